//! engine::schedule
//!
//! Scheduling operations: each validates one request against the current
//! catalog and records it in the change ledger, or undoes a recorded
//! request. Nothing outside the catalog changes, except that imports found
//! in a search directory are copied into the repository.
//!
//! # Invariants
//!
//! - A rejected request leaves the stored catalog untouched
//! - Every accepted request is stored before the call returns

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, info};

use super::imports::{FoundImport, ImportLookup};
use super::{Engine, EngineError};
use crate::catalog::{Catalog, FeatureChange, ModuleEntry, PendingInstall, PendingUpdate};
use crate::core::types::{FeatureName, ModuleName, UtcTimestamp};
use crate::schema::{DataTree, ModuleId, ModuleSource, ParseMode, SchemaContext};
use crate::store::Backend;

/// A module loaded on its own to check a request.
struct Scratch {
    ctx: SchemaContext,
    found: Vec<FoundImport>,
}

impl<B: Backend> Engine<B> {
    // =========================================================================
    // Install
    // =========================================================================

    /// Schedule a module for installation with the given features enabled
    /// and optional seed data for both datastores.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the module is installed
    /// - `AlreadyScheduled` if its installation is already scheduled
    /// - `NotFound` for a feature the module does not define
    /// - `InvalidRequest` if the module cannot be loaded or the seed data
    ///   does not fit it
    pub fn schedule_install(
        &mut self,
        schema_text: &str,
        features: &[FeatureName],
        data: Option<&Value>,
    ) -> Result<ModuleName, EngineError> {
        let source = self.parse_source(schema_text)?;
        let name = source.name.clone();
        let mut catalog = self.catalog()?;

        if catalog.find_module(name.as_str()).is_some() {
            return Err(EngineError::AlreadyExists(format!(
                "Module \"{}\" is already installed.",
                name
            )));
        }
        if catalog.find_install(name.as_str()).is_some() {
            return Err(EngineError::AlreadyScheduled(format!(
                "Module \"{}\" already scheduled for installation.",
                name
            )));
        }
        let features = dedup_features(features);
        for f in &features {
            if !source.features.contains(f) {
                return Err(missing_feature(&name, f));
            }
        }

        let scratch = self.scratch(&catalog, &name, schema_text, &features)?;
        let data = match data {
            Some(value) => seed_data(&scratch.ctx, &name, value)?,
            None => None,
        };

        self.store_found(scratch.found)?;
        catalog.add_install(PendingInstall {
            name: name.clone(),
            revision: source.revision,
            schema_text: schema_text.to_string(),
            features,
            data,
        })?;
        self.store_catalog(&catalog)?;
        info!("Module \"{}\" scheduled for installation.", name);
        Ok(name)
    }

    /// # Errors
    ///
    /// `NotScheduled` if the module is not scheduled for installation.
    pub fn unschedule_install(&mut self, module: &str) -> Result<(), EngineError> {
        let mut catalog = self.catalog()?;
        if catalog.remove_install(module).is_none() {
            return Err(EngineError::NotScheduled(format!(
                "Module \"{}\" not scheduled for installation.",
                module
            )));
        }
        self.store_catalog(&catalog)?;
        info!("Module \"{}\" installation unscheduled.", module);
        Ok(())
    }

    /// Replace the seed data of a scheduled installation. `None` drops it.
    ///
    /// # Errors
    ///
    /// `NotScheduled` if the module is not scheduled for installation,
    /// `InvalidRequest` if the data does not fit the module.
    pub fn set_install_data(&mut self, module: &str, data: Option<&Value>) -> Result<(), EngineError> {
        let mut catalog = self.catalog()?;
        let install = catalog.find_install(module).cloned().ok_or_else(|| {
            EngineError::NotScheduled(format!("Module \"{}\" not scheduled for installation.", module))
        })?;

        let data = match data {
            Some(value) => {
                let scratch = self.scratch(&catalog, &install.name, &install.schema_text, &install.features)?;
                seed_data(&scratch.ctx, &install.name, value)?
            }
            None => None,
        };

        if let Some(i) = catalog.find_install_mut(module) {
            i.data = data;
        }
        self.store_catalog(&catalog)?;
        info!("Module \"{}\" installation data replaced.", module);
        Ok(())
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// # Errors
    ///
    /// - `NotFound` if the module is not installed
    /// - `AlreadyScheduled` if its removal is already scheduled
    /// - `InvalidRequest` if an update of the module is scheduled
    pub fn schedule_remove(&mut self, module: &str) -> Result<(), EngineError> {
        let mut catalog = self.catalog()?;
        let entry = installed_entry_mut(&mut catalog, module)?;
        if entry.pending.removal {
            return Err(EngineError::AlreadyScheduled(format!(
                "Module \"{}\" already scheduled for deletion.",
                module
            )));
        }
        if entry.pending.update.is_some() {
            return Err(EngineError::InvalidRequest(format!(
                "Module \"{}\" is scheduled for an update; cancel it first.",
                module
            )));
        }
        entry.pending.removal = true;
        self.store_catalog(&catalog)?;
        info!("Module \"{}\" scheduled for deletion.", module);
        Ok(())
    }

    /// Cancel a scheduled removal, together with the scheduled removal of
    /// every installed module it imports, transitively.
    ///
    /// # Errors
    ///
    /// `NotFound` if the module is not installed, `NotScheduled` if its
    /// removal is not scheduled.
    pub fn unschedule_remove(&mut self, module: &str) -> Result<(), EngineError> {
        let mut catalog = self.catalog()?;
        if !installed_entry(&catalog, module)?.pending.removal {
            return Err(EngineError::NotScheduled(format!(
                "Module \"{}\" not scheduled for deletion.",
                module
            )));
        }

        let mut queue = vec![module.to_string()];
        let mut visited = BTreeSet::new();
        while let Some(current) = queue.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let imports = self.installed_imports(&catalog, &current)?;
            if let Some(entry) = catalog.find_module_mut(&current) {
                if entry.pending.removal {
                    entry.pending.removal = false;
                    info!("Module \"{}\" deletion unscheduled.", current);
                }
            }
            queue.extend(imports.into_iter().map(String::from));
        }

        self.store_catalog(&catalog)
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Schedule an update of an installed module to a newer revision. The
    /// module's enabled features carry over.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the module is not installed
    /// - `AlreadyScheduled` if an update is already scheduled
    /// - `InvalidRequest` if the revision is not newer, the module is
    ///   scheduled for removal, or the new revision cannot be loaded with
    ///   the enabled features
    pub fn schedule_update(&mut self, schema_text: &str) -> Result<ModuleName, EngineError> {
        let source = self.parse_source(schema_text)?;
        let name = source.name.clone();
        let mut catalog = self.catalog()?;

        let entry = installed_entry(&catalog, name.as_str())?;
        if entry.pending.update.is_some() {
            return Err(EngineError::AlreadyScheduled(format!(
                "Module \"{}\" already scheduled for an update.",
                name
            )));
        }
        if entry.pending.removal {
            return Err(EngineError::InvalidRequest(format!(
                "Module \"{}\" is scheduled for deletion; cancel it first.",
                name
            )));
        }
        let newer = match (&entry.revision, &source.revision) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(old), Some(new)) => new > old,
        };
        if !newer {
            return Err(EngineError::InvalidRequest(format!(
                "Module \"{}\" revision {} is not newer than the installed revision {}.",
                name,
                source
                    .revision
                    .as_ref()
                    .map(|r| r.as_str())
                    .unwrap_or("(none)"),
                entry.revision_label()
            )));
        }

        let features = entry.enabled_features.clone();
        let scratch = self.scratch(&catalog, &name, schema_text, &features)?;
        self.store_found(scratch.found)?;

        let entry = installed_entry_mut(&mut catalog, name.as_str())?;
        entry.pending.update = Some(PendingUpdate {
            revision: source.revision,
            schema_text: schema_text.to_string(),
        });
        self.store_catalog(&catalog)?;
        info!("Module \"{}\" scheduled for an update.", name);
        Ok(name)
    }

    /// # Errors
    ///
    /// `NotFound` if the module is not installed, `NotScheduled` if no
    /// update is scheduled.
    pub fn unschedule_update(&mut self, module: &str) -> Result<(), EngineError> {
        let mut catalog = self.catalog()?;
        let entry = installed_entry_mut(&mut catalog, module)?;
        if entry.pending.update.take().is_none() {
            return Err(EngineError::NotScheduled(format!(
                "Module \"{}\" not scheduled for an update.",
                module
            )));
        }
        self.store_catalog(&catalog)?;
        info!("Module \"{}\" update unscheduled.", module);
        Ok(())
    }

    // =========================================================================
    // Features
    // =========================================================================

    /// Schedule enabling or disabling a feature. Requesting the opposite of
    /// a pending change cancels that change.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the module is not installed or has no such feature
    /// - `AlreadyScheduled` if the same change is already pending
    /// - `AlreadySet` if the feature is already in the requested state
    pub fn schedule_feature_change(
        &mut self,
        module: &str,
        feature: &FeatureName,
        enable: bool,
    ) -> Result<(), EngineError> {
        let mut catalog = self.catalog()?;
        let entry = installed_entry(&catalog, module)?;
        let defined = self.installed_source(entry)?.features;
        if !defined.contains(feature) {
            return Err(missing_feature(&entry.name, feature));
        }

        let (verb, state) = if enable {
            ("enabling", "enabled")
        } else {
            ("disabling", "disabled")
        };
        let entry = installed_entry_mut(&mut catalog, module)?;
        let pending = entry
            .pending
            .feature_changes
            .iter()
            .position(|c| c.feature == *feature);

        match pending {
            Some(idx) if entry.pending.feature_changes[idx].enable == enable => {
                return Err(EngineError::AlreadyScheduled(format!(
                    "Module \"{}\" feature \"{}\" already scheduled to be {}.",
                    module, feature, state
                )));
            }
            Some(idx) => {
                entry.pending.feature_changes.remove(idx);
                self.store_catalog(&catalog)?;
                info!("Module \"{}\" feature \"{}\" {} unscheduled.", module, feature, verb);
            }
            None if entry.has_feature(feature) == enable => {
                return Err(EngineError::AlreadySet(format!(
                    "Module \"{}\" feature \"{}\" is already {}.",
                    module, feature, state
                )));
            }
            None => {
                entry.pending.feature_changes.push(FeatureChange {
                    feature: feature.clone(),
                    enable,
                });
                self.store_catalog(&catalog)?;
                info!("Module \"{}\" feature \"{}\" {} scheduled.", module, feature, verb);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Replay support
    // =========================================================================

    /// Turn notification replay support on or off for one module, or for
    /// every installed module when `module` is `None`. Takes effect
    /// immediately. Enabling keeps an existing timestamp.
    ///
    /// # Errors
    ///
    /// `NotFound` if the named module is not installed.
    pub fn set_replay_support(&mut self, module: Option<&str>, enable: bool) -> Result<(), EngineError> {
        let mut catalog = self.catalog()?;
        if let Some(name) = module {
            installed_entry(&catalog, name)?;
        }

        let now = UtcTimestamp::now();
        for entry in catalog
            .modules
            .iter_mut()
            .filter(|m| module.map(|n| m.name.as_str() == n).unwrap_or(true))
        {
            if enable && entry.replay_support.is_none() {
                entry.replay_support = Some(now.clone());
                info!("Module \"{}\" replay support enabled.", entry.name);
            } else if !enable && entry.replay_support.take().is_some() {
                info!("Module \"{}\" replay support disabled.", entry.name);
            }
        }
        self.store_catalog(&catalog)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn parse_source(&self, text: &str) -> Result<ModuleSource, EngineError> {
        self.parser
            .parse(text)
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))
    }

    /// Load one module, implemented, into an empty context and enable
    /// `features`.
    fn scratch(
        &self,
        catalog: &Catalog,
        name: &ModuleName,
        text: &str,
        features: &[FeatureName],
    ) -> Result<Scratch, EngineError> {
        let cannot_load =
            |e: crate::schema::SchemaError| EngineError::InvalidRequest(format!("Module \"{}\" cannot be loaded: {}", name, e));

        let lookup = ImportLookup::new(catalog, &self.backend, &self.search_dirs);
        let mut ctx = SchemaContext::new();
        let module: ModuleId = ctx
            .load_module(self.parser.as_ref(), text, true, &lookup)
            .map_err(cannot_load)?;
        for f in features {
            ctx.enable_feature(module, f).map_err(cannot_load)?;
        }
        ctx.finalize().map_err(cannot_load)?;

        Ok(Scratch {
            ctx,
            found: lookup.into_found(),
        })
    }

    /// Copy imports found in search directories into the repository,
    /// under the revision their source declares.
    fn store_found(&mut self, found: Vec<FoundImport>) -> Result<(), EngineError> {
        for f in found {
            let revision = self
                .parser
                .parse(&f.text)
                .map(|s| s.revision)
                .unwrap_or(f.revision);
            self.backend.store_schema(&f.name, revision.as_ref(), &f.text)?;
            debug!(module = %f.name, "stored import from search directory");
        }
        Ok(())
    }

    /// Stored source of an installed module.
    pub(crate) fn installed_source(&self, entry: &ModuleEntry) -> Result<ModuleSource, EngineError> {
        let text = self
            .backend
            .find_schema(&entry.name, entry.revision.as_ref())?
            .ok_or_else(|| {
                EngineError::Corrupted(format!(
                    "schema of installed module \"{}\" revision {} is missing",
                    entry.name,
                    entry.revision_label()
                ))
            })?;
        self.parser.parse(&text).map_err(|e| {
            EngineError::Corrupted(format!("stored schema of module \"{}\": {}", entry.name, e))
        })
    }

    /// Installed modules imported by an installed module.
    fn installed_imports(&self, catalog: &Catalog, module: &str) -> Result<Vec<ModuleName>, EngineError> {
        let entry = match catalog.find_module(module) {
            Some(entry) => entry,
            None => return Ok(Vec::new()),
        };
        Ok(self
            .installed_source(entry)?
            .imports
            .into_iter()
            .map(|i| i.module)
            .filter(|m| catalog.find_module(m.as_str()).is_some())
            .collect())
    }
}

fn installed_entry<'c>(catalog: &'c Catalog, module: &str) -> Result<&'c ModuleEntry, EngineError> {
    catalog
        .find_module(module)
        .ok_or_else(|| not_installed(module))
}

fn installed_entry_mut<'c>(catalog: &'c mut Catalog, module: &str) -> Result<&'c mut ModuleEntry, EngineError> {
    catalog
        .find_module_mut(module)
        .ok_or_else(|| not_installed(module))
}

fn not_installed(module: &str) -> EngineError {
    EngineError::NotFound(format!("Module \"{}\" is not installed.", module))
}

fn missing_feature(module: &ModuleName, feature: &FeatureName) -> EngineError {
    EngineError::NotFound(format!(
        "Feature \"{}\" was not found in module \"{}\".",
        feature, module
    ))
}

fn dedup_features(features: &[FeatureName]) -> Vec<FeatureName> {
    let mut out: Vec<FeatureName> = Vec::with_capacity(features.len());
    for f in features {
        if !out.contains(f) {
            out.push(f.clone());
        }
    }
    out
}

/// Strictly parse seed data against the scratch context.
/// Empty data is no data.
fn seed_data(ctx: &SchemaContext, module: &ModuleName, value: &Value) -> Result<Option<Value>, EngineError> {
    let tree = DataTree::parse(ctx, value, ParseMode::Strict).map_err(|e| {
        EngineError::InvalidRequest(format!("Invalid data for module \"{}\": {}", module, e))
    })?;
    Ok((!tree.is_empty()).then(|| tree.to_value()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::*;
    use serde_json::json;

    mod install {
        use super::*;

        #[test]
        fn schedules_and_lists() {
            let mut e = engine();
            let n = e.schedule_install(BASE, &[feature("extra")], None).unwrap();
            assert_eq!(n, name("base"));

            let c = e.catalog().unwrap();
            let install = c.find_install("base").unwrap();
            assert_eq!(install.features, vec![feature("extra")]);
            assert!(c.find_module("base").is_none());
        }

        #[test]
        fn twice_is_already_scheduled() {
            let mut e = engine();
            e.schedule_install(BASE, &[], None).unwrap();
            assert!(matches!(
                e.schedule_install(BASE, &[], None),
                Err(EngineError::AlreadyScheduled(_))
            ));
        }

        #[test]
        fn installed_module_already_exists() {
            let mut e = installed(&[BASE]);
            assert!(matches!(
                e.schedule_install(BASE, &[], None),
                Err(EngineError::AlreadyExists(_))
            ));
        }

        #[test]
        fn unknown_feature() {
            let mut e = engine();
            let err = e.schedule_install(BASE, &[feature("nope")], None).unwrap_err();
            assert!(matches!(err, EngineError::NotFound(_)));
            assert!(!e.catalog().unwrap().has_scheduled_changes());
        }

        #[test]
        fn unresolvable_import_is_rejected() {
            let mut e = engine();
            let err = e.schedule_install(USER, &[], None).unwrap_err();
            assert!(matches!(err, EngineError::InvalidRequest(_)));
        }

        #[test]
        fn import_from_pending_install() {
            let mut e = engine();
            e.schedule_install(BASE, &[], None).unwrap();
            e.schedule_install(USER, &[], None).unwrap();
            assert_eq!(e.catalog().unwrap().installs.len(), 2);
        }

        #[test]
        fn seed_data_is_normalized() {
            let mut e = engine();
            e.schedule_install(BASE, &[], Some(&json!({"base:items": {"base:count": 3}})))
                .unwrap();
            let c = e.catalog().unwrap();
            assert_eq!(
                c.find_install("base").unwrap().data,
                Some(json!({"base:items": {"count": 3}}))
            );
        }

        #[test]
        fn seed_data_must_fit() {
            let mut e = engine();
            let err = e
                .schedule_install(BASE, &[], Some(&json!({"base:items": {"bogus": 1}})))
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidRequest(_)));

            // Feature-guarded nodes need the feature.
            let err = e
                .schedule_install(BASE, &[], Some(&json!({"base:items": {"note": "x"}})))
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidRequest(_)));
            e.schedule_install(BASE, &[feature("extra")], Some(&json!({"base:items": {"note": "x"}})))
                .unwrap();
        }

        #[test]
        fn unschedule() {
            let mut e = engine();
            assert!(matches!(
                e.unschedule_install("base"),
                Err(EngineError::NotScheduled(_))
            ));
            e.schedule_install(BASE, &[], None).unwrap();
            e.unschedule_install("base").unwrap();
            assert!(!e.catalog().unwrap().has_scheduled_changes());
        }

        #[test]
        fn replace_seed_data() {
            let mut e = engine();
            e.schedule_install(BASE, &[], Some(&items(1))).unwrap();
            e.set_install_data("base", Some(&items(2))).unwrap();
            assert_eq!(e.catalog().unwrap().find_install("base").unwrap().data, Some(items(2)));
            e.set_install_data("base", None).unwrap();
            assert_eq!(e.catalog().unwrap().find_install("base").unwrap().data, None);
            assert!(matches!(
                e.set_install_data("user", None),
                Err(EngineError::NotScheduled(_))
            ));
        }
    }

    mod remove {
        use super::*;

        #[test]
        fn schedule_and_cancel() {
            let mut e = installed(&[BASE]);
            e.schedule_remove("base").unwrap();
            assert!(matches!(
                e.schedule_remove("base"),
                Err(EngineError::AlreadyScheduled(_))
            ));
            e.unschedule_remove("base").unwrap();
            assert!(matches!(
                e.unschedule_remove("base"),
                Err(EngineError::NotScheduled(_))
            ));
        }

        #[test]
        fn not_installed() {
            let mut e = engine();
            assert!(matches!(e.schedule_remove("base"), Err(EngineError::NotFound(_))));
        }

        #[test]
        fn cancel_covers_installed_imports() {
            let mut e = installed(&[BASE, LOOSE]);
            e.schedule_remove("loose").unwrap();
            e.schedule_remove("base").unwrap();
            e.unschedule_remove("loose").unwrap();
            let c = e.catalog().unwrap();
            assert!(!c.find_module("loose").unwrap().pending.removal);
            assert!(!c.find_module("base").unwrap().pending.removal);
        }

        #[test]
        fn cancel_does_not_touch_importers() {
            let mut e = installed(&[BASE, LOOSE]);
            e.schedule_remove("loose").unwrap();
            e.schedule_remove("base").unwrap();
            e.unschedule_remove("base").unwrap();
            assert!(e.catalog().unwrap().find_module("loose").unwrap().pending.removal);
        }

        #[test]
        fn conflicts_with_update() {
            let mut e = installed(&[BASE]);
            e.schedule_update(BASE_V2).unwrap();
            assert!(matches!(
                e.schedule_remove("base"),
                Err(EngineError::InvalidRequest(_))
            ));
        }
    }

    mod update {
        use super::*;

        #[test]
        fn schedule_and_cancel() {
            let mut e = installed(&[BASE]);
            assert_eq!(e.schedule_update(BASE_V2).unwrap(), name("base"));
            assert!(matches!(
                e.schedule_update(BASE_NARROW),
                Err(EngineError::AlreadyScheduled(_))
            ));
            e.unschedule_update("base").unwrap();
            assert!(matches!(
                e.unschedule_update("base"),
                Err(EngineError::NotScheduled(_))
            ));
        }

        #[test]
        fn must_be_newer() {
            let mut e = installed(&[BASE]);
            assert!(matches!(
                e.schedule_update(BASE),
                Err(EngineError::InvalidRequest(_))
            ));
        }

        #[test]
        fn not_installed() {
            let mut e = engine();
            assert!(matches!(e.schedule_update(BASE_V2), Err(EngineError::NotFound(_))));
        }
    }

    mod features {
        use super::*;

        #[test]
        fn enable_twice_is_already_scheduled() {
            let mut e = installed(&[BASE]);
            e.schedule_feature_change("base", &feature("extra"), true).unwrap();
            assert!(matches!(
                e.schedule_feature_change("base", &feature("extra"), true),
                Err(EngineError::AlreadyScheduled(_))
            ));
        }

        #[test]
        fn opposite_request_cancels() {
            let mut e = installed(&[BASE]);
            e.schedule_feature_change("base", &feature("extra"), true).unwrap();
            e.schedule_feature_change("base", &feature("extra"), false).unwrap();
            assert!(!e.catalog().unwrap().has_scheduled_changes());
        }

        #[test]
        fn already_in_state() {
            let mut e = installed(&[BASE]);
            assert!(matches!(
                e.schedule_feature_change("base", &feature("extra"), false),
                Err(EngineError::AlreadySet(_))
            ));
        }

        #[test]
        fn undated_module_reads_its_own_source() {
            use crate::core::types::Revision;
            use crate::store::SchemaRepository;

            let mut e = engine();
            let stale = r#"{"name": "m", "revision": "2020-01-01",
                "data": [{"kind": "leaf", "name": "old", "type": {"base": "string"}}]}"#;
            e.backend_mut()
                .store_schema(&name("m"), Some(&Revision::new("2020-01-01").unwrap()), stale)
                .unwrap();

            let current = r#"{"name": "m", "features": ["f"],
                "data": [{"kind": "leaf", "name": "new", "type": {"base": "string"}}]}"#;
            e.schedule_install(current, &[], None).unwrap();
            assert!(!e.apply_scheduled_changes().unwrap().failed);
            assert_eq!(e.catalog().unwrap().find_module("m").unwrap().revision, None);

            e.schedule_feature_change("m", &feature("f"), true).unwrap();
            let outcome = e.apply_scheduled_changes().unwrap();
            assert!(!outcome.failed);
            assert_eq!(
                e.catalog().unwrap().find_module("m").unwrap().enabled_features,
                vec![feature("f")]
            );
        }

        #[test]
        fn unknown_feature_or_module() {
            let mut e = installed(&[BASE]);
            assert!(matches!(
                e.schedule_feature_change("base", &feature("nope"), true),
                Err(EngineError::NotFound(_))
            ));
            assert!(matches!(
                e.schedule_feature_change("ghost", &feature("extra"), true),
                Err(EngineError::NotFound(_))
            ));
        }
    }

    mod replay {
        use super::*;

        #[test]
        fn enable_keeps_first_timestamp() {
            let mut e = installed(&[BASE]);
            e.set_replay_support(Some("base"), true).unwrap();
            let first = e.catalog().unwrap().find_module("base").unwrap().replay_support.clone();
            assert!(first.is_some());
            e.set_replay_support(Some("base"), true).unwrap();
            assert_eq!(e.catalog().unwrap().find_module("base").unwrap().replay_support, first);
        }

        #[test]
        fn all_modules() {
            let mut e = installed(&[BASE, LOOSE]);
            e.set_replay_support(None, true).unwrap();
            assert!(e.catalog().unwrap().modules.iter().all(|m| m.replay_support.is_some()));
            e.set_replay_support(None, false).unwrap();
            assert!(e.catalog().unwrap().modules.iter().all(|m| m.replay_support.is_none()));
        }

        #[test]
        fn unknown_module() {
            let mut e = engine();
            assert!(matches!(
                e.set_replay_support(Some("base"), true),
                Err(EngineError::NotFound(_))
            ));
        }
    }
}
