//! engine::apply
//!
//! The apply pass: every scheduled change is applied as one batch, or none
//! is.
//!
//! # Phases
//!
//! **BuildingContext** assembles the candidate context: replacement schemas
//! of pending updates, every other surviving catalog module, catalog
//! features, pending feature changes, pending installs with their requested
//! features, then `finalize` (augments, leafrefs, leafref targets).
//!
//! **Validating** checks, each step gated on the previous, that
//!
//! 1. no module scheduled for removal is still implemented
//! 2. every module a condition refers to is implemented, and every
//!    implemented module's dependencies can be extracted
//! 3. the persisted startup and running data, plus install seed data, are
//!    valid in the candidate
//!
//! **Committing** runs the finalizers, writes the data back, rebuilds all
//! dependency records and stores the catalog.
//!
//! A failed check aborts the pass with a [`Rejection`] and nothing written.
//! Store and consistency errors are hard errors and propagate as
//! [`EngineError`].

use std::collections::BTreeSet;
use std::fmt;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::imports::ImportLookup;
use super::{Engine, EngineError};
use crate::catalog::deps::{condition_modules, extract};
use crate::catalog::{Catalog, CatalogError, FeatureChange, ModuleEntry};
use crate::core::types::{Datastore, ModuleName};
use crate::schema::{DataError, DataTree, ModuleId, ParseMode, SchemaContext, SchemaError};
use crate::store::Backend;

/// Apply pass states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    Idle,
    BuildingContext,
    Validating,
    Committing,
    Aborted,
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyPhase::Idle => "idle",
            ApplyPhase::BuildingContext => "building-context",
            ApplyPhase::Validating => "validating",
            ApplyPhase::Committing => "committing",
            ApplyPhase::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Why a batch was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// A module failed to load, or the context failed to finalize.
    #[error("{}", load_failed(.module, .message))]
    LoadFailed {
        module: Option<ModuleName>,
        message: String,
    },

    /// A module scheduled for removal is still needed by another module.
    #[error("Cannot remove module \"{module}\" because some other installed module depends on it.")]
    StillInUse { module: ModuleName },

    /// A condition refers to a module that would not be implemented.
    #[error("Module \"{module}\" depends on module \"{dependency}\", which is not implemented.")]
    MissingDependency {
        module: ModuleName,
        dependency: ModuleName,
    },

    /// Stored or seed data do not fit the new schemas.
    #[error("Data are not valid with the scheduled changes: {message}")]
    IncompatibleData { message: String },
}

fn load_failed(module: &Option<ModuleName>, message: &str) -> String {
    match module {
        Some(m) => format!("Loading module \"{}\" failed: {}", m, message),
        None => format!("Building the new schema context failed: {}", message),
    }
}

/// What a committed pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Newly installed modules, dependencies included.
    pub installed: Vec<ModuleName>,
    pub updated: Vec<ModuleName>,
    pub removed: Vec<ModuleName>,
    pub features: Vec<(ModuleName, FeatureChange)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.updated.is_empty() && self.removed.is_empty() && self.features.is_empty()
    }
}

/// Result of [`Engine::apply_scheduled_changes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// The catalog was rewritten.
    pub changed: bool,
    /// The batch was rejected; everything stays scheduled.
    pub failed: bool,
    pub rejection: Option<Rejection>,
    pub changes: ChangeSet,
}

impl ApplyOutcome {
    fn unchanged() -> Self {
        Self {
            changed: false,
            failed: false,
            rejection: None,
            changes: ChangeSet::default(),
        }
    }

    fn rejected(rejection: Rejection) -> Self {
        Self {
            changed: false,
            failed: true,
            rejection: Some(rejection),
            changes: ChangeSet::default(),
        }
    }
}

/// Either the next value of the pass or the reason it stops.
type Soft<T> = Result<T, Rejection>;

/// Tracks and logs phase transitions.
struct Pass {
    phase: ApplyPhase,
}

impl Pass {
    fn new() -> Self {
        Self {
            phase: ApplyPhase::Idle,
        }
    }

    fn enter(&mut self, next: ApplyPhase) {
        debug!(from = %self.phase, to = %next, "apply phase");
        self.phase = next;
    }

    fn abort(&mut self, rejection: Rejection) -> ApplyOutcome {
        warn!("{}", rejection);
        warn!("Failed to apply some changes, leaving all changes scheduled.");
        self.enter(ApplyPhase::Aborted);
        self.enter(ApplyPhase::Idle);
        ApplyOutcome::rejected(rejection)
    }
}

/// Validated data of every surviving module.
struct CandidateData {
    startup: DataTree,
    running: DataTree,
}

impl CandidateData {
    fn tree(&self, ds: Datastore) -> &DataTree {
        match ds {
            Datastore::Startup => &self.startup,
            Datastore::Running => &self.running,
        }
    }
}

impl<B: Backend> Engine<B> {
    /// Apply every scheduled change as one batch.
    ///
    /// # Returns
    ///
    /// - `changed = false, failed = false` when nothing is scheduled
    /// - `changed = true` with the [`ChangeSet`] when the batch committed
    /// - `failed = true` with a [`Rejection`] when a check failed; the
    ///   catalog, ledger and data are left as they were
    ///
    /// # Errors
    ///
    /// Store failures and repository inconsistencies. A failure during
    /// commit may leave schema and data files partially rewritten; the
    /// catalog itself is only stored once everything else succeeded.
    pub fn apply_scheduled_changes(&mut self) -> Result<ApplyOutcome, EngineError> {
        let mut catalog = self.catalog()?;
        if !catalog.has_scheduled_changes() {
            info!("No scheduled changes.");
            return Ok(ApplyOutcome::unchanged());
        }
        info!("Applying scheduled changes.");
        let mut pass = Pass::new();

        pass.enter(ApplyPhase::BuildingContext);
        let ctx = match self.build_context(&catalog)? {
            Ok(ctx) => ctx,
            Err(rejection) => return Ok(pass.abort(rejection)),
        };

        pass.enter(ApplyPhase::Validating);
        if let Err(rejection) = self.check_removed(&catalog, &ctx) {
            return Ok(pass.abort(rejection));
        }
        if let Err(rejection) = self.check_dependencies(&ctx) {
            return Ok(pass.abort(rejection));
        }
        let data = match self.check_data(&catalog, &ctx)? {
            Ok(data) => data,
            Err(rejection) => return Ok(pass.abort(rejection)),
        };

        pass.enter(ApplyPhase::Committing);
        let changes = self.commit(&mut catalog, &ctx, &data)?;
        pass.enter(ApplyPhase::Idle);

        info!(
            fingerprint = catalog.fingerprint().short(),
            installed = changes.installed.len(),
            updated = changes.updated.len(),
            removed = changes.removed.len(),
            features = changes.features.len(),
            "Scheduled changes applied."
        );
        Ok(ApplyOutcome {
            changed: true,
            failed: false,
            rejection: None,
            changes,
        })
    }

    // =========================================================================
    // BuildingContext
    // =========================================================================

    fn build_context(&self, catalog: &Catalog) -> Result<Soft<SchemaContext>, EngineError> {
        let parser = self.parser.as_ref();
        let lookup = ImportLookup::new(catalog, &self.backend, &[]);
        let mut ctx = SchemaContext::new();

        // Replacement schemas first, so importers see the new revisions.
        for entry in &catalog.modules {
            let Some(update) = &entry.pending.update else {
                continue;
            };
            let loaded = ctx
                .load_module(parser, &update.schema_text, true, &lookup)
                .and_then(|id| enable_all(&mut ctx, id, entry));
            if let Err(e) = loaded {
                return Ok(Err(load_error(&entry.name, e)));
            }
            debug!(module = %entry.name, "loaded updated module");
        }

        for entry in &catalog.modules {
            if entry.pending.removal || entry.pending.update.is_some() {
                continue;
            }
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
            let loaded = ctx
                .load_module(parser, &text, true, &lookup)
                .and_then(|id| enable_all(&mut ctx, id, entry));
            if let Err(e) = loaded {
                return Ok(Err(load_error(&entry.name, e)));
            }
        }

        for entry in catalog.modules.iter().filter(|m| !m.pending.feature_changes.is_empty()) {
            if entry.pending.removal {
                warn!(
                    "Module \"{}\" is scheduled for both removal and feature changes, ignoring them.",
                    entry.name
                );
                continue;
            }
            let id = ctx.find_module(entry.name.as_str()).ok_or_else(|| {
                EngineError::Internal(format!("module \"{}\" missing from the new context", entry.name))
            })?;
            for change in &entry.pending.feature_changes {
                let result = if change.enable {
                    ctx.enable_feature(id, &change.feature)
                } else {
                    ctx.disable_feature(id, &change.feature)
                };
                if let Err(e) = result {
                    return Ok(Err(load_error(&entry.name, e)));
                }
            }
        }

        for install in &catalog.installs {
            let loaded = ctx
                .load_module(parser, &install.schema_text, true, &lookup)
                .and_then(|id| {
                    install
                        .features
                        .iter()
                        .try_for_each(|f| ctx.enable_feature(id, f))
                });
            if let Err(e) = loaded {
                warn!("Installing module \"{}\" failed.", install.name);
                return Ok(Err(load_error(&install.name, e)));
            }
        }

        if let Err(e) = ctx.finalize() {
            return Ok(Err(Rejection::LoadFailed {
                module: None,
                message: e.to_string(),
            }));
        }
        Ok(Ok(ctx))
    }

    // =========================================================================
    // Validating
    // =========================================================================

    fn check_removed(&self, catalog: &Catalog, ctx: &SchemaContext) -> Soft<()> {
        for entry in catalog.modules.iter().filter(|m| m.pending.removal) {
            let still_used = ctx
                .find_module(entry.name.as_str())
                .map(|id| ctx.module(id))
                .map(|m| m.implemented && m.revision == entry.revision)
                .unwrap_or(false);
            if still_used {
                return Err(Rejection::StillInUse {
                    module: entry.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_dependencies(&self, ctx: &SchemaContext) -> Soft<()> {
        let atomizer = self.atomizer.as_ref();
        for id in ctx.module_ids().filter(|id| ctx.module(*id).implemented) {
            let module = &ctx.module(id).name;
            let extract_failed = |e: CatalogError| Rejection::LoadFailed {
                module: Some(module.clone()),
                message: e.to_string(),
            };

            let conditions = condition_modules(ctx, id, atomizer).map_err(extract_failed)?;
            for dep in conditions {
                if !ctx.module(dep).implemented {
                    return Err(Rejection::MissingDependency {
                        module: module.clone(),
                        dependency: ctx.module(dep).name.clone(),
                    });
                }
            }
            extract(ctx, id, atomizer).map_err(extract_failed)?;
        }
        Ok(())
    }

    fn check_data(&self, catalog: &Catalog, ctx: &SchemaContext) -> Result<Soft<CandidateData>, EngineError> {
        let incompatible = |e: DataError| Rejection::IncompatibleData {
            message: e.to_string(),
        };
        let mut data = CandidateData {
            startup: DataTree::new(),
            running: DataTree::new(),
        };

        for entry in &catalog.modules {
            for ds in Datastore::ALL {
                let Some(value) = self.backend.read_module_data(&entry.name, ds)? else {
                    continue;
                };
                match DataTree::parse(ctx, &value, ParseMode::Lenient) {
                    Ok(tree) => match ds {
                        Datastore::Startup => data.startup.merge(tree),
                        Datastore::Running => data.running.merge(tree),
                    },
                    Err(e) => return Ok(Err(incompatible(e))),
                }
            }
        }

        for install in &catalog.installs {
            let Some(seed) = &install.data else {
                continue;
            };
            match DataTree::parse(ctx, seed, ParseMode::Strict) {
                Ok(tree) => {
                    data.startup.merge(tree.clone());
                    data.running.merge(tree);
                }
                Err(e) => return Ok(Err(incompatible(e))),
            }
        }

        for tree in [&data.startup, &data.running] {
            if let Err(e) = tree.validate(ctx) {
                return Ok(Err(incompatible(e)));
            }
        }
        Ok(Ok(data))
    }

    // =========================================================================
    // Committing
    // =========================================================================

    fn commit(&mut self, catalog: &mut Catalog, ctx: &SchemaContext, data: &CandidateData) -> Result<ChangeSet, EngineError> {
        let mut changes = ChangeSet::default();
        let mut visited: BTreeSet<ModuleName> = BTreeSet::new();

        let names: Vec<ModuleName> = catalog.module_names().cloned().collect();
        for name in &names {
            let Some(entry) = catalog.find_module(name.as_str()) else {
                continue;
            };
            if entry.pending.removal {
                self.finalize_remove(catalog, ctx, name)?;
                changes.removed.push(name.clone());
            } else if entry.pending.update.is_some() {
                let features = entry.pending.feature_changes.clone();
                self.finalize_update(catalog, ctx, name, &mut visited, &mut changes.installed)?;
                changes.updated.push(name.clone());
                changes
                    .features
                    .extend(features.into_iter().map(|c| (name.clone(), c)));
            } else if !entry.pending.feature_changes.is_empty() {
                let applied = finalize_features(catalog, name)?;
                changes
                    .features
                    .extend(applied.into_iter().map(|c| (name.clone(), c)));
            }
        }

        let installs = std::mem::take(&mut catalog.installs);
        for install in &installs {
            let id = in_context(ctx, &install.name)?;
            let importer = installs
                .iter()
                .filter(|other| other.name != install.name)
                .find(|other| {
                    ctx.find_module(other.name.as_str())
                        .map(|o| ctx.module(o).imports.contains(&id))
                        .unwrap_or(false)
                });
            if let Some(importer) = importer {
                info!(
                    "Module \"{}\" will be installed as \"{}\" module dependency.",
                    install.name, importer.name
                );
                continue;
            }
            self.add_with_imports(catalog, ctx, id, &mut visited, &mut changes.installed)?;
        }

        // Modules the candidate implements on its own, e.g. leafref targets.
        for id in ctx.module_ids() {
            let m = ctx.module(id);
            if m.implemented && catalog.find_module(m.name.as_str()).is_none() {
                self.add_with_imports(catalog, ctx, id, &mut visited, &mut changes.installed)?;
            }
        }

        for entry in &catalog.modules {
            for ds in Datastore::ALL {
                let value = data.tree(ds).module_data(entry.name.as_str()).unwrap_or_else(|| json!({}));
                self.backend.write_module_data(&entry.name, ds, &value, true)?;
            }
        }

        catalog.clear_all_deps();
        let names: Vec<ModuleName> = catalog.module_names().cloned().collect();
        for name in &names {
            catalog.add_all_deps(name.as_str(), ctx, self.atomizer.as_ref())?;
        }

        self.store_catalog(catalog)?;
        Ok(changes)
    }

    /// Drop a module with its data. Its schema file stays while a module
    /// in the candidate still imports it.
    fn finalize_remove(&mut self, catalog: &mut Catalog, ctx: &SchemaContext, name: &ModuleName) -> Result<(), EngineError> {
        let entry = catalog.remove_module(name.as_str())?;
        self.backend.remove_module_data(&entry.name)?;
        if !ctx.is_imported(&entry.name) {
            self.backend.remove_schema(&entry.name, entry.revision.as_ref())?;
        }
        info!("Module \"{}\" was removed.", entry.name);
        Ok(())
    }

    /// Replace a module's record with its new revision. Data stay; replay
    /// support carries over.
    fn finalize_update(
        &mut self,
        catalog: &mut Catalog,
        ctx: &SchemaContext,
        name: &ModuleName,
        visited: &mut BTreeSet<ModuleName>,
        installed: &mut Vec<ModuleName>,
    ) -> Result<(), EngineError> {
        let old = catalog.remove_module(name.as_str())?;
        self.backend.remove_schema(&old.name, old.revision.as_ref())?;

        let id = in_context(ctx, name)?;
        let m = ctx.module(id);
        let entry = catalog.add_module(m.name.clone(), m.revision.clone(), m.enabled_features())?;
        entry.replay_support = old.replay_support;
        self.add_with_imports(catalog, ctx, id, visited, installed)?;

        info!("Module \"{}\" was updated to revision {}.", m.name, m.revision_label());
        Ok(())
    }

    /// Store the schema of `id` and of its imports, recursively, and add
    /// every implemented one the catalog lacks.
    fn add_with_imports(
        &mut self,
        catalog: &mut Catalog,
        ctx: &SchemaContext,
        id: ModuleId,
        visited: &mut BTreeSet<ModuleName>,
        installed: &mut Vec<ModuleName>,
    ) -> Result<(), EngineError> {
        let m = ctx.module(id);
        if !visited.insert(m.name.clone()) {
            return Ok(());
        }
        self.backend.store_schema(&m.name, m.revision.as_ref(), &m.text)?;

        if m.implemented && catalog.find_module(m.name.as_str()).is_none() {
            catalog.add_module(m.name.clone(), m.revision.clone(), m.enabled_features())?;
            info!("Module \"{}\" was installed.", m.name);
            installed.push(m.name.clone());
        }
        for &import in &m.imports {
            self.add_with_imports(catalog, ctx, import, visited, installed)?;
        }
        Ok(())
    }
}

/// Flip the module's feature memberships and clear its pending changes.
fn finalize_features(catalog: &mut Catalog, name: &ModuleName) -> Result<Vec<FeatureChange>, EngineError> {
    let entry: &mut ModuleEntry = catalog
        .find_module_mut(name.as_str())
        .ok_or_else(|| EngineError::Internal(format!("module \"{}\" vanished during commit", name)))?;
    let changes = std::mem::take(&mut entry.pending.feature_changes);
    for change in &changes {
        if change.enable {
            if !entry.has_feature(&change.feature) {
                entry.enabled_features.push(change.feature.clone());
            }
        } else {
            entry.enabled_features.retain(|f| *f != change.feature);
        }
        info!(
            "Module \"{}\" feature \"{}\" was {}.",
            name,
            change.feature,
            if change.enable { "enabled" } else { "disabled" }
        );
    }
    Ok(changes)
}

fn enable_all(ctx: &mut SchemaContext, id: ModuleId, entry: &ModuleEntry) -> Result<(), SchemaError> {
    entry
        .enabled_features
        .iter()
        .try_for_each(|f| ctx.enable_feature(id, f))
}

fn load_error(module: &ModuleName, e: SchemaError) -> Rejection {
    Rejection::LoadFailed {
        module: Some(module.clone()),
        message: e.to_string(),
    }
}

fn in_context(ctx: &SchemaContext, name: &ModuleName) -> Result<ModuleId, EngineError> {
    ctx.find_module(name.as_str())
        .ok_or_else(|| EngineError::Internal(format!("module \"{}\" missing from the new context", name)))
}
