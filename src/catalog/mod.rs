//! catalog
//!
//! The persisted module catalog (v1).
//!
//! # Schema Design
//!
//! The catalog is a single JSON document:
//! - Self-describing with `kind` and `schema_version`
//! - Strictly parsed (unknown fields rejected)
//! - An ordered vector of module records addressed by name
//!
//! Each module record carries its identity, enabled features, replay
//! support, forward dependencies and inverse dependencies, plus the
//! part of the change ledger that applies to it (see [`ledger`]). Pending
//! installs live at the top level because their modules have no record
//! yet.
//!
//! # Invariants
//!
//! - Module names are unique
//! - No dependency set holds two records with the same key
//! - A module's inverse dependencies are exactly the other modules whose
//!   data or operation dependencies hold a `ModuleRef` naming it
//!
//! [`Catalog::validate`] checks all three; stores refuse to persist a
//! catalog that fails it.
//!
//! # Example
//!
//! ```
//! use yangmods::catalog::{parse_catalog, Catalog};
//! use yangmods::core::types::ModuleName;
//!
//! let mut catalog = Catalog::new();
//! catalog.add_module(ModuleName::new("base").unwrap(), None, vec![]).unwrap();
//!
//! let json = catalog.to_json().unwrap();
//! let parsed = parse_catalog(&json).unwrap();
//! assert!(parsed.find_module("base").is_some());
//! assert_eq!(parsed.fingerprint(), catalog.fingerprint());
//! ```

pub mod deps;
pub mod ledger;

pub use deps::{expression_top, foreign_module, ExtractedDeps};
pub use ledger::{FeatureChange, ModulePending, PendingInstall, PendingUpdate, ScheduledChange};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{FeatureName, Fingerprint, ModuleName, Revision, UtcTimestamp};
use crate::schema::SchemaError;

/// The kind identifier for the catalog document.
pub const CATALOG_KIND: &str = "yangmods.catalog";

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse catalog: {0}")]
    ParseError(String),

    #[error("invalid kind '{found}', expected '{}'", CATALOG_KIND)]
    InvalidKind { found: String },

    #[error("unsupported schema version {0}, supported: {SCHEMA_VERSION}")]
    UnsupportedVersion(u32),

    #[error("module '{0}' already exists")]
    AlreadyExists(ModuleName),

    #[error("module '{0}' not found")]
    NotFound(String),

    /// The document parsed but breaks a catalog invariant.
    #[error("catalog is inconsistent: {0}")]
    Inconsistent(String),

    /// Dependency extraction hit a state that cannot happen in a valid
    /// context.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("failed to serialize catalog: {0}")]
    Serialize(String),
}

/// One dependency record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum Dependency {
    /// Data of another module is referenced.
    ModuleRef { module: ModuleName },

    /// An instance-identifier leaf; its default may point into a module.
    InstanceId {
        xpath: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_module: Option<ModuleName>,
    },
}

impl Dependency {
    pub fn module_ref(module: ModuleName) -> Self {
        Dependency::ModuleRef { module }
    }

    /// Whether two records share tag and key.
    fn same_key(&self, other: &Dependency) -> bool {
        match (self, other) {
            (Dependency::ModuleRef { module: a }, Dependency::ModuleRef { module: b }) => a == b,
            (Dependency::InstanceId { xpath: a, .. }, Dependency::InstanceId { xpath: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// A set of dependency records without duplicate keys, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencySet(Vec<Dependency>);

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless a record with the same key exists. Returns whether
    /// the set changed.
    pub fn insert(&mut self, dep: Dependency) -> bool {
        if self.0.iter().any(|d| d.same_key(&dep)) {
            return false;
        }
        self.0.push(dep);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Modules named by `ModuleRef` records.
    pub fn module_refs(&self) -> impl Iterator<Item = &ModuleName> {
        self.0.iter().filter_map(|d| match d {
            Dependency::ModuleRef { module } => Some(module),
            Dependency::InstanceId { .. } => None,
        })
    }

    fn has_duplicates(&self) -> bool {
        self.0
            .iter()
            .enumerate()
            .any(|(i, d)| self.0[i + 1..].iter().any(|o| o.same_key(d)))
    }
}

/// Dependencies of one RPC, action or notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationDependency {
    /// Absolute data path of the operation.
    pub path: String,

    /// Input dependencies (all dependencies, for notifications).
    #[serde(rename = "in", default)]
    pub input: DependencySet,

    /// Output dependencies; `None` for notifications.
    #[serde(rename = "out", default, skip_serializing_if = "Option::is_none")]
    pub output: Option<DependencySet>,
}

impl OperationDependency {
    pub fn module_refs(&self) -> impl Iterator<Item = &ModuleName> {
        self.input
            .module_refs()
            .chain(self.output.iter().flat_map(|o| o.module_refs()))
    }
}

/// One installed module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleEntry {
    pub name: ModuleName,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_features: Vec<FeatureName>,

    /// When replay support was enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_support: Option<UtcTimestamp>,

    #[serde(default, skip_serializing_if = "DependencySet::is_empty")]
    pub data_deps: DependencySet,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub op_deps: Vec<OperationDependency>,

    /// Modules whose dependencies reference this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inverse_deps: Vec<ModuleName>,

    #[serde(default, skip_serializing_if = "ModulePending::is_empty")]
    pub pending: ModulePending,
}

impl ModuleEntry {
    fn new(name: ModuleName, revision: Option<Revision>, enabled_features: Vec<FeatureName>) -> Self {
        Self {
            name,
            revision,
            enabled_features,
            replay_support: None,
            data_deps: DependencySet::new(),
            op_deps: Vec::new(),
            inverse_deps: Vec::new(),
            pending: ModulePending::default(),
        }
    }

    pub fn has_feature(&self, feature: &FeatureName) -> bool {
        self.enabled_features.contains(feature)
    }

    pub fn revision_label(&self) -> &str {
        self.revision.as_ref().map(|r| r.as_str()).unwrap_or("(none)")
    }

    /// Every module named by a `ModuleRef` in data or operation dependencies.
    pub fn referenced_modules(&self) -> BTreeSet<&ModuleName> {
        self.data_deps
            .module_refs()
            .chain(self.op_deps.iter().flat_map(|op| op.module_refs()))
            .collect()
    }

    fn has_deps(&self) -> bool {
        !self.data_deps.is_empty() || !self.op_deps.is_empty()
    }
}

/// Envelope for version dispatch before full parsing.
#[derive(Debug, Deserialize)]
struct CatalogEnvelope {
    kind: String,
    schema_version: u32,
}

/// Parse catalog JSON with version dispatch and validation.
///
/// # Errors
///
/// Malformed JSON, a foreign `kind`, an unsupported version, or a
/// document that breaks a catalog invariant.
pub fn parse_catalog(json: &str) -> Result<Catalog, CatalogError> {
    let envelope: CatalogEnvelope =
        serde_json::from_str(json).map_err(|e| CatalogError::ParseError(e.to_string()))?;

    if envelope.kind != CATALOG_KIND {
        return Err(CatalogError::InvalidKind {
            found: envelope.kind,
        });
    }

    match envelope.schema_version {
        1 => {
            let catalog: Catalog =
                serde_json::from_str(json).map_err(|e| CatalogError::ParseError(e.to_string()))?;
            catalog.validate()?;
            Ok(catalog)
        }
        v => Err(CatalogError::UnsupportedVersion(v)),
    }
}

/// The module catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    /// Kind identifier (always "yangmods.catalog")
    pub kind: String,

    /// Schema version (always 1 for this struct)
    pub schema_version: u32,

    #[serde(default)]
    pub modules: Vec<ModuleEntry>,

    /// Modules scheduled for installation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub installs: Vec<PendingInstall>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self {
            kind: CATALOG_KIND.to_string(),
            schema_version: SCHEMA_VERSION,
            modules: Vec::new(),
            installs: Vec::new(),
        }
    }

    /// Append a module without dependencies.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if a module with the name is present.
    pub fn add_module(
        &mut self,
        name: ModuleName,
        revision: Option<Revision>,
        enabled_features: Vec<FeatureName>,
    ) -> Result<&mut ModuleEntry, CatalogError> {
        if self.find_module(name.as_str()).is_some() {
            return Err(CatalogError::AlreadyExists(name));
        }
        self.modules.push(ModuleEntry::new(name, revision, enabled_features));
        let last = self.modules.len() - 1;
        Ok(&mut self.modules[last])
    }

    pub fn find_module(&self, name: &str) -> Option<&ModuleEntry> {
        self.modules.iter().find(|m| m.name.as_str() == name)
    }

    pub fn find_module_mut(&mut self, name: &str) -> Option<&mut ModuleEntry> {
        self.modules.iter_mut().find(|m| m.name.as_str() == name)
    }

    /// Remove a module's record. Dependency edges of other modules are
    /// left alone; they are rebuilt as a whole after a commit.
    pub fn remove_module(&mut self, name: &str) -> Result<ModuleEntry, CatalogError> {
        let idx = self
            .modules
            .iter()
            .position(|m| m.name.as_str() == name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))?;
        Ok(self.modules.remove(idx))
    }

    /// Modules that depend on `name`. Empty if the module is absent.
    pub fn find_inverse_dependents(&self, name: &str) -> Vec<ModuleName> {
        self.find_module(name)
            .map(|m| m.inverse_deps.clone())
            .unwrap_or_default()
    }

    /// Drop every data, operation and inverse dependency.
    pub fn clear_all_deps(&mut self) {
        for m in &mut self.modules {
            m.data_deps = DependencySet::new();
            m.op_deps.clear();
            m.inverse_deps.clear();
        }
    }

    pub fn module_names(&self) -> impl Iterator<Item = &ModuleName> {
        self.modules.iter().map(|m| &m.name)
    }

    /// Canonical JSON rendering.
    pub fn to_json(&self) -> Result<String, CatalogError> {
        serde_json::to_string_pretty(self).map_err(|e| CatalogError::Serialize(e.to_string()))
    }

    /// Fingerprint of the canonical rendering.
    pub fn fingerprint(&self) -> Fingerprint {
        // Every map key is a string, so serialization cannot fail.
        Fingerprint::of_bytes(&serde_json::to_vec(self).unwrap_or_default())
    }

    /// Check every catalog invariant.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.kind != CATALOG_KIND {
            return Err(CatalogError::InvalidKind {
                found: self.kind.clone(),
            });
        }
        if self.schema_version != SCHEMA_VERSION {
            return Err(CatalogError::UnsupportedVersion(self.schema_version));
        }

        let mut names = BTreeSet::new();
        for m in &self.modules {
            if !names.insert(&m.name) {
                return Err(inconsistent(format!("module '{}' listed twice", m.name)));
            }
        }

        let mut expected: BTreeMap<&ModuleName, BTreeSet<&ModuleName>> = BTreeMap::new();
        for m in &self.modules {
            if m.data_deps.has_duplicates() {
                return Err(inconsistent(format!("module '{}' has duplicate data dependencies", m.name)));
            }
            let mut paths = BTreeSet::new();
            for op in &m.op_deps {
                if !paths.insert(&op.path) {
                    return Err(inconsistent(format!(
                        "module '{}' lists operation '{}' twice",
                        m.name, op.path
                    )));
                }
                if op.input.has_duplicates() || op.output.as_ref().map(|o| o.has_duplicates()).unwrap_or(false) {
                    return Err(inconsistent(format!(
                        "operation '{}' has duplicate dependencies",
                        op.path
                    )));
                }
            }
            for target in m.referenced_modules() {
                if !names.contains(target) {
                    return Err(inconsistent(format!(
                        "module '{}' depends on unknown module '{}'",
                        m.name, target
                    )));
                }
                if *target != m.name {
                    expected.entry(target).or_default().insert(&m.name);
                }
            }
        }

        for m in &self.modules {
            let actual: BTreeSet<&ModuleName> = m.inverse_deps.iter().collect();
            if actual.len() != m.inverse_deps.len() {
                return Err(inconsistent(format!("module '{}' has duplicate inverse dependencies", m.name)));
            }
            let wanted = expected.remove(&m.name).unwrap_or_default();
            if actual != wanted {
                return Err(inconsistent(format!(
                    "inverse dependencies of '{}' do not match its dependents",
                    m.name
                )));
            }
        }

        self.validate_ledger(&names)
    }
}

fn inconsistent(message: String) -> CatalogError {
    CatalogError::Inconsistent(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ModuleName {
        ModuleName::new(s).unwrap()
    }

    mod parsing {
        use super::*;

        #[test]
        fn empty_catalog_roundtrip() {
            let catalog = Catalog::new();
            let parsed = parse_catalog(&catalog.to_json().unwrap()).unwrap();
            assert_eq!(parsed, catalog);
        }

        #[test]
        fn wrong_kind() {
            let err = parse_catalog(r#"{"kind": "other", "schema_version": 1}"#).unwrap_err();
            assert!(matches!(err, CatalogError::InvalidKind { .. }));
        }

        #[test]
        fn future_version() {
            let err =
                parse_catalog(r#"{"kind": "yangmods.catalog", "schema_version": 9}"#).unwrap_err();
            assert!(matches!(err, CatalogError::UnsupportedVersion(9)));
        }

        #[test]
        fn unknown_field() {
            let err = parse_catalog(
                r#"{"kind": "yangmods.catalog", "schema_version": 1, "extra": true}"#,
            )
            .unwrap_err();
            assert!(matches!(err, CatalogError::ParseError(_)));
        }

        #[test]
        fn dependency_encoding() {
            let mut set = DependencySet::new();
            set.insert(Dependency::module_ref(name("base")));
            set.insert(Dependency::InstanceId {
                xpath: "/m:ref".into(),
                default_module: None,
            });
            assert_eq!(
                serde_json::to_value(&set).unwrap(),
                serde_json::json!([
                    {"kind": "module-ref", "module": "base"},
                    {"kind": "instance-id", "xpath": "/m:ref"}
                ])
            );
        }
    }

    mod modules {
        use super::*;

        #[test]
        fn add_find_remove() {
            let mut c = Catalog::new();
            c.add_module(name("a"), None, vec![]).unwrap();
            assert!(c.find_module("a").is_some());
            assert!(matches!(
                c.add_module(name("a"), None, vec![]),
                Err(CatalogError::AlreadyExists(_))
            ));
            c.remove_module("a").unwrap();
            assert!(c.find_module("a").is_none());
            assert!(matches!(c.remove_module("a"), Err(CatalogError::NotFound(_))));
        }

        #[test]
        fn inverse_lookup_of_absent_module_is_empty() {
            assert!(Catalog::new().find_inverse_dependents("nope").is_empty());
        }

        #[test]
        fn clear_all_deps() {
            let mut c = Catalog::new();
            c.add_module(name("a"), None, vec![]).unwrap();
            c.add_module(name("b"), None, vec![]).unwrap();
            c.modules[0].data_deps.insert(Dependency::module_ref(name("b")));
            c.modules[1].inverse_deps.push(name("a"));
            c.validate().unwrap();

            c.clear_all_deps();
            assert!(c.modules.iter().all(|m| !m.has_deps() && m.inverse_deps.is_empty()));
        }
    }

    mod dedup {
        use super::*;

        #[test]
        fn module_ref_keyed_by_name() {
            let mut set = DependencySet::new();
            assert!(set.insert(Dependency::module_ref(name("x"))));
            assert!(!set.insert(Dependency::module_ref(name("x"))));
            assert_eq!(set.len(), 1);
        }

        #[test]
        fn instance_id_keyed_by_xpath() {
            let mut set = DependencySet::new();
            assert!(set.insert(Dependency::InstanceId {
                xpath: "/m:a".into(),
                default_module: None
            }));
            assert!(!set.insert(Dependency::InstanceId {
                xpath: "/m:a".into(),
                default_module: Some(name("x"))
            }));
            assert!(set.insert(Dependency::module_ref(name("a"))));
            assert_eq!(set.len(), 2);
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn missing_inverse_edge() {
            let mut c = Catalog::new();
            c.add_module(name("a"), None, vec![]).unwrap();
            c.add_module(name("b"), None, vec![]).unwrap();
            c.modules[0].data_deps.insert(Dependency::module_ref(name("b")));
            assert!(matches!(c.validate(), Err(CatalogError::Inconsistent(_))));
        }

        #[test]
        fn stray_inverse_edge() {
            let mut c = Catalog::new();
            c.add_module(name("a"), None, vec![]).unwrap();
            c.add_module(name("b"), None, vec![]).unwrap();
            c.modules[1].inverse_deps.push(name("a"));
            assert!(c.validate().is_err());
        }

        #[test]
        fn self_reference_needs_no_inverse() {
            let mut c = Catalog::new();
            c.add_module(name("a"), None, vec![]).unwrap();
            c.modules[0].op_deps.push(OperationDependency {
                path: "/a:op".into(),
                input: {
                    let mut s = DependencySet::new();
                    s.insert(Dependency::module_ref(name("a")));
                    s
                },
                output: Some(DependencySet::new()),
            });
            c.validate().unwrap();
        }

        #[test]
        fn reference_to_unknown_module() {
            let mut c = Catalog::new();
            c.add_module(name("a"), None, vec![]).unwrap();
            c.modules[0].data_deps.insert(Dependency::module_ref(name("gone")));
            assert!(c.validate().is_err());
        }

        #[test]
        fn duplicate_module_names() {
            let mut c = Catalog::new();
            c.add_module(name("a"), None, vec![]).unwrap();
            c.modules.push(c.modules[0].clone());
            assert!(c.validate().is_err());
        }
    }

    #[test]
    fn fingerprint_tracks_content() {
        let mut c = Catalog::new();
        let before = c.fingerprint();
        c.add_module(name("a"), None, vec![]).unwrap();
        assert_ne!(before, c.fingerprint());
        assert_eq!(c.fingerprint(), c.clone().fingerprint());
    }
}
