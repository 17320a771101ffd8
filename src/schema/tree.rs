//! schema::tree
//!
//! The compiled schema context: an arena of loaded modules and schema nodes.
//!
//! # Architecture
//!
//! Nodes and modules live in two vectors and refer to each other by index
//! ([`NodeId`], [`ModuleId`]). Parent links and child lists are plain
//! indices, so the tree can be walked in both directions without shared
//! ownership. A context only grows: modules are never unloaded, and a
//! context that failed to load or finalize is simply dropped.
//!
//! Loading a module recursively loads its imports through an
//! [`ImportResolver`]. Imported modules are loaded non-implemented;
//! loading a module that is already present with the same revision
//! implements it. [`SchemaContext::finalize`] then grafts augments,
//! resolves leafref paths, and implements every module that owns a
//! leafref or augment target of an implemented module, until nothing
//! changes.
//!
//! # Invariants
//!
//! - At most one revision of a module name is loaded
//! - Every `NodeId` stored in the context indexes `nodes`
//! - A node's `module` is the module that defined it (the augmenting
//!   module for augment nodes)
//!
//! # Example
//!
//! ```
//! use yangmods::schema::source::JsonSchemaParser;
//! use yangmods::schema::tree::{NoImports, SchemaContext};
//!
//! let mut ctx = SchemaContext::new();
//! let text = r#"{"name": "m", "data": [
//!     {"kind": "container", "name": "top", "children": [
//!         {"kind": "leaf", "name": "x", "type": {"base": "string"}}
//!     ]}
//! ]}"#;
//! let id = ctx.load_module(&JsonSchemaParser, text, true, &NoImports).unwrap();
//! ctx.finalize().unwrap();
//!
//! let top = ctx.module(id).data[0];
//! let x = ctx.node(top).children[0];
//! assert_eq!(ctx.data_path(x), "/m:top/x");
//! ```

use std::collections::BTreeMap;

use tracing::debug;

use super::source::{AugmentSource, ImportSource, ModuleSource, NodeKind, NodeSource};
use super::source::{RangeSource, SchemaParser, TypeSource};
use super::xpath;
use super::SchemaError;
use crate::core::types::{check_identifier, FeatureName, ModuleName, Revision};

/// Index of a schema node in a [`SchemaContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Index of a module in a [`SchemaContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(usize);

/// Built-in integer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntKind {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
}

impl IntKind {
    pub fn bounds(self) -> (i128, i128) {
        match self {
            IntKind::Int8 => (i8::MIN.into(), i8::MAX.into()),
            IntKind::Int16 => (i16::MIN.into(), i16::MAX.into()),
            IntKind::Int32 => (i32::MIN.into(), i32::MAX.into()),
            IntKind::Int64 => (i64::MIN.into(), i64::MAX.into()),
            IntKind::Uint8 => (0, u8::MAX.into()),
            IntKind::Uint16 => (0, u16::MAX.into()),
            IntKind::Uint32 => (0, u32::MAX.into()),
            IntKind::Uint64 => (0, u64::MAX.into()),
        }
    }

    /// 64-bit values are encoded as JSON strings.
    pub fn is_64bit(self) -> bool {
        matches!(self, IntKind::Int64 | IntKind::Uint64)
    }
}

/// A compiled leaf type.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafType {
    String,
    Boolean,
    Empty,
    Integer {
        kind: IntKind,
        min: i128,
        max: i128,
    },
    Decimal64 {
        fraction_digits: u8,
    },
    Enumeration(Vec<String>),
    Leafref {
        path: String,
        require_instance: bool,
        /// Resolved by [`SchemaContext::finalize`].
        target: Option<NodeId>,
    },
    InstanceIdentifier {
        require_instance: bool,
    },
    Union(Vec<LeafType>),
}

impl LeafType {
    fn compile(src: &TypeSource) -> Result<LeafType, String> {
        let int = |kind: IntKind, range: &Option<RangeSource>| -> Result<LeafType, String> {
            let (lo, hi) = kind.bounds();
            let (mut min, mut max) = (lo, hi);
            if let Some(range) = range {
                if let Some(n) = &range.min {
                    min = RangeSource::bound(n).ok_or_else(|| format!("range bound {} is not an integer", n))?;
                }
                if let Some(n) = &range.max {
                    max = RangeSource::bound(n).ok_or_else(|| format!("range bound {} is not an integer", n))?;
                }
            }
            if min < lo || max > hi || min > max {
                return Err(format!("range {}..{} does not fit {:?}", min, max, kind));
            }
            Ok(LeafType::Integer { kind, min, max })
        };

        match src {
            TypeSource::String => Ok(LeafType::String),
            TypeSource::Boolean => Ok(LeafType::Boolean),
            TypeSource::Empty => Ok(LeafType::Empty),
            TypeSource::Int8 { range } => int(IntKind::Int8, range),
            TypeSource::Int16 { range } => int(IntKind::Int16, range),
            TypeSource::Int32 { range } => int(IntKind::Int32, range),
            TypeSource::Int64 { range } => int(IntKind::Int64, range),
            TypeSource::Uint8 { range } => int(IntKind::Uint8, range),
            TypeSource::Uint16 { range } => int(IntKind::Uint16, range),
            TypeSource::Uint32 { range } => int(IntKind::Uint32, range),
            TypeSource::Uint64 { range } => int(IntKind::Uint64, range),
            TypeSource::Decimal64 { fraction_digits } => {
                if !(1..=18).contains(fraction_digits) {
                    return Err(format!("fraction_digits {} outside 1..18", fraction_digits));
                }
                Ok(LeafType::Decimal64 {
                    fraction_digits: *fraction_digits,
                })
            }
            TypeSource::Enumeration { enums } => {
                if enums.is_empty() {
                    return Err("enumeration without enums".into());
                }
                let mut seen = std::collections::BTreeSet::new();
                for e in enums {
                    if !seen.insert(e) {
                        return Err(format!("duplicate enum '{}'", e));
                    }
                }
                Ok(LeafType::Enumeration(enums.clone()))
            }
            TypeSource::Leafref {
                path,
                require_instance,
            } => Ok(LeafType::Leafref {
                path: path.clone(),
                require_instance: *require_instance,
                target: None,
            }),
            TypeSource::InstanceIdentifier { require_instance } => {
                Ok(LeafType::InstanceIdentifier {
                    require_instance: *require_instance,
                })
            }
            TypeSource::Union { types } => {
                if types.is_empty() {
                    return Err("union without member types".into());
                }
                types
                    .iter()
                    .map(LeafType::compile)
                    .collect::<Result<Vec<_>, _>>()
                    .map(LeafType::Union)
            }
        }
    }

    /// Leafref paths in this type, unions flattened, in declaration order.
    pub fn leafref_paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_leafref_paths(&mut out);
        out
    }

    fn collect_leafref_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            LeafType::Leafref { path, .. } => out.push(path),
            LeafType::Union(types) => types.iter().for_each(|t| t.collect_leafref_paths(out)),
            _ => {}
        }
    }

    fn set_leafref_targets(&mut self, targets: &mut impl Iterator<Item = NodeId>) {
        match self {
            LeafType::Leafref { target, .. } => *target = targets.next(),
            LeafType::Union(types) => types.iter_mut().for_each(|t| t.set_leafref_targets(targets)),
            _ => {}
        }
    }
}

/// One compiled schema node.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub kind: NodeKind,
    pub name: String,
    pub module: ModuleId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub leaf_type: Option<LeafType>,
    /// Leaf default (at most one) or leaf-list defaults.
    pub defaults: Vec<String>,
    pub when: Vec<String>,
    pub musts: Vec<String>,
    pub if_features: Vec<(ModuleId, FeatureName)>,
    pub mandatory: bool,
    pub keys: Vec<String>,
}

/// A module loaded into a context.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub name: ModuleName,
    pub revision: Option<Revision>,
    /// Source text the module was loaded from.
    pub text: String,
    pub imports: Vec<ModuleId>,
    pub implemented: bool,
    /// Every defined feature and whether it is enabled.
    pub features: BTreeMap<FeatureName, bool>,
    pub data: Vec<NodeId>,
    pub rpcs: Vec<NodeId>,
    pub notifications: Vec<NodeId>,
    augments: Vec<AugmentSource>,
    augments_applied: bool,
}

impl LoadedModule {
    pub fn enabled_features(&self) -> Vec<FeatureName> {
        self.features
            .iter()
            .filter(|(_, on)| **on)
            .map(|(f, _)| f.clone())
            .collect()
    }

    pub fn revision_label(&self) -> &str {
        self.revision.as_ref().map(|r| r.as_str()).unwrap_or("(none)")
    }
}

/// Source of module text for imports that are not loaded yet.
pub trait ImportResolver {
    fn find_import(
        &self,
        name: &ModuleName,
        revision: Option<&Revision>,
    ) -> Result<Option<String>, SchemaError>;
}

impl<F> ImportResolver for F
where
    F: Fn(&ModuleName, Option<&Revision>) -> Result<Option<String>, SchemaError>,
{
    fn find_import(
        &self,
        name: &ModuleName,
        revision: Option<&Revision>,
    ) -> Result<Option<String>, SchemaError> {
        self(name, revision)
    }
}

/// Resolver that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImports;

impl ImportResolver for NoImports {
    fn find_import(
        &self,
        _name: &ModuleName,
        _revision: Option<&Revision>,
    ) -> Result<Option<String>, SchemaError> {
        Ok(None)
    }
}

/// An arena of loaded modules and their compiled schema nodes.
#[derive(Debug, Clone, Default)]
pub struct SchemaContext {
    modules: Vec<LoadedModule>,
    nodes: Vec<SchemaNode>,
    /// Modules whose imports are being loaded, for cycle detection.
    loading: Vec<ModuleName>,
}

impl SchemaContext {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Parse and load a module, loading missing imports through `resolver`.
    ///
    /// # Errors
    ///
    /// Any parse, import, revision or compile error. On error the module
    /// itself is not added; imports loaded on the way stay loaded.
    pub fn load_module(
        &mut self,
        parser: &dyn SchemaParser,
        text: &str,
        implement: bool,
        resolver: &dyn ImportResolver,
    ) -> Result<ModuleId, SchemaError> {
        let source = parser.parse(text)?;
        self.load_source(parser, source, text, implement, resolver)
    }

    fn load_source(
        &mut self,
        parser: &dyn SchemaParser,
        source: ModuleSource,
        text: &str,
        implement: bool,
        resolver: &dyn ImportResolver,
    ) -> Result<ModuleId, SchemaError> {
        if let Some(id) = self.find_module(source.name.as_str()) {
            let existing = &mut self.modules[id.0];
            if existing.revision != source.revision {
                return Err(SchemaError::RevisionConflict {
                    module: source.name,
                    loaded: existing.revision_label().to_string(),
                    requested: source
                        .revision
                        .as_ref()
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "(none)".into()),
                });
            }
            if implement && !existing.implemented {
                existing.implemented = true;
                debug!(module = %existing.name, "implemented previously imported module");
            }
            return Ok(id);
        }

        if self.loading.contains(&source.name) {
            return Err(SchemaError::ImportCycle(source.name));
        }
        self.loading.push(source.name.clone());
        let result = self.load_new(parser, source, text, implement, resolver);
        self.loading.pop();
        result
    }

    fn load_new(
        &mut self,
        parser: &dyn SchemaParser,
        source: ModuleSource,
        text: &str,
        implement: bool,
        resolver: &dyn ImportResolver,
    ) -> Result<ModuleId, SchemaError> {
        let mut imports = Vec::with_capacity(source.imports.len());
        for import in &source.imports {
            if import.module == source.name {
                return Err(invalid(&source.name, "module imports itself"));
            }
            imports.push(self.load_import(parser, &source.name, import, resolver)?);
        }

        let mut features = BTreeMap::new();
        for feature in &source.features {
            if features.insert(feature.clone(), false).is_some() {
                return Err(invalid(
                    &source.name,
                    format!("duplicate feature '{}'", feature),
                ));
            }
        }

        let id = ModuleId(self.modules.len());
        self.modules.push(LoadedModule {
            name: source.name.clone(),
            revision: source.revision.clone(),
            text: text.to_string(),
            imports,
            implemented: implement,
            features,
            data: Vec::new(),
            rpcs: Vec::new(),
            notifications: Vec::new(),
            augments: source.augments.clone(),
            augments_applied: false,
        });

        let node_mark = self.nodes.len();
        if let Err(e) = self.compile_module(id, &source) {
            self.nodes.truncate(node_mark);
            self.modules.truncate(id.0);
            return Err(e);
        }

        debug!(
            module = %source.name,
            revision = self.modules[id.0].revision_label(),
            implemented = implement,
            "loaded module"
        );
        Ok(id)
    }

    fn load_import(
        &mut self,
        parser: &dyn SchemaParser,
        importer: &ModuleName,
        import: &ImportSource,
        resolver: &dyn ImportResolver,
    ) -> Result<ModuleId, SchemaError> {
        if let Some(id) = self.find_module(import.module.as_str()) {
            let loaded = &self.modules[id.0];
            return match &import.revision {
                Some(rev) if loaded.revision.as_ref() != Some(rev) => {
                    Err(SchemaError::RevisionConflict {
                        module: import.module.clone(),
                        loaded: loaded.revision_label().to_string(),
                        requested: rev.to_string(),
                    })
                }
                _ => Ok(id),
            };
        }

        let text = resolver
            .find_import(&import.module, import.revision.as_ref())?
            .ok_or_else(|| SchemaError::ImportNotFound {
                module: importer.clone(),
                import: import.module.clone(),
            })?;
        let source = parser.parse(&text)?;
        if source.name != import.module {
            return Err(invalid(
                importer,
                format!(
                    "import '{}' resolved to module '{}'",
                    import.module, source.name
                ),
            ));
        }
        if let Some(rev) = &import.revision {
            if source.revision.as_ref() != Some(rev) {
                return Err(SchemaError::ImportNotFound {
                    module: importer.clone(),
                    import: import.module.clone(),
                });
            }
        }
        self.load_source(parser, source, &text, false, resolver)
    }

    fn compile_module(&mut self, id: ModuleId, source: &ModuleSource) -> Result<(), SchemaError> {
        let name = &source.name;
        let mut top_names = std::collections::BTreeSet::new();

        for n in source
            .data
            .iter()
            .chain(&source.rpcs)
            .chain(&source.notifications)
        {
            if !top_names.insert(n.name.as_str()) {
                return Err(invalid(name, format!("duplicate top-level node '{}'", n.name)));
            }
        }

        for n in &source.data {
            if n.kind.is_operation() || matches!(n.kind, NodeKind::Case | NodeKind::Input | NodeKind::Output) {
                return Err(invalid(
                    name,
                    format!("'{}' ({}) cannot be a top-level data node", n.name, n.kind.as_str()),
                ));
            }
            let nid = self.compile_node(id, None, n)?;
            self.modules[id.0].data.push(nid);
        }
        for n in &source.rpcs {
            if n.kind != NodeKind::Rpc {
                return Err(invalid(name, format!("'{}' listed in rpcs is not an rpc", n.name)));
            }
            let nid = self.compile_node(id, None, n)?;
            self.modules[id.0].rpcs.push(nid);
        }
        for n in &source.notifications {
            if n.kind != NodeKind::Notification {
                return Err(invalid(
                    name,
                    format!("'{}' listed in notifications is not a notification", n.name),
                ));
            }
            let nid = self.compile_node(id, None, n)?;
            self.modules[id.0].notifications.push(nid);
        }
        Ok(())
    }

    fn compile_node(
        &mut self,
        module: ModuleId,
        parent: Option<NodeId>,
        src: &NodeSource,
    ) -> Result<NodeId, SchemaError> {
        let mod_name = self.modules[module.0].name.clone();
        let fail = |message: String| invalid(&mod_name, format!("node '{}': {}", src.name, message));

        check_identifier(&src.name).map_err(&fail)?;

        let kind = src.kind;
        let parent_kind = parent.map(|p| self.nodes[p.0].kind);
        match kind {
            NodeKind::Input | NodeKind::Output => {
                return Err(fail("input/output are declared with the input/output fields".into()))
            }
            NodeKind::Rpc if parent.is_some() => {
                return Err(fail("rpc must be top-level, use an action".into()))
            }
            NodeKind::Action
                if !matches!(parent_kind, Some(NodeKind::Container | NodeKind::List)) =>
            {
                return Err(fail("action must be inside a container or list".into()))
            }
            NodeKind::Notification
                if !matches!(parent_kind, None | Some(NodeKind::Container | NodeKind::List)) =>
            {
                return Err(fail("notification must be top-level or inside a container or list".into()))
            }
            NodeKind::Case if parent_kind != Some(NodeKind::Choice) => {
                return Err(fail("case must be inside a choice".into()))
            }
            _ => {}
        }

        if kind.is_terminal() != src.leaf_type.is_some() {
            return Err(fail("only leaf and leaf-list nodes carry a type".into()));
        }
        if src.default.is_some() && kind != NodeKind::Leaf {
            return Err(fail("default is only allowed on leaves".into()));
        }
        if !src.defaults.is_empty() && kind != NodeKind::LeafList {
            return Err(fail("defaults is only allowed on leaf-lists".into()));
        }
        if !src.keys.is_empty() && kind != NodeKind::List {
            return Err(fail("keys are only allowed on lists".into()));
        }
        if (src.input.is_some() || src.output.is_some())
            && !matches!(kind, NodeKind::Rpc | NodeKind::Action)
        {
            return Err(fail("input/output are only allowed on rpcs and actions".into()));
        }
        if matches!(kind, NodeKind::Rpc | NodeKind::Action) && !src.children.is_empty() {
            return Err(fail("operation children belong in input or output".into()));
        }
        if kind.is_terminal() && !src.children.is_empty() {
            return Err(fail("leaves cannot have children".into()));
        }
        if src.mandatory && !matches!(kind, NodeKind::Leaf | NodeKind::Choice | NodeKind::Anydata) {
            return Err(fail("mandatory is only allowed on leaves, choices and anydata".into()));
        }
        if !src.must.is_empty() && !must_allowed(kind) {
            return Err(fail("must is not allowed on this node kind".into()));
        }

        let leaf_type = match &src.leaf_type {
            Some(t) => Some(LeafType::compile(t).map_err(&fail)?),
            None => None,
        };

        let mut if_features = Vec::with_capacity(src.if_features.len());
        for reference in &src.if_features {
            if_features.push(self.resolve_feature(module, reference)?);
        }

        let mut defaults: Vec<String> = src.default.iter().cloned().collect();
        defaults.extend(src.defaults.iter().cloned());

        if let Some(p) = parent {
            let clash = self.nodes[p.0]
                .children
                .iter()
                .any(|c| self.nodes[c.0].name == src.name && self.nodes[c.0].module == module);
            if clash {
                return Err(fail("duplicate sibling name".into()));
            }
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(SchemaNode {
            kind,
            name: src.name.clone(),
            module,
            parent,
            children: Vec::new(),
            leaf_type,
            defaults,
            when: src.when.clone(),
            musts: src.must.clone(),
            if_features,
            mandatory: src.mandatory,
            keys: src.keys.clone(),
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }

        for child in &src.children {
            self.compile_node(module, Some(id), child)?;
        }

        if matches!(kind, NodeKind::Rpc | NodeKind::Action) {
            let empty = super::source::IoSource::default();
            for (io_kind, io) in [
                (NodeKind::Input, src.input.as_ref().unwrap_or(&empty)),
                (NodeKind::Output, src.output.as_ref().unwrap_or(&empty)),
            ] {
                let io_id = NodeId(self.nodes.len());
                self.nodes.push(SchemaNode {
                    kind: io_kind,
                    name: io_kind.as_str().to_string(),
                    module,
                    parent: Some(id),
                    children: Vec::new(),
                    leaf_type: None,
                    defaults: Vec::new(),
                    when: Vec::new(),
                    musts: io.must.clone(),
                    if_features: Vec::new(),
                    mandatory: false,
                    keys: Vec::new(),
                });
                self.nodes[id.0].children.push(io_id);
                for child in &io.children {
                    self.compile_node(module, Some(io_id), child)?;
                }
            }
        }

        if kind == NodeKind::List {
            for key in &src.keys {
                let is_leaf_key = self.nodes[id.0].children.iter().any(|c| {
                    let n = &self.nodes[c.0];
                    n.name == *key && n.kind == NodeKind::Leaf
                });
                if !is_leaf_key {
                    return Err(fail(format!("key '{}' is not a leaf child", key)));
                }
            }
        }

        Ok(id)
    }

    fn resolve_feature(
        &self,
        module: ModuleId,
        reference: &str,
    ) -> Result<(ModuleId, FeatureName), SchemaError> {
        let (owner, fname) = match reference.split_once(':') {
            Some((prefix, f)) => (self.resolve_prefix(module, prefix)?, f),
            None => (module, reference),
        };
        let owner_name = &self.modules[owner.0].name;
        let feature = FeatureName::new(fname)
            .map_err(|e| invalid(&self.modules[module.0].name, e.to_string()))?;
        if !self.modules[owner.0].features.contains_key(&feature) {
            return Err(SchemaError::UnknownFeature {
                module: owner_name.clone(),
                feature,
            });
        }
        Ok((owner, feature))
    }

    /// Resolve a path prefix used inside `module`: the module's own name or
    /// one of its imports.
    pub fn resolve_prefix(&self, module: ModuleId, prefix: &str) -> Result<ModuleId, SchemaError> {
        let m = &self.modules[module.0];
        if m.name.as_str() == prefix {
            return Ok(module);
        }
        m.imports
            .iter()
            .copied()
            .find(|i| self.modules[i.0].name.as_str() == prefix)
            .ok_or_else(|| SchemaError::InvalidPrefix {
                module: m.name.clone(),
                prefix: prefix.to_string(),
            })
    }

    // =========================================================================
    // Features and implementation state
    // =========================================================================

    pub fn enable_feature(&mut self, module: ModuleId, feature: &FeatureName) -> Result<(), SchemaError> {
        self.set_feature(module, feature, true)
    }

    pub fn disable_feature(&mut self, module: ModuleId, feature: &FeatureName) -> Result<(), SchemaError> {
        self.set_feature(module, feature, false)
    }

    fn set_feature(&mut self, module: ModuleId, feature: &FeatureName, on: bool) -> Result<(), SchemaError> {
        let m = &mut self.modules[module.0];
        match m.features.get_mut(feature) {
            Some(state) => {
                *state = on;
                Ok(())
            }
            None => Err(SchemaError::UnknownFeature {
                module: m.name.clone(),
                feature: feature.clone(),
            }),
        }
    }

    /// Mark a module implemented. Returns whether the flag changed.
    pub fn implement(&mut self, module: ModuleId) -> bool {
        let m = &mut self.modules[module.0];
        if m.implemented {
            return false;
        }
        m.implemented = true;
        debug!(module = %m.name, "implemented as a dependency");
        true
    }

    /// Whether the node or any ancestor is excluded by a disabled feature.
    pub fn is_disabled(&self, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            let n = &self.nodes[id.0];
            let off = n
                .if_features
                .iter()
                .any(|(m, f)| !self.modules[m.0].features.get(f).copied().unwrap_or(false));
            if off {
                return true;
            }
            cur = n.parent;
        }
        false
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Apply augments, resolve leafrefs and implement their targets, to a
    /// fixpoint.
    ///
    /// # Errors
    ///
    /// Unresolvable augment targets or leafref paths.
    pub fn finalize(&mut self) -> Result<(), SchemaError> {
        loop {
            let mut changed = false;

            let pending: Vec<ModuleId> = self
                .module_ids()
                .filter(|id| {
                    let m = &self.modules[id.0];
                    m.implemented && !m.augments_applied
                })
                .collect();
            for id in pending {
                for target in self.apply_augments(id)? {
                    changed |= self.implement(target);
                }
            }

            for target in self.resolve_leafrefs()? {
                changed |= self.implement(target);
            }

            if !changed {
                return Ok(());
            }
        }
    }

    fn apply_augments(&mut self, module: ModuleId) -> Result<Vec<ModuleId>, SchemaError> {
        let augments = std::mem::take(&mut self.modules[module.0].augments);
        self.modules[module.0].augments_applied = true;

        let mut targets = Vec::new();
        for aug in &augments {
            let target = self.resolve_schema_path(module, &aug.target)?;
            let kind = self.nodes[target.0].kind;
            if !matches!(
                kind,
                NodeKind::Container
                    | NodeKind::List
                    | NodeKind::Choice
                    | NodeKind::Case
                    | NodeKind::Input
                    | NodeKind::Output
                    | NodeKind::Notification
            ) {
                return Err(SchemaError::UnresolvedPath {
                    module: self.modules[module.0].name.clone(),
                    path: aug.target.clone(),
                    message: format!("cannot augment a {}", kind.as_str()),
                });
            }
            for n in &aug.nodes {
                self.compile_node(module, Some(target), n)?;
            }
            targets.push(self.nodes[target.0].module);
            targets.push(self.owner_module(target));
            debug!(
                module = %self.modules[module.0].name,
                target = %aug.target,
                "applied augment"
            );
        }
        Ok(targets)
    }

    /// Resolve an absolute schema node identifier (`/mod:a/mod:b`), as used
    /// by augment targets. Choice, case, input and output are addressable.
    pub fn resolve_schema_path(&self, module: ModuleId, path: &str) -> Result<NodeId, SchemaError> {
        let unresolved = |message: &str| SchemaError::UnresolvedPath {
            module: self.modules[module.0].name.clone(),
            path: path.to_string(),
            message: message.to_string(),
        };

        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| unresolved("schema path must be absolute"))?;
        let mut current: Option<NodeId> = None;
        for step in rest.split('/') {
            let (step_mod, name) = match step.split_once(':') {
                Some((prefix, name)) => (self.resolve_prefix(module, prefix)?, name),
                None => (module, step),
            };
            let found = match current {
                None => self.find_top(step_mod, name),
                Some(parent) => self.nodes[parent.0]
                    .children
                    .iter()
                    .copied()
                    .find(|c| self.nodes[c.0].name == name && self.nodes[c.0].module == step_mod),
            };
            current = Some(found.ok_or_else(|| unresolved(&format!("no node '{}'", step)))?);
        }
        current.ok_or_else(|| unresolved("empty path"))
    }

    fn resolve_leafrefs(&mut self) -> Result<Vec<ModuleId>, SchemaError> {
        let mut resolved: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        for idx in 0..self.nodes.len() {
            let id = NodeId(idx);
            let node = &self.nodes[idx];
            if !self.modules[node.module.0].implemented || self.is_disabled(id) {
                continue;
            }
            let paths = match &node.leaf_type {
                Some(t) => t.leafref_paths(),
                None => continue,
            };
            if paths.is_empty() {
                continue;
            }
            let mut targets = Vec::with_capacity(paths.len());
            for path in paths {
                let target = xpath::resolve_target(self, id, path)?;
                if self.is_disabled(target) {
                    return Err(SchemaError::UnresolvedPath {
                        module: self.modules[node.module.0].name.clone(),
                        path: path.to_string(),
                        message: "target is disabled by if-feature".into(),
                    });
                }
                targets.push(target);
            }
            resolved.push((id, targets));
        }

        let mut to_implement = Vec::new();
        for (id, targets) in resolved {
            for t in &targets {
                to_implement.push(self.nodes[t.0].module);
                to_implement.push(self.owner_module(*t));
            }
            if let Some(leaf_type) = self.nodes[id.0].leaf_type.as_mut() {
                leaf_type.set_leafref_targets(&mut targets.into_iter());
            }
        }
        Ok(to_implement)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn module(&self, id: ModuleId) -> &LoadedModule {
        &self.modules[id.0]
    }

    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub fn module_ids(&self) -> impl Iterator<Item = ModuleId> {
        (0..self.modules.len()).map(ModuleId)
    }

    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| m.name.as_str() == name)
            .map(ModuleId)
    }

    /// Whether some loaded module imports `name`.
    pub fn is_imported(&self, name: &ModuleName) -> bool {
        self.modules
            .iter()
            .any(|m| m.imports.iter().any(|i| self.modules[i.0].name == *name))
    }

    /// Top-level data node, RPC or notification of a module by name.
    pub fn find_top(&self, module: ModuleId, name: &str) -> Option<NodeId> {
        let m = &self.modules[module.0];
        m.data
            .iter()
            .chain(&m.rpcs)
            .chain(&m.notifications)
            .copied()
            .find(|n| self.nodes[n.0].name == name)
    }

    /// Every top-level node of every loaded module.
    pub fn top_level_nodes(&self) -> Vec<NodeId> {
        self.modules
            .iter()
            .flat_map(|m| m.data.iter().chain(&m.rpcs).chain(&m.notifications))
            .copied()
            .collect()
    }

    /// Closest ancestor that appears in instance data.
    pub fn data_parent(&self, node: NodeId) -> Option<NodeId> {
        let mut cur = self.nodes[node.0].parent;
        while let Some(id) = cur {
            if !self.nodes[id.0].kind.is_schema_only() {
                return Some(id);
            }
            cur = self.nodes[id.0].parent;
        }
        None
    }

    /// Children as they appear in instance data: choice and case flattened,
    /// and for operations the input (or, with `output`, output) children.
    pub fn data_children(&self, node: NodeId, output: bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.push_data_children(node, output, &mut out);
        out
    }

    fn push_data_children(&self, node: NodeId, output: bool, out: &mut Vec<NodeId>) {
        for &c in &self.nodes[node.0].children {
            match self.nodes[c.0].kind {
                NodeKind::Choice | NodeKind::Case => self.push_data_children(c, output, out),
                NodeKind::Input if !output => self.push_data_children(c, output, out),
                NodeKind::Output if output => self.push_data_children(c, output, out),
                NodeKind::Input | NodeKind::Output => {}
                _ => out.push(c),
            }
        }
    }

    /// Data child of `parent` (or top-level node when `None`) by module and name.
    pub fn find_data_child(
        &self,
        parent: Option<NodeId>,
        module: ModuleId,
        name: &str,
        output: bool,
    ) -> Option<NodeId> {
        match parent {
            None => self.find_top(module, name),
            Some(p) => self
                .data_children(p, output)
                .into_iter()
                .find(|c| self.nodes[c.0].name == name && self.nodes[c.0].module == module),
        }
    }

    /// Outermost schema ancestor (the node itself when top-level).
    pub fn top_ancestor(&self, node: NodeId) -> NodeId {
        let mut cur = node;
        while let Some(p) = self.nodes[cur.0].parent {
            cur = p;
        }
        cur
    }

    /// Module owning the data tree the node lives in.
    pub fn owner_module(&self, node: NodeId) -> ModuleId {
        self.nodes[self.top_ancestor(node).0].module
    }

    /// Whether any choice lies between the node and its data parent.
    pub fn is_in_choice(&self, node: NodeId) -> bool {
        let mut cur = self.nodes[node.0].parent;
        while let Some(id) = cur {
            match self.nodes[id.0].kind {
                NodeKind::Choice | NodeKind::Case => return true,
                k if !k.is_schema_only() => return false,
                _ => cur = self.nodes[id.0].parent,
            }
        }
        false
    }

    /// Data path of a node, e.g. `/base:top/list/aug:extra`.
    ///
    /// Schema-only nodes are skipped; a step is prefixed with its module
    /// name when the module differs from the previous step's.
    pub fn data_path(&self, node: NodeId) -> String {
        let mut chain = Vec::new();
        let mut cur = Some(node);
        while let Some(id) = cur {
            if !self.nodes[id.0].kind.is_schema_only() {
                chain.push(id);
            }
            cur = self.nodes[id.0].parent;
        }
        chain.reverse();

        let mut path = String::new();
        let mut prev: Option<ModuleId> = None;
        for id in chain {
            let n = &self.nodes[id.0];
            path.push('/');
            if prev != Some(n.module) {
                path.push_str(self.modules[n.module.0].name.as_str());
                path.push(':');
            }
            path.push_str(&n.name);
            prev = Some(n.module);
        }
        path
    }
}

fn invalid(module: &ModuleName, message: impl Into<String>) -> SchemaError {
    SchemaError::InvalidModule {
        module: module.clone(),
        message: message.into(),
    }
}

fn must_allowed(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Container
            | NodeKind::List
            | NodeKind::Leaf
            | NodeKind::LeafList
            | NodeKind::Anydata
            | NodeKind::Notification
    )
}
