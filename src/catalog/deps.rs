//! catalog::deps
//!
//! Dependency extraction from compiled schema trees.
//!
//! # Architecture
//!
//! An [`Extractor`] walks a module's schema pre-order, skipping subtrees
//! disabled by `if-feature`. Every expression it meets (`when`, `must`,
//! leafref paths, instance-identifier defaults) is atomized, and each atom
//! is classified as local or foreign relative to the expression's top
//! node ([`expression_top`], [`foreign_module`]). Foreign atoms become
//! `ModuleRef` records.
//!
//! RPCs, actions and notifications are not descended into as data; each
//! gets an [`OperationDependency`] keyed by its data path, with input and
//! output conditions collected separately.
//!
//! The same walk, with leafrefs turned off, produces the set of modules
//! that `when`/`must` conditions and instance-identifier defaults refer to
//! ([`condition_modules`]). The apply engine uses it to make sure every
//! such module is implemented.

use std::collections::BTreeSet;

use tracing::debug;

use super::{Catalog, CatalogError, Dependency, DependencySet, OperationDependency};
use crate::core::types::ModuleName;
use crate::schema::source::NodeKind;
use crate::schema::{AtomizeOptions, Atomizer, LeafType, ModuleId, NodeId, SchemaContext};

/// Dependencies of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDeps {
    pub data_deps: DependencySet,
    pub op_deps: Vec<OperationDependency>,
}

impl ExtractedDeps {
    /// Every module named by a `ModuleRef`, in data or operation deps.
    pub fn module_refs(&self) -> BTreeSet<ModuleName> {
        self.data_deps
            .module_refs()
            .chain(self.op_deps.iter().flat_map(|op| op.module_refs()))
            .cloned()
            .collect()
    }
}

/// Top node of an expression on `node`: the closest enclosing action or
/// notification, else the top-level ancestor.
pub fn expression_top(ctx: &SchemaContext, node: NodeId) -> NodeId {
    let mut cur = node;
    loop {
        if matches!(ctx.node(cur).kind, NodeKind::Action | NodeKind::Notification) {
            return cur;
        }
        match ctx.node(cur).parent {
            Some(p) => cur = p,
            None => return cur,
        }
    }
}

/// Module of `atom` if it lies outside the scope of `top`.
///
/// Atoms inside `top` are local. When `top` is an operation, any atom
/// outside it is foreign. Otherwise an atom is foreign only when its
/// data tree belongs to a different module than `top`'s.
pub fn foreign_module(ctx: &SchemaContext, atom: NodeId, top: NodeId) -> Option<ModuleId> {
    let mut cur = Some(atom);
    while let Some(n) = cur {
        if n == top {
            return None;
        }
        cur = ctx.node(n).parent;
    }

    let atom_owner = ctx.owner_module(atom);
    if ctx.node(top).kind.is_operation() {
        return Some(atom_owner);
    }
    (atom_owner != ctx.owner_module(top)).then_some(atom_owner)
}

/// Extract the data and operation dependencies of `module`.
///
/// # Errors
///
/// Atomizer failures, or an expression that reaches into more than one
/// foreign module where only one is possible.
pub fn extract(
    ctx: &SchemaContext,
    module: ModuleId,
    atomizer: &dyn Atomizer,
) -> Result<ExtractedDeps, CatalogError> {
    let mut x = Extractor::new(ctx, atomizer, true);
    let mut data_deps = DependencySet::new();
    let m = ctx.module(module);
    for &node in &m.data {
        x.walk(node, &mut data_deps, false)?;
    }
    for &op in m.rpcs.iter().chain(&m.notifications) {
        if !ctx.is_disabled(op) {
            x.operation(op)?;
        }
    }
    Ok(ExtractedDeps {
        data_deps,
        op_deps: x.op_deps,
    })
}

/// Modules referenced by `when`/`must` conditions (operation input and
/// output included) and instance-identifier defaults of `module`.
pub fn condition_modules(
    ctx: &SchemaContext,
    module: ModuleId,
    atomizer: &dyn Atomizer,
) -> Result<BTreeSet<ModuleId>, CatalogError> {
    let mut x = Extractor::new(ctx, atomizer, false);
    let mut scratch = DependencySet::new();
    let m = ctx.module(module);
    for &node in m.data.iter().chain(&m.rpcs).chain(&m.notifications) {
        x.walk(node, &mut scratch, false)?;
    }
    Ok(x.conditions)
}

struct Extractor<'a> {
    ctx: &'a SchemaContext,
    atomizer: &'a dyn Atomizer,
    /// Record leafref targets.
    leafrefs: bool,
    op_deps: Vec<OperationDependency>,
    /// Foreign modules of conditions and instance-identifier defaults.
    conditions: BTreeSet<ModuleId>,
}

impl<'a> Extractor<'a> {
    fn new(ctx: &'a SchemaContext, atomizer: &'a dyn Atomizer, leafrefs: bool) -> Self {
        Self {
            ctx,
            atomizer,
            leafrefs,
            op_deps: Vec::new(),
            conditions: BTreeSet::new(),
        }
    }

    fn walk(&mut self, node: NodeId, sink: &mut DependencySet, output: bool) -> Result<(), CatalogError> {
        let ctx = self.ctx;
        if ctx.is_disabled(node) {
            return Ok(());
        }
        let n = ctx.node(node);
        if n.kind.is_operation() {
            return self.operation(node);
        }

        if let Some(leaf_type) = &n.leaf_type {
            self.leaf_type(node, leaf_type, sink, output)?;
        }

        // Input and output conditions are evaluated on the operation.
        let ctx_node = match n.kind {
            NodeKind::Input | NodeKind::Output => n.parent.unwrap_or(node),
            _ => node,
        };
        for expr in n.when.iter().chain(&n.musts) {
            self.condition(ctx_node, expr, sink, output)?;
        }

        for &child in &n.children {
            self.walk(child, sink, output)?;
        }
        Ok(())
    }

    fn operation(&mut self, op: NodeId) -> Result<(), CatalogError> {
        let ctx = self.ctx;
        let path = ctx.data_path(op);
        if self.op_deps.iter().any(|o| o.path == path) {
            return Ok(());
        }

        let n = ctx.node(op);
        let mut input = DependencySet::new();
        for expr in n.when.iter().chain(&n.musts) {
            self.condition(op, expr, &mut input, false)?;
        }

        let output = match n.kind {
            NodeKind::Notification => {
                for &child in &n.children {
                    self.walk(child, &mut input, false)?;
                }
                None
            }
            NodeKind::Rpc | NodeKind::Action => {
                let mut output = DependencySet::new();
                for &child in &n.children {
                    match ctx.node(child).kind {
                        NodeKind::Input => self.walk(child, &mut input, false)?,
                        NodeKind::Output => self.walk(child, &mut output, true)?,
                        other => {
                            return Err(CatalogError::Internal(format!(
                                "unexpected {} under operation '{}'",
                                other.as_str(),
                                path
                            )))
                        }
                    }
                }
                Some(output)
            }
            other => {
                return Err(CatalogError::Internal(format!(
                    "'{}' is a {}, not an operation",
                    path,
                    other.as_str()
                )))
            }
        };

        debug!(path = %path, "extracted operation dependencies");
        self.op_deps.push(OperationDependency { path, input, output });
        Ok(())
    }

    fn leaf_type(
        &mut self,
        node: NodeId,
        leaf_type: &LeafType,
        sink: &mut DependencySet,
        output: bool,
    ) -> Result<(), CatalogError> {
        match leaf_type {
            LeafType::InstanceIdentifier { .. } => {
                let mut foreign = BTreeSet::new();
                for default in &self.ctx.node(node).defaults {
                    foreign.extend(self.foreign_atoms(node, default, output)?);
                }
                let default_module = single(self.ctx, &foreign, node, "instance-identifier default")?;
                self.conditions.extend(foreign);
                sink.insert(Dependency::InstanceId {
                    xpath: self.ctx.data_path(node),
                    default_module: default_module.map(|m| self.ctx.module(m).name.clone()),
                });
            }
            LeafType::Leafref { path, .. } if self.leafrefs => {
                let foreign = self.foreign_atoms(node, path, output)?;
                if let Some(m) = single(self.ctx, &foreign, node, "leafref path")? {
                    sink.insert(Dependency::module_ref(self.ctx.module(m).name.clone()));
                }
            }
            LeafType::Union(types) => {
                for t in types {
                    self.leaf_type(node, t, sink, output)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn condition(
        &mut self,
        ctx_node: NodeId,
        expr: &str,
        sink: &mut DependencySet,
        output: bool,
    ) -> Result<(), CatalogError> {
        for m in self.foreign_atoms(ctx_node, expr, output)? {
            sink.insert(Dependency::module_ref(self.ctx.module(m).name.clone()));
            self.conditions.insert(m);
        }
        Ok(())
    }

    fn foreign_atoms(&self, ctx_node: NodeId, expr: &str, output: bool) -> Result<BTreeSet<ModuleId>, CatalogError> {
        let atoms = self
            .atomizer
            .atomize(self.ctx, ctx_node, expr, AtomizeOptions { output })?;
        let top = expression_top(self.ctx, ctx_node);
        Ok(atoms
            .into_iter()
            .filter_map(|a| foreign_module(self.ctx, a, top))
            .collect())
    }
}

fn single(
    ctx: &SchemaContext,
    foreign: &BTreeSet<ModuleId>,
    node: NodeId,
    what: &str,
) -> Result<Option<ModuleId>, CatalogError> {
    if foreign.len() > 1 {
        return Err(CatalogError::Internal(format!(
            "{} of '{}' reaches {} foreign modules",
            what,
            ctx.data_path(node),
            foreign.len()
        )));
    }
    Ok(foreign.iter().next().copied())
}

impl Catalog {
    /// Extract the dependencies of `name` from `ctx` and record them, with
    /// the matching inverse dependencies on every referenced module.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the module has no catalog record
    /// - `Internal` if the module already has dependencies, is missing
    ///   from the context, or references a module outside the catalog
    pub fn add_all_deps(
        &mut self,
        name: &str,
        ctx: &SchemaContext,
        atomizer: &dyn Atomizer,
    ) -> Result<(), CatalogError> {
        let entry = self
            .find_module(name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))?;
        if !entry.data_deps.is_empty() || !entry.op_deps.is_empty() {
            return Err(CatalogError::Internal(format!(
                "module '{}' already has dependencies",
                name
            )));
        }
        let module = ctx
            .find_module(name)
            .ok_or_else(|| CatalogError::Internal(format!("module '{}' is not in the context", name)))?;

        let deps = extract(ctx, module, atomizer)?;
        let refs = deps.module_refs();
        for target in &refs {
            if self.find_module(target.as_str()).is_none() {
                return Err(CatalogError::Internal(format!(
                    "module '{}' depends on '{}', which is not installed",
                    name, target
                )));
            }
        }

        let source = {
            let entry = self
                .find_module_mut(name)
                .ok_or_else(|| CatalogError::NotFound(name.to_string()))?;
            entry.data_deps = deps.data_deps;
            entry.op_deps = deps.op_deps;
            entry.name.clone()
        };

        for target in refs.iter().filter(|t| **t != source) {
            if let Some(t) = self.find_module_mut(target.as_str()) {
                if !t.inverse_deps.contains(&source) {
                    t.inverse_deps.push(source.clone());
                }
            }
        }
        debug!(module = name, references = refs.len(), "added dependencies");
        Ok(())
    }
}
