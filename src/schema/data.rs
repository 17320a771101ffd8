//! schema::data
//!
//! Instance data trees in RFC 7951 JSON encoding.
//!
//! # Encoding
//!
//! Top-level members are qualified `module:name`. Nested members are
//! unqualified unless their module differs from the parent's (augmented
//! nodes). Lists are arrays of objects, leaf-lists arrays of scalars, and
//! `empty` leaves are `[null]`.
//!
//! # Architecture
//!
//! [`DataTree::parse`] resolves every member against a [`SchemaContext`]
//! and produces a normalized tree: qualification follows the rules above
//! regardless of how the input spelled it. [`DataTree::validate`] then
//! checks the semantic constraints: value types, list keys, mandatory
//! leaves and leafref instances. Instance data never holds a `NodeId`;
//! the tree is plain JSON and is re-resolved on every walk.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::source::NodeKind;
use super::tree::{LeafType, ModuleId, NodeId, SchemaContext};

/// How to treat members that do not resolve to a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Unknown members are an error.
    Strict,
    /// Unknown members are dropped.
    Lenient,
}

/// Errors from parsing or validating instance data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataError {
    /// JSON shape does not match the schema node.
    #[error("{path}: {message}")]
    Malformed { path: String, message: String },

    /// Member does not resolve to an enabled node of an implemented module.
    #[error("{path}: unknown data node")]
    UnknownNode { path: String },

    /// Value does not match the leaf type.
    #[error("{path}: invalid value: {message}")]
    InvalidValue { path: String, message: String },

    /// List entry without one of its keys.
    #[error("{path}: list entry is missing key '{key}'")]
    MissingKey { path: String, key: String },

    /// Two list entries with the same key values.
    #[error("{path}: duplicate list entry {keys}")]
    DuplicateEntry { path: String, keys: String },

    /// Mandatory leaf absent while its parent exists.
    #[error("{path}: mandatory node is missing")]
    MissingMandatory { path: String },

    /// Leafref value with no matching target instance.
    #[error("{path}: leafref value '{value}' has no target instance")]
    MissingLeafrefTarget { path: String, value: String },
}

/// A normalized instance data tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTree {
    root: Map<String, Value>,
}

impl DataTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document against `ctx`. `null` is an empty tree.
    pub fn parse(ctx: &SchemaContext, value: &Value, mode: ParseMode) -> Result<Self, DataError> {
        let obj = match value {
            Value::Null => return Ok(Self::new()),
            Value::Object(obj) => obj,
            _ => {
                return Err(DataError::Malformed {
                    path: "/".into(),
                    message: "data document must be an object".into(),
                })
            }
        };

        let parser = Parser { ctx, mode };
        let mut root = Map::new();
        for (key, v) in obj {
            let path = format!("/{}", key);
            match resolve_top(ctx, key) {
                Some(node) => {
                    let canonical = qualified(ctx, node);
                    root.insert(canonical, parser.node(node, v, &path)?);
                }
                None => parser.unknown(&path)?,
            }
        }
        Ok(Self { root })
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Data owned by one module: its qualified top-level members.
    pub fn module_data(&self, module: &str) -> Option<Value> {
        let prefix = format!("{}:", module);
        let members: Map<String, Value> = self
            .root
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        (!members.is_empty()).then_some(Value::Object(members))
    }

    /// Names of the modules with top-level data in this tree.
    pub fn modules(&self) -> BTreeSet<String> {
        self.root
            .keys()
            .filter_map(|k| k.split_once(':').map(|(m, _)| m.to_string()))
            .collect()
    }

    /// Merge `other` into this tree. Objects merge member-wise, list and
    /// leaf-list entries are appended unless an equal entry exists, and
    /// leaf values are replaced.
    pub fn merge(&mut self, other: DataTree) {
        for (k, v) in other.root {
            match self.root.get_mut(&k) {
                Some(existing) => merge_value(existing, v),
                None => {
                    self.root.insert(k, v);
                }
            }
        }
    }

    /// Check value types, list keys, mandatory leaves and leafref instances.
    pub fn validate(&self, ctx: &SchemaContext) -> Result<(), DataError> {
        let mut v = Validator {
            ctx,
            values: BTreeMap::new(),
            leafrefs: Vec::new(),
        };

        let mut with_data: BTreeSet<ModuleId> = BTreeSet::new();
        for (key, value) in &self.root {
            let path = format!("/{}", key);
            let node = resolve_top(ctx, key).ok_or_else(|| DataError::UnknownNode { path: path.clone() })?;
            with_data.insert(ctx.node(node).module);
            v.node(node, value, &path)?;
        }

        for m in with_data {
            for &top in &ctx.module(m).data {
                let n = ctx.node(top);
                if n.mandatory && !ctx.is_disabled(top) && !self.root.contains_key(&qualified(ctx, top)) {
                    return Err(DataError::MissingMandatory {
                        path: ctx.data_path(top),
                    });
                }
            }
        }

        v.check_leafrefs()
    }
}

// =============================================================================
// Resolution helpers
// =============================================================================

fn resolve_top(ctx: &SchemaContext, key: &str) -> Option<NodeId> {
    let (prefix, name) = key.split_once(':')?;
    let module = ctx.find_module(prefix)?;
    if !ctx.module(module).implemented {
        return None;
    }
    ctx.find_top(module, name)
        .filter(|n| is_instance_node(ctx, *n))
}

fn resolve_child(ctx: &SchemaContext, parent: NodeId, key: &str) -> Option<NodeId> {
    let (module, name) = match key.split_once(':') {
        Some((prefix, name)) => (ctx.find_module(prefix)?, name),
        None => (ctx.node(parent).module, key),
    };
    ctx.find_data_child(Some(parent), module, name, false)
        .filter(|n| is_instance_node(ctx, *n))
}

fn is_instance_node(ctx: &SchemaContext, node: NodeId) -> bool {
    !ctx.node(node).kind.is_operation() && !ctx.is_disabled(node)
}

/// Top-level member name of a node.
fn qualified(ctx: &SchemaContext, node: NodeId) -> String {
    let n = ctx.node(node);
    format!("{}:{}", ctx.module(n.module).name, n.name)
}

/// Member name of a node under `parent`.
fn member_name(ctx: &SchemaContext, parent: NodeId, node: NodeId) -> String {
    if ctx.node(parent).module == ctx.node(node).module {
        ctx.node(node).name.clone()
    } else {
        qualified(ctx, node)
    }
}

fn merge_value(into: &mut Value, from: Value) {
    match (into, from) {
        (Value::Object(a), Value::Object(b)) => {
            for (k, v) in b {
                match a.get_mut(&k) {
                    Some(existing) => merge_value(existing, v),
                    None => {
                        a.insert(k, v);
                    }
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for entry in b {
                if !a.contains(&entry) {
                    a.push(entry);
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

// =============================================================================
// Parsing
// =============================================================================

struct Parser<'a> {
    ctx: &'a SchemaContext,
    mode: ParseMode,
}

impl Parser<'_> {
    fn unknown(&self, path: &str) -> Result<(), DataError> {
        match self.mode {
            ParseMode::Strict => Err(DataError::UnknownNode { path: path.to_string() }),
            ParseMode::Lenient => {
                debug!(path, "dropped unknown data node");
                Ok(())
            }
        }
    }

    fn node(&self, node: NodeId, value: &Value, path: &str) -> Result<Value, DataError> {
        let malformed = |message: &str| DataError::Malformed {
            path: path.to_string(),
            message: message.to_string(),
        };
        match self.ctx.node(node).kind {
            NodeKind::Container => {
                let obj = value.as_object().ok_or_else(|| malformed("container must be an object"))?;
                self.children(node, obj, path).map(Value::Object)
            }
            NodeKind::List => {
                let entries = value.as_array().ok_or_else(|| malformed("list must be an array"))?;
                let mut out = Vec::with_capacity(entries.len());
                for entry in entries {
                    let obj = entry
                        .as_object()
                        .ok_or_else(|| malformed("list entry must be an object"))?;
                    out.push(Value::Object(self.children(node, obj, path)?));
                }
                Ok(Value::Array(out))
            }
            NodeKind::LeafList => {
                if !value.is_array() {
                    return Err(malformed("leaf-list must be an array"));
                }
                Ok(value.clone())
            }
            NodeKind::Leaf => {
                if value.is_object() {
                    return Err(malformed("leaf value cannot be an object"));
                }
                Ok(value.clone())
            }
            NodeKind::Anydata => Ok(value.clone()),
            other => Err(malformed(&format!("{} cannot appear in instance data", other.as_str()))),
        }
    }

    fn children(&self, parent: NodeId, obj: &Map<String, Value>, path: &str) -> Result<Map<String, Value>, DataError> {
        let mut out = Map::new();
        for (key, v) in obj {
            let child_path = format!("{}/{}", path, key);
            match resolve_child(self.ctx, parent, key) {
                Some(child) => {
                    out.insert(member_name(self.ctx, parent, child), self.node(child, v, &child_path)?);
                }
                None => self.unknown(&child_path)?,
            }
        }
        Ok(out)
    }
}

// =============================================================================
// Validation
// =============================================================================

struct Validator<'a> {
    ctx: &'a SchemaContext,
    /// Every leaf and leaf-list value seen, by schema node.
    values: BTreeMap<NodeId, BTreeSet<String>>,
    /// Leafref values that require an instance: (path, target, value).
    leafrefs: Vec<(String, NodeId, String)>,
}

impl Validator<'_> {
    fn node(&mut self, node: NodeId, value: &Value, path: &str) -> Result<(), DataError> {
        let ctx = self.ctx;
        match ctx.node(node).kind {
            NodeKind::Container => {
                if let Some(obj) = value.as_object() {
                    self.children(node, obj, path)?;
                }
                Ok(())
            }
            NodeKind::List => {
                let keys = &ctx.node(node).keys;
                let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
                for entry in value.as_array().into_iter().flatten() {
                    let obj = match entry.as_object() {
                        Some(obj) => obj,
                        None => continue,
                    };
                    let mut tuple = Vec::with_capacity(keys.len());
                    for key in keys {
                        let v = obj.get(key).ok_or_else(|| DataError::MissingKey {
                            path: path.to_string(),
                            key: key.clone(),
                        })?;
                        tuple.push(canonical(v));
                    }
                    if !keys.is_empty() && !seen.insert(tuple.clone()) {
                        return Err(DataError::DuplicateEntry {
                            path: path.to_string(),
                            keys: format!("[{}]", tuple.join(", ")),
                        });
                    }
                    self.children(node, obj, path)?;
                }
                Ok(())
            }
            NodeKind::Leaf => self.leaf_value(node, value, path),
            NodeKind::LeafList => {
                for v in value.as_array().into_iter().flatten() {
                    self.leaf_value(node, v, path)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn children(&mut self, parent: NodeId, obj: &Map<String, Value>, path: &str) -> Result<(), DataError> {
        let ctx = self.ctx;
        for (key, v) in obj {
            let child_path = format!("{}/{}", path, key);
            let child = resolve_child(ctx, parent, key).ok_or_else(|| DataError::UnknownNode {
                path: child_path.clone(),
            })?;
            self.node(child, v, &child_path)?;
        }

        for child in ctx.data_children(parent, false) {
            let n = ctx.node(child);
            if n.kind == NodeKind::Leaf
                && n.mandatory
                && !ctx.is_in_choice(child)
                && !ctx.is_disabled(child)
                && !obj.contains_key(&member_name(ctx, parent, child))
            {
                return Err(DataError::MissingMandatory {
                    path: format!("{}/{}", path, member_name(ctx, parent, child)),
                });
            }
        }
        Ok(())
    }

    fn leaf_value(&mut self, node: NodeId, value: &Value, path: &str) -> Result<(), DataError> {
        let ctx = self.ctx;
        let leaf_type = match &ctx.node(node).leaf_type {
            Some(t) => t,
            None => return Ok(()),
        };
        check_value(ctx, leaf_type, value).map_err(|message| DataError::InvalidValue {
            path: path.to_string(),
            message,
        })?;

        let text = typed_canonical(ctx, leaf_type, value);
        if let LeafType::Leafref {
            require_instance: true,
            target: Some(target),
            ..
        } = leaf_type
        {
            self.leafrefs.push((path.to_string(), *target, text.clone()));
        }
        self.values.entry(node).or_default().insert(text);
        Ok(())
    }

    fn check_leafrefs(&self) -> Result<(), DataError> {
        for (path, target, value) in &self.leafrefs {
            let found = self
                .values
                .get(target)
                .map(|set| set.contains(value))
                .unwrap_or(false);
            if !found {
                return Err(DataError::MissingLeafrefTarget {
                    path: path.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// String form used to compare values across nodes.
fn canonical(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Comparable form of a valid leaf value. Numbers compare by value, so
/// `"1.50"` and `1.5` are the same decimal.
fn typed_canonical(ctx: &SchemaContext, ty: &LeafType, value: &Value) -> String {
    match ty {
        LeafType::Integer { .. } => integer(value)
            .map(|n| n.to_string())
            .unwrap_or_else(|| canonical(value)),
        LeafType::Decimal64 { .. } => match value {
            Value::Number(n) => normalize_decimal(&n.to_string()),
            Value::String(s) => normalize_decimal(s),
            other => canonical(other),
        },
        LeafType::Leafref { target, .. } => match target.and_then(|t| ctx.node(t).leaf_type.as_ref()) {
            Some(target_type) => typed_canonical(ctx, target_type, value),
            None => canonical(value),
        },
        LeafType::Union(types) => types
            .iter()
            .find(|t| check_value(ctx, t, value).is_ok())
            .map(|t| typed_canonical(ctx, t, value))
            .unwrap_or_else(|| canonical(value)),
        _ => canonical(value),
    }
}

fn integer(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Drop leading integer zeros, trailing fraction zeros and the sign of zero.
fn normalize_decimal(text: &str) -> String {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    let int = match int.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    let frac = frac.trim_end_matches('0');

    let mut out = String::with_capacity(text.len());
    if negative && !(int == "0" && frac.is_empty()) {
        out.push('-');
    }
    out.push_str(int);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(frac);
    }
    out
}

fn check_value(ctx: &SchemaContext, ty: &LeafType, value: &Value) -> Result<(), String> {
    match ty {
        LeafType::String => value
            .as_str()
            .map(|_| ())
            .ok_or_else(|| "expected a string".to_string()),
        LeafType::Boolean => value
            .as_bool()
            .map(|_| ())
            .ok_or_else(|| "expected true or false".to_string()),
        LeafType::Empty => match value {
            Value::Array(a) if a.len() == 1 && a[0].is_null() => Ok(()),
            _ => Err("expected [null]".into()),
        },
        LeafType::Integer { kind, min, max } => {
            let n: i128 = match value {
                Value::Number(n) => n
                    .as_i64()
                    .map(i128::from)
                    .or_else(|| n.as_u64().map(i128::from))
                    .ok_or_else(|| format!("{} is not an integer", n))?,
                Value::String(s) if kind.is_64bit() => s
                    .parse()
                    .map_err(|_| format!("'{}' is not an integer", s))?,
                _ => return Err("expected an integer".into()),
            };
            if n < *min || n > *max {
                return Err(format!("{} is outside {}..{}", n, min, max));
            }
            Ok(())
        }
        LeafType::Decimal64 { fraction_digits } => {
            let text = match value {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => return Err("expected a decimal number".into()),
            };
            check_decimal(&text, *fraction_digits)
        }
        LeafType::Enumeration(enums) => match value.as_str() {
            Some(s) if enums.iter().any(|e| e == s) => Ok(()),
            Some(s) => Err(format!("'{}' is not one of {}", s, enums.join(", "))),
            None => Err("expected an enum name".into()),
        },
        LeafType::Leafref { target, .. } => match target.and_then(|t| ctx.node(t).leaf_type.as_ref()) {
            Some(target_type) => check_value(ctx, target_type, value),
            None => Ok(()),
        },
        LeafType::InstanceIdentifier { .. } => match value.as_str() {
            Some(s) if s.starts_with('/') => Ok(()),
            _ => Err("expected an absolute instance identifier".into()),
        },
        LeafType::Union(types) => {
            if types.iter().any(|t| check_value(ctx, t, value).is_ok()) {
                Ok(())
            } else {
                Err("value matches no member type of the union".into())
            }
        }
    }
}

fn check_decimal(text: &str, fraction_digits: u8) -> Result<(), String> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    let ok = !int.is_empty()
        && int.chars().all(|c| c.is_ascii_digit())
        && frac.chars().all(|c| c.is_ascii_digit())
        && frac.len() <= usize::from(fraction_digits)
        && !(digits.contains('.') && frac.is_empty());
    if ok {
        Ok(())
    } else {
        Err(format!(
            "'{}' is not a decimal with at most {} fraction digits",
            text, fraction_digits
        ))
    }
}
