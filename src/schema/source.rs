//! schema::source
//!
//! Serialized module source documents and the parser seam.
//!
//! A module source is a JSON rendering of a compiled YANG module: its
//! identity, imports, features, data nodes, operations and augments.
//! Source text is what the repository stores and what install/update
//! requests carry; the [`SchemaParser`] trait turns it into a
//! [`ModuleSource`].
//!
//! # Example
//!
//! ```
//! use yangmods::schema::source::{JsonSchemaParser, SchemaParser};
//!
//! let text = r#"{
//!     "name": "example",
//!     "revision": "2024-01-01",
//!     "features": ["extra"],
//!     "data": [
//!         {"kind": "container", "name": "top", "children": [
//!             {"kind": "leaf", "name": "id", "type": {"base": "uint32"}}
//!         ]}
//!     ]
//! }"#;
//! let module = JsonSchemaParser.parse(text).unwrap();
//! assert_eq!(module.name.as_str(), "example");
//! assert_eq!(module.data.len(), 1);
//! ```

use serde::{Deserialize, Serialize};

use super::SchemaError;
use crate::core::types::{FeatureName, ModuleName, Revision};

/// Turns module source text into a module description.
pub trait SchemaParser {
    fn parse(&self, text: &str) -> Result<ModuleSource, SchemaError>;
}

/// Parser for the JSON module source format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaParser;

impl SchemaParser for JsonSchemaParser {
    fn parse(&self, text: &str) -> Result<ModuleSource, SchemaError> {
        serde_json::from_str(text).map_err(|e| SchemaError::Parse(e.to_string()))
    }
}

/// A complete module source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSource {
    pub name: ModuleName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<FeatureName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<NodeSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rpcs: Vec<NodeSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<NodeSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub augments: Vec<AugmentSource>,
}

/// An `import` statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportSource {
    pub module: ModuleName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
}

/// An `augment` statement: nodes grafted under an absolute schema path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AugmentSource {
    /// Absolute schema node identifier, e.g. `/base:top/base:inner`.
    pub target: String,
    #[serde(default)]
    pub nodes: Vec<NodeSource>,
}

/// Schema node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Container,
    List,
    Leaf,
    LeafList,
    Choice,
    Case,
    Anydata,
    Rpc,
    Action,
    Notification,
    Input,
    Output,
}

impl NodeKind {
    /// Operations: RPCs, actions and notifications.
    pub fn is_operation(self) -> bool {
        matches!(self, NodeKind::Rpc | NodeKind::Action | NodeKind::Notification)
    }

    /// Nodes that never appear in instance data or data paths.
    pub fn is_schema_only(self) -> bool {
        matches!(
            self,
            NodeKind::Choice | NodeKind::Case | NodeKind::Input | NodeKind::Output
        )
    }

    /// Nodes whose value is a scalar or scalar array.
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeKind::Leaf | NodeKind::LeafList)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Container => "container",
            NodeKind::List => "list",
            NodeKind::Leaf => "leaf",
            NodeKind::LeafList => "leaf-list",
            NodeKind::Choice => "choice",
            NodeKind::Case => "case",
            NodeKind::Anydata => "anydata",
            NodeKind::Rpc => "rpc",
            NodeKind::Action => "action",
            NodeKind::Notification => "notification",
            NodeKind::Input => "input",
            NodeKind::Output => "output",
        }
    }
}

/// One schema node in a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSource {
    pub kind: NodeKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSource>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub leaf_type: Option<TypeSource>,
    /// Leaf default, in canonical string form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Leaf-list defaults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaults: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<String>,
    /// `feature` or `module:feature` references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub if_features: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mandatory: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<IoSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<IoSource>,
}

/// RPC/action input or output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoSource {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSource>,
}

/// Inclusive integer bounds narrowing a built-in integer type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<serde_json::Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<serde_json::Number>,
}

impl RangeSource {
    /// Integer value of a bound; `None` for fractional bounds.
    pub fn bound(n: &serde_json::Number) -> Option<i128> {
        n.as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
    }
}

fn require_instance_default() -> bool {
    true
}

/// Leaf types, tagged by `base`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "base", rename_all = "kebab-case")]
pub enum TypeSource {
    String,
    Boolean,
    Empty,
    Int8 {
        #[serde(default)]
        range: Option<RangeSource>,
    },
    Int16 {
        #[serde(default)]
        range: Option<RangeSource>,
    },
    Int32 {
        #[serde(default)]
        range: Option<RangeSource>,
    },
    Int64 {
        #[serde(default)]
        range: Option<RangeSource>,
    },
    Uint8 {
        #[serde(default)]
        range: Option<RangeSource>,
    },
    Uint16 {
        #[serde(default)]
        range: Option<RangeSource>,
    },
    Uint32 {
        #[serde(default)]
        range: Option<RangeSource>,
    },
    Uint64 {
        #[serde(default)]
        range: Option<RangeSource>,
    },
    Decimal64 {
        fraction_digits: u8,
    },
    Enumeration {
        enums: Vec<String>,
    },
    Leafref {
        path: String,
        #[serde(default = "require_instance_default")]
        require_instance: bool,
    },
    InstanceIdentifier {
        #[serde(default = "require_instance_default")]
        require_instance: bool,
    },
    Union {
        types: Vec<TypeSource>,
    },
}
