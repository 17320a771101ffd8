//! Module sources and helpers shared by the engine tests.

use serde_json::{json, Value};

use super::Engine;
use crate::core::types::{Datastore, FeatureName, ModuleName};
use crate::store::{MemoryBackend, ModuleDataStore};

/// A list of items with a numeric `count` and a feature-guarded `note`.
pub const BASE: &str = r#"{
    "name": "base",
    "revision": "2024-01-01",
    "features": ["extra"],
    "data": [
        {"kind": "container", "name": "items", "children": [
            {"kind": "leaf", "name": "count", "type": {"base": "uint32"}},
            {"kind": "leaf", "name": "note", "type": {"base": "string"}, "if_features": ["extra"]},
            {"kind": "list", "name": "item", "keys": ["name"], "children": [
                {"kind": "leaf", "name": "name", "type": {"base": "string"}}
            ]}
        ]}
    ]
}"#;

/// Newer `base` with an extra leaf.
pub const BASE_V2: &str = r#"{
    "name": "base",
    "revision": "2024-06-01",
    "features": ["extra"],
    "data": [
        {"kind": "container", "name": "items", "children": [
            {"kind": "leaf", "name": "count", "type": {"base": "uint32"}},
            {"kind": "leaf", "name": "note", "type": {"base": "string"}, "if_features": ["extra"]},
            {"kind": "leaf", "name": "label", "type": {"base": "string"}},
            {"kind": "list", "name": "item", "keys": ["name"], "children": [
                {"kind": "leaf", "name": "name", "type": {"base": "string"}}
            ]}
        ]}
    ]
}"#;

/// Newer `base` whose `count` no longer fits large values.
pub const BASE_NARROW: &str = r#"{
    "name": "base",
    "revision": "2024-09-01",
    "features": ["extra"],
    "data": [
        {"kind": "container", "name": "items", "children": [
            {"kind": "leaf", "name": "count", "type": {"base": "uint8"}},
            {"kind": "leaf", "name": "note", "type": {"base": "string"}, "if_features": ["extra"]},
            {"kind": "list", "name": "item", "keys": ["name"], "children": [
                {"kind": "leaf", "name": "name", "type": {"base": "string"}}
            ]}
        ]}
    ]
}"#;

/// Imports `base` and points a leafref into its items.
pub const USER: &str = r#"{
    "name": "user",
    "imports": [{"module": "base"}],
    "data": [
        {"kind": "container", "name": "cfg", "children": [
            {"kind": "leaf", "name": "pick", "type": {"base": "leafref",
             "path": "/base:items/base:item/base:name"}}
        ]}
    ]
}"#;

/// Imports `base` without referencing it.
pub const LOOSE: &str = r#"{
    "name": "loose",
    "imports": [{"module": "base"}],
    "data": [{"kind": "leaf", "name": "flag", "type": {"base": "boolean"}}]
}"#;

/// A `when` condition on a module that is only imported.
pub const WATCHER: &str = r#"{
    "name": "watcher",
    "imports": [{"module": "base"}],
    "data": [
        {"kind": "leaf", "name": "armed", "type": {"base": "boolean"},
         "when": ["/base:items/base:count > 0"]}
    ]
}"#;

pub fn name(s: &str) -> ModuleName {
    ModuleName::new(s).unwrap()
}

pub fn feature(s: &str) -> FeatureName {
    FeatureName::new(s).unwrap()
}

pub fn engine() -> Engine<MemoryBackend> {
    Engine::new(MemoryBackend::initialized())
}

/// Install modules one batch at a time.
pub fn installed(sources: &[&str]) -> Engine<MemoryBackend> {
    let mut e = engine();
    for source in sources {
        e.schedule_install(source, &[], None).unwrap();
        let outcome = e.apply_scheduled_changes().unwrap();
        assert!(!outcome.failed, "install failed: {:?}", outcome.rejection);
    }
    e
}

pub fn write_data(e: &mut Engine<MemoryBackend>, module: &str, data: Value) {
    for ds in Datastore::ALL {
        e.backend_mut()
            .write_module_data(&name(module), ds, &data, true)
            .unwrap();
    }
}

pub fn read_data(e: &Engine<MemoryBackend>, module: &str, ds: Datastore) -> Option<Value> {
    e.backend().read_module_data(&name(module), ds).unwrap()
}

pub fn items(count: u64) -> Value {
    json!({"base:items": {"count": count, "item": [{"name": "a"}]}})
}
