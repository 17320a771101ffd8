//! Fixtures shared by the integration tests: module sources and an
//! on-disk repository in a temporary directory.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use yangmods::core::paths::RepoPaths;
use yangmods::core::types::{Datastore, ModuleName, Revision};
use yangmods::engine::Engine;
use yangmods::store::FileBackend;

// =============================================================================
// Module sources
// =============================================================================

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

/// Leafref into `base`.
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

/// An RPC whose input refers to `base`.
pub const OPS: &str = r#"{
    "name": "ops",
    "imports": [{"module": "base"}],
    "rpcs": [
        {"kind": "rpc", "name": "ping",
         "input": {"children": [
            {"kind": "leaf", "name": "to", "type": {"base": "leafref",
             "path": "/base:items/base:item/base:name"}}
         ]}}
    ]
}"#;

/// Three features, no data nodes.
pub const FLAGS: &str = r#"{
    "name": "flags",
    "features": ["a", "b", "c"]
}"#;

pub fn name(s: &str) -> ModuleName {
    ModuleName::new(s).unwrap()
}

pub fn rev(s: &str) -> Revision {
    Revision::new(s).unwrap()
}

// =============================================================================
// On-disk repository
// =============================================================================

/// An initialized repository under `<tmp>/repo`, with `<tmp>/sources` for
/// module files handed to the CLI.
pub struct TestRepo {
    dir: TempDir,
    paths: RepoPaths,
}

impl TestRepo {
    pub fn new() -> Self {
        let repo = Self::uninitialized();
        FileBackend::new(repo.paths.clone()).init().expect("init repository");
        repo
    }

    pub fn uninitialized() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let paths = RepoPaths::new(dir.path().join("repo"));
        fs::create_dir_all(dir.path().join("sources")).expect("create sources dir");
        Self { dir, paths }
    }

    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn tmp(&self) -> &Path {
        self.dir.path()
    }

    /// A fresh engine over the repository, as a new process would open it.
    pub fn engine(&self) -> Engine<FileBackend> {
        Engine::new(FileBackend::new(self.paths.clone()))
    }

    /// Write a file under `<tmp>/sources` and return its path.
    pub fn source(&self, file: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join("sources").join(file);
        fs::write(&path, text).expect("write source");
        path
    }

    pub fn data_file(&self, module: &str, ds: Datastore) -> PathBuf {
        self.paths.data_path(&name(module), ds)
    }

    pub fn schema_file(&self, module: &str, revision: Option<&str>) -> PathBuf {
        self.paths.schema_path(&name(module), revision.map(rev).as_ref())
    }

    /// Every file under the repository root with its bytes, lock excluded.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut out = BTreeMap::new();
        let mut stack = vec![self.root().to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).expect("read dir") {
                let path = entry.expect("dir entry").path();
                if path.is_dir() {
                    stack.push(path);
                } else if path != self.paths.lock_path() {
                    let bytes = fs::read(&path).expect("read file");
                    out.insert(path, bytes);
                }
            }
        }
        out
    }
}
