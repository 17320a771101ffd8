//! store::file
//!
//! File-based backend.
//!
//! # Layout
//!
//! ```text
//! <repo>/
//!   catalog.json
//!   data/<module>.<datastore>.json
//!   schemas/<module>[@<revision>].json
//! ```
//!
//! Every write goes to a uniquely named temporary file in the target
//! directory, is synced, and then renamed over the target, so readers see
//! either the old or the new content.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{CatalogStore, ModuleDataStore, SchemaRepository, StoreError};
use crate::catalog::{parse_catalog, Catalog};
use crate::core::paths::RepoPaths;
use crate::core::types::{Datastore, ModuleName, Revision};

/// JSON files under a repository directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    paths: RepoPaths,
}

impl FileBackend {
    pub fn new(paths: RepoPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    /// Create the repository layout and an empty catalog if none exists.
    /// Returns whether a catalog was created.
    pub fn init(&mut self) -> Result<bool, StoreError> {
        for dir in [self.paths.data_dir(), self.paths.schemas_dir()] {
            fs::create_dir_all(&dir).map_err(|e| io(&dir, e))?;
        }
        if self.paths.catalog_path().exists() {
            return Ok(false);
        }
        self.store_catalog(&Catalog::new())?;
        Ok(true)
    }

    /// Whether a catalog exists at the repository root.
    pub fn is_initialized(&self) -> bool {
        self.paths.catalog_path().exists()
    }
}

fn io(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read a file, `None` if it does not exist.
fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io(path, e)),
    }
}

fn remove_optional(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io(path, e)),
    }
}

/// Write through a temporary file in the same directory, then rename.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| io(dir, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let result = (|| {
        let mut file = fs::File::create(&temp_path).map_err(|e| io(&temp_path, e))?;
        file.write_all(contents).map_err(|e| io(&temp_path, e))?;
        file.sync_all().map_err(|e| io(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| io(path, e))
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn to_bytes(value: &Value, path: &Path) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|e| StoreError::Corrupted {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

impl CatalogStore for FileBackend {
    fn load_catalog(&self) -> Result<Option<Catalog>, StoreError> {
        let path = self.paths.catalog_path();
        let text = match read_optional(&path)? {
            Some(t) => t,
            None => return Ok(None),
        };
        parse_catalog(&text)
            .map(Some)
            .map_err(|e| StoreError::Corrupted {
                path,
                message: e.to_string(),
            })
    }

    fn store_catalog(&mut self, catalog: &Catalog) -> Result<(), StoreError> {
        catalog.validate()?;
        let json = catalog.to_json()?;
        let path = self.paths.catalog_path();
        write_atomic(&path, json.as_bytes())?;
        debug!(path = %path.display(), fingerprint = catalog.fingerprint().short(), "stored catalog");
        Ok(())
    }
}

impl ModuleDataStore for FileBackend {
    fn read_module_data(&self, module: &ModuleName, datastore: Datastore) -> Result<Option<Value>, StoreError> {
        let path = self.paths.data_path(module, datastore);
        match read_optional(&path)? {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| StoreError::Corrupted {
                    path,
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn write_module_data(
        &mut self,
        module: &ModuleName,
        datastore: Datastore,
        data: &Value,
        create_if_missing: bool,
    ) -> Result<(), StoreError> {
        let path = self.paths.data_path(module, datastore);
        if !create_if_missing && !path.exists() {
            return Err(StoreError::MissingData {
                module: module.clone(),
                datastore,
            });
        }
        write_atomic(&path, &to_bytes(data, &path)?)
    }

    fn remove_module_data(&mut self, module: &ModuleName) -> Result<(), StoreError> {
        for ds in Datastore::ALL {
            remove_optional(&self.paths.data_path(module, ds))?;
        }
        Ok(())
    }
}

impl FileBackend {
    /// Stored revisions of a module, oldest first; `None` (no revision)
    /// sorts before any dated revision.
    fn stored_revisions(&self, module: &ModuleName) -> Result<Vec<Option<Revision>>, StoreError> {
        let dir = self.paths.schemas_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io(&dir, e)),
        };

        let mut revisions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io(&dir, e))?;
            let file = entry.file_name();
            let stem = match file.to_str().and_then(|f| f.strip_suffix(".json")) {
                Some(stem) => stem,
                None => continue,
            };
            match stem.split_once('@') {
                Some((name, rev)) if name == module.as_str() => {
                    if let Ok(rev) = Revision::new(rev) {
                        revisions.push(Some(rev));
                    }
                }
                None if stem == module.as_str() => revisions.push(None),
                _ => {}
            }
        }
        revisions.sort();
        Ok(revisions)
    }
}

impl SchemaRepository for FileBackend {
    fn store_schema(&mut self, module: &ModuleName, revision: Option<&Revision>, text: &str) -> Result<(), StoreError> {
        let path = self.paths.schema_path(module, revision);
        write_atomic(&path, text.as_bytes())?;
        debug!(module = %module, path = %path.display(), "stored schema");
        Ok(())
    }

    fn find_schema(&self, module: &ModuleName, revision: Option<&Revision>) -> Result<Option<String>, StoreError> {
        read_optional(&self.paths.schema_path(module, revision))
    }

    fn find_newest_schema(&self, module: &ModuleName) -> Result<Option<String>, StoreError> {
        match self.stored_revisions(module)?.pop() {
            Some(newest) => read_optional(&self.paths.schema_path(module, newest.as_ref())),
            None => Ok(None),
        }
    }

    fn remove_schema(&mut self, module: &ModuleName, revision: Option<&Revision>) -> Result<(), StoreError> {
        remove_optional(&self.paths.schema_path(module, revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn backend() -> (TempDir, FileBackend) {
        let temp = TempDir::new().unwrap();
        let mut b = FileBackend::new(RepoPaths::new(temp.path().to_path_buf()));
        b.init().unwrap();
        (temp, b)
    }

    fn name(s: &str) -> ModuleName {
        ModuleName::new(s).unwrap()
    }

    mod catalog {
        use super::*;

        #[test]
        fn init_creates_empty_catalog_once() {
            let (_temp, mut b) = backend();
            assert!(b.is_initialized());
            assert_eq!(b.load_catalog().unwrap(), Some(Catalog::new()));
            assert!(!b.init().unwrap());
        }

        #[test]
        fn store_and_load() {
            let (_temp, mut b) = backend();
            let mut c = Catalog::new();
            c.add_module(name("a"), None, vec![]).unwrap();
            b.store_catalog(&c).unwrap();
            assert_eq!(b.load_catalog().unwrap(), Some(c));
        }

        #[test]
        fn invalid_catalog_not_written() {
            let (_temp, mut b) = backend();
            let before = fs::read(b.paths().catalog_path()).unwrap();
            let mut c = Catalog::new();
            c.add_module(name("a"), None, vec![]).unwrap();
            c.modules[0].inverse_deps.push(name("ghost"));
            assert!(matches!(b.store_catalog(&c), Err(StoreError::InvalidCatalog(_))));
            assert_eq!(fs::read(b.paths().catalog_path()).unwrap(), before);
        }

        #[test]
        fn corrupted_catalog() {
            let (_temp, b) = backend();
            fs::write(b.paths().catalog_path(), "{not json").unwrap();
            assert!(matches!(b.load_catalog(), Err(StoreError::Corrupted { .. })));
        }

        #[test]
        fn no_temp_files_left() {
            let (temp, mut b) = backend();
            b.store_catalog(&Catalog::new()).unwrap();
            let stray = fs::read_dir(temp.path())
                .unwrap()
                .filter_map(Result::ok)
                .any(|e| e.file_name().to_string_lossy().ends_with(".tmp"));
            assert!(!stray);
        }
    }

    mod data {
        use super::*;

        #[test]
        fn write_read_remove() {
            let (_temp, mut b) = backend();
            let m = name("m");
            assert!(b.read_module_data(&m, Datastore::Running).unwrap().is_none());

            b.write_module_data(&m, Datastore::Running, &json!({"m:x": 1}), true)
                .unwrap();
            assert_eq!(
                b.read_module_data(&m, Datastore::Running).unwrap(),
                Some(json!({"m:x": 1}))
            );
            assert!(b.read_module_data(&m, Datastore::Startup).unwrap().is_none());

            b.remove_module_data(&m).unwrap();
            assert!(b.read_module_data(&m, Datastore::Running).unwrap().is_none());
            b.remove_module_data(&m).unwrap();
        }

        #[test]
        fn write_without_create() {
            let (_temp, mut b) = backend();
            let err = b
                .write_module_data(&name("m"), Datastore::Startup, &json!({}), false)
                .unwrap_err();
            assert!(matches!(err, StoreError::MissingData { .. }));
        }
    }

    mod schemas {
        use super::*;

        #[test]
        fn newest_revision_wins() {
            let (_temp, mut b) = backend();
            let m = name("m");
            let r1 = Revision::new("2020-01-01").unwrap();
            let r2 = Revision::new("2021-01-01").unwrap();
            b.store_schema(&m, None, "none").unwrap();
            b.store_schema(&m, Some(&r2), "two").unwrap();
            b.store_schema(&m, Some(&r1), "one").unwrap();
            b.store_schema(&name("m2"), Some(&r2), "other").unwrap();

            assert_eq!(b.find_newest_schema(&m).unwrap().as_deref(), Some("two"));
            assert_eq!(b.find_schema(&m, Some(&r1)).unwrap().as_deref(), Some("one"));

            b.remove_schema(&m, Some(&r2)).unwrap();
            assert_eq!(b.find_newest_schema(&m).unwrap().as_deref(), Some("one"));
            b.remove_schema(&m, Some(&r1)).unwrap();
            assert_eq!(b.find_newest_schema(&m).unwrap().as_deref(), Some("none"));
        }

        #[test]
        fn undated_lookup_ignores_dated_sources() {
            let (_temp, mut b) = backend();
            let m = name("m");
            b.store_schema(&m, Some(&Revision::new("2020-01-01").unwrap()), "dated")
                .unwrap();
            assert!(b.find_schema(&m, None).unwrap().is_none());

            b.store_schema(&m, None, "undated").unwrap();
            assert_eq!(b.find_schema(&m, None).unwrap().as_deref(), Some("undated"));
        }

        #[test]
        fn missing_schema() {
            let (_temp, b) = backend();
            assert!(b.find_schema(&name("m"), None).unwrap().is_none());
            assert!(b.find_newest_schema(&name("m")).unwrap().is_none());
        }
    }
}
