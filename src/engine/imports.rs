//! engine::imports
//!
//! Import resolution for candidate and scratch contexts.
//!
//! Lookup order for an import:
//!
//! 1. a pending install of that name
//! 2. an installed module: its pending update, else its catalog revision
//! 3. a stored schema in the repository, the newest one when no revision
//!    is requested
//! 4. the configured search directories (`<name>@<revision>.json` or
//!    `<name>.json`)
//!
//! Sources found in a search directory are remembered so that scheduling
//! can store them into the repository once the request is accepted.

use std::cell::RefCell;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::catalog::Catalog;
use crate::core::types::{ModuleName, Revision};
use crate::schema::{ImportResolver, SchemaError};
use crate::store::{SchemaRepository, StoreError};

/// A module source found outside the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FoundImport {
    pub name: ModuleName,
    pub revision: Option<Revision>,
    pub text: String,
}

pub(crate) struct ImportLookup<'a> {
    catalog: &'a Catalog,
    repository: &'a dyn SchemaRepository,
    search_dirs: &'a [PathBuf],
    found: RefCell<Vec<FoundImport>>,
}

impl<'a> ImportLookup<'a> {
    pub fn new(catalog: &'a Catalog, repository: &'a dyn SchemaRepository, search_dirs: &'a [PathBuf]) -> Self {
        Self {
            catalog,
            repository,
            search_dirs,
            found: RefCell::new(Vec::new()),
        }
    }

    /// Sources that came from a search directory, in lookup order.
    pub fn into_found(self) -> Vec<FoundImport> {
        self.found.into_inner()
    }

    fn lookup(&self, name: &ModuleName, revision: Option<&Revision>) -> Result<Option<String>, SchemaError> {
        let wanted = |r: Option<&Revision>| revision.is_none() || revision == r;

        if let Some(install) = self.catalog.find_install(name.as_str()) {
            if wanted(install.revision.as_ref()) {
                return Ok(Some(install.schema_text.clone()));
            }
        }

        if let Some(entry) = self.catalog.find_module(name.as_str()) {
            if let Some(update) = &entry.pending.update {
                if wanted(update.revision.as_ref()) {
                    return Ok(Some(update.schema_text.clone()));
                }
            }
            if revision.is_none() {
                return self.stored(name, entry.revision.as_ref());
            }
        }

        let stored = match revision {
            Some(_) => self.repository.find_schema(name, revision),
            None => self.repository.find_newest_schema(name),
        };
        if let Some(text) = stored.map_err(|e| resolver_error(name, e))? {
            return Ok(Some(text));
        }

        for dir in self.search_dirs {
            if let Some(text) = search_dir(dir, name, revision).map_err(|e| SchemaError::Resolver {
                module: name.clone(),
                message: format!("{}: {}", dir.display(), e),
            })? {
                self.found.borrow_mut().push(FoundImport {
                    name: name.clone(),
                    revision: revision.cloned(),
                    text: text.clone(),
                });
                return Ok(Some(text));
            }
        }
        Ok(None)
    }

    fn stored(&self, name: &ModuleName, revision: Option<&Revision>) -> Result<Option<String>, SchemaError> {
        self.repository
            .find_schema(name, revision)
            .map_err(|e| resolver_error(name, e))
    }
}

impl ImportResolver for ImportLookup<'_> {
    fn find_import(&self, name: &ModuleName, revision: Option<&Revision>) -> Result<Option<String>, SchemaError> {
        self.lookup(name, revision)
    }
}

fn resolver_error(name: &ModuleName, e: StoreError) -> SchemaError {
    SchemaError::Resolver {
        module: name.clone(),
        message: e.to_string(),
    }
}

/// Look for a module source in one directory. Without a revision, an
/// undated file wins over the newest dated one.
fn search_dir(dir: &Path, name: &ModuleName, revision: Option<&Revision>) -> std::io::Result<Option<String>> {
    if let Some(rev) = revision {
        return read_optional(&dir.join(format!("{}@{}.json", name, rev)));
    }
    if let Some(text) = read_optional(&dir.join(format!("{}.json", name)))? {
        return Ok(Some(text));
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let prefix = format!("{}@", name);
    let mut newest: Option<(Revision, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let file = entry.file_name();
        let rev = file
            .to_str()
            .and_then(|f| f.strip_prefix(&prefix))
            .and_then(|f| f.strip_suffix(".json"))
            .and_then(|r| Revision::new(r).ok());
        if let Some(rev) = rev {
            if newest.as_ref().map(|(n, _)| rev > *n).unwrap_or(true) {
                newest = Some((rev, entry.path()));
            }
        }
    }
    match newest {
        Some((_, path)) => read_optional(&path),
        None => Ok(None),
    }
}

fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PendingInstall, PendingUpdate};
    use crate::store::MemoryBackend;
    use tempfile::TempDir;

    fn name(s: &str) -> ModuleName {
        ModuleName::new(s).unwrap()
    }

    fn rev(s: &str) -> Revision {
        Revision::new(s).unwrap()
    }

    #[test]
    fn pending_install_wins() {
        let mut repo = MemoryBackend::new();
        repo.store_schema(&name("d"), None, "stored").unwrap();
        let mut catalog = Catalog::new();
        catalog
            .add_install(PendingInstall {
                name: name("d"),
                revision: None,
                schema_text: "pending".into(),
                features: vec![],
                data: None,
            })
            .unwrap();

        let lookup = ImportLookup::new(&catalog, &repo, &[]);
        assert_eq!(lookup.find_import(&name("d"), None).unwrap().as_deref(), Some("pending"));
    }

    #[test]
    fn installed_module_uses_catalog_revision() {
        let mut repo = MemoryBackend::new();
        repo.store_schema(&name("d"), Some(&rev("2020-01-01")), "old").unwrap();
        repo.store_schema(&name("d"), Some(&rev("2022-01-01")), "newer").unwrap();
        let mut catalog = Catalog::new();
        catalog
            .add_module(name("d"), Some(rev("2020-01-01")), vec![])
            .unwrap();

        let lookup = ImportLookup::new(&catalog, &repo, &[]);
        assert_eq!(lookup.find_import(&name("d"), None).unwrap().as_deref(), Some("old"));

        catalog.find_module_mut("d").unwrap().pending.update = Some(PendingUpdate {
            revision: Some(rev("2023-01-01")),
            schema_text: "update".into(),
        });
        let lookup = ImportLookup::new(&catalog, &repo, &[]);
        assert_eq!(lookup.find_import(&name("d"), None).unwrap().as_deref(), Some("update"));
    }

    #[test]
    fn undated_installed_module_ignores_dated_copies() {
        let mut repo = MemoryBackend::new();
        repo.store_schema(&name("d"), Some(&rev("2020-01-01")), "dated").unwrap();
        repo.store_schema(&name("d"), None, "undated").unwrap();
        let mut catalog = Catalog::new();
        catalog.add_module(name("d"), None, vec![]).unwrap();

        let lookup = ImportLookup::new(&catalog, &repo, &[]);
        assert_eq!(lookup.find_import(&name("d"), None).unwrap().as_deref(), Some("undated"));
    }

    #[test]
    fn uninstalled_module_uses_newest_stored() {
        let mut repo = MemoryBackend::new();
        repo.store_schema(&name("d"), None, "undated").unwrap();
        repo.store_schema(&name("d"), Some(&rev("2021-01-01")), "dated").unwrap();

        let catalog = Catalog::new();
        let lookup = ImportLookup::new(&catalog, &repo, &[]);
        assert_eq!(lookup.find_import(&name("d"), None).unwrap().as_deref(), Some("dated"));
    }

    #[test]
    fn search_dirs_are_recorded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("d@2020-01-01.json"), "old").unwrap();
        fs::write(dir.path().join("d@2021-06-01.json"), "new").unwrap();
        fs::write(dir.path().join("e.json"), "e").unwrap();

        let repo = MemoryBackend::new();
        let catalog = Catalog::new();
        let dirs = vec![dir.path().to_path_buf()];
        let lookup = ImportLookup::new(&catalog, &repo, &dirs);

        assert_eq!(lookup.find_import(&name("d"), None).unwrap().as_deref(), Some("new"));
        assert_eq!(
            lookup.find_import(&name("d"), Some(&rev("2020-01-01"))).unwrap().as_deref(),
            Some("old")
        );
        assert_eq!(lookup.find_import(&name("e"), None).unwrap().as_deref(), Some("e"));
        assert!(lookup.find_import(&name("f"), None).unwrap().is_none());

        let found = lookup.into_found();
        assert_eq!(found.len(), 3);
        assert_eq!(found[1].revision, Some(rev("2020-01-01")));
    }
}
