//! store::memory
//!
//! In-process backend. The catalog is kept in its serialized form so a
//! load always returns an independent, freshly parsed copy.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{CatalogStore, ModuleDataStore, SchemaRepository, StoreError};
use crate::catalog::{parse_catalog, Catalog};
use crate::core::types::{Datastore, ModuleName, Revision};

/// Maps standing in for the repository directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryBackend {
    catalog: Option<String>,
    data: BTreeMap<(ModuleName, &'static str), Value>,
    schemas: BTreeMap<(ModuleName, Option<Revision>), String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend holding an empty catalog.
    pub fn initialized() -> Self {
        Self {
            catalog: Catalog::new().to_json().ok(),
            ..Self::default()
        }
    }

    /// Raw catalog text, for byte-level comparisons.
    pub fn catalog_text(&self) -> Option<&str> {
        self.catalog.as_deref()
    }
}

impl CatalogStore for MemoryBackend {
    fn load_catalog(&self) -> Result<Option<Catalog>, StoreError> {
        match &self.catalog {
            Some(text) => parse_catalog(text)
                .map(Some)
                .map_err(|e| StoreError::Corrupted {
                    path: "<memory>".into(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn store_catalog(&mut self, catalog: &Catalog) -> Result<(), StoreError> {
        catalog.validate()?;
        self.catalog = Some(catalog.to_json()?);
        Ok(())
    }
}

impl ModuleDataStore for MemoryBackend {
    fn read_module_data(&self, module: &ModuleName, datastore: Datastore) -> Result<Option<Value>, StoreError> {
        Ok(self.data.get(&(module.clone(), datastore.as_str())).cloned())
    }

    fn write_module_data(
        &mut self,
        module: &ModuleName,
        datastore: Datastore,
        data: &Value,
        create_if_missing: bool,
    ) -> Result<(), StoreError> {
        let key = (module.clone(), datastore.as_str());
        if !create_if_missing && !self.data.contains_key(&key) {
            return Err(StoreError::MissingData {
                module: module.clone(),
                datastore,
            });
        }
        self.data.insert(key, data.clone());
        Ok(())
    }

    fn remove_module_data(&mut self, module: &ModuleName) -> Result<(), StoreError> {
        for ds in Datastore::ALL {
            self.data.remove(&(module.clone(), ds.as_str()));
        }
        Ok(())
    }
}

impl SchemaRepository for MemoryBackend {
    fn store_schema(&mut self, module: &ModuleName, revision: Option<&Revision>, text: &str) -> Result<(), StoreError> {
        self.schemas
            .insert((module.clone(), revision.cloned()), text.to_string());
        Ok(())
    }

    fn find_schema(&self, module: &ModuleName, revision: Option<&Revision>) -> Result<Option<String>, StoreError> {
        Ok(self
            .schemas
            .get(&(module.clone(), revision.cloned()))
            .cloned())
    }

    fn find_newest_schema(&self, module: &ModuleName) -> Result<Option<String>, StoreError> {
        Ok(self
            .schemas
            .range((module.clone(), None)..)
            .take_while(|((name, _), _)| name == module)
            .last()
            .map(|(_, text)| text.clone()))
    }

    fn remove_schema(&mut self, module: &ModuleName, revision: Option<&Revision>) -> Result<(), StoreError> {
        self.schemas.remove(&(module.clone(), revision.cloned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn name(s: &str) -> ModuleName {
        ModuleName::new(s).unwrap()
    }

    #[test]
    fn empty_until_initialized() {
        assert!(MemoryBackend::new().load_catalog().unwrap().is_none());
        assert_eq!(
            MemoryBackend::initialized().load_catalog().unwrap(),
            Some(Catalog::new())
        );
    }

    #[test]
    fn schema_lookup_by_revision() {
        let mut b = MemoryBackend::new();
        let m = name("m");
        let r1 = Revision::new("2020-01-01").unwrap();
        let r2 = Revision::new("2021-01-01").unwrap();
        b.store_schema(&m, Some(&r2), "two").unwrap();
        b.store_schema(&m, Some(&r1), "one").unwrap();
        b.store_schema(&name("n"), None, "n").unwrap();
        assert!(b.find_schema(&m, None).unwrap().is_none());
        assert_eq!(b.find_newest_schema(&m).unwrap().as_deref(), Some("two"));
        assert_eq!(b.find_schema(&m, Some(&r1)).unwrap().as_deref(), Some("one"));
        assert_eq!(b.find_schema(&name("n"), None).unwrap().as_deref(), Some("n"));
        assert_eq!(b.find_newest_schema(&name("n")).unwrap().as_deref(), Some("n"));
        assert!(b.find_newest_schema(&name("l")).unwrap().is_none());
    }

    #[test]
    fn data_create_flag() {
        let mut b = MemoryBackend::new();
        let m = name("m");
        assert!(b
            .write_module_data(&m, Datastore::Running, &json!({}), false)
            .is_err());
        b.write_module_data(&m, Datastore::Running, &json!({"m:a": 1}), true)
            .unwrap();
        b.write_module_data(&m, Datastore::Running, &json!({"m:a": 2}), false)
            .unwrap();
        assert_eq!(
            b.read_module_data(&m, Datastore::Running).unwrap(),
            Some(json!({"m:a": 2}))
        );
    }
}
