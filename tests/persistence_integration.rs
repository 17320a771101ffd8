//! Integration tests for the persistence layer.
//!
//! These tests exercise the FileBackend, RepoLock and configuration files
//! against repositories created with tempfile.

mod support;

use std::fs;

use serde_json::json;

use yangmods::catalog::{parse_catalog, Catalog};
use yangmods::core::config::{Config, RepoConfig};
use yangmods::core::lock::{LockError, RepoLock};
use yangmods::core::types::Datastore;
use yangmods::engine::Rejection;
use yangmods::store::{CatalogStore, FileBackend, ModuleDataStore, SchemaRepository, StoreError};

use support::{name, rev, TestRepo, BASE, USER};

// =============================================================================
// FileBackend
// =============================================================================

mod file_backend {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let repo = TestRepo::uninitialized();
        let mut backend = FileBackend::new(repo.paths().clone());
        assert!(!backend.is_initialized());
        assert!(backend.init().unwrap());
        assert!(backend.is_initialized());
        assert!(repo.paths().data_dir().is_dir());
        assert!(repo.paths().schemas_dir().is_dir());

        let before = repo.snapshot();
        assert!(!backend.init().unwrap());
        assert_eq!(repo.snapshot(), before);
    }

    #[test]
    fn fresh_catalog_is_empty() {
        let repo = TestRepo::new();
        let catalog = FileBackend::new(repo.paths().clone()).load_catalog().unwrap();
        assert_eq!(catalog, Some(Catalog::new()));
    }

    #[test]
    fn catalog_survives_reopen() {
        let repo = TestRepo::new();
        let mut catalog = Catalog::new();
        catalog.add_module(name("base"), Some(rev("2024-01-01")), vec![]).unwrap();
        FileBackend::new(repo.paths().clone()).store_catalog(&catalog).unwrap();

        let loaded = FileBackend::new(repo.paths().clone())
            .load_catalog()
            .unwrap()
            .unwrap();
        assert_eq!(loaded.fingerprint(), catalog.fingerprint());

        let text = fs::read_to_string(repo.paths().catalog_path()).unwrap();
        assert_eq!(parse_catalog(&text).unwrap(), catalog);
    }

    #[test]
    fn garbage_catalog_is_corrupted() {
        let repo = TestRepo::new();
        fs::write(repo.paths().catalog_path(), "{not json").unwrap();
        let err = FileBackend::new(repo.paths().clone()).load_catalog().unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { .. }));
    }

    #[test]
    fn module_data_per_datastore() {
        let repo = TestRepo::new();
        let mut backend = FileBackend::new(repo.paths().clone());
        let m = name("base");
        backend
            .write_module_data(&m, Datastore::Startup, &json!({"base:items": {"count": 1}}), true)
            .unwrap();
        assert!(backend.read_module_data(&m, Datastore::Running).unwrap().is_none());
        assert_eq!(
            backend.read_module_data(&m, Datastore::Startup).unwrap(),
            Some(json!({"base:items": {"count": 1}}))
        );

        backend.remove_module_data(&m).unwrap();
        assert!(backend.read_module_data(&m, Datastore::Startup).unwrap().is_none());
        backend.remove_module_data(&m).unwrap();
    }

    #[test]
    fn newest_schema_without_revision() {
        let repo = TestRepo::new();
        let mut backend = FileBackend::new(repo.paths().clone());
        let m = name("base");
        backend.store_schema(&m, Some(&rev("2020-01-01")), "old").unwrap();
        backend.store_schema(&m, Some(&rev("2023-01-01")), "new").unwrap();
        assert!(backend.find_schema(&m, None).unwrap().is_none());
        assert_eq!(backend.find_newest_schema(&m).unwrap().as_deref(), Some("new"));
        assert_eq!(
            backend.find_schema(&m, Some(&rev("2020-01-01"))).unwrap().as_deref(),
            Some("old")
        );

        backend.remove_schema(&m, Some(&rev("2023-01-01"))).unwrap();
        assert_eq!(backend.find_newest_schema(&m).unwrap().as_deref(), Some("old"));
    }
}

// =============================================================================
// Atomicity of apply
// =============================================================================

mod atomicity {
    use super::*;

    #[test]
    fn rejected_batch_leaves_every_file_alone() {
        let repo = TestRepo::new();
        let mut engine = repo.engine();
        engine.schedule_install(BASE, &[], None).unwrap();
        engine.apply_scheduled_changes().unwrap();

        engine
            .schedule_install(USER, &[], Some(&json!({"user:cfg": {"pick": "missing"}})))
            .unwrap();
        let before = repo.snapshot();
        let fingerprint = engine.catalog().unwrap().fingerprint();

        let outcome = repo.engine().apply_scheduled_changes().unwrap();
        assert!(matches!(outcome.rejection, Some(Rejection::IncompatibleData { .. })));
        assert_eq!(repo.snapshot(), before);
        assert_eq!(repo.engine().catalog().unwrap().fingerprint(), fingerprint);
    }
}

// =============================================================================
// RepoLock
// =============================================================================

mod lock {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let repo = TestRepo::new();
        let _lock = RepoLock::acquire(repo.paths()).unwrap();
        assert!(matches!(
            RepoLock::acquire(repo.paths()),
            Err(LockError::AlreadyLocked)
        ));
        assert!(RepoLock::try_acquire(repo.paths()).unwrap().is_none());
    }

    #[test]
    fn released_on_drop() {
        let repo = TestRepo::new();
        drop(RepoLock::acquire(repo.paths()).unwrap());
        assert!(RepoLock::try_acquire(repo.paths()).unwrap().is_some());
    }

    #[test]
    fn explicit_release() {
        let repo = TestRepo::new();
        let mut lock = RepoLock::acquire(repo.paths()).unwrap();
        lock.release().unwrap();
        assert!(RepoLock::try_acquire(repo.paths()).unwrap().is_some());
    }
}

// =============================================================================
// Repository configuration
// =============================================================================

mod config {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn repo_config_round_trip() {
        let repo = TestRepo::new();
        let written = RepoConfig {
            search_dirs: vec![PathBuf::from("/usr/share/yang")],
            log_filter: Some("yangmods=debug".into()),
        };
        Config::write_repo(repo.paths(), &written).unwrap();

        let loaded = Config::load_repo(repo.root()).unwrap();
        assert_eq!(loaded, Some(written));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let repo = TestRepo::new();
        fs::write(repo.paths().repo_config_path(), "colour = \"blue\"\n").unwrap();
        assert!(Config::load_repo(repo.root()).is_err());
    }
}
