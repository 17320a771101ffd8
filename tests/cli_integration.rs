//! Integration tests for the `ymod` binary.
//!
//! These tests run the real binary against repositories in temporary
//! directories, with the user's configuration locations redirected.

mod support;

use assert_cmd::Command;
use predicates::prelude::*;

use support::{TestRepo, BASE, BASE_V2, USER};

/// `ymod --repo <repo>` isolated from the invoking user's configuration.
fn ymod(repo: &TestRepo) -> Command {
    let mut cmd = Command::cargo_bin("ymod").unwrap();
    cmd.env("HOME", repo.tmp())
        .env("XDG_CONFIG_HOME", repo.tmp().join("xdg"))
        .env("YANGMODS_CONFIG", repo.tmp().join("no-config.toml"))
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .arg("--repo")
        .arg(repo.root());
    cmd
}

// =============================================================================
// Basics
// =============================================================================

#[test]
fn help_lists_commands() {
    Command::cargo_bin("ymod")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install").and(predicate::str::contains("apply")));
}

#[test]
fn version_flag_works() {
    Command::cargo_bin("ymod")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ymod"));
}

#[test]
fn init_then_list_empty() {
    let repo = TestRepo::uninitialized();
    ymod(&repo)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized module repository"));
    assert!(repo.paths().catalog_path().exists());
    assert!(repo.paths().repo_config_path().exists());

    ymod(&repo)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already initialized"));

    ymod(&repo)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No modules installed."));
}

#[test]
fn uninitialized_repository_is_an_error() {
    let repo = TestRepo::uninitialized();
    ymod(&repo)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ymod init"));
}

// =============================================================================
// Scheduling and apply
// =============================================================================

#[test]
fn install_apply_show() {
    let repo = TestRepo::new();
    let base = repo.source("base.json", BASE);
    let user = repo.source("user.json", USER);

    ymod(&repo)
        .args(["install", "--feature", "extra"])
        .arg(&base)
        .assert()
        .success()
        .stdout(predicate::str::contains("Scheduled installation of base"));
    ymod(&repo).arg("install").arg(&user).assert().success();

    ymod(&repo)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("scheduled:").and(predicate::str::contains("base: install @2024-01-01")));

    ymod(&repo)
        .arg("apply")
        .assert()
        .success()
        .stdout(predicate::str::contains("installed base").and(predicate::str::contains("installed user")));

    ymod(&repo)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("base@2024-01-01 [extra]"));

    ymod(&repo)
        .args(["show", "base"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Required by:").and(predicate::str::contains("user")));
}

#[test]
fn rejected_apply_exits_non_zero() {
    let repo = TestRepo::new();
    let base = repo.source("base.json", BASE);
    let user = repo.source("user.json", USER);
    ymod(&repo).arg("install").arg(&base).assert().success();
    ymod(&repo).arg("install").arg(&user).assert().success();
    ymod(&repo).arg("apply").assert().success();

    ymod(&repo).args(["remove", "base"]).assert().success();
    ymod(&repo)
        .arg("apply")
        .assert()
        .failure()
        .stderr(predicate::str::contains("depends on it").and(predicate::str::contains("remain scheduled")));

    ymod(&repo)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("base: remove"));

    ymod(&repo).args(["cancel-remove", "base"]).assert().success();
    ymod(&repo)
        .arg("apply")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing scheduled."));
}

#[test]
fn conflicting_requests_fail() {
    let repo = TestRepo::new();
    let base = repo.source("base.json", BASE);
    ymod(&repo).arg("install").arg(&base).assert().success();
    ymod(&repo)
        .arg("install")
        .arg(&base)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already scheduled for installation"));

    ymod(&repo).args(["cancel-install", "base"]).assert().success();
    ymod(&repo)
        .args(["cancel-install", "base"])
        .assert()
        .failure();
}

#[test]
fn update_and_feature_commands() {
    let repo = TestRepo::new();
    let base = repo.source("base.json", BASE);
    let v2 = repo.source("base-v2.json", BASE_V2);
    ymod(&repo).arg("install").arg(&base).assert().success();
    ymod(&repo).arg("apply").assert().success();

    ymod(&repo).arg("update").arg(&v2).assert().success();
    ymod(&repo)
        .args(["feature", "base", "extra", "--enable"])
        .assert()
        .success();
    ymod(&repo)
        .args(["feature", "base", "extra", "--enable"])
        .assert()
        .failure();

    ymod(&repo)
        .arg("apply")
        .assert()
        .success()
        .stdout(predicate::str::contains("updated base"));
    ymod(&repo)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("base@2024-06-01"));
}

#[test]
fn replay_toggles_immediately() {
    let repo = TestRepo::new();
    let base = repo.source("base.json", BASE);
    ymod(&repo).arg("install").arg(&base).assert().success();
    ymod(&repo).arg("apply").assert().success();

    ymod(&repo).args(["replay", "--all", "--on"]).assert().success();
    ymod(&repo)
        .args(["show", "base"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Replay support: since"));

    ymod(&repo).args(["replay", "base", "--off"]).assert().success();
    ymod(&repo)
        .args(["show", "base"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Replay support").not());
    ymod(&repo)
        .args(["replay", "nope", "--on"])
        .assert()
        .failure();
}

#[test]
fn quiet_suppresses_output() {
    let repo = TestRepo::new();
    let base = repo.source("base.json", BASE);
    ymod(&repo)
        .arg("-q")
        .arg("install")
        .arg(&base)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn feature_direction_is_required() {
    let repo = TestRepo::new();
    ymod(&repo)
        .args(["feature", "base", "extra"])
        .assert()
        .failure()
        .code(2);
}
