mod support;

use std::fs::{self, OpenOptions};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use predicates::str::contains;
use serde_json::Value;

use support::TestBacklog;
use taskgraph::config::Config;
use taskgraph::fs::{RealFileSystem, SystemClock};
use taskgraph::loader::{LoadOptions, TaskLoader};
use taskgraph::lock::{lock_path_for, FileLock};

fn loader(backlog: &TestBacklog, config: Config) -> TaskLoader {
    TaskLoader::new(
        backlog.path(),
        Arc::new(RealFileSystem),
        Arc::new(SystemClock),
        config,
    )
}

fn seeded() -> TestBacklog {
    let backlog = TestBacklog::new();
    backlog.write_task("a", "id: A\npriority: P1\n").unwrap();
    backlog.write_task("b", "id: B\nblocked_by: [A]\n").unwrap();
    backlog
        .write_archived("old", "id: OLD\nstatus: completed\n")
        .unwrap();
    backlog
}

/// Rewrite a file and push its mtime forward so coarse clocks still notice.
fn rewrite(backlog: &TestBacklog, rel_path: &str, contents: &str) {
    let path = backlog.write_file(rel_path, contents).unwrap();
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();
}

#[test]
fn first_load_writes_index_and_second_load_hits() {
    let backlog = seeded();
    let loader = loader(&backlog, Config::default());

    let first = loader.load(LoadOptions::default()).unwrap();
    let stats = first.stats.unwrap();
    assert!(stats.rebuilt);
    assert_eq!(stats.misses, 3);
    assert!(backlog.index_path().exists());

    let second = loader.load(LoadOptions::default()).unwrap();
    let stats = second.stats.unwrap();
    assert!(!stats.rebuilt);
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 0);
    assert_eq!(second.archived_count, 1);
}

#[test]
fn modified_file_is_reparsed() {
    let backlog = seeded();
    let loader = loader(&backlog, Config::default());
    loader.load(LoadOptions::default()).unwrap();

    rewrite(&backlog, "tasks/a.yaml", "id: A\npriority: P0\nstatus: in_progress\n");

    let report = loader.load(LoadOptions::default()).unwrap();
    let stats = report.stats.unwrap();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    let a = report.tasks.iter().find(|task| task.id == "A").unwrap();
    assert_eq!(a.status.as_str(), "in_progress");
}

#[test]
fn touched_but_unchanged_file_is_a_hit() {
    let backlog = seeded();
    let loader = loader(&backlog, Config::default());
    loader.load(LoadOptions::default()).unwrap();

    rewrite(&backlog, "tasks/b.yaml", "id: B\nblocked_by: [A]\n");

    let stats = loader.load(LoadOptions::default()).unwrap().stats.unwrap();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 0);
}

#[test]
fn deleted_file_leaves_the_index() {
    let backlog = seeded();
    let loader = loader(&backlog, Config::default());
    loader.load(LoadOptions::default()).unwrap();

    fs::remove_file(backlog.path().join("tasks/b.yaml")).unwrap();

    let report = loader.load(LoadOptions::default()).unwrap();
    assert_eq!(report.tasks.len(), 2);
    assert_eq!(report.stats.unwrap().removed, 1);

    let index = loader.cache().load().unwrap().unwrap();
    assert!(!index.entries.contains_key("tasks/b.yaml"));
}

#[test]
fn malformed_index_is_rebuilt() {
    let backlog = seeded();
    backlog
        .write_file(".taskgraph/index.json", "{ not json")
        .unwrap();

    let report = loader(&backlog, Config::default())
        .load(LoadOptions::default())
        .unwrap();
    assert_eq!(report.tasks.len(), 3);
    assert!(report.stats.unwrap().rebuilt);

    let raw = backlog.read_file(".taskgraph/index.json").unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["version"], 2);
}

#[test]
fn held_lock_degrades_to_uncached_load() {
    let backlog = seeded();
    let mut config = Config::default();
    config.cache.lock_timeout_ms = 100;
    let loader = loader(&backlog, config);

    let _held = FileLock::acquire(lock_path_for(backlog.index_path()), 1_000).unwrap();

    let report = loader.load(LoadOptions::default()).unwrap();
    assert_eq!(report.tasks.len(), 3);
    assert!(report.stats.is_none());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("loaded without cache"));
    assert!(!backlog.index_path().exists());
}

#[test]
fn disabled_cache_never_touches_disk() {
    let backlog = seeded();
    let mut config = Config::default();
    config.cache.enabled = false;

    let report = loader(&backlog, config)
        .load(LoadOptions::default())
        .unwrap();
    assert_eq!(report.tasks.len(), 3);
    assert!(report.stats.is_none());
    assert!(!backlog.index_path().exists());
}

#[test]
fn cache_commands_report_and_clear() -> Result<(), Box<dyn std::error::Error>> {
    let backlog = seeded();

    let output = backlog
        .tg()
        .args(["cache", "status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output)?;
    assert_eq!(value["command"], "cache status");
    assert_eq!(value["data"]["present"], false);

    backlog.tg().arg("list").assert().success();
    assert!(backlog.index_path().exists());

    let output = backlog
        .tg()
        .args(["cache", "status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output)?;
    assert_eq!(value["data"]["present"], true);
    assert_eq!(value["data"]["version"], 2);
    assert_eq!(value["data"]["entries"], 3);
    assert_eq!(value["data"]["archived"], 1);

    backlog
        .tg()
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(contains("Removed"));
    assert!(!backlog.index_path().exists());

    backlog
        .tg()
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(contains("No index at"));
    Ok(())
}

#[test]
fn no_cache_flag_skips_the_index() {
    let backlog = seeded();

    backlog.tg().args(["list", "--no-cache"]).assert().success();
    assert!(!backlog.index_path().exists());

    backlog.tg().args(["list", "--refresh"]).assert().success();
    assert!(backlog.index_path().exists());
}

#[test]
fn index_survives_a_different_repo_spelling() {
    let backlog = seeded();

    support::tg_cmd()
        .arg("--repo")
        .arg(backlog.path())
        .arg("list")
        .assert()
        .success();
    let written = backlog.read_file(".taskgraph/index.json").unwrap();

    backlog.tg().args(["--repo", ".", "list"]).assert().success();
    backlog.tg().arg("list").assert().success();

    assert_eq!(backlog.read_file(".taskgraph/index.json").unwrap(), written);
}

#[test]
fn cli_reflects_edits_between_runs() -> Result<(), Box<dyn std::error::Error>> {
    let backlog = seeded();
    backlog.tg().arg("list").assert().success();

    rewrite(&backlog, "tasks/a.yaml", "id: A\nstatus: completed\n");

    let output = backlog
        .tg()
        .args(["next", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output)?;
    assert_eq!(value["data"]["task"]["id"], "B");
    Ok(())
}
