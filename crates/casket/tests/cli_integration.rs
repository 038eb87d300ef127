//! CLI integration tests for the Casket command-line interface.
//!
//! Each test writes its own config file pointing at a SQLite database in a
//! temporary directory, so separate invocations share session state the way
//! separate web processes would.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the casket binary, isolated from the caller's env.
fn casket() -> Command {
    let mut cmd = Command::cargo_bin("casket").unwrap();
    cmd.env_remove("CASKET_CONFIG")
        .env_remove("CASKET_NAMESPACE")
        .env_remove("RUST_LOG");
    cmd
}

/// Write a SQLite-backed config into `dir` and return its path.
fn sqlite_config(dir: &Path) -> PathBuf {
    let db = dir.join("kv.sqlite3");
    let path = dir.join("casket.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[session]
namespace = "cli-test"
default_timeout_minutes = 20

[session.lock]
max_attempts = 20
initial_backoff_ms = 1
max_backoff_ms = 20

[client]
backend = "sqlite"
path = "{}"
"#,
            db.display().to_string().replace('\\', "\\\\")
        ),
    )
    .unwrap();
    path
}

/// Run a command with `--json` against `config` and parse its output.
fn json(config: &Path, args: &[&str]) -> serde_json::Value {
    let output = casket()
        .arg("--config")
        .arg(config)
        .arg("--json")
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    casket()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Casket"))
        .stdout(predicate::str::contains("hit"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("reset-timeout"))
        .stdout(predicate::str::contains("remove"))
        .stdout(predicate::str::contains("release"))
        .stdout(predicate::str::contains("contend"))
        .stdout(predicate::str::contains("cache"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    casket()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("casket"));
}

#[test]
fn test_release_rejects_zero_lock_id() {
    casket()
        .args(["release", "s1", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nonzero"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_hit_counts_across_invocations() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path());

    let first = json(&config, &["hit", "--session", "s1"]);
    assert_eq!(first["stored"], true);
    assert_eq!(first["value"], 1);
    assert_eq!(first["new_session"], true);

    let second = json(&config, &["hit", "--session", "s1"]);
    assert_eq!(second["value"], 2);
    assert_eq!(second["new_session"], false);

    let shown = json(&config, &["show", "s1"]);
    assert_eq!(shown["found"], true);
    assert_eq!(shown["session"]["locked"], false);
    assert_eq!(shown["session"]["timeout_minutes"], 20);
    assert_eq!(shown["session"]["items"][0]["name"], "A");
    assert_eq!(shown["session"]["items"][0]["value"], "2");
}

#[test]
fn test_hit_human_output() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path());

    casket()
        .arg("--config")
        .arg(&config)
        .args(["hit", "--session", "page"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[page]"))
        .stdout(predicate::str::contains("A = 1"));
}

#[test]
fn test_show_missing_session() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path());

    let shown = json(&config, &["show", "nope"]);
    assert_eq!(shown["found"], false);
    assert!(shown.get("session").is_none());
}

#[test]
fn test_remove_then_show() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path());

    json(&config, &["hit", "--session", "doomed"]);
    let removed = json(&config, &["remove", "doomed"]);
    assert_eq!(removed["removed"], true);

    let shown = json(&config, &["show", "doomed"]);
    assert_eq!(shown["found"], false);

    let again = json(&config, &["remove", "doomed"]);
    assert_eq!(again["removed"], false);
    assert_eq!(again["locked"], false);
}

#[test]
fn test_reset_timeout() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path());

    json(&config, &["hit", "--session", "s1"]);
    assert_eq!(json(&config, &["reset-timeout", "s1"])["refreshed"], true);
    assert_eq!(json(&config, &["reset-timeout", "missing"])["refreshed"], false);
}

#[test]
fn test_release_with_wrong_lock_is_noop() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path());

    json(&config, &["hit", "--session", "s1"]);
    let released = json(&config, &["release", "s1", "12345"]);
    assert_eq!(released["released"], false);
    assert_eq!(released["lock_id"], 12345);
}

#[test]
fn test_contend_keeps_counter_consistent() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path());

    let result = json(&config, &["contend", "--workers", "3", "--hits", "5"]);
    assert_eq!(result["expected"], 15);
    assert_eq!(result["counter"], 15);
}

#[test]
fn test_contend_on_memory_backend() {
    let dir = TempDir::new().unwrap();

    casket()
        .current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["--namespace", "mem", "--json", "contend", "--workers", "4", "--hits", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"counter\": 40"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Output Cache Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_cache_add_keeps_first_entry() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path());

    let first = json(&config, &["cache", "add", "/index", "<html>one</html>"]);
    assert_eq!(first["stored"], true);

    let second = json(&config, &["cache", "add", "/index", "<html>two</html>"]);
    assert_eq!(second["stored"], false);
    assert_eq!(second["value"], "<html>one</html>");

    json(&config, &["cache", "set", "/index", "<html>three</html>"]);
    assert_eq!(
        json(&config, &["cache", "get", "/index"])["value"],
        "<html>three</html>"
    );

    json(&config, &["cache", "remove", "/index"]);
    assert!(json(&config, &["cache", "get", "/index"]).get("value").is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_namespace_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("casket.toml");
    std::fs::write(&config, "[client]\nbackend = \"memory\"\n").unwrap();

    casket()
        .arg("--config")
        .arg(&config)
        .arg("hit")
        .assert()
        .failure()
        .stderr(predicate::str::contains("namespace"));
}

#[test]
fn test_unknown_config_field_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("casket.toml");
    std::fs::write(&config, "[session]\nnamespace = \"x\"\nbogus = 1\n").unwrap();

    casket()
        .arg("--config")
        .arg(&config)
        .args(["show", "s1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bogus"));
}

#[test]
fn test_config_init_then_validate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("casket.toml");
    let db = dir.path().join("kv.sqlite3");

    casket()
        .current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["--namespace", "shop", "config", "init", "--path"])
        .arg(&path)
        .arg("--sqlite")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config file"));

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("namespace = \"shop\""));
    assert!(written.contains("backend = \"sqlite\""));

    casket()
        .arg("--config")
        .arg(&path)
        .args(["config", "validate"])
        .assert()
        .success();

    // Refuses to clobber without --force.
    casket()
        .args(["config", "init", "--path"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}
