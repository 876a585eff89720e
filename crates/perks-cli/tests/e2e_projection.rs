//! E2E CLI tests for projected reads, resolve, search, and reward deletion.

use assert_cmd::Command;
use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;

fn perks_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("perks"));
    cmd.current_dir(dir);
    cmd.env("PERKS_LOG", "error");
    cmd.env_remove("PERKS_DB");
    cmd.env_remove("FORMAT");
    cmd
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let output = perks_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("perks should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
}

/// Project with two users and two rewards; Ada holds both, Grace holds one.
struct Fixture {
    dir: TempDir,
    welcome: String,
    summer: String,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    perks_cmd(dir.path()).args(["init"]).assert().success();

    for (name, email) in [("Ada", "ada@example.com"), ("Grace", "grace@navy.mil")] {
        run_json(dir.path(), &["user", "create", "--name", name, "--email", email]);
    }
    let welcome = run_json(
        dir.path(),
        &[
            "reward",
            "create",
            "--name",
            "Welcome",
            "--description",
            "Sign-up bonus",
            "--expires",
            "2100-01-01T00:00:00Z",
        ],
    )["id"]
        .to_string();
    let summer = run_json(
        dir.path(),
        &[
            "reward",
            "create",
            "--name",
            "SUMMER_SALE",
            "--description",
            "20% off",
            "--expires",
            "2100-06-01T00:00:00Z",
        ],
    )["id"]
        .to_string();

    for (reward, user) in [
        (&welcome, "ada@example.com"),
        (&summer, "ada@example.com"),
        (&welcome, "grace@navy.mil"),
    ] {
        run_json(dir.path(), &["apply", reward, user]);
    }
    run_json(dir.path(), &["claim", &welcome, "ada@example.com"]);

    Fixture {
        dir,
        welcome,
        summer,
    }
}

#[test]
fn find_returns_only_requested_fields() {
    let fx = fixture();
    let row = run_json(
        fx.dir.path(),
        &["user", "find", "ada@example.com", "--fields", "email,name"],
    );
    assert_eq!(
        row,
        json!({"email": "ada@example.com", "name": "Ada"})
    );
}

#[test]
fn resolve_inlines_reward_details() {
    let fx = fixture();
    let row = run_json(
        fx.dir.path(),
        &["user", "find", "ada@example.com", "--fields", "id", "--resolve"],
    );
    let resolved = &row["rewards_resolved"];
    assert_eq!(
        resolved[fx.welcome.as_str()],
        json!({"name": "Welcome", "description": "Sign-up bonus", "claimed": true})
    );
    assert_eq!(resolved[fx.summer.as_str()]["claimed"], false);
}

#[test]
fn invalid_field_is_rejected_with_code() {
    let fx = fixture();
    let output = perks_cmd(fx.dir.path())
        .args(["user", "find", "1", "--fields", "id,password", "--json"])
        .output()
        .expect("perks should not crash");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("\"error_code\": \"E2101\""), "{stderr}");
    assert!(stderr.contains("password"), "{stderr}");
}

#[test]
fn invalid_search_column_is_rejected_with_code() {
    let fx = fixture();
    let output = perks_cmd(fx.dir.path())
        .args(["user", "search", "dob", "19", "--json"])
        .output()
        .expect("perks should not crash");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("\"error_code\": \"E2102\""), "{stderr}");
}

#[test]
fn search_is_literal_and_case_insensitive() {
    let fx = fixture();

    let rows = run_json(
        fx.dir.path(),
        &["reward", "search", "description", "20%", "--fields", "name"],
    );
    assert_eq!(rows, json!([{"name": "SUMMER_SALE"}]));

    let rows = run_json(
        fx.dir.path(),
        &["reward", "search", "name", "_", "--fields", "name"],
    );
    assert_eq!(rows, json!([{"name": "SUMMER_SALE"}]));

    let rows = run_json(
        fx.dir.path(),
        &["user", "search", "email", "EXAMPLE", "--fields", "name"],
    );
    assert_eq!(rows, json!([{"name": "Ada"}]));

    let rows = run_json(fx.dir.path(), &["user", "search", "name", "zzz"]);
    assert_eq!(rows, json!([]));
}

#[test]
fn reward_find_by_name_projects_expiry() {
    let fx = fixture();
    let row = run_json(
        fx.dir.path(),
        &["reward", "find", "Welcome", "--fields", "expires"],
    );
    assert_eq!(row, json!({"expires": "2100-01-01T00:00:00Z"}));
}

#[test]
fn deleting_a_reward_removes_it_from_every_user() {
    let fx = fixture();

    let report = run_json(fx.dir.path(), &["reward", "delete", &fx.welcome]);
    assert_eq!(report["users_updated"], 2);

    let ada = run_json(
        fx.dir.path(),
        &["user", "find", "ada@example.com", "--fields", "rewards"],
    );
    let mut expected = serde_json::Map::new();
    expected.insert(fx.summer.clone(), json!(false));
    assert_eq!(ada["rewards"], Value::Object(expected));

    let grace = run_json(
        fx.dir.path(),
        &["user", "find", "grace@navy.mil", "--fields", "rewards"],
    );
    assert_eq!(grace["rewards"], json!({}));
}
