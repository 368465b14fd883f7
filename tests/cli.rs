//! CLI integration tests: drive the `bsx` binary against a disposable
//! in-process engine, the way an operator would.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use build_search::models::{BuildRecord, BuildStatus};

fn bsx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("bsx");
    path
}

fn write_record(dir: &Path, name: &str, job: &str, number: u32, status: BuildStatus) {
    let record = BuildRecord {
        job: job.to_string(),
        number,
        status,
        timestamp: Utc.timestamp_opt(1_700_000_000 + number as i64, 0).unwrap(),
        log_text: format!("Building {} #{}", job, number),
        metadata: serde_json::Value::Null,
    };
    fs::write(dir.join(name), serde_json::to_string(&record).unwrap()).unwrap();
}

fn setup_test_env(port: u16) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let history_dir = root.join("builds");
    fs::create_dir_all(&history_dir).unwrap();
    write_record(&history_dir, "demo-1.json", "demo", 1, BuildStatus::Success);
    write_record(&history_dir, "demo-2.json", "demo", 2, BuildStatus::Failure);

    let config_content = format!(
        r#"[backend]
kind = "solr"
host = "127.0.0.1"
port = {}
core = "builds"

[retry]
max_retries = 2
base_backoff_ms = 10
timeout_secs = 5

[history]
dir = "{}/builds"
"#,
        port,
        root.display()
    );

    let config_path = root.join("bsx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_bsx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = bsx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run bsx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_rebuild_search_remove_flow() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let solr = runtime.block_on(common::spawn_fake_solr("builds"));
    let (_tmp, config_path) = setup_test_env(solr.port());

    let (stdout, stderr, success) = run_bsx(&config_path, &["status"]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("state: ready"));

    let (stdout, stderr, success) = run_bsx(&config_path, &["rebuild"]);
    assert!(success, "rebuild failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("rebuild complete: 2 documents"));

    let (stdout, _, success) = run_bsx(&config_path, &["search", "demo"]);
    assert!(success);
    assert!(stdout.contains("demo / build 1"));
    assert!(stdout.contains("demo / build 2"));

    let (stdout, _, success) = run_bsx(&config_path, &["remove", "demo"]);
    assert!(success);
    assert!(stdout.contains("removed job demo"));

    let (stdout, _, success) = run_bsx(&config_path, &["search", "demo"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_index_command_and_id_search() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let solr = runtime.block_on(common::spawn_fake_solr("builds"));
    let (tmp, config_path) = setup_test_env(solr.port());

    let record_path = tmp.path().join("one-off.json");
    write_record(
        tmp.path(),
        "one-off.json",
        "adhoc",
        7,
        BuildStatus::Success,
    );

    let (stdout, stderr, success) =
        run_bsx(&config_path, &["index", record_path.to_str().unwrap()]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("indexed adhoc#7"));

    let (stdout, _, success) = run_bsx(&config_path, &["search", "id:adhoc#7"]);
    assert!(success);
    assert!(stdout.contains("adhoc / build 7"));
}

#[test]
fn test_malformed_query_fails_cleanly() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let solr = runtime.block_on(common::spawn_fake_solr("builds"));
    let (_tmp, config_path) = setup_test_env(solr.port());

    let (_, stderr, success) = run_bsx(&config_path, &["search", "(demo"]);
    assert!(!success);
    assert!(stderr.contains("malformed query"));
}

#[test]
fn test_unreachable_backend_fails_configure() {
    // Allocate a port with nothing behind it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (_tmp, config_path) = setup_test_env(port);
    let (_, stderr, success) = run_bsx(&config_path, &["status"]);
    assert!(!success);
    assert!(stderr.contains("Failed to configure search backend"));
}
