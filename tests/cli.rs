//! End-to-end tests of the `tsl` binary against the mock server.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use common::{MockTypesense, API_KEY};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const KEY_VAR: &str = "TSL_TEST_API_KEY";

fn tsl_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tsl"))
}

fn setup_test_env(url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("tsl.toml");
    let config_content = format!(
        r#"[connections.mock]
url = "{}"
api_key_env = "{}"
connection_timeout_secs = 5

[settings]
default_page_size = 10
search_debounce_ms = 50
"#,
        url, KEY_VAR
    );
    fs::write(&config_path, config_content).unwrap();
    (tmp, config_path)
}

async fn run_tsl(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    run_tsl_with_input(config_path, args, None).await
}

async fn run_tsl_with_input(
    config_path: &Path,
    args: &[&str],
    input: Option<&str>,
) -> (String, String, bool) {
    let mut child = Command::new(tsl_binary())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env(KEY_VAR, API_KEY)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start tsl");

    let mut stdin = child.stdin.take().unwrap();
    if let Some(input) = input {
        stdin.write_all(input.as_bytes()).await.unwrap();
    }
    drop(stdin);

    let output = child.wait_with_output().await.unwrap();
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[tokio::test]
async fn test_health() {
    let server = MockTypesense::start().await;
    let (_tmp, config) = setup_test_env(&server.url);
    let (stdout, stderr, success) = run_tsl(&config, &["health"]).await;
    assert!(success, "health failed: {}", stderr);
    assert!(stdout.contains(": ok"));
}

#[tokio::test]
async fn test_indexes_and_aliases() {
    let server = MockTypesense::start().await;
    let (_tmp, config) = setup_test_env(&server.url);

    let (stdout, _, success) = run_tsl(&config, &["indexes"]).await;
    assert!(success);
    assert!(stdout.contains("books (books_v2)"));
    assert!(stdout.contains("2023-11-14T22:13:20Z"));

    let (stdout, _, success) = run_tsl(&config, &["aliases"]).await;
    assert!(success);
    let old = stdout.lines().find(|l| l.starts_with("old")).unwrap();
    assert!(old.ends_with("BROKEN"));

    let (stdout, _, success) = run_tsl(&config, &["resolve", "books"]).await;
    assert!(success);
    assert!(stdout.contains("books is an alias of books_v2"));
}

#[tokio::test]
async fn test_search_prints_highlights() {
    let server = MockTypesense::start().await;
    let (_tmp, config) = setup_test_env(&server.url);

    let (stdout, stderr, success) =
        run_tsl(&config, &["search", "books", "-q", "river", "--range", "year=1990.."]).await;
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("1. [100]"));
    assert!(stdout.contains("title: Slow **River**"));
    assert!(stdout.contains("Showing 1 to 1 of 1 (page 1 of 1)"));

    let sent = server.requests().pop().unwrap();
    assert_eq!(sent.query["filter_by"], "year:>=1990");
    assert_eq!(sent.query["query_by"], "title,author,tags");
    assert_eq!(sent.query["per_page"], "10");
}

#[tokio::test]
async fn test_search_json_and_errors() {
    let server = MockTypesense::start().await;
    let (_tmp, config) = setup_test_env(&server.url);

    let (stdout, _, success) = run_tsl(&config, &["search", "books_v2", "--json"]).await;
    assert!(success);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["found"], 2);

    let (_, stderr, success) =
        run_tsl(&config, &["search", "books", "--filter", "bad:"]).await;
    assert!(!success);
    assert!(stderr.contains("Could not parse the filter query."));

    let (_, stderr, success) = run_tsl(&config, &["search", "nothing"]).await;
    assert!(!success);
    assert!(stderr.contains("could not be found"));
}

#[tokio::test]
async fn test_browse_from_piped_input() {
    let server = MockTypesense::start().await;
    let (_tmp, config) = setup_test_env(&server.url);

    let (stdout, stderr, success) = run_tsl_with_input(
        &config,
        &["browse", "books"],
        Some("q fast\nbogus\n"),
    )
    .await;
    assert!(success, "browse failed: {}", stderr);
    assert!(stdout.contains("-- books --"));
    assert!(stdout.contains("title: **Fast** Car"));
    assert!(stderr.contains("unknown command 'bogus'"));
    assert_eq!(server.queries().last().map(String::as_str), Some("fast"));
}

#[tokio::test]
async fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_tsl(&tmp.path().join("nope.toml"), &["health"]).await;
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[tokio::test]
async fn test_completions_need_no_config() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, success) =
        run_tsl(&tmp.path().join("nope.toml"), &["completions", "bash"]).await;
    assert!(success);
    assert!(stdout.contains("tsl"));
}
