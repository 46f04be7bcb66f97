use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn synth_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_synth"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/synth.sqlite"

[server]
bind = "127.0.0.1:0"

[llm]
api_key_env = "THOUGHTSYNTH_TEST_UNSET_KEY"

[extract]
timeout_secs = 5
"#,
        root.display()
    );

    let config_path = config_dir.join("synth.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_synth(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = synth_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("THOUGHTSYNTH_TEST_UNSET_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run synth binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_synth(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/synth.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_synth(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_synth(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_classify_known_hosts() {
    let (_tmp, config_path) = setup_test_env();

    let cases = [
        ("https://youtu.be/dQw4w9WgXcQ", "video"),
        ("https://open.spotify.com/episode/1", "podcast"),
        ("https://mypodcast.fm/ep/3", "podcast"),
        ("https://example.com/article-x", "article"),
    ];
    for (url, expected) in cases {
        let (stdout, stderr, success) = run_synth(&config_path, &["classify", url]);
        assert!(success, "classify {} failed: {}", url, stderr);
        assert_eq!(stdout.trim(), expected, "classify {}", url);
    }
}

#[test]
fn test_classify_needs_no_config() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (stdout, _, success) = run_synth(&missing, &["classify", "https://vimeo.com/1"]);
    assert!(success);
    assert_eq!(stdout.trim(), "video");
}

#[test]
fn test_classify_rejects_invalid_url() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_synth(&config_path, &["classify", "not a url"]);
    assert!(!success);
    assert!(stderr.contains("invalid URL"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (_, stderr, success) = run_synth(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_process_unreachable_url_reports_failure() {
    let (_tmp, config_path) = setup_test_env();
    run_synth(&config_path, &["init"]);

    // Reserve a port and release it so the fetch is refused
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/post", listener.local_addr().unwrap());
    drop(listener);

    let (stdout, _, success) = run_synth(&config_path, &["process", &url, "--user", "u1"]);
    assert!(!success);
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["success"], false);
    assert!(outcome["contentItem"].is_null());
}

#[tokio::test]
async fn test_process_in_degraded_mode() {
    let (_tmp, config_path) = setup_test_env();

    let site = axum::Router::new().route(
        "/article-x",
        axum::routing::get(|| async {
            axum::response::Html(
                "<html><head><title>Article X</title></head><body><p>Text</p></body></html>",
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/article-x", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, site).await.unwrap();
    });

    let (stdout, stderr, success) = tokio::task::spawn_blocking(move || {
        run_synth(
            &config_path,
            &["process", &url, "--user", "u1", "--notes", "worth a reread"],
        )
    })
    .await
    .unwrap();
    assert!(success, "process failed: stdout={}, stderr={}", stdout, stderr);

    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["contentItem"]["contentType"], "article");
    assert_eq!(outcome["contentItem"]["title"], "Article X");
    let tags = outcome["contentItem"]["aiAnalysis"]["tags"].as_array().unwrap();
    assert!(tags.iter().any(|t| t == "unprocessed"));
}

#[test]
fn test_search_errors_when_disabled() {
    let (_tmp, config_path) = setup_test_env();
    run_synth(&config_path, &["init"]);

    let (_, stderr, success) = run_synth(&config_path, &["search", "rust", "--user", "u1"]);
    assert!(!success);
    assert!(stderr.contains("semantic search requires"));
}
