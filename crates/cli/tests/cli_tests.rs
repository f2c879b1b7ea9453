//! CLI integration tests

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn locsync(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_locsync"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("LOCSYNC_CREDENTIALS_PATH")
        .output()
        .expect("Failed to execute command")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("temp path is not UTF-8")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = locsync(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Location Sync"), "Should show app name");
    assert!(stdout.contains("pair"), "Should show pair command");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("locations"), "Should show locations command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = locsync(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("locsync"), "Should show binary name");
}

#[test]
fn test_pair_help() {
    let output = locsync(&["pair", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("<CODE>"), "Should show code argument");
    assert!(stdout.contains("--server"), "Should show server option");
}

#[test]
fn test_pair_requires_code() {
    let output = locsync(&["pair"]);
    assert!(!output.status.success());
}

#[test]
fn test_locations_json() {
    let temp_dir = TempDir::new().unwrap();
    let cache = temp_dir.path().join("Items.data");
    std::fs::write(
        &cache,
        r#"[
            {"id": "X", "location": {"timeStamp": 1000, "latitude": 1.0, "longitude": 2.0}},
            {"id": "Home", "location": {"timeStamp": 2000, "latitude": 3.0, "longitude": 4.0, "positionType": "safeLocation"}}
        ]"#,
    )
    .unwrap();

    let output = locsync(&["locations", "--db-path", path_arg(&cache), "--format", "json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let items = json.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["device_id"], "X");
    assert_eq!(items[0]["timestamp"], 1000);
    assert_eq!(items[0]["observed_at"], "1970-01-01T00:00:01.000Z");
}

#[test]
fn test_locations_table() {
    let temp_dir = TempDir::new().unwrap();
    let cache = temp_dir.path().join("Items.data");
    std::fs::write(
        &cache,
        r#"{"items": [{"identifier": "Keys", "location": {"timeStamp": 5000, "latitude": 51.5, "longitude": -0.12}}]}"#,
    )
    .unwrap();

    let output = locsync(&["locations", "--db-path", path_arg(&cache)]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Keys"));
    assert!(stdout.contains("51.500000"));
}

#[test]
fn test_locations_missing_cache_fails() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.data");

    let output = locsync(&["locations", "--db-path", path_arg(&missing)]);
    assert!(!output.status.success());
}

#[test]
fn test_pair_saves_token() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/pairing/claim")
        .match_body(mockito::Matcher::Json(serde_json::json!({"code": "ABC123"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token": "issued-token"}"#)
        .create();

    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("config.json");

    let output = locsync(&[
        "--config",
        path_arg(&config),
        "pair",
        "ABC123",
        "--server",
        &server.url(),
    ]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    mock.assert();

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config).unwrap()).unwrap();
    assert_eq!(saved["token"], "issued-token");
    assert_eq!(saved["server"], server.url());
}

#[test]
fn test_rejected_pair_writes_nothing() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/api/pairing/claim")
        .with_status(401)
        .with_body(r#"{"error": "invalid code"}"#)
        .create();

    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("config.json");

    let output = locsync(&[
        "--config",
        path_arg(&config),
        "pair",
        "WRONG",
        "--server",
        &server.url(),
    ]);

    assert!(!output.status.success());
    assert!(!config.exists());
}

#[test]
fn test_status_uses_stored_server() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/health")
        .with_status(200)
        .with_body(r#"{"status": "ok"}"#)
        .create();

    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("config.json");
    std::fs::write(
        &config,
        serde_json::json!({"token": "t", "server": server.url()}).to_string(),
    )
    .unwrap();

    let output = locsync(&["--config", path_arg(&config), "status", "--format", "json"]);
    assert!(output.status.success());
    mock.assert();

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["reachable"], true);
    assert_eq!(report["token_stored"], true);
    assert_eq!(report["health"]["status"], "ok");
}

#[test]
fn test_pair_replaces_corrupt_credential_file() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/pairing/claim")
        .with_status(200)
        .with_body(r#"{"token": "fresh-token"}"#)
        .create();

    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("config.json");
    std::fs::write(&config, "{not json").unwrap();

    let output = locsync(&[
        "--config",
        path_arg(&config),
        "pair",
        "CODE",
        "--server",
        &server.url(),
    ]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    mock.assert();

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config).unwrap()).unwrap();
    assert_eq!(saved["token"], "fresh-token");
}

#[test]
fn test_verbose_json_output_stays_parseable() {
    let temp_dir = TempDir::new().unwrap();
    let cache = temp_dir.path().join("Items.data");
    std::fs::write(
        &cache,
        r#"[{"id": "X", "location": {"timeStamp": 1000, "latitude": 1.0, "longitude": 2.0}}]"#,
    )
    .unwrap();

    let output = locsync(&[
        "locations",
        "--db-path",
        path_arg(&cache),
        "--format",
        "json",
        "--verbose",
    ]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert!(String::from_utf8_lossy(&output.stderr).contains("Items.data"));
}
