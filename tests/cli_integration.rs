//! Binary-level tests for the chatrelay CLI

mod common;

use assert_cmd::Command;
use common::{temp_config_file, CHAT_COMPLETION_HI};
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Command with a private history database and no inherited overrides
fn chatrelay(config_path: &Path, db_path: &Path) -> Command {
    let mut cmd = Command::cargo_bin("chatrelay").unwrap();
    for var in [
        "CHATRELAY_PROVIDER",
        "CHATRELAY_MODEL",
        "CHATRELAY_API_ENDPOINT",
        "CHATRELAY_API_KEY",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("CHATRELAY_HISTORY_DB", db_path)
        .arg("--config")
        .arg(config_path);
    cmd
}

#[test]
fn test_version_flag() {
    let mut cmd = Command::cargo_bin("chatrelay").unwrap();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("chatrelay"));
}

#[test]
fn test_models_list_json_is_parseable() {
    let tmp = TempDir::new().unwrap();
    let output = chatrelay(&tmp.path().join("missing.yaml"), &tmp.path().join("h.db"))
        .args(["models", "list", "--provider", "groq", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let models: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let models = models.as_array().unwrap();
    assert!(!models.is_empty());
    assert!(models.iter().all(|m| m["provider"] == "groq"));
}

#[test]
fn test_history_list_on_empty_database() {
    let tmp = TempDir::new().unwrap();
    chatrelay(&tmp.path().join("missing.yaml"), &tmp.path().join("h.db"))
        .args(["history", "list"])
        .assert()
        .success();
}

#[test]
fn test_usage_for_unknown_user_is_zero() {
    let tmp = TempDir::new().unwrap();
    chatrelay(&tmp.path().join("missing.yaml"), &tmp.path().join("h.db"))
        .args(["usage", "nobody"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nobody"))
        .stdout(predicate::str::contains("0"));
}

#[test]
fn test_invalid_config_file_fails() {
    let (_dir, config_path) = temp_config_file("provider: [this is not a mapping");
    let tmp = TempDir::new().unwrap();
    chatrelay(&config_path, &tmp.path().join("h.db"))
        .args(["models", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

#[test]
fn test_unknown_provider_is_rejected_by_parser() {
    let tmp = TempDir::new().unwrap();
    chatrelay(&tmp.path().join("missing.yaml"), &tmp.path().join("h.db"))
        .args(["models", "list", "--provider", "cohere"])
        .assert()
        .failure();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_one_shot_chat_prints_answer_and_persists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHAT_COMPLETION_HI))
        .expect(1)
        .mount(&server)
        .await;

    let (dir, config_path) = temp_config_file(&format!(
        "provider:\n  api_provider: local\n  api_key: test-key\n  api_endpoint: {}/v1/chat/completions\n",
        server.uri()
    ));
    let db_path = dir.path().join("history.db");

    chatrelay(&config_path, &db_path)
        .args(["chat", "--user", "alice", "--message", "Hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hi!"));

    chatrelay(&config_path, &db_path)
        .args(["history", "list", "--user", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello"));
}
