use chatrelay::config::Config;
use chatrelay::providers::Provider;
use chatrelay::storage::SqliteStorage;
use chatrelay::transport::HttpTransport;
use chatrelay::ChatClient;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// OpenAI-compatible reply whose content is "Hi!"
#[allow(dead_code)]
pub const CHAT_COMPLETION_HI: &str = r#"{
    "id": "chatcmpl-1",
    "model": "llama-3.1-8b-instant",
    "choices": [
        {"index": 0, "message": {"role": "assistant", "content": "Hi!"}, "finish_reason": "stop"}
    ],
    "usage": {"prompt_tokens": 20, "completion_tokens": 2, "total_tokens": 22}
}"#;

#[allow(dead_code)]
pub fn create_temp_storage() -> (SqliteStorage, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("history.db");
    let storage =
        SqliteStorage::new_with_path(db_path).expect("failed to create sqlite storage with path");
    (storage, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Config that sends `provider` traffic to `endpoint` with a fixed key
#[allow(dead_code)]
pub fn config_for(provider: Provider, endpoint: String) -> Config {
    let mut config = Config::default();
    config.provider.api_provider = provider;
    config.provider.api_key = Some("test-key".to_string());
    config.provider.api_endpoint = Some(endpoint);
    config
}

/// Client over the real HTTP transport
#[allow(dead_code)]
pub fn http_client(config: Config) -> ChatClient {
    let transport = HttpTransport::new().expect("failed to build http transport");
    ChatClient::with_transport(config, Arc::new(transport))
}
