//! Configuration resolution for the pipeline and AI client
//!
//! Tests touching process environment variables run under `#[serial]`.

use catnorm::ai::AiClientConfig;
use catnorm::{BatchConfig, PipelineConfig, PipelineError};
use catnorm_common::TomlConfig;
use serial_test::serial;
use std::time::Duration;
use tempfile::TempDir;

const CONFIG: &str = r#"
database_path = "/tmp/catnorm-test.db"

[logging]
level = "debug"

[ai]
base_url = "http://localhost:8080/v1"
model = "test-model"
api_key_env = "CATNORM_TEST_API_KEY"
timeout_secs = 15
requests_per_second = 2
burst = 4

[pipeline]
default_strategy = "bottom_priority"
max_depth = 3
use_chat = true

[batch]
inter_call_delay_ms = 75
"#;

fn write_config(contents: &str) -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, contents).expect("Failed to write config");
    (temp_dir, path)
}

#[test]
#[serial]
fn test_typed_configs_from_toml() {
    std::env::remove_var("ARLIAI_BASE_URL");
    std::env::remove_var("ARLIAI_MODEL");
    let (_temp_dir, path) = write_config(CONFIG);
    let config = TomlConfig::resolve(Some(&path)).unwrap();

    let pipeline = PipelineConfig::from_toml(&config);
    assert_eq!(pipeline.default_strategy, "bottom_priority");
    assert_eq!(pipeline.max_depth, 3);
    assert!(pipeline.use_chat);
    assert!(pipeline.validate().is_ok());

    let batch = BatchConfig::from_toml(&config);
    assert_eq!(batch.inter_call_delay, Duration::from_millis(75));
    assert!(batch.validate().is_ok());
}

#[test]
#[serial]
fn test_ai_config_requires_key() {
    std::env::remove_var("CATNORM_TEST_API_KEY");
    let (_temp_dir, path) = write_config(CONFIG);
    let config = TomlConfig::resolve(Some(&path)).unwrap();

    let err = AiClientConfig::from_toml(&config).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
#[serial]
fn test_ai_config_from_env_and_toml() {
    std::env::set_var("CATNORM_TEST_API_KEY", "secret");
    std::env::set_var("ARLIAI_MODEL", "override-model");
    let (_temp_dir, path) = write_config(CONFIG);
    let config = TomlConfig::resolve(Some(&path)).unwrap();

    let ai = AiClientConfig::from_toml(&config).unwrap();
    assert_eq!(ai.api_key, "secret");
    assert_eq!(ai.model, "override-model");
    assert_eq!(ai.base_url, "http://localhost:8080/v1");
    assert_eq!(ai.timeout, Duration::from_secs(15));
    assert_eq!(ai.requests_per_second, 2);
    assert_eq!(ai.burst, 4);
    assert!(ai.validate().is_ok());

    std::env::remove_var("CATNORM_TEST_API_KEY");
    std::env::remove_var("ARLIAI_MODEL");
}

#[test]
#[serial]
fn test_invalid_toml_rejected() {
    let (_temp_dir, path) = write_config("[pipeline]\nmax_depth = 0\n");
    assert!(TomlConfig::resolve(Some(&path)).is_err());
}
