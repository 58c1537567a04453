use std::io::Write;

use secureorder_core::config::{AppConfig, CheckpointBackend};
use secureorder_core::error::SecureOrderError;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(content.as_bytes()).expect("write toml");
    tmp
}

#[test]
fn test_load_full_config_from_file() {
    let tmp = write_config(
        r#"
[engine]
suspend_before_tools = false
max_steps = 12
tool_fan_out = 8
step_timeout_secs = 45
researcher_prompt = "Gather facts."

[model]
provider = "openai"
model_id = "gpt-4o-mini"
api_key = "sk-test-key"
max_tokens = 2048
temperature = 0.3

[model.retry]
max_retries = 1
initial_backoff_ms = 200
max_backoff_ms = 800

[checkpoint]
backend = "memory"
path = "/tmp/secureorder-test.db"

[tools]
timeout_secs = 10
openweather_api_key = "ow-key"
exchange_rate_api_key = "fx-key"

[catalog]
path = "/srv/catalog.json"
"#,
    );

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert!(!config.engine.suspend_before_tools);
    assert_eq!(config.engine.max_steps, 12);
    assert_eq!(config.engine.tool_fan_out, 8);
    assert_eq!(config.engine.step_timeout_secs, 45);
    assert_eq!(config.engine.researcher_prompt.as_deref(), Some("Gather facts."));
    assert!(config.engine.analyzer_prompt.is_none());

    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.model.model_id, "gpt-4o-mini");
    assert_eq!(config.model.api_key, Some("sk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 2048);
    let retry = config.model.retry.as_ref().expect("retry present");
    assert_eq!(retry.max_retries, 1);
    assert_eq!(retry.max_backoff_ms, 800);

    assert_eq!(config.checkpoint.backend, CheckpointBackend::Memory);
    assert_eq!(config.tools.timeout_secs, 10);
    assert_eq!(config.tools.openweather_api_key.as_deref(), Some("ow-key"));
    assert_eq!(config.tools.exchange_rate_api_key.as_deref(), Some("fx-key"));
    assert_eq!(
        config.catalog_path(),
        Some(std::path::PathBuf::from("/srv/catalog.json"))
    );
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("SECUREORDER_TEST_FX_KEY", "expanded-key-value");

    let tmp = write_config(
        r#"
[tools]
exchange_rate_api_key = "${SECUREORDER_TEST_FX_KEY}"
"#,
    );

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(
        config.tools.exchange_rate_api_key,
        Some("expanded-key-value".to_string())
    );

    std::env::remove_var("SECUREORDER_TEST_FX_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let tmp = write_config(
        r#"
[model]
model_id = "llama-3.1-8b-instant"
"#,
    );

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "groq");
    assert_eq!(config.model.model_id, "llama-3.1-8b-instant");
    assert_eq!(config.model.max_tokens, 1024);
    assert!(config.model.retry.is_none());
    assert!(config.engine.suspend_before_tools);
    assert_eq!(config.engine.max_steps, 25);
    assert_eq!(config.engine.tool_fan_out, 4);
    assert_eq!(config.engine.step_timeout_secs, 120);
    assert_eq!(config.checkpoint.backend, CheckpointBackend::Sqlite);
    assert_eq!(config.checkpoint_path(), std::path::PathBuf::from("checkpoints.db"));
    assert_eq!(config.tools.timeout_secs, 30);
    assert!(config.catalog_path().is_none());
}

#[test]
fn test_missing_file_is_config_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, SecureOrderError::ConfigNotFound(_)));
}

#[test]
fn test_invalid_toml_is_config_error() {
    let tmp = write_config("[engine]\nmax_steps = \"many\"\n");
    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, SecureOrderError::Config(_)));
    assert_eq!(err.kind(), "Config");
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = AppConfig::default();
    let rendered = toml::to_string_pretty(&config).expect("serialize");
    let parsed: AppConfig = toml::from_str(&rendered).expect("parse");
    assert_eq!(parsed.engine.max_steps, config.engine.max_steps);
    assert_eq!(parsed.model.model_id, config.model.model_id);
    assert_eq!(parsed.checkpoint.backend, config.checkpoint.backend);
}
