use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SecureOrderError};

/// Top-level SecureOrder configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Halt before Tool-Execution and wait for an explicit resume.
    #[serde(default = "default_suspend_before_tools")]
    pub suspend_before_tools: bool,
    /// Step budget for a single run/resume invocation.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Maximum tool calls of one batch dispatched at the same time.
    #[serde(default = "default_tool_fan_out")]
    pub tool_fan_out: usize,
    /// Timeout for one decision-generator call.
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,
    #[serde(default)]
    pub researcher_prompt: Option<String>,
    #[serde(default)]
    pub analyzer_prompt: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            suspend_before_tools: default_suspend_before_tools(),
            max_steps: default_max_steps(),
            tool_fan_out: default_tool_fan_out(),
            step_timeout_secs: default_step_timeout(),
            researcher_prompt: None,
            analyzer_prompt: None,
        }
    }
}

fn default_suspend_before_tools() -> bool { true }
fn default_max_steps() -> usize { 25 }
fn default_tool_fan_out() -> usize { 4 }
fn default_step_timeout() -> u64 { 120 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
        }
    }
}

fn default_provider() -> String { "groq".to_string() }
fn default_model_id() -> String { "llama-3.3-70b-versatile".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for generator requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Checkpoint store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub backend: CheckpointBackend,
    #[serde(default = "default_checkpoint_path")]
    pub path: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::default(),
            path: default_checkpoint_path(),
        }
    }
}

fn default_checkpoint_path() -> String { "checkpoints.db".to_string() }

/// Tool runtime configuration and service credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub openweather_api_key: Option<String>,
    #[serde(default)]
    pub exchange_rate_api_key: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            openweather_api_key: None,
            exchange_rate_api_key: None,
        }
    }
}

fn default_tool_timeout() -> u64 { 30 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON file with `orders` and `inventory`; the demo catalog is used when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SecureOrderError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let mut config: AppConfig =
            toml::from_str(&expanded).map_err(|e| SecureOrderError::Config(e.to_string()))?;
        config.fill_from_env();
        Ok(config)
    }

    /// Defaults plus credentials taken from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.fill_from_env();
        config
    }

    /// Fill unset credentials from the conventional environment variables.
    fn fill_from_env(&mut self) {
        fill_unset(&mut self.model.api_key, "GROQ_API_KEY");
        fill_unset(&mut self.tools.openweather_api_key, "OPENWEATHER_API_KEY");
        fill_unset(&mut self.tools.exchange_rate_api_key, "EXCHANGE_RATE_API_KEY");
    }

    /// Resolve the checkpoint database path (expand ~).
    pub fn checkpoint_path(&self) -> PathBuf {
        expand_home(&self.checkpoint.path)
    }

    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog.path.as_deref().map(expand_home)
    }
}

fn fill_unset(slot: &mut Option<String>, var: &str) {
    let unset = slot.as_deref().map_or(true, |s| s.is_empty() || s.starts_with("${"));
    if unset {
        *slot = std::env::var(var).ok().filter(|v| !v.is_empty());
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
