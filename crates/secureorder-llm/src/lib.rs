pub mod providers;
pub mod retry;

use std::sync::Arc;

use tracing::warn;

use secureorder_core::config::ModelConfig;
use secureorder_core::error::{Result, SecureOrderError};
use secureorder_core::traits::DecisionGenerator;

pub use providers::openai::OpenAiGenerator;
pub use retry::RetryingGenerator;

/// Create the decision generator for a model config, wrapped in retry/backoff.
pub fn create_generator(config: &ModelConfig) -> Result<Arc<dyn DecisionGenerator>> {
    let preset = providers::presets::get_preset(&config.provider);
    if preset.is_none() && config.base_url.is_none() {
        return Err(SecureOrderError::Config(format!(
            "unknown provider '{}' and no base_url set",
            config.provider
        )));
    }

    if let Some(p) = &preset {
        if p.needs_api_key && config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(SecureOrderError::Config(format!(
                "provider '{}' needs an API key; set model.api_key or {}",
                config.provider, p.api_key_env
            )));
        }
    } else {
        warn!(provider = %config.provider, "Using custom OpenAI-compatible endpoint");
    }

    let inner = OpenAiGenerator::new(config.clone());
    let retry = config.retry.clone().unwrap_or_default();
    Ok(Arc::new(RetryingGenerator::new(Box::new(inner), retry)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_a_config_error() {
        let config = ModelConfig::default();
        let err = create_generator(&config).err().unwrap();
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn keyless_local_provider() {
        let config = ModelConfig {
            provider: "ollama".into(),
            ..ModelConfig::default()
        };
        assert!(create_generator(&config).is_ok());
    }

    #[test]
    fn unknown_provider_needs_base_url() {
        let mut config = ModelConfig {
            provider: "acme".into(),
            ..ModelConfig::default()
        };
        assert!(create_generator(&config).is_err());
        config.base_url = Some("http://localhost:9000/v1/chat/completions".into());
        assert!(create_generator(&config).is_ok());
    }
}
