use secureorder_core::config::ModelConfig;

/// A named provider preset for OpenAI-compatible APIs.
pub struct ProviderPreset {
    pub default_base_url: &'static str,
    pub needs_api_key: bool,
    pub api_key_env: &'static str,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "groq" => Some(ProviderPreset {
            default_base_url: "https://api.groq.com/openai/v1/chat/completions",
            needs_api_key: true,
            api_key_env: "GROQ_API_KEY",
            extra_headers: &[],
        }),
        "openai" => Some(ProviderPreset {
            default_base_url: "https://api.openai.com/v1/chat/completions",
            needs_api_key: true,
            api_key_env: "OPENAI_API_KEY",
            extra_headers: &[],
        }),
        "openrouter" => Some(ProviderPreset {
            default_base_url: "https://openrouter.ai/api/v1/chat/completions",
            needs_api_key: true,
            api_key_env: "OPENROUTER_API_KEY",
            extra_headers: &[("X-Title", "SecureOrder")],
        }),
        "together" => Some(ProviderPreset {
            default_base_url: "https://api.together.xyz/v1/chat/completions",
            needs_api_key: true,
            api_key_env: "TOGETHER_API_KEY",
            extra_headers: &[],
        }),
        "ollama" => Some(ProviderPreset {
            default_base_url: "http://localhost:11434/v1/chat/completions",
            needs_api_key: false,
            api_key_env: "",
            extra_headers: &[],
        }),
        _ => None,
    }
}

/// Endpoint for a config: explicit `base_url` wins, then the preset, then Groq.
pub fn resolve_url(config: &ModelConfig) -> String {
    if let Some(url) = config.base_url.as_deref().filter(|u| !u.is_empty()) {
        return url.to_string();
    }
    get_preset(&config.provider)
        .or_else(|| get_preset("groq"))
        .map(|p| p.default_base_url.to_string())
        .unwrap_or_default()
}

pub fn extra_headers(provider: &str) -> &'static [(&'static str, &'static str)] {
    get_preset(provider).map(|p| p.extra_headers).unwrap_or(&[])
}
