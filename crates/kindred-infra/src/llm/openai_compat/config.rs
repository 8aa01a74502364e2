//! Configuration types and per-provider defaults for OpenAI-compatible providers.
//!
//! Each provider that speaks the OpenAI chat completions protocol gets a factory
//! function returning an [`OpenAiCompatConfig`] with the correct base URL.

use secrecy::SecretString;

/// Configuration for an OpenAI-compatible LLM provider.
///
/// Used to construct an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Human-readable provider name (e.g., "perplexity", "openai").
    pub provider_name: String,
    /// Base URL for the API (e.g., "https://api.perplexity.ai").
    pub base_url: String,
    /// API key for authentication.
    pub api_key: SecretString,
    /// Default model identifier (e.g., "sonar", "gpt-4o").
    pub model: String,
}

/// Perplexity default configuration.
///
/// Base URL: `https://api.perplexity.ai`
pub fn perplexity_defaults(api_key: &str, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "perplexity".into(),
        base_url: "https://api.perplexity.ai".into(),
        api_key: SecretString::from(api_key),
        model: model.into(),
    }
}

/// OpenAI default configuration.
///
/// Base URL: `https://api.openai.com/v1`
pub fn openai_defaults(api_key: &str, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openai".into(),
        base_url: "https://api.openai.com/v1".into(),
        api_key: SecretString::from(api_key),
        model: model.into(),
    }
}
