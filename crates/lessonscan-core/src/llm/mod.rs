//! Language-model providers for structured extraction
//!
//! This module provides a single-shot completion interface over:
//! - Google Gemini API
//! - Anthropic API
//! - An in-memory mock for tests

pub mod anthropic;
pub mod gemini;
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use mock::MockProvider;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";

/// A single prompt sent to a provider
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System instruction, if any
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 4096,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Unified completion interface
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send one prompt and return the model's text reply
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Get the provider name (e.g., "gemini", "anthropic")
    fn provider_name(&self) -> &'static str;

    /// Get the model identifier
    fn model_id(&self) -> &str;
}

/// Provider configuration stored in settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Google Gemini API
    Gemini {
        api_key: String,
        #[serde(default = "default_gemini_model")]
        model: String,
    },
    /// Anthropic API
    Anthropic {
        api_key: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
    },
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_anthropic_model() -> String {
    DEFAULT_ANTHROPIC_MODEL.to_string()
}

impl ProviderConfig {
    /// Gemini with the default model
    pub fn gemini(api_key: String) -> Self {
        ProviderConfig::Gemini {
            api_key,
            model: default_gemini_model(),
        }
    }

    /// Anthropic with the default model
    pub fn anthropic(api_key: String) -> Self {
        ProviderConfig::Anthropic {
            api_key,
            model: default_anthropic_model(),
        }
    }

    /// Get the provider type name
    pub fn provider_type(&self) -> &'static str {
        match self {
            ProviderConfig::Gemini { .. } => "gemini",
            ProviderConfig::Anthropic { .. } => "anthropic",
        }
    }

    /// Get the model ID
    pub fn model_id(&self) -> &str {
        match self {
            ProviderConfig::Gemini { model, .. } => model,
            ProviderConfig::Anthropic { model, .. } => model,
        }
    }

    pub fn set_model(&mut self, new_model: String) {
        match self {
            ProviderConfig::Gemini { model, .. } | ProviderConfig::Anthropic { model, .. } => {
                *model = new_model
            }
        }
    }
}

/// Build a provider from configuration. Requests time out after `timeout`.
pub fn build_provider(
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<Arc<dyn CompletionProvider>> {
    let provider: Arc<dyn CompletionProvider> = match config {
        ProviderConfig::Gemini { api_key, model } => {
            Arc::new(GeminiProvider::new(api_key, model, timeout)?)
        }
        ProviderConfig::Anthropic { api_key, model } => {
            Arc::new(AnthropicProvider::new(api_key, model, timeout)?)
        }
    };
    Ok(provider)
}

/// Turn a non-2xx response body into an error, preferring the API's own message.
pub(crate) fn api_error(provider: &str, status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => anyhow!("{} API error ({}): {}", provider, status, envelope.error.message),
        Err(_) if body.trim().is_empty() => anyhow!("{} API error ({})", provider, status),
        Err(_) => anyhow!("{} API error ({}): {}", provider, status, body.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_config_serialization() {
        let config = ProviderConfig::gemini("key".to_string());
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "gemini");
        assert_eq!(json["model"], DEFAULT_GEMINI_MODEL);

        let parsed: ProviderConfig =
            serde_json::from_str(r#"{"type": "anthropic", "api_key": "k"}"#).unwrap();
        assert_eq!(parsed.provider_type(), "anthropic");
        assert_eq!(parsed.model_id(), DEFAULT_ANTHROPIC_MODEL);
    }

    #[test]
    fn test_build_provider() {
        let mut config = ProviderConfig::anthropic("key".to_string());
        config.set_model("claude-sonnet-4-5".to_string());

        let provider = build_provider(&config, Duration::from_secs(30)).unwrap();
        assert_eq!(provider.provider_name(), "anthropic");
        assert_eq!(provider.model_id(), "claude-sonnet-4-5");
    }

    #[test]
    fn test_api_error_prefers_api_message() {
        let status = reqwest::StatusCode::BAD_REQUEST;
        let err = api_error(
            "Gemini",
            status,
            r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#,
        );
        assert_eq!(err.to_string(), "Gemini API error (400 Bad Request): API key not valid");

        let err = api_error("Anthropic", reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(err.to_string().ends_with("upstream down"));
    }
}
