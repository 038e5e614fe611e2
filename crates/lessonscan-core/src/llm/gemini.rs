//! Google Gemini API provider
//!
//! Uses the non-streaming `generateContent` endpoint with JSON output mode.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{api_error, CompletionProvider, CompletionRequest};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Gemini API provider
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider with the given API key and model
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Point the provider at a different API host
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// The key travels in a header so it never appears in request URLs or their errors
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key).context("Invalid API key")?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = GenerateRequest::from_request(request);

        debug!(model = %self.model, prompt_chars = request.prompt.len(), "Calling Gemini");
        let response = self
            .client
            .post(self.endpoint())
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read Gemini response")?;
        if !status.is_success() {
            return Err(api_error("Gemini", status, &text));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text).context("Unexpected Gemini response format")?;
        parsed.into_text()
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

impl GenerateRequest {
    fn from_request(request: &CompletionRequest) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            system_instruction: request.system.as_ref().map(|system| Content {
                role: None,
                parts: vec![Part {
                    text: system.clone(),
                }],
            }),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                max_output_tokens: request.max_tokens,
                temperature: 0.1,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate
    fn into_text(self) -> Result<String> {
        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);
        let candidate = self.candidates.into_iter().next().ok_or_else(|| match block_reason {
            Some(reason) => anyhow!("Gemini blocked the prompt: {}", reason),
            None => anyhow!("Gemini returned no candidates"),
        })?;

        Ok(candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let request = CompletionRequest::new("Extract this")
            .with_system("You are precise")
            .with_max_tokens(512);
        let body = serde_json::to_value(GenerateRequest::from_request(&request)).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Extract this");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are precise");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "{\"title\":"}, {"text": " \"Quiz\"}"}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 10}
            }"#,
        )
        .unwrap();

        assert_eq!(response.into_text().unwrap(), r#"{"title": "Quiz"}"#);
    }

    #[test]
    fn test_blocked_prompt_is_error() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();

        let err = response.into_text().unwrap_err();
        assert_eq!(err.to_string(), "Gemini blocked the prompt: SAFETY");
    }

    #[test]
    fn test_endpoint_uses_model_and_base() {
        let provider = GeminiProvider::new("k", "gemini-1.5-pro", Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://localhost:8080/");
        assert_eq!(
            provider.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn test_api_key_sent_as_header() {
        let provider = GeminiProvider::new("k-123", "m", Duration::from_secs(5)).unwrap();
        let headers = provider.headers().unwrap();

        assert_eq!(headers["x-goog-api-key"], "k-123");
        assert!(!provider.endpoint().contains("k-123"));
    }

    #[tokio::test]
    async fn test_connection_error_does_not_expose_api_key() {
        let provider = GeminiProvider::new("SECRET-KEY-123", "m", Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");

        let err = provider
            .complete(&CompletionRequest::new("hello"))
            .await
            .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("Gemini request failed"));
        assert!(!message.contains("SECRET-KEY-123"));
    }
}
