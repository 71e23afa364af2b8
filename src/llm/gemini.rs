//! Google Gemini `generateContent` client.

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::provider::{LlmError, LlmProvider};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    api_key: String,
    pub model: String,
    pub base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn parse_response(&self, json: &Value) -> Result<String, LlmError> {
        json.pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                LlmError::Parse("Missing candidates[0].content.parts[0].text".to_string())
            })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}]
        });

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ProviderUnavailable(format!("gemini: {}", e)))?
            .error_for_status()?;

        let json: Value = resp.json().await?;
        self.parse_response(&json)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_provider_new() {
        let p = GeminiProvider::new("key-123", "gemini-2.0-flash");
        assert_eq!(p.name(), "gemini");
        assert_eq!(p.model, "gemini-2.0-flash");
        assert_eq!(p.base_url, GEMINI_BASE_URL);
    }

    #[test]
    fn test_gemini_parse_response() {
        let p = GeminiProvider::new("key-123", "gemini-2.0-flash");
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "  SQL\n"}]}
            }]
        });
        assert_eq!(p.parse_response(&raw).unwrap(), "SQL");
    }

    #[test]
    fn test_gemini_parse_response_without_candidates() {
        let p = GeminiProvider::new("key-123", "gemini-2.0-flash");
        let raw = serde_json::json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert!(matches!(p.parse_response(&raw), Err(LlmError::Parse(_))));
    }
}
