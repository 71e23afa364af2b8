//! OpenAI-compatible chat completions client (configurable base URL).

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::provider::{LlmError, LlmProvider};

pub struct OpenAiProvider {
    api_key: String,
    pub model: String,
    pub base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn parse_response(&self, json: &Value) -> Result<String, LlmError> {
        json.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::Parse("Missing choices[0].message.content".to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.0
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ProviderUnavailable(format!("openai: {}", e)))?
            .error_for_status()?;

        let json: Value = resp.json().await?;
        self.parse_response(&json)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_provider_trims_base_url() {
        let p = OpenAiProvider::new("sk-test", "gpt-4o-mini", "https://api.openai.com/v1/");
        assert_eq!(p.base_url, "https://api.openai.com/v1");
        assert_eq!(p.name(), "openai");
    }

    #[test]
    fn test_openai_parse_response() {
        let p = OpenAiProvider::new("sk-test", "gpt-4o-mini", "https://api.openai.com/v1");
        let raw = serde_json::json!({
            "choices": [{"message": {"content": "SELECT COUNT(*) FROM \"sales\""}}]
        });
        assert_eq!(
            p.parse_response(&raw).unwrap(),
            "SELECT COUNT(*) FROM \"sales\""
        );
    }
}
