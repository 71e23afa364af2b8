//! Oracle trait and error type.

use async_trait::async_trait;

/// Errors from oracle calls. Opaque to the pipeline: callers only decide
/// whether to degrade or to surface the message.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider '{0}' unavailable")]
    ProviderUnavailable(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Http(e.to_string())
    }
}

/// A stateless text-completion service.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for the given prompt.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
    /// Human-readable provider name (e.g. "gemini").
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoLlm;

    #[async_trait]
    impl LlmProvider for EchoLlm {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            Ok(prompt.to_uppercase())
        }
        fn name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_provider_is_object_safe() {
        let llm: std::sync::Arc<dyn LlmProvider> = std::sync::Arc::new(EchoLlm);
        assert_eq!(llm.complete("sql").await.unwrap(), "SQL");
        assert_eq!(llm.name(), "echo");
    }

    #[test]
    fn test_llm_error_display() {
        let e = LlmError::ProviderUnavailable("gemini".to_string());
        assert!(e.to_string().contains("gemini"));
    }
}
