//! Language-model oracle clients.

pub mod gemini;
pub mod openai;
pub mod provider;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use provider::{LlmError, LlmProvider};
