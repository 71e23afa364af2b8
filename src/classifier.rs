use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::LlmProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// The user wants to read or change table data.
    Sql,
    /// Greetings, questions about the assistant, metadata.
    Chat,
}

pub struct IntentClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Never fails: an unreachable oracle counts as chat.
    pub async fn classify(&self, query: &str) -> Intent {
        match self.llm.complete(&classification_prompt(query)).await {
            Ok(reply) => {
                let intent = parse_intent(&reply);
                debug!("Classified {:?} as {:?} via {}", query, intent, self.llm.name());
                intent
            }
            Err(e) => {
                warn!("Intent classification failed, treating as chat: {}", e);
                Intent::Chat
            }
        }
    }
}

fn classification_prompt(query: &str) -> String {
    format!(
        "Classify this user message: \"{query}\"\n\
         - Respond ONLY with \"SQL\" if it is a request to SELECT, INSERT, UPDATE, DELETE, or ALTER table data.\n\
         - Respond ONLY with \"CHAT\" for greetings, assistant info, or metadata questions (like table names).\n"
    )
}

/// The first token of the upper-cased reply decides.
pub fn parse_intent(reply: &str) -> Intent {
    let upper = reply.trim().to_uppercase();
    match upper.split_whitespace().next() {
        Some("SQL") => Intent::Sql,
        _ => Intent::Chat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_intent() {
        assert_eq!(parse_intent("SQL"), Intent::Sql);
        assert_eq!(parse_intent("  sql\n"), Intent::Sql);
        assert_eq!(parse_intent("SQL because it updates rows"), Intent::Sql);
        assert_eq!(parse_intent("CHAT"), Intent::Chat);
        assert_eq!(parse_intent("SQL."), Intent::Chat);
        assert_eq!(parse_intent(""), Intent::Chat);
        assert_eq!(parse_intent("I think SQL"), Intent::Chat);
    }

    #[test]
    fn test_prompt_embeds_query() {
        let prompt = classification_prompt("delete row 3");
        assert!(prompt.contains("\"delete row 3\""));
        assert!(prompt.contains("\"SQL\""));
        assert!(prompt.contains("\"CHAT\""));
    }
}
