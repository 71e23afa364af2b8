use std::sync::Arc;
use tracing::debug;

use crate::database::CatalogStore;
use crate::domain::ConversationEntry;
use crate::error::NlqError;

/// Append-only record of chat turns, one transcript per dataset.
pub struct ConversationLog {
    store: Arc<dyn CatalogStore>,
}

impl ConversationLog {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub async fn append(
        &self,
        dataset_id: Option<&str>,
        user_query: &str,
        sql_query: &str,
        response: String,
    ) -> Result<ConversationEntry, NlqError> {
        let entry = ConversationEntry::new(
            dataset_id.map(str::to_string),
            user_query,
            sql_query,
            response,
        );
        self.store.insert_conversation(&entry).await?;
        debug!("Appended conversation entry {} ({:?})", entry.id, entry.dataset_id);
        Ok(entry)
    }

    /// Entries of one dataset, oldest first.
    pub async fn transcript(&self, dataset_id: &str) -> Result<Vec<ConversationEntry>, NlqError> {
        self.store.list_conversations(dataset_id).await
    }

    pub async fn clear(&self, dataset_id: &str) -> Result<u64, NlqError> {
        self.store.delete_conversations(dataset_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryCatalogStore;

    #[tokio::test]
    async fn test_append_transcript_clear() {
        let log = ConversationLog::new(Arc::new(MemoryCatalogStore::new()));

        log.append(Some("ds_a"), "first", "", "<p>1</p>".into()).await.unwrap();
        log.append(Some("ds_b"), "other", "", "<p>x</p>".into()).await.unwrap();
        log.append(Some("ds_a"), "second", "SELECT 1", "<p>2</p>".into())
            .await
            .unwrap();
        log.append(None, "list all tables", "", "<p>-</p>".into()).await.unwrap();

        let entries = log.transcript("ds_a").await.unwrap();
        let queries: Vec<&str> = entries.iter().map(|e| e.user_query.as_str()).collect();
        assert_eq!(queries, vec!["first", "second"]);
        assert_eq!(entries[1].sql_query, "SELECT 1");

        assert_eq!(log.clear("ds_a").await.unwrap(), 2);
        assert!(log.transcript("ds_a").await.unwrap().is_empty());
        assert_eq!(log.transcript("ds_b").await.unwrap().len(), 1);
    }
}
