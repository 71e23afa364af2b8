use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{
        deadpool::{Object, Pool},
        AsyncDieselConnectionManager,
    },
    AsyncPgConnection, RunQueryDsl,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio::sync::RwLock;
use tracing::info;

use crate::catalog::{ColumnMetadata, Dataset, OwnerScope};
use crate::domain::ConversationEntry;
use crate::error::NlqError;
use crate::models::*;
use crate::schema::*;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Persistence for dataset records and the conversation log.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_dataset(&self, dataset: &Dataset) -> Result<(), NlqError>;

    async fn find_dataset(
        &self,
        owner: &OwnerScope,
        dataset_id: &str,
    ) -> Result<Option<Dataset>, NlqError>;

    /// The owner's datasets ordered by logical name.
    async fn list_datasets(&self, owner: &OwnerScope) -> Result<Vec<Dataset>, NlqError>;

    async fn update_dataset_names(
        &self,
        dataset_id: &str,
        name: &str,
        table_name: &str,
    ) -> Result<(), NlqError>;

    async fn update_dataset_columns(
        &self,
        dataset_id: &str,
        columns: &[ColumnMetadata],
    ) -> Result<(), NlqError>;

    async fn delete_dataset(&self, dataset_id: &str) -> Result<(), NlqError>;

    async fn insert_conversation(&self, entry: &ConversationEntry) -> Result<(), NlqError>;

    /// Entries of one dataset ordered by creation time.
    async fn list_conversations(&self, dataset_id: &str)
        -> Result<Vec<ConversationEntry>, NlqError>;

    async fn delete_conversations(&self, dataset_id: &str) -> Result<u64, NlqError>;

    /// Fails when the catalog cannot serve queries.
    async fn health_check(&self) -> Result<(), NlqError>;
}

#[derive(Clone)]
pub struct DatabaseManager {
    pool: Pool<AsyncPgConnection>,
}

impl DatabaseManager {
    pub async fn new(database_url: &str) -> Result<Self, NlqError> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(config)
            .build()
            .map_err(|e| NlqError::ConfigError {
                message: format!("Failed to create database pool: {}", e),
            })?;

        let manager = Self { pool };
        manager.run_migrations(database_url).await?;

        Ok(manager)
    }

    pub async fn run_migrations(&self, database_url: &str) -> Result<(), NlqError> {
        use diesel::Connection;
        use diesel::PgConnection;

        // diesel_migrations only drives synchronous connections.
        let mut connection =
            PgConnection::establish(database_url).map_err(|e| NlqError::ConfigError {
                message: format!("Failed to establish connection for migrations: {}", e),
            })?;

        connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| NlqError::ConfigError {
                message: format!("Failed to run migrations: {}", e),
            })?;

        Ok(())
    }

    async fn conn(&self) -> Result<Object<AsyncPgConnection>, NlqError> {
        self.pool.get().await.map_err(|e| NlqError::CatalogError {
            message: format!("Failed to get database connection: {}", e),
        })
    }
}

#[async_trait]
impl CatalogStore for DatabaseManager {
    async fn insert_dataset(&self, dataset: &Dataset) -> Result<(), NlqError> {
        info!("Adding dataset {} to catalog", dataset.name);
        let mut conn = self.conn().await?;

        let columns_json = serde_json::to_value(&dataset.columns)?;
        let new_dataset = NewDataset {
            id: &dataset.id,
            owner_id: dataset.owner_id.as_deref(),
            name: &dataset.name,
            table_name: &dataset.table_name,
            columns: &columns_json,
            uploaded_at: dataset.uploaded_at,
        };

        diesel::insert_into(datasets::table)
            .values(&new_dataset)
            .execute(&mut conn)
            .await
            .map_err(|e| NlqError::CatalogError {
                message: format!("Failed to insert dataset: {}", e),
            })?;

        Ok(())
    }

    async fn find_dataset(
        &self,
        owner: &OwnerScope,
        dataset_id: &str,
    ) -> Result<Option<Dataset>, NlqError> {
        let mut conn = self.conn().await?;

        let mut query = datasets::table
            .filter(datasets::id.eq(dataset_id))
            .into_boxed();
        query = match owner {
            OwnerScope::Anonymous => query.filter(datasets::owner_id.is_null()),
            OwnerScope::OwnedBy(owner_id) => query.filter(datasets::owner_id.eq(owner_id.clone())),
        };

        let dataset = query
            .select(DatasetModel::as_select())
            .get_result::<DatasetModel>(&mut conn)
            .await
            .optional()
            .map_err(|e| NlqError::CatalogError {
                message: format!("Failed to fetch dataset: {}", e),
            })?;

        dataset.map(Dataset::try_from).transpose()
    }

    async fn list_datasets(&self, owner: &OwnerScope) -> Result<Vec<Dataset>, NlqError> {
        let mut conn = self.conn().await?;

        let mut query = datasets::table.into_boxed();
        query = match owner {
            OwnerScope::Anonymous => query.filter(datasets::owner_id.is_null()),
            OwnerScope::OwnedBy(owner_id) => query.filter(datasets::owner_id.eq(owner_id.clone())),
        };

        let dataset_list = query
            .order((datasets::name.asc(), datasets::uploaded_at.asc()))
            .select(DatasetModel::as_select())
            .get_results::<DatasetModel>(&mut conn)
            .await
            .map_err(|e| NlqError::CatalogError {
                message: format!("Failed to fetch datasets: {}", e),
            })?;

        dataset_list.into_iter().map(Dataset::try_from).collect()
    }

    async fn update_dataset_names(
        &self,
        dataset_id: &str,
        name: &str,
        table_name: &str,
    ) -> Result<(), NlqError> {
        let mut conn = self.conn().await?;

        let updated = diesel::update(datasets::table.find(dataset_id))
            .set((datasets::name.eq(name), datasets::table_name.eq(table_name)))
            .execute(&mut conn)
            .await
            .map_err(|e| NlqError::CatalogError {
                message: format!("Failed to rename dataset: {}", e),
            })?;

        if updated == 0 {
            return Err(NlqError::DatasetNotFound {
                dataset_id: dataset_id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_dataset_columns(
        &self,
        dataset_id: &str,
        columns: &[ColumnMetadata],
    ) -> Result<(), NlqError> {
        let mut conn = self.conn().await?;
        let columns_json = serde_json::to_value(columns)?;

        diesel::update(datasets::table.find(dataset_id))
            .set(datasets::column_list.eq(&columns_json))
            .execute(&mut conn)
            .await
            .map_err(|e| NlqError::CatalogError {
                message: format!("Failed to update dataset columns: {}", e),
            })?;

        Ok(())
    }

    async fn delete_dataset(&self, dataset_id: &str) -> Result<(), NlqError> {
        let mut conn = self.conn().await?;

        diesel::delete(datasets::table.find(dataset_id))
            .execute(&mut conn)
            .await
            .map_err(|e| NlqError::CatalogError {
                message: format!("Failed to delete dataset: {}", e),
            })?;

        Ok(())
    }

    async fn insert_conversation(&self, entry: &ConversationEntry) -> Result<(), NlqError> {
        let mut conn = self.conn().await?;

        let new_entry = NewConversation {
            id: &entry.id,
            dataset_id: entry.dataset_id.as_deref(),
            user_query: &entry.user_query,
            sql_query: &entry.sql_query,
            response: &entry.response,
            created_at: entry.created_at,
        };

        diesel::insert_into(conversations::table)
            .values(&new_entry)
            .execute(&mut conn)
            .await
            .map_err(|e| NlqError::CatalogError {
                message: format!("Failed to insert conversation entry: {}", e),
            })?;

        Ok(())
    }

    async fn list_conversations(
        &self,
        dataset_id: &str,
    ) -> Result<Vec<ConversationEntry>, NlqError> {
        let mut conn = self.conn().await?;

        let entries = conversations::table
            .filter(conversations::dataset_id.eq(dataset_id))
            .order(conversations::created_at.asc())
            .select(ConversationModel::as_select())
            .get_results::<ConversationModel>(&mut conn)
            .await
            .map_err(|e| NlqError::CatalogError {
                message: format!("Failed to load conversation: {}", e),
            })?;

        Ok(entries.into_iter().map(|e| e.into()).collect())
    }

    async fn delete_conversations(&self, dataset_id: &str) -> Result<u64, NlqError> {
        let mut conn = self.conn().await?;

        let deleted = diesel::delete(
            conversations::table.filter(conversations::dataset_id.eq(dataset_id)),
        )
        .execute(&mut conn)
        .await
        .map_err(|e| NlqError::CatalogError {
            message: format!("Failed to clear conversation: {}", e),
        })?;

        Ok(deleted as u64)
    }

    async fn health_check(&self) -> Result<(), NlqError> {
        let mut conn = self.conn().await?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .await
            .map_err(|e| NlqError::CatalogError {
                message: format!("Catalog health check failed: {}", e),
            })?;
        Ok(())
    }
}

/// Process-local catalog used when no `DATABASE_URL` is configured, and in tests.
#[derive(Default)]
pub struct MemoryCatalogStore {
    datasets: RwLock<Vec<Dataset>>,
    conversations: RwLock<Vec<ConversationEntry>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn insert_dataset(&self, dataset: &Dataset) -> Result<(), NlqError> {
        let mut datasets = self.datasets.write().await;
        if datasets.iter().any(|d| d.id == dataset.id) {
            return Err(NlqError::CatalogError {
                message: format!("Dataset {} already exists", dataset.id),
            });
        }
        datasets.push(dataset.clone());
        Ok(())
    }

    async fn find_dataset(
        &self,
        owner: &OwnerScope,
        dataset_id: &str,
    ) -> Result<Option<Dataset>, NlqError> {
        Ok(self
            .datasets
            .read()
            .await
            .iter()
            .find(|d| d.id == dataset_id && owner.can_see(d.owner_id.as_deref()))
            .cloned())
    }

    async fn list_datasets(&self, owner: &OwnerScope) -> Result<Vec<Dataset>, NlqError> {
        let mut visible: Vec<Dataset> = self
            .datasets
            .read()
            .await
            .iter()
            .filter(|d| owner.can_see(d.owner_id.as_deref()))
            .cloned()
            .collect();
        // Stable sort keeps upload order among equal names.
        visible.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(visible)
    }

    async fn update_dataset_names(
        &self,
        dataset_id: &str,
        name: &str,
        table_name: &str,
    ) -> Result<(), NlqError> {
        let mut datasets = self.datasets.write().await;
        let dataset = datasets
            .iter_mut()
            .find(|d| d.id == dataset_id)
            .ok_or_else(|| NlqError::DatasetNotFound {
                dataset_id: dataset_id.to_string(),
            })?;
        dataset.name = name.to_string();
        dataset.table_name = table_name.to_string();
        Ok(())
    }

    async fn update_dataset_columns(
        &self,
        dataset_id: &str,
        columns: &[ColumnMetadata],
    ) -> Result<(), NlqError> {
        let mut datasets = self.datasets.write().await;
        if let Some(dataset) = datasets.iter_mut().find(|d| d.id == dataset_id) {
            dataset.columns = columns.to_vec();
        }
        Ok(())
    }

    async fn delete_dataset(&self, dataset_id: &str) -> Result<(), NlqError> {
        self.datasets.write().await.retain(|d| d.id != dataset_id);
        self.conversations
            .write()
            .await
            .retain(|c| c.dataset_id.as_deref() != Some(dataset_id));
        Ok(())
    }

    async fn insert_conversation(&self, entry: &ConversationEntry) -> Result<(), NlqError> {
        self.conversations.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_conversations(
        &self,
        dataset_id: &str,
    ) -> Result<Vec<ConversationEntry>, NlqError> {
        let mut entries: Vec<ConversationEntry> = self
            .conversations
            .read()
            .await
            .iter()
            .filter(|c| c.dataset_id.as_deref() == Some(dataset_id))
            .cloned()
            .collect();
        entries.sort_by_key(|c| c.created_at);
        Ok(entries)
    }

    async fn delete_conversations(&self, dataset_id: &str) -> Result<u64, NlqError> {
        let mut conversations = self.conversations.write().await;
        let before = conversations.len();
        conversations.retain(|c| c.dataset_id.as_deref() != Some(dataset_id));
        Ok((before - conversations.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), NlqError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dataset(id: &str, owner: Option<&str>, name: &str) -> Dataset {
        Dataset {
            id: id.to_string(),
            owner_id: owner.map(str::to_string),
            name: name.to_string(),
            table_name: crate::sanitize::sanitize_table_name(name),
            columns: vec![ColumnMetadata::text("a")],
            uploaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_scopes_by_owner() {
        let store = MemoryCatalogStore::new();
        store.insert_dataset(&dataset("ds_1", None, "anon.csv")).await.unwrap();
        store
            .insert_dataset(&dataset("ds_2", Some("alice"), "alice.csv"))
            .await
            .unwrap();

        let anon = OwnerScope::Anonymous;
        let alice = OwnerScope::OwnedBy("alice".to_string());
        let bob = OwnerScope::OwnedBy("bob".to_string());

        assert!(store.find_dataset(&anon, "ds_1").await.unwrap().is_some());
        assert!(store.find_dataset(&anon, "ds_2").await.unwrap().is_none());
        assert!(store.find_dataset(&alice, "ds_1").await.unwrap().is_none());
        assert!(store.find_dataset(&alice, "ds_2").await.unwrap().is_some());
        assert!(store.find_dataset(&bob, "ds_2").await.unwrap().is_none());
        assert!(store.list_datasets(&bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_lists_by_name() {
        let store = MemoryCatalogStore::new();
        store.insert_dataset(&dataset("ds_1", None, "zeta.csv")).await.unwrap();
        store.insert_dataset(&dataset("ds_2", None, "alpha.csv")).await.unwrap();

        let names: Vec<String> = store
            .list_datasets(&OwnerScope::Anonymous)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["alpha.csv", "zeta.csv"]);
    }

    #[tokio::test]
    async fn test_memory_store_conversations_cascade() {
        let store = MemoryCatalogStore::new();
        store.insert_dataset(&dataset("ds_1", None, "a.csv")).await.unwrap();
        store
            .insert_conversation(&ConversationEntry::new(Some("ds_1".into()), "q", "", "r"))
            .await
            .unwrap();
        store
            .insert_conversation(&ConversationEntry::new(None, "list all tables", "", "r"))
            .await
            .unwrap();

        store.delete_dataset("ds_1").await.unwrap();

        assert!(store.list_conversations("ds_1").await.unwrap().is_empty());
        assert_eq!(store.conversations.read().await.len(), 1);
    }
}
