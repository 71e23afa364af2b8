use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::{group_by_base_name, ColumnMetadata, Dataset, DatasetGroup, OwnerScope};
use crate::database::CatalogStore;
use crate::error::NlqError;
use crate::ingest::parse_upload;
use crate::sanitize::sanitize_table_name;
use crate::storage::TabularStore;

/// Keeps dataset records and their physical tables in step.
pub struct DatasetManager {
    catalog: Arc<dyn CatalogStore>,
    tables: Arc<dyn TabularStore>,
}

impl DatasetManager {
    pub fn new(catalog: Arc<dyn CatalogStore>, tables: Arc<dyn TabularStore>) -> Self {
        Self { catalog, tables }
    }

    pub async fn create(
        &self,
        owner: &OwnerScope,
        name: &str,
        table_name: &str,
        columns: Vec<ColumnMetadata>,
    ) -> Result<Dataset, NlqError> {
        let dataset = Dataset {
            id: format!("ds_{}", Uuid::new_v4().simple()),
            owner_id: owner.owner_id().map(str::to_string),
            name: name.to_string(),
            table_name: table_name.to_string(),
            columns,
            uploaded_at: Utc::now(),
        };
        self.catalog.insert_dataset(&dataset).await?;
        Ok(dataset)
    }

    /// Parses the file, replaces the physical table named after it and
    /// records a new dataset.
    pub async fn upload(
        &self,
        owner: &OwnerScope,
        filename: &str,
        content: &[u8],
    ) -> Result<Dataset, NlqError> {
        info!("Ingesting upload {} ({} bytes)", filename, content.len());

        let data = parse_upload(filename, content)?;
        let table_name = sanitize_table_name(filename);
        self.tables.create_or_replace_table(&table_name, &data).await?;

        let dataset = self.create(owner, filename, &table_name, data.columns).await?;
        info!(
            "Dataset {} created for {} (table {})",
            dataset.id, dataset.name, dataset.table_name
        );
        Ok(dataset)
    }

    pub async fn lookup(&self, owner: &OwnerScope, dataset_id: &str) -> Result<Dataset, NlqError> {
        self.catalog
            .find_dataset(owner, dataset_id)
            .await?
            .ok_or_else(|| NlqError::DatasetNotFound {
                dataset_id: dataset_id.to_string(),
            })
    }

    pub async fn list(&self, owner: &OwnerScope) -> Result<Vec<Dataset>, NlqError> {
        self.catalog.list_datasets(owner).await
    }

    /// The owner's datasets together with their base-name groups.
    pub async fn list_grouped(
        &self,
        owner: &OwnerScope,
    ) -> Result<(Vec<Dataset>, Vec<DatasetGroup>), NlqError> {
        let datasets = self.list(owner).await?;
        let groups = group_by_base_name(&datasets);
        Ok((datasets, groups))
    }

    /// Every dataset of the owner sharing `dataset`'s base name, itself included.
    pub async fn related(
        &self,
        owner: &OwnerScope,
        dataset: &Dataset,
    ) -> Result<Vec<Dataset>, NlqError> {
        let base = dataset.base_name();
        Ok(self
            .list(owner)
            .await?
            .into_iter()
            .filter(|d| d.base_name() == base)
            .collect())
    }

    /// Renames the physical table, then the record. A failed record update
    /// puts the physical name back.
    pub async fn rename(&self, dataset: &Dataset, new_name: &str) -> Result<Dataset, NlqError> {
        let new_table_name = sanitize_table_name(new_name);
        let moves_table = new_table_name != dataset.table_name;

        if moves_table {
            self.tables
                .rename_table(&dataset.table_name, &new_table_name)
                .await?;
        }

        if let Err(e) = self
            .catalog
            .update_dataset_names(&dataset.id, new_name, &new_table_name)
            .await
        {
            if moves_table {
                if let Err(revert) = self
                    .tables
                    .rename_table(&new_table_name, &dataset.table_name)
                    .await
                {
                    error!(
                        "Failed to restore table {} after catalog error: {}",
                        dataset.table_name, revert
                    );
                }
            }
            return Err(e);
        }

        info!(
            "Renamed dataset {} from {} to {} (table {})",
            dataset.id, dataset.name, new_name, new_table_name
        );
        Ok(Dataset {
            name: new_name.to_string(),
            table_name: new_table_name,
            ..dataset.clone()
        })
    }

    /// Removes the conversations, the physical table and the record. A table
    /// that cannot be dropped is only logged.
    pub async fn delete(&self, dataset: &Dataset) -> Result<(), NlqError> {
        let cleared = self.catalog.delete_conversations(&dataset.id).await?;

        if let Err(e) = self.tables.drop_table_if_exists(&dataset.table_name).await {
            warn!("Could not drop table {}: {}", dataset.table_name, e);
        }

        self.catalog.delete_dataset(&dataset.id).await?;
        info!(
            "Deleted dataset {} ({} conversation entries)",
            dataset.id, cleared
        );
        Ok(())
    }

    /// Re-reads the physical columns so schema changes reach later prompts.
    pub async fn refresh_columns(&self, dataset: &Dataset) -> Result<Dataset, NlqError> {
        let columns = self.tables.table_columns(&dataset.table_name).await?;
        if columns.is_empty() || columns == dataset.columns {
            return Ok(dataset.clone());
        }

        self.catalog
            .update_dataset_columns(&dataset.id, &columns)
            .await?;
        info!(
            "Updated columns of {}: {:?}",
            dataset.table_name,
            columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
        );
        Ok(Dataset {
            columns,
            ..dataset.clone()
        })
    }

    /// Both the catalog and the table store must answer.
    pub async fn health_check(&self) -> Result<(), NlqError> {
        self.catalog.health_check().await?;
        self.tables.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryCatalogStore;
    use crate::domain::ExecutionOutcome;
    use crate::executor::StatementExecutor;
    use crate::storage::SqliteTabularStore;

    fn manager() -> (DatasetManager, Arc<SqliteTabularStore>) {
        let tables = Arc::new(SqliteTabularStore::open_in_memory().unwrap());
        let manager = DatasetManager::new(Arc::new(MemoryCatalogStore::new()), tables.clone());
        (manager, tables)
    }

    #[tokio::test]
    async fn test_upload_records_columns() {
        let (manager, _) = manager();
        let owner = OwnerScope::OwnedBy("alice".into());

        let dataset = manager
            .upload(&owner, "Class List.csv", b"name,age\nAda,36\n")
            .await
            .unwrap();

        assert!(dataset.id.starts_with("ds_"));
        assert_eq!(dataset.table_name, "class_list");
        assert_eq!(dataset.column_names(), vec!["name", "age"]);
        assert_eq!(dataset.owner_id.as_deref(), Some("alice"));

        let found = manager.lookup(&owner, &dataset.id).await.unwrap();
        assert_eq!(found, dataset);
        assert!(matches!(
            manager.lookup(&OwnerScope::Anonymous, &dataset.id).await,
            Err(NlqError::DatasetNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_upload_creates_nothing() {
        let (manager, _) = manager();
        let err = manager
            .upload(&OwnerScope::Anonymous, "notes.txt", b"hi")
            .await
            .unwrap_err();

        assert!(matches!(err, NlqError::UnsupportedFormat { .. }));
        assert!(manager.list(&OwnerScope::Anonymous).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_related_datasets_share_base_name() {
        let (manager, _) = manager();
        let owner = OwnerScope::Anonymous;
        let students = manager.upload(&owner, "Students.csv", b"a\n1\n").await.unwrap();
        manager.upload(&owner, "Students_1.csv", b"b\n2\n").await.unwrap();
        manager.upload(&owner, "College.csv", b"c\n3\n").await.unwrap();

        let related = manager.related(&owner, &students).await.unwrap();
        let names: Vec<&str> = related.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Students.csv", "Students_1.csv"]);

        let (datasets, groups) = manager.list_grouped(&owner).await.unwrap();
        assert_eq!(datasets.len(), 3);
        assert_eq!(groups.len(), 2);
        let students_group = groups.iter().find(|g| g.base_name == "Students").unwrap();
        assert_eq!(students_group.datasets.len(), 2);
    }

    #[tokio::test]
    async fn test_rename_moves_table() {
        let (manager, tables) = manager();
        let owner = OwnerScope::Anonymous;
        let dataset = manager.upload(&owner, "old.csv", b"a\n1\n").await.unwrap();

        let renamed = manager.rename(&dataset, "New Name").await.unwrap();

        assert_eq!(renamed.name, "New Name");
        assert_eq!(renamed.table_name, "new_name");
        assert_eq!(manager.lookup(&owner, &dataset.id).await.unwrap(), renamed);
        assert_eq!(tables.table_columns("new_name").await.unwrap().len(), 1);
        assert!(tables.table_columns("old").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_onto_existing_table_changes_nothing() {
        let (manager, tables) = manager();
        let owner = OwnerScope::Anonymous;
        let first = manager.upload(&owner, "first.csv", b"a\n1\n").await.unwrap();
        manager.upload(&owner, "second.csv", b"b\n2\n").await.unwrap();

        let err = manager.rename(&first, "second").await.unwrap_err();

        assert!(matches!(err, NlqError::StorageError { .. }));
        assert_eq!(manager.lookup(&owner, &first.id).await.unwrap(), first);
        assert_eq!(tables.table_columns("first").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_table_and_record() {
        let (manager, tables) = manager();
        let owner = OwnerScope::Anonymous;
        let dataset = manager.upload(&owner, "gone.csv", b"a\n1\n").await.unwrap();

        manager.delete(&dataset).await.unwrap();

        assert!(manager.list(&owner).await.unwrap().is_empty());
        assert!(tables.table_columns("gone").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_columns_after_alter() {
        let (manager, tables) = manager();
        let owner = OwnerScope::Anonymous;
        let dataset = manager.upload(&owner, "grades.csv", b"name\nAda\n").await.unwrap();

        let executor = StatementExecutor::new(tables.clone());
        let outcome = executor
            .execute(&["ALTER TABLE \"grades\" ADD COLUMN \"grade\" TEXT".to_string()])
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::Mutation { rows_affected: 0 });

        let refreshed = manager.refresh_columns(&dataset).await.unwrap();
        assert_eq!(refreshed.column_names(), vec!["name", "grade"]);
        assert_eq!(manager.lookup(&owner, &dataset.id).await.unwrap(), refreshed);
    }
}
