use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::catalog::ColumnMetadata;
use crate::domain::{CellValue, ResultSet, TabularData};
use crate::error::NlqError;
use crate::sanitize::quote_identifier;

/// One statement of a batch, already classified by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Read(String),
    Mutation(String),
}

impl Statement {
    pub fn sql(&self) -> &str {
        match self {
            Statement::Read(sql) | Statement::Mutation(sql) => sql,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    Rows(ResultSet),
    Affected(u64),
}

/// The physical store holding one table per dataset.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Drops any table called `name` and writes `data` in its place.
    async fn create_or_replace_table(&self, name: &str, data: &TabularData)
        -> Result<(), NlqError>;

    /// Runs every statement inside one transaction. Any failure rolls the whole
    /// batch back and is reported as `SqlExecutionError`.
    async fn execute_batch(&self, statements: &[Statement])
        -> Result<Vec<StatementResult>, NlqError>;

    async fn rename_table(&self, from: &str, to: &str) -> Result<(), NlqError>;

    async fn drop_table_if_exists(&self, name: &str) -> Result<(), NlqError>;

    async fn table_columns(&self, name: &str) -> Result<Vec<ColumnMetadata>, NlqError>;

    async fn health_check(&self) -> Result<(), NlqError>;
}

pub struct SqliteTabularStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTabularStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NlqError> {
        let path = path.as_ref();
        info!("Opening tabular store at {}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| NlqError::StorageError {
                message: format!("Failed to create {}: {}", parent.display(), e),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| NlqError::StorageError {
            message: format!("Failed to open tabular database: {}", e),
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, NlqError> {
        let conn = Connection::open_in_memory().map_err(|e| NlqError::StorageError {
            message: format!("Failed to create in-memory database: {}", e),
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `work` on the blocking pool while holding the connection.
    async fn with_conn<T, F>(&self, work: F) -> Result<T, NlqError>
    where
        F: FnOnce(&mut Connection) -> Result<T, NlqError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| NlqError::InternalError {
                message: format!("Failed to acquire tabular store lock: {}", e),
            })?;
            work(&mut guard)
        })
        .await
        .map_err(|e| NlqError::InternalError {
            message: format!("Tabular store task failed: {}", e),
        })?
    }
}

fn read_rows(conn: &Connection, sql: &str) -> rusqlite::Result<ResultSet> {
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut rows = stmt.query([])?;
    let mut result_rows = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_names.len());
        for idx in 0..column_names.len() {
            values.push(cell_value(row.get_ref(idx)?));
        }
        result_rows.push(values);
    }

    Ok(ResultSet {
        column_names,
        rows: result_rows,
    })
}

fn cell_value(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(v) => CellValue::Integer(v),
        ValueRef::Real(v) => CellValue::Real(v),
        ValueRef::Text(v) => CellValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => CellValue::Blob(v.to_vec()),
    }
}

#[async_trait]
impl TabularStore for SqliteTabularStore {
    async fn create_or_replace_table(
        &self,
        name: &str,
        data: &TabularData,
    ) -> Result<(), NlqError> {
        if data.columns.is_empty() {
            return Err(NlqError::StorageError {
                message: format!("Cannot create table {} without columns", name),
            });
        }

        let name = name.to_string();
        let data = data.clone();
        self.with_conn(move |conn| {
            let storage_err = |e: rusqlite::Error| NlqError::StorageError {
                message: format!("Error saving to database: {}", e),
            };

            let table = quote_identifier(&name);
            let column_defs: Vec<String> = data
                .columns
                .iter()
                .map(|c| format!("{} {}", quote_identifier(&c.name), c.data_type))
                .collect();
            let placeholders: Vec<String> =
                (1..=data.columns.len()).map(|i| format!("?{}", i)).collect();

            let tx = conn.transaction().map_err(storage_err)?;
            tx.execute(&format!("DROP TABLE IF EXISTS {}", table), [])
                .map_err(storage_err)?;
            tx.execute(
                &format!("CREATE TABLE {} ({})", table, column_defs.join(", ")),
                [],
            )
            .map_err(storage_err)?;
            {
                let mut insert = tx
                    .prepare(&format!(
                        "INSERT INTO {} VALUES ({})",
                        table,
                        placeholders.join(", ")
                    ))
                    .map_err(storage_err)?;
                for row in &data.rows {
                    insert.execute(params_from_iter(row.iter())).map_err(storage_err)?;
                }
            }
            tx.commit().map_err(storage_err)?;

            info!(
                "Wrote table {} ({} columns, {} rows)",
                name,
                data.columns.len(),
                data.rows.len()
            );
            Ok(())
        })
        .await
    }

    async fn execute_batch(
        &self,
        statements: &[Statement],
    ) -> Result<Vec<StatementResult>, NlqError> {
        let statements = statements.to_vec();
        self.with_conn(move |conn| {
            let sql_err = |e: rusqlite::Error| NlqError::SqlExecutionError {
                message: e.to_string(),
            };

            // Dropping `tx` without commit rolls back.
            let tx = conn.transaction().map_err(sql_err)?;
            let mut results = Vec::with_capacity(statements.len());
            for statement in &statements {
                let result = match statement {
                    Statement::Read(sql) => {
                        StatementResult::Rows(read_rows(&tx, sql).map_err(sql_err)?)
                    }
                    Statement::Mutation(sql) => {
                        StatementResult::Affected(tx.execute(sql, []).map_err(sql_err)? as u64)
                    }
                };
                results.push(result);
            }
            tx.commit().map_err(sql_err)?;

            Ok(results)
        })
        .await
    }

    async fn rename_table(&self, from: &str, to: &str) -> Result<(), NlqError> {
        let (from, to) = (from.to_string(), to.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "ALTER TABLE {} RENAME TO {}",
                    quote_identifier(&from),
                    quote_identifier(&to)
                ),
                [],
            )
            .map_err(|e| NlqError::StorageError {
                message: format!("Error renaming table: {}", e),
            })?;

            info!("Renamed table {} to {}", from, to);
            Ok(())
        })
        .await
    }

    async fn drop_table_if_exists(&self, name: &str) -> Result<(), NlqError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_identifier(&name)), [])
                .map_err(|e| NlqError::StorageError {
                    message: format!("Could not drop table {}: {}", name, e),
                })?;
            Ok(())
        })
        .await
    }

    async fn table_columns(&self, name: &str) -> Result<Vec<ColumnMetadata>, NlqError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let columns_err = |e: rusqlite::Error| NlqError::StorageError {
                message: format!("Failed to read columns of {}: {}", name, e),
            };
            let mut stmt = conn
                .prepare(&format!("PRAGMA table_info({})", quote_identifier(&name)))
                .map_err(columns_err)?;

            let columns = stmt
                .query_map([], |row| {
                    Ok(ColumnMetadata {
                        name: row.get::<_, String>(1)?,
                        data_type: row.get::<_, String>(2)?,
                    })
                })
                .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
                .map_err(columns_err)?;

            Ok(columns)
        })
        .await
    }

    async fn health_check(&self) -> Result<(), NlqError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| NlqError::StorageError {
                    message: format!("Health check failed: {}", e),
                })?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> TabularData {
        TabularData {
            columns: vec![ColumnMetadata::text("name"), ColumnMetadata::text("city")],
            rows: vec![
                vec![Some("Ada".into()), Some("London".into())],
                vec![Some("Grace".into()), None],
            ],
        }
    }

    fn count(store: &SqliteTabularStore, table: &str) -> i64 {
        let conn = store.conn.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |r| r.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_or_replace_discards_previous_rows() {
        let store = SqliteTabularStore::open_in_memory().unwrap();
        store.create_or_replace_table("people", &people()).await.unwrap();
        assert_eq!(count(&store, "people"), 2);

        let mut smaller = people();
        smaller.rows.truncate(1);
        store.create_or_replace_table("people", &smaller).await.unwrap();
        assert_eq!(count(&store, "people"), 1);
    }

    #[tokio::test]
    async fn test_null_cells_round_trip() {
        let store = SqliteTabularStore::open_in_memory().unwrap();
        store.create_or_replace_table("people", &people()).await.unwrap();

        let results = store
            .execute_batch(&[Statement::Read(
                "SELECT city FROM \"people\" WHERE name = 'Grace'".into(),
            )])
            .await
            .unwrap();

        match &results[0] {
            StatementResult::Rows(set) => assert_eq!(set.rows, vec![vec![CellValue::Null]]),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let store = SqliteTabularStore::open_in_memory().unwrap();
        store.create_or_replace_table("people", &people()).await.unwrap();

        let err = store
            .execute_batch(&[
                Statement::Mutation("DELETE FROM \"people\"".into()),
                Statement::Mutation("UPDATE \"missing\" SET x = 1".into()),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, NlqError::SqlExecutionError { .. }));
        assert_eq!(count(&store, "people"), 2);
    }

    #[tokio::test]
    async fn test_rename_and_columns() {
        let store = SqliteTabularStore::open_in_memory().unwrap();
        store.create_or_replace_table("people", &people()).await.unwrap();

        store.rename_table("people", "staff").await.unwrap();

        let columns = store.table_columns("staff").await.unwrap();
        assert_eq!(
            columns,
            vec![ColumnMetadata::text("name"), ColumnMetadata::text("city")]
        );
        assert!(store.table_columns("people").await.unwrap().is_empty());
        assert!(store.rename_table("people", "again").await.is_err());
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tables.sqlite3");

        {
            let store = SqliteTabularStore::open(&path).unwrap();
            store.create_or_replace_table("people", &people()).await.unwrap();
        }

        let reopened = SqliteTabularStore::open(&path).unwrap();
        assert_eq!(count(&reopened, "people"), 2);
        reopened.drop_table_if_exists("people").await.unwrap();
        reopened.drop_table_if_exists("people").await.unwrap();
        reopened.health_check().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_batches_are_serialized() {
        let store = Arc::new(SqliteTabularStore::open_in_memory().unwrap());
        store.create_or_replace_table("people", &people()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .execute_batch(&[
                        Statement::Mutation(format!(
                            "INSERT INTO \"people\" VALUES ('p{}', 'Paris')",
                            i
                        )),
                        Statement::Read("SELECT COUNT(*) FROM \"people\"".into()),
                    ])
                    .await
            }));
        }
        for handle in handles {
            let results = handle.await.unwrap().unwrap();
            assert_eq!(results[0], StatementResult::Affected(1));
        }

        assert_eq!(count(&store, "people"), 10);
        store.health_check().await.unwrap();
    }
}
