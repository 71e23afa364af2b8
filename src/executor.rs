use std::sync::Arc;
use tracing::debug;

use crate::domain::ExecutionOutcome;
use crate::error::NlqError;
use crate::storage::{Statement, StatementResult, TabularStore};

/// Verbs whose affected-row counts go into the mutation total. DDL reports 0.
const COUNTED_VERBS: [&str; 4] = ["INSERT", "UPDATE", "DELETE", "REPLACE"];

/// Runs generated statement batches against the tabular store.
pub struct StatementExecutor {
    store: Arc<dyn TabularStore>,
}

impl StatementExecutor {
    pub fn new(store: Arc<dyn TabularStore>) -> Self {
        Self { store }
    }

    /// Executes `statements` in one transaction.
    ///
    /// When any read runs, the outcome carries the rows of the last read.
    /// Otherwise it carries the summed DML row count.
    pub async fn execute(&self, statements: &[String]) -> Result<ExecutionOutcome, NlqError> {
        let batch: Vec<Statement> = statements
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(classify_statement)
            .collect();

        if batch.is_empty() {
            return Err(NlqError::InvalidQuery {
                message: "No SQL statement to execute".to_string(),
            });
        }

        debug!("Executing {} statement(s)", batch.len());
        let results = self.store.execute_batch(&batch).await?;

        let mut last_read = None;
        let mut rows_affected = 0u64;
        for (statement, result) in batch.iter().zip(results) {
            match result {
                StatementResult::Rows(rows) => last_read = Some(rows),
                StatementResult::Affected(count) if counts_rows(statement.sql()) => {
                    rows_affected += count
                }
                StatementResult::Affected(_) => {}
            }
        }

        Ok(match last_read {
            Some(rows) => ExecutionOutcome::Read(rows),
            None => ExecutionOutcome::Mutation { rows_affected },
        })
    }
}

/// A statement is a read when it starts with `SELECT` or `PRAGMA`.
pub fn classify_statement(sql: &str) -> Statement {
    let upper = sql.trim_start().to_uppercase();
    if upper.starts_with("SELECT") || upper.starts_with("PRAGMA") {
        Statement::Read(sql.to_string())
    } else {
        Statement::Mutation(sql.to_string())
    }
}

fn counts_rows(sql: &str) -> bool {
    let upper = sql.trim_start().to_uppercase();
    COUNTED_VERBS.iter().any(|verb| upper.starts_with(verb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnMetadata;
    use crate::domain::{CellValue, TabularData};
    use crate::storage::SqliteTabularStore;

    async fn executor() -> StatementExecutor {
        let store = SqliteTabularStore::open_in_memory().unwrap();
        store
            .create_or_replace_table(
                "scores",
                &TabularData {
                    columns: vec![ColumnMetadata::text("name"), ColumnMetadata::text("score")],
                    rows: vec![
                        vec![Some("a".into()), Some("1".into())],
                        vec![Some("b".into()), Some("2".into())],
                        vec![Some("c".into()), Some("3".into())],
                    ],
                },
            )
            .await
            .unwrap();
        StatementExecutor::new(Arc::new(store))
    }

    fn sql(statements: &[&str]) -> Vec<String> {
        statements.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classify_statement() {
        assert!(matches!(classify_statement("select 1"), Statement::Read(_)));
        assert!(matches!(
            classify_statement("  PRAGMA table_info(t)"),
            Statement::Read(_)
        ));
        assert!(matches!(
            classify_statement("DELETE FROM t"),
            Statement::Mutation(_)
        ));
    }

    #[tokio::test]
    async fn test_last_read_wins() {
        let executor = executor().await;
        let outcome = executor
            .execute(&sql(&[
                "SELECT name FROM scores",
                "SELECT COUNT(*) AS n FROM scores",
            ]))
            .await
            .unwrap();

        match outcome {
            ExecutionOutcome::Read(rows) => {
                assert_eq!(rows.column_names, vec!["n"]);
                assert_eq!(rows.rows, vec![vec![CellValue::Integer(3)]]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mutation_counts_are_summed() {
        let executor = executor().await;
        let outcome = executor
            .execute(&sql(&[
                "UPDATE scores SET score = '9' WHERE name = 'a'",
                "DELETE FROM scores WHERE name IN ('b', 'c')",
                "CREATE TABLE extra (x TEXT)",
            ]))
            .await
            .unwrap();

        assert_eq!(outcome, ExecutionOutcome::Mutation { rows_affected: 3 });
    }

    #[tokio::test]
    async fn test_read_after_mutation_sees_changes() {
        let executor = executor().await;
        let outcome = executor
            .execute(&sql(&[
                "DELETE FROM scores WHERE name = 'a'",
                "SELECT COUNT(*) FROM scores",
            ]))
            .await
            .unwrap();

        match outcome {
            ExecutionOutcome::Read(rows) => assert_eq!(rows.rows[0][0], CellValue::Integer(2)),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_rolls_back_earlier_statements() {
        let executor = executor().await;
        let err = executor
            .execute(&sql(&["DELETE FROM scores", "SELEC broken"]))
            .await
            .unwrap_err();
        assert!(matches!(err, NlqError::SqlExecutionError { .. }));

        let outcome = executor
            .execute(&sql(&["SELECT COUNT(*) FROM scores"]))
            .await
            .unwrap();
        match outcome {
            ExecutionOutcome::Read(rows) => assert_eq!(rows.rows[0][0], CellValue::Integer(3)),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let executor = executor().await;
        let err = executor.execute(&sql(&["  ", ""])).await.unwrap_err();
        assert!(matches!(err, NlqError::InvalidQuery { .. }));
    }
}
