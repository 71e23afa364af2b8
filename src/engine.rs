use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{Dataset, DatasetGroup, OwnerScope};
use crate::classifier::{Intent, IntentClassifier};
use crate::commands::{match_command, Command};
use crate::config::{redact_url, Config};
use crate::conversation::ConversationLog;
use crate::database::{CatalogStore, DatabaseManager, MemoryCatalogStore};
use crate::dataset_manager::DatasetManager;
use crate::domain::{ConversationView, ExecutionOutcome, QueryReply};
use crate::error::NlqError;
use crate::executor::{classify_statement, StatementExecutor};
use crate::llm::LlmProvider;
use crate::render;
use crate::sanitize::quote_identifier;
use crate::storage::{SqliteTabularStore, Statement, TabularStore};
use crate::synthesizer::SqlSynthesizer;

pub const MAX_QUERY_CHARS: usize = 1000;

pub struct NlqEngine {
    datasets: DatasetManager,
    conversations: ConversationLog,
    classifier: IntentClassifier,
    synthesizer: SqlSynthesizer,
    executor: StatementExecutor,
    llm: Arc<dyn LlmProvider>,
}

impl NlqEngine {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        tables: Arc<dyn TabularStore>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            datasets: DatasetManager::new(catalog.clone(), tables.clone()),
            conversations: ConversationLog::new(catalog),
            classifier: IntentClassifier::new(llm.clone()),
            synthesizer: SqlSynthesizer::new(llm.clone()),
            executor: StatementExecutor::new(tables),
            llm,
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self, NlqError> {
        info!("Initializing NLQ engine");

        let catalog: Arc<dyn CatalogStore> = match &config.database_url {
            Some(url) => {
                info!("Using Postgres catalog at {}", redact_url(url));
                Arc::new(DatabaseManager::new(url).await?)
            }
            None => {
                warn!("DATABASE_URL not set, catalog is kept in memory");
                Arc::new(MemoryCatalogStore::new())
            }
        };

        let tables: Arc<dyn TabularStore> = if config.tables_db_path.as_os_str() == ":memory:" {
            Arc::new(SqliteTabularStore::open_in_memory()?)
        } else {
            Arc::new(SqliteTabularStore::open(&config.tables_db_path)?)
        };

        info!("Language model: {}", config.llm.describe());
        let engine = Self::new(catalog, tables, config.llm.build_provider());

        info!("NLQ engine initialized successfully");
        Ok(engine)
    }

    pub async fn upload_dataset(
        &self,
        owner: &OwnerScope,
        filename: &str,
        content: &[u8],
    ) -> Result<Dataset, NlqError> {
        if filename.trim().is_empty() {
            return Err(NlqError::InvalidQuery {
                message: "filename is required".to_string(),
            });
        }
        self.datasets.upload(owner, filename.trim(), content).await
    }

    pub async fn list_datasets(
        &self,
        owner: &OwnerScope,
    ) -> Result<(Vec<Dataset>, Vec<DatasetGroup>), NlqError> {
        self.datasets.list_grouped(owner).await
    }

    /// The chat view. Without an explicit dataset the owner's first dataset is
    /// selected; an unknown id selects nothing.
    pub async fn conversation(
        &self,
        owner: &OwnerScope,
        dataset_id: Option<&str>,
    ) -> Result<ConversationView, NlqError> {
        let datasets = self.datasets.list(owner).await?;
        let selected = match dataset_id {
            Some(id) => datasets.iter().find(|d| d.id == id).cloned(),
            None => datasets.first().cloned(),
        };
        let entries = match &selected {
            Some(dataset) => self.conversations.transcript(&dataset.id).await?,
            None => Vec::new(),
        };

        Ok(ConversationView {
            datasets,
            selected,
            entries,
        })
    }

    pub async fn clear_conversation(
        &self,
        owner: &OwnerScope,
        dataset_id: &str,
    ) -> Result<u64, NlqError> {
        let dataset = self.datasets.lookup(owner, dataset_id).await?;
        let deleted = self.conversations.clear(&dataset.id).await?;
        info!("Cleared {} entries from {}", deleted, dataset.id);
        Ok(deleted)
    }

    pub async fn rename_dataset(
        &self,
        owner: &OwnerScope,
        dataset_id: &str,
        new_name: &str,
    ) -> Result<Dataset, NlqError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(NlqError::InvalidQuery {
                message: "new name is required".to_string(),
            });
        }
        let dataset = self.datasets.lookup(owner, dataset_id).await?;
        self.datasets.rename(&dataset, new_name).await
    }

    pub async fn delete_dataset(&self, owner: &OwnerScope, dataset_id: &str) -> Result<(), NlqError> {
        let dataset = self.datasets.lookup(owner, dataset_id).await?;
        self.datasets.delete(&dataset).await
    }

    pub async fn health_check(&self) -> Result<(), NlqError> {
        self.datasets.health_check().await
    }

    /// One chat turn. Every handled turn appends exactly one entry.
    pub async fn ask(
        &self,
        owner: &OwnerScope,
        dataset_id: Option<&str>,
        query: &str,
    ) -> Result<QueryReply, NlqError> {
        let query = validate_query(query)?;

        if let Some(command) = match_command(query) {
            if let Some(reply) = self.run_command(owner, dataset_id, query, command).await? {
                return Ok(reply);
            }
        }

        let dataset_id = dataset_id.ok_or(NlqError::NoDatasetSelected)?;
        let dataset = self.datasets.lookup(owner, dataset_id).await?;

        match self.classifier.classify(query).await {
            Intent::Chat => self.chat(&dataset, query).await,
            Intent::Sql => self.run_sql(owner, &dataset, query).await,
        }
    }

    async fn chat(&self, dataset: &Dataset, query: &str) -> Result<QueryReply, NlqError> {
        let response = match self.llm.complete(&chat_prompt(&dataset.name, query)).await {
            Ok(reply) => render::render_chat_reply(&reply),
            Err(e) => {
                warn!("Chat reply failed: {}", e);
                render::render_failure(&e.to_string())
            }
        };
        self.reply(Some(dataset), query, "", response).await
    }

    async fn run_sql(
        &self,
        owner: &OwnerScope,
        dataset: &Dataset,
        query: &str,
    ) -> Result<QueryReply, NlqError> {
        let related = self.datasets.related(owner, dataset).await?;
        let generated = match self.synthesizer.synthesize(query, dataset, &related).await {
            Ok(generated) => generated,
            Err(e) => {
                warn!("SQL synthesis failed: {}", e);
                let response = render::render_failure(&e.to_string());
                return self.reply(Some(dataset), query, "", response).await;
            }
        };

        let response = match self.executor.execute(&generated.statements).await {
            Ok(outcome) => {
                if has_mutation(&generated.statements) {
                    if let Err(e) = self.datasets.refresh_columns(dataset).await {
                        warn!("Could not refresh columns of {}: {}", dataset.table_name, e);
                    }
                }
                render::render_outcome(&outcome)
            }
            Err(e) => {
                warn!("Generated SQL failed on {}: {}", dataset.table_name, e);
                render::render_sql_error(&e.to_string(), &generated.text)
            }
        };

        self.reply(Some(dataset), query, &generated.text, response).await
    }

    /// `Ok(None)` means the command does not apply and the turn continues.
    async fn run_command(
        &self,
        owner: &OwnerScope,
        dataset_id: Option<&str>,
        query: &str,
        command: Command,
    ) -> Result<Option<QueryReply>, NlqError> {
        info!("Answering {:?} without the language model", command);

        let reply = match command {
            Command::ListTables => {
                let datasets = self.datasets.list(owner).await?;
                let response = render::render_dataset_list(&datasets);
                self.reply(None, query, "", response).await?
            }
            Command::CurrentTable => {
                let selected = self.selected(owner, dataset_id).await?;
                let response = render::render_current_table(selected.as_ref());
                self.reply(selected.as_ref(), query, "", response).await?
            }
            Command::RenameTable { new_name } => match self.selected(owner, dataset_id).await? {
                Some(dataset) => {
                    let renamed = self.datasets.rename(&dataset, &new_name).await;
                    let (current, response) = match renamed {
                        Ok(renamed) => {
                            let response = render::render_renamed(&renamed);
                            (renamed, response)
                        }
                        Err(e) => {
                            warn!("Rename of {} failed: {}", dataset.id, e);
                            (dataset, render::render_rename_error(&e.to_string()))
                        }
                    };
                    self.reply(Some(&current), query, "", response).await?
                }
                None => {
                    self.reply(None, query, "", render::NO_TABLE_SELECTED.to_string())
                        .await?
                }
            },
            Command::ShowTable { name } => {
                let datasets = self.datasets.list(owner).await?;
                let Some(dataset) = datasets.into_iter().find(|d| names_match(d, &name)) else {
                    return Ok(None);
                };

                let sql = format!("SELECT * FROM {} LIMIT 10", quote_identifier(&dataset.table_name));
                let response = match self.executor.execute(std::slice::from_ref(&sql)).await {
                    Ok(ExecutionOutcome::Read(rows)) => render::render_table_preview(&dataset, &rows),
                    Ok(other) => render::render_outcome(&other),
                    Err(e) => render::render_sql_error(&e.to_string(), &sql),
                };
                self.reply(Some(&dataset), query, &sql, response).await?
            }
        };

        Ok(Some(reply))
    }

    async fn selected(
        &self,
        owner: &OwnerScope,
        dataset_id: Option<&str>,
    ) -> Result<Option<Dataset>, NlqError> {
        match dataset_id {
            Some(id) => match self.datasets.lookup(owner, id).await {
                Ok(dataset) => Ok(Some(dataset)),
                Err(NlqError::DatasetNotFound { .. }) => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }

    async fn reply(
        &self,
        dataset: Option<&Dataset>,
        query: &str,
        sql: &str,
        response: String,
    ) -> Result<QueryReply, NlqError> {
        let dataset_id = dataset.map(|d| d.id.clone());
        let entry = self
            .conversations
            .append(dataset_id.as_deref(), query, sql, response)
            .await?;
        Ok(QueryReply { entry, dataset_id })
    }
}

fn validate_query(query: &str) -> Result<&str, NlqError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(NlqError::InvalidQuery {
            message: "query must not be empty".to_string(),
        });
    }
    if trimmed.chars().count() > MAX_QUERY_CHARS {
        return Err(NlqError::InvalidQuery {
            message: format!("query must be at most {} characters", MAX_QUERY_CHARS),
        });
    }
    Ok(trimmed)
}

fn has_mutation(statements: &[String]) -> bool {
    statements
        .iter()
        .any(|s| matches!(classify_statement(s), Statement::Mutation(_)))
}

/// `name` is already lower-cased; it may omit the file extension.
fn names_match(dataset: &Dataset, name: &str) -> bool {
    let full = dataset.name.to_lowercase();
    let stem = full.split('.').next().unwrap_or_default();
    full == name || stem == name
}

fn chat_prompt(dataset_name: &str, query: &str) -> String {
    format!(
        "You are a friendly assistant. Answer naturally.\n\
         If asked \"what do you do?\", respond:\n\
         \"I'm a Natural Language Query assistant. You can upload tables like '{dataset_name}' \
         and ask me to view, update, delete, or modify data without writing SQL.\"\n\
         User: \"{query}\"\n"
    )
}
