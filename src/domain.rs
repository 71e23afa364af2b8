use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::catalog::{ColumnMetadata, Dataset, DatasetGroup};
use crate::proto::nlq;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Integer(v) => write!(f, "{}", v),
            CellValue::Real(v) => write!(f, "{}", v),
            CellValue::Text(v) => write!(f, "{}", v),
            CellValue::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Rows returned by a read statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// What a statement batch produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// At least one read ran; holds the last read's rows.
    Read(ResultSet),
    /// Only mutations ran.
    Mutation { rows_affected: u64 },
}

/// Parsed upload ready to be written as a physical table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularData {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationEntry {
    pub id: Uuid,
    pub dataset_id: Option<String>,
    pub user_query: String,
    /// SQL actually executed, empty when none ran.
    pub sql_query: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn new(
        dataset_id: Option<String>,
        user_query: impl Into<String>,
        sql_query: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset_id,
            user_query: user_query.into(),
            sql_query: sql_query.into(),
            response: response.into(),
            created_at: Utc::now(),
        }
    }
}

/// Result of one user turn: the appended entry and the dataset the chat view
/// should return to.
#[derive(Debug, Clone)]
pub struct QueryReply {
    pub entry: ConversationEntry,
    pub dataset_id: Option<String>,
}

/// The chat view for one owner: their datasets, the selected one and its log.
#[derive(Debug, Clone)]
pub struct ConversationView {
    pub datasets: Vec<Dataset>,
    pub selected: Option<Dataset>,
    pub entries: Vec<ConversationEntry>,
}

impl From<ColumnMetadata> for nlq::ColumnInfo {
    fn from(domain: ColumnMetadata) -> Self {
        Self {
            name: domain.name,
            data_type: domain.data_type,
        }
    }
}

impl From<Dataset> for nlq::Dataset {
    fn from(domain: Dataset) -> Self {
        Self {
            id: domain.id,
            name: domain.name,
            table_name: domain.table_name,
            columns: domain.columns.into_iter().map(|c| c.into()).collect(),
            uploaded_at: domain.uploaded_at.to_rfc3339(),
        }
    }
}

impl From<DatasetGroup> for nlq::DatasetGroup {
    fn from(domain: DatasetGroup) -> Self {
        Self {
            base_name: domain.base_name,
            datasets: domain.datasets.into_iter().map(|d| d.into()).collect(),
        }
    }
}

impl From<ConversationEntry> for nlq::ConversationEntry {
    fn from(domain: ConversationEntry) -> Self {
        Self {
            id: domain.id.to_string(),
            dataset_id: domain.dataset_id.unwrap_or_default(),
            user_query: domain.user_query,
            sql_query: domain.sql_query,
            response: domain.response,
            created_at: domain.created_at.to_rfc3339(),
        }
    }
}

impl From<QueryReply> for nlq::AskResponse {
    fn from(domain: QueryReply) -> Self {
        Self {
            entry: Some(domain.entry.into()),
            dataset_id: domain.dataset_id.unwrap_or_default(),
        }
    }
}
