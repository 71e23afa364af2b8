use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Declared type recorded for every ingested column. No inference is done.
pub const TEXT_TYPE: &str = "TEXT";

static TRAILING_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9_]+$").expect("valid regex"));

/// Who a catalog query runs on behalf of.
///
/// Anonymous records are only visible to anonymous sessions and owned records
/// only to their owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerScope {
    Anonymous,
    OwnedBy(String),
}

impl OwnerScope {
    /// Maps a wire-level owner id, where empty means anonymous.
    pub fn from_owner_id(owner_id: &str) -> Self {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            OwnerScope::Anonymous
        } else {
            OwnerScope::OwnedBy(owner_id.to_string())
        }
    }

    pub fn owner_id(&self) -> Option<&str> {
        match self {
            OwnerScope::Anonymous => None,
            OwnerScope::OwnedBy(id) => Some(id),
        }
    }

    pub fn can_see(&self, record_owner: Option<&str>) -> bool {
        self.owner_id() == record_owner
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl ColumnMetadata {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: TEXT_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub id: String,
    pub owner_id: Option<String>,
    /// User-facing name, usually the uploaded filename.
    pub name: String,
    /// Sanitized physical table name.
    pub table_name: String,
    pub columns: Vec<ColumnMetadata>,
    pub uploaded_at: DateTime<Utc>,
}

impl Dataset {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn base_name(&self) -> String {
        base_name(&self.name)
    }
}

/// Datasets uploaded under a common base name.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetGroup {
    pub base_name: String,
    pub datasets: Vec<Dataset>,
}

/// Strips the extension and any trailing digits/underscores:
/// `Students_1.csv` and `Students.csv` both yield `Students`.
///
/// A name made only of digits and underscores keeps its stem.
pub fn base_name(name: &str) -> String {
    let stem = name.split('.').next().unwrap_or_default();
    let trimmed = TRAILING_SUFFIX.replace(stem, "");
    if trimmed.is_empty() {
        stem.to_string()
    } else {
        trimmed.into_owned()
    }
}

/// Groups datasets by base name. Groups appear in order of their first member
/// and members keep their input order.
pub fn group_by_base_name(datasets: &[Dataset]) -> Vec<DatasetGroup> {
    let mut groups: Vec<DatasetGroup> = Vec::new();
    for dataset in datasets {
        let base = dataset.base_name();
        match groups.iter_mut().find(|g| g.base_name == base) {
            Some(group) => group.datasets.push(dataset.clone()),
            None => groups.push(DatasetGroup {
                base_name: base,
                datasets: vec![dataset.clone()],
            }),
        }
    }
    groups
}
