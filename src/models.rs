use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::catalog::{ColumnMetadata, Dataset};
use crate::domain::ConversationEntry;
use crate::error::NlqError;
use crate::schema::{conversations, datasets};

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = datasets)]
#[diesel(primary_key(id))]
pub struct DatasetModel {
    pub id: String,
    pub owner_id: Option<String>,
    pub name: String,
    pub table_name: String,
    #[diesel(column_name = column_list)]
    pub columns: serde_json::Value,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = datasets)]
pub struct NewDataset<'a> {
    pub id: &'a str,
    pub owner_id: Option<&'a str>,
    pub name: &'a str,
    pub table_name: &'a str,
    #[diesel(column_name = column_list)]
    pub columns: &'a serde_json::Value,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = conversations)]
#[diesel(belongs_to(DatasetModel, foreign_key = dataset_id))]
#[diesel(primary_key(id))]
pub struct ConversationModel {
    pub id: Uuid,
    pub dataset_id: Option<String>,
    pub user_query: String,
    pub sql_query: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = conversations)]
pub struct NewConversation<'a> {
    pub id: &'a Uuid,
    pub dataset_id: Option<&'a str>,
    pub user_query: &'a str,
    pub sql_query: &'a str,
    pub response: &'a str,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DatasetModel> for Dataset {
    type Error = NlqError;

    fn try_from(model: DatasetModel) -> Result<Self, Self::Error> {
        let columns: Vec<ColumnMetadata> = serde_json::from_value(model.columns)?;

        Ok(Dataset {
            id: model.id,
            owner_id: model.owner_id,
            name: model.name,
            table_name: model.table_name,
            columns,
            uploaded_at: model.uploaded_at,
        })
    }
}

impl From<ConversationModel> for ConversationEntry {
    fn from(model: ConversationModel) -> Self {
        ConversationEntry {
            id: model.id,
            dataset_id: model.dataset_id,
            user_query: model.user_query,
            sql_query: model.sql_query,
            response: model.response,
            created_at: model.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::pg::Pg;

    #[test]
    fn test_dataset_columns_map_to_columns_field() {
        let select = datasets::table.select(DatasetModel::as_select());
        let sql = diesel::debug_query::<Pg, _>(&select).to_string();
        assert!(sql.contains(r#""datasets"."columns""#), "{}", sql);

        let columns = serde_json::json!([{ "name": "a", "data_type": "TEXT" }]);
        let update = diesel::update(datasets::table.find("ds_1"))
            .set(datasets::column_list.eq(&columns));
        let sql = diesel::debug_query::<Pg, _>(&update).to_string();
        assert!(sql.contains(r#"SET "columns" = "#), "{}", sql);
    }
}
