use regex::Regex;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::catalog::Dataset;
use crate::error::NlqError;
use crate::llm::LlmProvider;

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^```[a-z]*\s*").expect("valid regex"));
static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```\s*$").expect("valid regex"));
static FIRST_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|ALTER|DROP|CREATE)\b").expect("valid regex")
});

/// Cleaned oracle output: the normalized text that is shown and logged, plus
/// the individual statements handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSql {
    pub text: String,
    pub statements: Vec<String>,
}

pub struct SqlSynthesizer {
    llm: Arc<dyn LlmProvider>,
}

impl SqlSynthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Asks the oracle for SQL against `target`. `related` are the other
    /// datasets of the same base-name group.
    pub async fn synthesize(
        &self,
        query: &str,
        target: &Dataset,
        related: &[Dataset],
    ) -> Result<GeneratedSql, NlqError> {
        let prompt = sql_prompt(query, target, related);
        let raw = self.llm.complete(&prompt).await?;
        debug!("Raw SQL from {}: {}", self.llm.name(), raw);
        Ok(clean_sql_response(&raw))
    }
}

fn quoted_columns(dataset: &Dataset) -> String {
    dataset
        .column_names()
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn sql_prompt(query: &str, target: &Dataset, related: &[Dataset]) -> String {
    let table = &target.table_name;
    let mut prompt = format!(
        "Convert this user request into a VALID SQLite SQL query.\n\
         - Table name: \"{table}\"\n\
         - Columns: {columns}\n",
        columns = quoted_columns(target),
    );

    let others: Vec<&Dataset> = related.iter().filter(|d| d.id != target.id).collect();
    if !others.is_empty() {
        prompt.push_str("- Related tables you may join or reference:\n");
        for other in others {
            prompt.push_str(&format!(
                "  - \"{}\" (from {}): {}\n",
                other.table_name,
                other.name,
                quoted_columns(other)
            ));
        }
    }

    prompt.push_str(&format!(
        "- User request: \"{query}\"\n\n\
         Important notes:\n\
         1. Use ONLY the tables and columns listed above.\n\
         2. For SELECT queries, return the data as requested.\n\
         3. For UPDATE, DELETE, INSERT, or ALTER operations, generate the appropriate SQL.\n\
         4. Return ONLY the SQL query (no explanations, no extra text).\n\
         5. Always quote table names and column names with double quotes.\n\
         6. If the user asks for the complete table, generate: SELECT * FROM \"{table}\"\n\
         7. If the user asks to show the table, generate: SELECT * FROM \"{table}\" LIMIT 10\n\
         8. For multi-step work such as adding a column and then filling it, generate separate statements separated by semicolons.\n\
         9. Do not include any text before the SQL statement.\n"
    ));
    prompt
}

/// Normalizes oracle output into executable SQL.
///
/// Strips a fenced code block, drops anything before the first statement
/// keyword and pretty-prints what parses. Text that does not parse is passed
/// through trimmed.
pub fn clean_sql_response(raw: &str) -> GeneratedSql {
    let trimmed = raw.trim();
    let unfenced = if LEADING_FENCE.is_match(trimmed) {
        let without_open = LEADING_FENCE.replace(trimmed, "");
        TRAILING_FENCE.replace(&without_open, "").into_owned()
    } else {
        trimmed.to_string()
    };

    let body = match FIRST_KEYWORD.find(&unfenced) {
        Some(m) => &unfenced[m.start()..],
        None => unfenced.as_str(),
    };
    let body = body.trim();

    match Parser::parse_sql(&SQLiteDialect {}, body) {
        Ok(parsed) if !parsed.is_empty() => {
            let statements: Vec<String> = parsed.iter().map(|s| s.to_string()).collect();
            GeneratedSql {
                text: statements.join(";\n"),
                statements,
            }
        }
        Ok(_) | Err(_) => GeneratedSql {
            text: body.to_string(),
            statements: split_statements(body),
        },
    }
}

fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
