//! HTML fragments stored as conversation responses.

use std::fmt::Write;

use crate::catalog::Dataset;
use crate::domain::{ExecutionOutcome, ResultSet};

pub const NO_RESULTS: &str = "<p>No results found for your query.</p>";
pub const NO_TABLE_SELECTED: &str = "<p>No table is currently selected.</p>";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Scrollable table with a header row. NULL cells render empty.
pub fn render_table(rows: &ResultSet) -> String {
    let mut html = String::from("<div class=\"table-scroll\"><table class=\"result-table\"><thead><tr>");
    for name in &rows.column_names {
        let _ = write!(html, "<th>{}</th>", escape_html(name));
    }
    html.push_str("</tr></thead><tbody>");
    for row in &rows.rows {
        html.push_str("<tr>");
        for cell in row {
            let _ = write!(html, "<td>{}</td>", escape_html(&cell.to_string()));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table></div>");
    html
}

pub fn render_outcome(outcome: &ExecutionOutcome) -> String {
    match outcome {
        ExecutionOutcome::Read(rows) if rows.rows.is_empty() => NO_RESULTS.to_string(),
        ExecutionOutcome::Read(rows) => format!(
            "<p>Here's the data based on your query:</p>{}",
            render_table(rows)
        ),
        ExecutionOutcome::Mutation { rows_affected } => format!(
            "<p>Operation executed successfully. {} rows affected in total.</p>",
            rows_affected
        ),
    }
}

pub fn render_sql_error(error: &str, sql: &str) -> String {
    format!(
        "<p>SQL Error: {}</p><p>Generated SQL: {}</p>",
        escape_html(error),
        escape_html(sql)
    )
}

/// Shown when the oracle could not answer a chat or synthesis request.
pub fn render_failure(error: &str) -> String {
    format!("<p>Something went wrong: {}</p>", escape_html(error))
}

pub fn render_chat_reply(reply: &str) -> String {
    format!("<p>{}</p>", escape_html(reply.trim()))
}

pub fn render_dataset_list(datasets: &[Dataset]) -> String {
    if datasets.is_empty() {
        return "<p>You haven't uploaded any tables yet.</p>".to_string();
    }
    let mut html = String::from("<p>Here are your uploaded tables:</p><ul>");
    for dataset in datasets {
        let _ = write!(
            html,
            "<li>{} (Table: {})</li>",
            escape_html(&dataset.name),
            escape_html(&dataset.table_name)
        );
    }
    html.push_str("</ul>");
    html
}

pub fn render_current_table(dataset: Option<&Dataset>) -> String {
    match dataset {
        Some(dataset) => format!(
            "<p>Your current uploaded table is: <b>{}</b> (Internal name: {})</p>",
            escape_html(&dataset.name),
            escape_html(&dataset.table_name)
        ),
        None => NO_TABLE_SELECTED.to_string(),
    }
}

pub fn render_renamed(dataset: &Dataset) -> String {
    format!(
        "<p>Table renamed to: <b>{}</b> (Internal name: {})</p>",
        escape_html(&dataset.name),
        escape_html(&dataset.table_name)
    )
}

pub fn render_rename_error(error: &str) -> String {
    format!("<p>Error renaming table: {}</p>", escape_html(error))
}

pub fn render_table_preview(dataset: &Dataset, rows: &ResultSet) -> String {
    if rows.rows.is_empty() {
        format!(
            "<p>No data found in table '{}'.</p>",
            escape_html(&dataset.name)
        )
    } else {
        format!(
            "<p>Here's the data from table '{}':</p>{}",
            escape_html(&dataset.name),
            render_table(rows)
        )
    }
}
