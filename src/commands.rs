//! Fixed meta-queries answered without the oracle.

use regex::Regex;
use std::sync::LazyLock;

const LIST_TABLES: [&str; 4] = [
    "show me all databases",
    "show all tables",
    "list all tables",
    "what databases do you have",
];

const CURRENT_TABLE: [&str; 4] = [
    "which data i have uploaded now",
    "what is the table name",
    "current table",
    "which table am i using",
];

const RENAME_PREFIXES: [&str; 2] = ["change table name to", "rename table to"];

static SHOW_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(show me|display|list|get)\s+(the\s+)?(.+?)\s+(table|data)").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListTables,
    CurrentTable,
    RenameTable { new_name: String },
    /// `name` is lower-cased; the caller resolves it against the owner's
    /// datasets and falls through when nothing matches.
    ShowTable { name: String },
}

type Matcher = fn(&str, &str) -> Option<Command>;

/// Tried in order; the first hit wins. Each matcher sees the trimmed input
/// and its lower-cased form.
const MATCHERS: [Matcher; 4] = [
    match_list_tables,
    match_current_table,
    match_rename_table,
    match_show_table,
];

pub fn match_command(query: &str) -> Option<Command> {
    let trimmed = query.trim();
    let lower = trimmed.to_lowercase();
    MATCHERS.iter().find_map(|matcher| matcher(trimmed, &lower))
}

fn match_list_tables(_: &str, lower: &str) -> Option<Command> {
    LIST_TABLES.contains(&lower).then_some(Command::ListTables)
}

fn match_current_table(_: &str, lower: &str) -> Option<Command> {
    CURRENT_TABLE.contains(&lower).then_some(Command::CurrentTable)
}

fn match_rename_table(trimmed: &str, _: &str) -> Option<Command> {
    RENAME_PREFIXES.iter().find_map(|prefix| {
        let head = trimmed.get(..prefix.len())?;
        if !head.eq_ignore_ascii_case(prefix) {
            return None;
        }
        let new_name = trimmed[prefix.len()..].trim();
        (!new_name.is_empty()).then(|| Command::RenameTable {
            new_name: new_name.to_string(),
        })
    })
}

fn match_show_table(_: &str, lower: &str) -> Option<Command> {
    let captures = SHOW_TABLE.captures(lower)?;
    let name = captures.get(3)?.as_str().trim();
    Some(Command::ShowTable {
        name: name.to_string(),
    })
}
