use regex::Regex;
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("valid regex"));

const EMPTY_NAME: &str = "_unnamed";

/// Turns a filename or user-chosen name into a storage identifier.
///
/// Everything from the first `.` on is treated as the extension and dropped,
/// every remaining character outside `[A-Za-z0-9_]` becomes `_`, a leading
/// digit gets a `_` prefix and the result is lowercased. Distinct inputs may
/// collide.
pub fn sanitize_table_name(name: &str) -> String {
    let stem = name.split('.').next().unwrap_or_default();
    if stem.is_empty() {
        return EMPTY_NAME.to_string();
    }

    let mut sanitized = NON_WORD.replace_all(stem, "_").into_owned();
    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized.to_lowercase()
}

/// Double-quotes an identifier for SQL, doubling embedded quotes.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
