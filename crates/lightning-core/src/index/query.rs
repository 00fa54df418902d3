//! FTS5 MATCH expression building.

use regex::Regex;
use std::sync::LazyLock;

/// Anything outside plain word characters forces a quoted term.
static NEEDS_QUOTING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]").unwrap());

/// Bare words FTS5 would read as operators.
const RESERVED: &[&str] = &["and", "or", "not", "near"];

/// Quote a single term for FTS5 if it contains punctuation or is an operator.
pub fn quote_term(term: &str) -> String {
    if NEEDS_QUOTING.is_match(term) || RESERVED.contains(&term) {
        format!("\"{}\"", term.replace('"', "\"\""))
    } else {
        term.to_string()
    }
}

/// Build an FTS5 MATCH expression from free text.
///
/// Terms are lowercased, quoted when needed, given prefix matching and
/// joined with OR:
/// - `"gpt-2 model"` → `"gpt-2"* OR model*`
/// - `"Acme Corp"` → `acme* OR corp*`
pub fn build_match_query(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .map(|term| format!("{}*", quote_term(term)))
        .collect::<Vec<_>>()
        .join(" OR ")
}
