use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static WHITESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Collapses a source string to the form translation memory keys on: trim
/// the edges, collapse interior whitespace runs to a single space, then
/// lowercase. Order matters — lowercasing before collapsing could change
/// which runs of whitespace are adjacent under some locales' casing rules.
pub fn normalize_source_text(text: &str) -> String {
    let collapsed = WHITESPACE_PATTERN.replace_all(text.trim(), " ");
    collapsed.to_lowercase()
}

/// SHA-256 hex digest of the normalized source text; the natural-key field
/// translation memory entries are deduplicated on.
pub fn normalized_source_hash(text: &str) -> String {
    let normalized = normalize_source_text(text);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_lowercases() {
        assert_eq!(normalize_source_text("  Hello   World \n"), "hello world");
    }

    #[test]
    fn hash_is_stable_across_equivalent_whitespace() {
        assert_eq!(
            normalized_source_hash("Hello   World"),
            normalized_source_hash("hello world")
        );
        assert_ne!(
            normalized_source_hash("Hello World"),
            normalized_source_hash("Hello Worlds")
        );
    }
}
