use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

/// A single recognized placeholder span in some source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub kind: &'static str,
    pub value: String,
    pub start: usize,
    pub end: usize,
    pub token: String,
}

/// Source text together with its token-substituted form and the mapping
/// needed to reverse the substitution after translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedText {
    pub original: String,
    pub protected: String,
    pub placeholders: Vec<Placeholder>,
    pub token_map: HashMap<String, String>,
}

/// Checked in this order; a span already claimed by an earlier pattern is
/// never reconsidered by a later one, even if the later pattern would also
/// match it.
static PATTERNS: LazyLock<[(&'static str, Regex); 6]> = LazyLock::new(|| {
    [
        ("double_curly", Regex::new(r"\{\{[^{}\r\n]+\}\}").unwrap()),
        (
            "angle_tag",
            Regex::new(r"(?i)</?(?:b|i|color|size)\b[^>]*>|<sprite\b[^>]*>").unwrap(),
        ),
        (
            "curly",
            Regex::new(r"\{(?:\d+|[A-Za-z_][A-Za-z0-9_]*)\}").unwrap(),
        ),
        ("percent", Regex::new(r"%(?:\d+\$)?[sd]").unwrap()),
        ("escaped_newline", Regex::new(r"\\n").unwrap()),
        ("newline", Regex::new(r"\n").unwrap()),
    ]
});

fn patterns() -> &'static [(&'static str, Regex)] {
    &*PATTERNS
}

fn overlaps(start: usize, end: usize, occupied: &[(usize, usize)]) -> bool {
    occupied
        .iter()
        .any(|&(span_start, span_end)| start < span_end && span_start < end)
}

/// Finds every placeholder in `text`, in priority order, skipping any span
/// that overlaps one already claimed by a higher-priority pattern. Results
/// are returned in document order with 1-based ascending tokens.
pub fn extract_placeholders(text: &str) -> Vec<Placeholder> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut collected: Vec<(usize, usize, &'static str, String)> = Vec::new();
    let mut occupied: Vec<(usize, usize)> = Vec::new();

    for (kind, pattern) in patterns().iter().map(|(k, p)| (*k, p)) {
        for m in pattern.find_iter(text) {
            let (start, end) = (m.start(), m.end());
            if overlaps(start, end, &occupied) {
                continue;
            }
            occupied.push((start, end));
            collected.push((start, end, kind, m.as_str().to_string()));
        }
    }

    collected.sort_by_key(|item| item.0);

    collected
        .into_iter()
        .enumerate()
        .map(|(index, (start, end, kind, value))| Placeholder {
            kind,
            value,
            start,
            end,
            token: format!("\u{27e6}PH_{}\u{27e7}", index + 1),
        })
        .collect()
}

/// Replaces every placeholder span in `text` with its opaque token, so that
/// a translation call cannot corrupt it.
pub fn protect_text(text: &str) -> ProtectedText {
    let placeholders = extract_placeholders(text);
    if placeholders.is_empty() {
        return ProtectedText {
            original: text.to_string(),
            protected: text.to_string(),
            placeholders: Vec::new(),
            token_map: HashMap::new(),
        };
    }

    let mut protected = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for placeholder in &placeholders {
        protected.push_str(&text[cursor..placeholder.start]);
        protected.push_str(&placeholder.token);
        cursor = placeholder.end;
    }
    protected.push_str(&text[cursor..]);

    let token_map = placeholders
        .iter()
        .map(|p| (p.token.clone(), p.value.clone()))
        .collect();

    ProtectedText {
        original: text.to_string(),
        protected,
        placeholders,
        token_map,
    }
}

/// Reverses `protect_text`, swapping each token back for its original
/// placeholder value. Tokens the translator dropped simply vanish; that is
/// caught by `validate_placeholders`, not here.
pub fn reinject(protected: &ProtectedText, translated_with_tokens: &str) -> String {
    let mut output = translated_with_tokens.to_string();
    for placeholder in &protected.placeholders {
        output = output.replace(&placeholder.token, &placeholder.value);
    }
    output
}

/// Compares the placeholder multiset (and, when counts match, the order) of
/// `original_text` against `final_text`, returning one message per
/// discrepancy. An empty result means every placeholder survived intact.
pub fn validate_placeholders(original_text: &str, final_text: &str) -> Vec<String> {
    let original_values: Vec<String> = extract_placeholders(original_text)
        .into_iter()
        .map(|p| p.value)
        .collect();
    let final_values: Vec<String> = extract_placeholders(final_text)
        .into_iter()
        .map(|p| p.value)
        .collect();

    let mut original_counts: HashMap<&str, usize> = HashMap::new();
    for v in &original_values {
        *original_counts.entry(v.as_str()).or_insert(0) += 1;
    }
    let mut final_counts: HashMap<&str, usize> = HashMap::new();
    for v in &final_values {
        *final_counts.entry(v.as_str()).or_insert(0) += 1;
    }

    let mut all_values: BTreeSet<&str> = BTreeSet::new();
    all_values.extend(original_counts.keys());
    all_values.extend(final_counts.keys());

    let mut errors = Vec::new();
    for value in all_values {
        let expected = original_counts.get(value).copied().unwrap_or(0);
        let found = final_counts.get(value).copied().unwrap_or(0);
        if found < expected {
            errors.push(format!(
                "Missing placeholder '{value}' (expected {expected}, found {found})"
            ));
        } else if found > expected {
            errors.push(format!(
                "Extra placeholder '{value}' (expected {expected}, found {found})"
            ));
        }
    }

    if errors.is_empty() && original_values != final_values {
        errors.push("Placeholder order changed.".to_string());
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_in_priority_then_document_order() {
        let text = "Hi {name}, you have {{count}} items\nnext line";
        let found = extract_placeholders(text);
        let kinds: Vec<&str> = found.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec!["curly", "double_curly", "newline"]);
        assert_eq!(found[0].token, "\u{27e6}PH_1\u{27e7}");
        assert_eq!(found[1].token, "\u{27e6}PH_2\u{27e7}");
    }

    #[test]
    fn angle_tag_takes_priority_over_curly_when_overlapping() {
        let text = "<color=red>{0}</color>";
        let found = extract_placeholders(text);
        let kinds: Vec<&str> = found.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec!["angle_tag", "curly", "angle_tag"]);
    }

    #[test]
    fn protect_and_reinject_round_trips() {
        let text = "Deal %d damage to {target}.";
        let protected = protect_text(text);
        assert!(!protected.protected.contains("%d"));
        let restored = reinject(&protected, &protected.protected);
        assert_eq!(restored, text);
    }

    #[test]
    fn validate_detects_missing_and_extra_and_reorder() {
        let original = "{a} then {b}";
        assert!(validate_placeholders(original, "{a} then {b}").is_empty());

        let missing = validate_placeholders(original, "then only");
        assert_eq!(missing.len(), 2);

        let extra = validate_placeholders(original, "{a} then {b} and {a}");
        assert_eq!(extra, vec!["Extra placeholder '{a}' (expected 1, found 2)"]);

        let reordered = validate_placeholders(original, "{b} then {a}");
        assert_eq!(reordered, vec!["Placeholder order changed."]);
    }
}
