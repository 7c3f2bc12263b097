use std::sync::LazyLock;

use regex::Regex;

use crate::placeholder::extract_placeholders;

static PUNCTUATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?:;,'"“”‘’()\[\]{}]+"#).unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeClassification {
    pub decision: &'static str,
    pub confidence: i32,
    pub reason: &'static str,
}

fn normalize_change_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_change_punctuation(value: &str) -> String {
    normalize_change_text(&PUNCTUATION_PATTERN.replace_all(value, " "))
}

fn relative_delta(old_value: usize, new_value: usize) -> f64 {
    if old_value == 0 {
        return if new_value > 0 { 1.0 } else { 0.0 };
    }
    (new_value as f64 - old_value as f64).abs() / old_value as f64
}

fn change_placeholder_signature(value: &str) -> Vec<(&'static str, String)> {
    extract_placeholders(value)
        .into_iter()
        .map(|placeholder| (placeholder.kind, placeholder.value))
        .collect()
}

/// Walks the same decision ladder the change-review job runs per segment:
/// whitespace-only edits are kept outright, a placeholder signature change
/// is always flagged for a human, punctuation-only edits are kept, and
/// otherwise a length or word-count swing past its threshold means update;
/// anything milder falls through to a manual flag.
pub fn classify_change(old: &str, new: &str) -> ChangeClassification {
    let normalized_old = normalize_change_text(old);
    let normalized_new = normalize_change_text(new);

    if normalized_old == normalized_new {
        return ChangeClassification {
            decision: "KEEP",
            confidence: 98,
            reason: "Whitespace-only source change.",
        };
    }

    if change_placeholder_signature(old) != change_placeholder_signature(new) {
        return ChangeClassification {
            decision: "FLAG",
            confidence: 25,
            reason: "Placeholder or tag pattern changed.",
        };
    }

    if strip_change_punctuation(&normalized_old) == strip_change_punctuation(&normalized_new) {
        return ChangeClassification {
            decision: "KEEP",
            confidence: 92,
            reason: "Only punctuation changed.",
        };
    }

    let old_length = normalized_old.chars().count();
    let new_length = normalized_new.chars().count();
    let old_words = normalized_old.split_whitespace().count();
    let new_words = normalized_new.split_whitespace().count();

    if relative_delta(old_length, new_length) > 0.30 {
        return ChangeClassification {
            decision: "UPDATE",
            confidence: 78,
            reason: "Source length changed significantly.",
        };
    }

    if relative_delta(old_words, new_words) > 0.20 {
        return ChangeClassification {
            decision: "UPDATE",
            confidence: 78,
            reason: "Source word count changed significantly.",
        };
    }

    ChangeClassification {
        decision: "FLAG",
        confidence: 45,
        reason: "Source change needs manual review.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_change_is_kept() {
        let result = classify_change("Heal for 10 HP", "Heal  for 10 HP");
        assert_eq!(result.decision, "KEEP");
        assert_eq!(result.confidence, 98);
    }

    #[test]
    fn placeholder_signature_change_is_flagged() {
        let result = classify_change("Heal for {amount} HP", "Heal for {value} HP");
        assert_eq!(result.decision, "FLAG");
        assert_eq!(result.confidence, 25);
    }

    #[test]
    fn punctuation_only_change_is_kept() {
        let result = classify_change("Heal for 10 HP.", "Heal for 10 HP!");
        assert_eq!(result.decision, "KEEP");
        assert_eq!(result.confidence, 92);
    }

    #[test]
    fn large_length_delta_is_update() {
        let result = classify_change("Heal.", "Heal for 10 HP over three turns of combat.");
        assert_eq!(result.decision, "UPDATE");
        assert_eq!(result.confidence, 78);
    }

    #[test]
    fn mild_rewrite_falls_through_to_flag() {
        let result = classify_change("Heal target for ten health", "Heal target for ten point of health");
        assert_eq!(result.decision, "FLAG");
        assert_eq!(result.confidence, 45);
    }
}
