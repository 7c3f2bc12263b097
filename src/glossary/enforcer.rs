use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::matcher::find_must_use_matches;
use super::store::GlossaryTerm;

static TERM_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\x{27e6}TERM_(\d+)\x{27e7}$").unwrap());

/// One must-use term occurrence the enforcer expects the translator to
/// preserve, recorded before its token is substituted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedEnforcement {
    pub token: String,
    pub source_term: String,
    pub target_term: String,
    pub enforced_text: String,
    pub start: usize,
    pub end: usize,
    pub is_compound: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementResult {
    pub original_text: String,
    pub text_with_term_tokens: String,
    pub term_map: HashMap<String, String>,
    pub expected_enforcements: Vec<ExpectedEnforcement>,
}

/// Replaces every must-use term occurrence in `text` with an opaque
/// `⟦TERM_k⟧` token (1-based, document order), so a translator cannot
/// rephrase a term that must be carried through verbatim.
pub fn enforce_must_use(text: &str, terms: &[GlossaryTerm]) -> EnforcementResult {
    let matches = find_must_use_matches(text, terms);
    if matches.is_empty() {
        return EnforcementResult {
            original_text: text.to_string(),
            text_with_term_tokens: text.to_string(),
            term_map: HashMap::new(),
            expected_enforcements: Vec::new(),
        };
    }

    let mut chunks = String::with_capacity(text.len());
    let mut term_map = HashMap::new();
    let mut expected = Vec::with_capacity(matches.len());
    let mut cursor = 0usize;

    for (index, m) in matches.into_iter().enumerate() {
        let token = format!("\u{27e6}TERM_{}\u{27e7}", index + 1);
        chunks.push_str(&text[cursor..m.start]);
        chunks.push_str(&token);
        cursor = m.end;

        term_map.insert(token.clone(), m.enforced_text.clone());
        expected.push(ExpectedEnforcement {
            token,
            source_term: m.term.source_term,
            target_term: m.term.target_term,
            enforced_text: m.enforced_text,
            start: m.start,
            end: m.end,
            is_compound: m.is_compound,
        });
    }
    chunks.push_str(&text[cursor..]);

    EnforcementResult {
        original_text: text.to_string(),
        text_with_term_tokens: chunks,
        term_map,
        expected_enforcements: expected,
    }
}

fn term_token_sort_key(token: &str) -> (u64, &str) {
    match TERM_TOKEN_PATTERN.captures(token) {
        Some(caps) => (caps[1].parse().unwrap_or(u64::MAX), token),
        None => (u64::MAX, token),
    }
}

/// Replaces each `⟦TERM_k⟧` token with its mapped text, substituting in
/// ascending numeric order so `TERM_10` is never mistaken for `TERM_1`
/// followed by a literal `"0"`.
pub fn reinject_term_tokens(text: &str, term_map: &HashMap<String, String>) -> String {
    if term_map.is_empty() {
        return text.to_string();
    }

    let mut tokens: Vec<&String> = term_map.keys().collect();
    tokens.sort_by_key(|token| term_token_sort_key(token));

    let mut output = text.to_string();
    for token in tokens {
        output = output.replace(token.as_str(), &term_map[token]);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(source: &str, target: &str) -> GlossaryTerm {
        GlossaryTerm {
            id: format!("id-{source}"),
            project_id: "demo".to_string(),
            locale_code: "en".to_string(),
            source_term: source.to_string(),
            target_term: target.to_string(),
            rule: "must_use".to_string(),
            match_type: "whole_token".to_string(),
            case_sensitive: true,
            allow_compounds: false,
            compound_strategy: "hyphenate".to_string(),
            negative_patterns: Vec::new(),
            notes: None,
        }
    }

    #[test]
    fn enforce_and_reinject_round_trips() {
        let terms = vec![term("HP", "Health"), term("MP", "Mana")];
        let result = enforce_must_use("HP and MP both matter", &terms);
        assert_eq!(result.expected_enforcements.len(), 2);
        assert!(result.text_with_term_tokens.contains("TERM_1"));
        assert!(result.text_with_term_tokens.contains("TERM_2"));

        let restored = reinject_term_tokens(&result.text_with_term_tokens, &result.term_map);
        assert_eq!(restored, "Health and Mana both matter");
    }

    #[test]
    fn numeric_sort_avoids_term_10_vs_term_1_ambiguity() {
        let mut term_map = HashMap::new();
        for i in 1..=11 {
            term_map.insert(format!("\u{27e6}TERM_{i}\u{27e7}"), format!("v{i}"));
        }
        let text = (1..=11)
            .map(|i| format!("\u{27e6}TERM_{i}\u{27e7}"))
            .collect::<Vec<_>>()
            .join(",");
        let restored = reinject_term_tokens(&text, &term_map);
        assert_eq!(restored, "v1,v2,v3,v4,v5,v6,v7,v8,v9,v10,v11");
    }

    #[test]
    fn no_matches_returns_text_unchanged() {
        let result = enforce_must_use("nothing to see here", &[]);
        assert_eq!(result.text_with_term_tokens, "nothing to see here");
        assert!(result.term_map.is_empty());
    }
}
