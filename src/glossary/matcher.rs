use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::store::GlossaryTerm;

static LOCKED_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x{27e6}(?:PH|TERM)_\d+\x{27e7}").unwrap());

/// One must-use term found in some source text, with the replacement text
/// that should appear at that span in the translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermMatch {
    pub term: GlossaryTerm,
    pub start: usize,
    pub end: usize,
    pub source_text: String,
    pub enforced_text: String,
    pub is_compound: bool,
    pub priority: usize,
}

fn span_overlaps(start: usize, end: usize, spans: &[(usize, usize)]) -> bool {
    spans
        .iter()
        .any(|&(s, e)| start < e && s < end)
}

/// Splits `text` into maximal runs of alphanumeric characters, in byte
/// offsets, skipping any run that overlaps a locked placeholder/term token
/// span entirely (not just trimming it).
fn iter_alnum_tokens(text: &str, blocked_spans: &[(usize, usize)]) -> Vec<(usize, usize, String)> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut i = 0usize;
    while i < chars.len() {
        if !chars[i].1.is_alphanumeric() {
            i += 1;
            continue;
        }
        let start = chars[i].0;
        let run_start = i;
        while i < chars.len() && chars[i].1.is_alphanumeric() {
            i += 1;
        }
        let end = if i < chars.len() {
            chars[i].0
        } else {
            text.len()
        };
        if span_overlaps(start, end, blocked_spans) {
            continue;
        }
        let token: String = chars[run_start..i].iter().map(|(_, c)| *c).collect();
        tokens.push((start, end, token));
    }
    tokens
}

fn fold(value: &str, case_sensitive: bool) -> std::borrow::Cow<'_, str> {
    if case_sensitive {
        std::borrow::Cow::Borrowed(value)
    } else {
        std::borrow::Cow::Owned(value.to_lowercase())
    }
}

fn equals(left: &str, right: &str, case_sensitive: bool) -> bool {
    fold(left, case_sensitive) == fold(right, case_sensitive)
}

fn starts_with(value: &str, prefix: &str, case_sensitive: bool) -> bool {
    let value_chars = value.chars().count();
    let prefix_chars = prefix.chars().count();
    if value_chars < prefix_chars {
        return false;
    }
    let prefix_len_bytes: usize = value.chars().take(prefix_chars).map(char::len_utf8).sum();
    equals(&value[..prefix_len_bytes], prefix, case_sensitive)
}

/// Boundaries inside `token` where a compound may be split between a
/// matched prefix and the remainder, mirroring common camelCase / snake
/// boundary conventions plus letter/digit transitions.
fn compound_split_points(token: &str) -> HashSet<usize> {
    let chars: Vec<char> = token.chars().collect();
    let byte_offsets: Vec<usize> = token.char_indices().map(|(i, _)| i).collect();
    let mut points = HashSet::new();

    for index in 1..chars.len() {
        let previous = chars[index - 1];
        let current = chars[index];
        let boundary = byte_offsets[index];

        if previous.is_alphabetic() && current.is_ascii_digit() {
            points.insert(boundary);
            continue;
        }
        if previous.is_ascii_digit() && current.is_alphabetic() {
            points.insert(boundary);
            continue;
        }
        if previous.is_lowercase() && current.is_uppercase() {
            points.insert(boundary);
            continue;
        }
        if previous.is_uppercase()
            && current.is_lowercase()
            && index >= 2
            && chars[index - 2].is_uppercase()
        {
            points.insert(boundary);
            continue;
        }
        if previous.is_uppercase()
            && current.is_uppercase()
            && index + 1 < chars.len()
            && chars[index + 1].is_lowercase()
        {
            points.insert(boundary);
        }
    }

    points
}

fn apply_compound_strategy(full_token: &str, rest: &str, target_term: &str, strategy: &str) -> String {
    match strategy.trim().to_lowercase().as_str() {
        "keep_source" => full_token.to_string(),
        "replace_prefix" => format!("{target_term}{rest}"),
        _ => format!("{target_term}-{rest}"),
    }
}

fn compile_regex(pattern: &str, case_sensitive: bool) -> Option<Regex> {
    let source = if case_sensitive {
        pattern.to_string()
    } else {
        format!("(?i){pattern}")
    };
    Regex::new(&source).ok()
}

/// Negative patterns suppress an otherwise-valid match when they occur
/// anywhere in the full text, or within roughly 48 bytes either side of it
/// (the original 48-codepoint window, approximated in byte units here).
fn is_negative_pattern_blocked(term: &GlossaryTerm, text: &str, start: usize, end: usize) -> bool {
    if term.negative_patterns.is_empty() {
        return false;
    }

    let context_start = start.saturating_sub(48);
    let context_end = (end + 48).min(text.len());
    let context_start = floor_char_boundary(text, context_start);
    let context_end = ceil_char_boundary(text, context_end);
    let context = &text[context_start..context_end];

    for raw_pattern in &term.negative_patterns {
        let Some(pattern) = compile_regex(raw_pattern, term.case_sensitive) else {
            continue;
        };
        if pattern.is_match(text) || pattern.is_match(context) {
            return true;
        }
    }
    false
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

fn find_token_matches(
    text: &str,
    term: &GlossaryTerm,
    tokens: &[(usize, usize, String)],
    priority: usize,
) -> Vec<TermMatch> {
    let mut matches = Vec::new();
    let source = &term.source_term;
    if source.is_empty() {
        return matches;
    }

    for (start, end, token) in tokens {
        let (start, end) = (*start, *end);
        if equals(token, source, term.case_sensitive) {
            if is_negative_pattern_blocked(term, text, start, end) {
                continue;
            }
            matches.push(TermMatch {
                term: term.clone(),
                start,
                end,
                source_text: token.clone(),
                enforced_text: term.target_term.clone(),
                is_compound: false,
                priority,
            });
            continue;
        }

        if !term.allow_compounds {
            continue;
        }
        if !starts_with(token, source, term.case_sensitive) {
            continue;
        }

        let split_chars = source.chars().count();
        let token_chars = token.chars().count();
        if split_chars >= token_chars {
            continue;
        }

        let split_points = compound_split_points(token);
        let split_byte: usize = token.chars().take(split_chars).map(char::len_utf8).sum();
        if !split_points.contains(&split_byte) {
            continue;
        }

        let rest = &token[split_byte..];
        if rest.is_empty() {
            continue;
        }
        if is_negative_pattern_blocked(term, text, start, end) {
            continue;
        }

        matches.push(TermMatch {
            term: term.clone(),
            start,
            end,
            source_text: token.clone(),
            enforced_text: apply_compound_strategy(token, rest, &term.target_term, &term.compound_strategy),
            is_compound: true,
            priority,
        });
    }

    matches
}

fn find_exact_matches(
    text: &str,
    term: &GlossaryTerm,
    blocked_spans: &[(usize, usize)],
    priority: usize,
) -> Vec<TermMatch> {
    if term.source_term.is_empty() {
        return Vec::new();
    }
    let Some(pattern) = compile_regex(&regex::escape(&term.source_term), term.case_sensitive) else {
        return Vec::new();
    };

    let mut output = Vec::new();
    for m in pattern.find_iter(text) {
        let (start, end) = (m.start(), m.end());
        if span_overlaps(start, end, blocked_spans) {
            continue;
        }
        if is_negative_pattern_blocked(term, text, start, end) {
            continue;
        }
        output.push(TermMatch {
            term: term.clone(),
            start,
            end,
            source_text: m.as_str().to_string(),
            enforced_text: term.target_term.clone(),
            is_compound: false,
            priority,
        });
    }
    output
}

/// Resolves overlapping candidate matches into a non-overlapping set,
/// preferring (in order) earlier start, longer span, earlier-declared term,
/// longer source term, then source term text — then re-sorts the survivors
/// by document position.
fn select_non_overlapping(mut matches: Vec<TermMatch>) -> Vec<TermMatch> {
    matches.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
            .then_with(|| a.priority.cmp(&b.priority))
            .then_with(|| b.term.source_term.len().cmp(&a.term.source_term.len()))
            .then_with(|| {
                a.term
                    .source_term
                    .to_lowercase()
                    .cmp(&b.term.source_term.to_lowercase())
            })
    });

    let mut selected: Vec<TermMatch> = Vec::new();
    for candidate in matches {
        let overlaps = selected
            .iter()
            .any(|item| candidate.start < item.end && item.start < candidate.end);
        if overlaps {
            continue;
        }
        selected.push(candidate);
    }

    selected.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));
    selected
}

/// Finds every must-use term occurrence in `text`, respecting each term's
/// match type, compounding rules, and negative patterns, and resolving
/// overlaps so the result is a clean non-overlapping span set.
pub fn find_must_use_matches(text: &str, terms: &[GlossaryTerm]) -> Vec<TermMatch> {
    if text.is_empty() || terms.is_empty() {
        return Vec::new();
    }

    let blocked_spans: Vec<(usize, usize)> = LOCKED_TOKEN_PATTERN
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();
    let tokens = iter_alnum_tokens(text, &blocked_spans);

    let mut matches = Vec::new();
    for (priority, term) in terms.iter().enumerate() {
        match term.match_type.trim().to_lowercase().as_str() {
            "whole_token" | "word_boundary" => {
                matches.extend(find_token_matches(text, term, &tokens, priority));
            }
            "exact" => {
                matches.extend(find_exact_matches(text, term, &blocked_spans, priority));
            }
            _ => {}
        }
    }

    if matches.is_empty() {
        return Vec::new();
    }
    select_non_overlapping(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(source: &str, target: &str, match_type: &str) -> GlossaryTerm {
        GlossaryTerm {
            id: format!("id-{source}"),
            project_id: "demo".to_string(),
            locale_code: "en".to_string(),
            source_term: source.to_string(),
            target_term: target.to_string(),
            rule: "must_use".to_string(),
            match_type: match_type.to_string(),
            case_sensitive: true,
            allow_compounds: false,
            compound_strategy: "hyphenate".to_string(),
            negative_patterns: Vec::new(),
            notes: None,
        }
    }

    #[test]
    fn matches_whole_token_and_skips_partial_overlap() {
        let terms = vec![term("HP", "Health", "whole_token")];
        let matches = find_must_use_matches("Your HP is low, HPX is not a match", &terms);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].source_text, "HP");
        assert_eq!(matches[0].enforced_text, "Health");
    }

    #[test]
    fn compound_allows_hyphenated_suffix() {
        let mut t = term("Mana", "MP", "whole_token");
        t.allow_compounds = true;
        let matches = find_must_use_matches("ManaPool increases", std::slice::from_ref(&t));
        assert_eq!(matches.len(), 1);
        assert!(matches[0].is_compound);
        assert_eq!(matches[0].enforced_text, "MP-Pool");
    }

    #[test]
    fn negative_pattern_suppresses_match() {
        let mut t = term("Fire", "Feu", "whole_token");
        t.negative_patterns = vec!["Firewall".to_string()];
        let matches = find_must_use_matches("A Firewall blocks Fire damage", std::slice::from_ref(&t));
        assert!(matches.is_empty());
    }

    #[test]
    fn overlapping_terms_prefer_longer_source() {
        let terms = vec![
            term("Fire Storm", "Tempête de feu", "exact"),
            term("Fire", "Feu", "whole_token"),
        ];
        let matches = find_must_use_matches("Fire Storm incoming", &terms);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].source_text, "Fire Storm");
    }

    #[test]
    fn locked_tokens_are_never_matched() {
        let terms = vec![term("PH", "x", "whole_token")];
        let matches = find_must_use_matches("value \u{27e6}PH_1\u{27e7} stays locked", &terms);
        assert!(matches.is_empty());
    }
}
