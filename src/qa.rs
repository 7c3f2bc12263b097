use rusqlite::{params, Connection};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::glossary::enforcer::ExpectedEnforcement;
use crate::placeholder::validate_placeholders;
use crate::store::now_iso;

/// A single quality issue surfaced against a translated segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaIssue {
    pub issue_type: &'static str,
    pub severity: &'static str,
    pub message: String,
    pub span: Value,
}

impl QaIssue {
    fn new(issue_type: &'static str, severity: &'static str, message: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity,
            message: message.into(),
            span: json!({}),
        }
    }

    /// Builds an issue with an explicit span payload, for flag types the
    /// job orchestrator derives outside the placeholder/newline/glossary
    /// checks (`stale_source_change`, `impact_flagged`).
    pub fn with_span(
        issue_type: &'static str,
        severity: &'static str,
        message: impl Into<String>,
        span: Value,
    ) -> Self {
        Self {
            issue_type,
            severity,
            message: message.into(),
            span,
        }
    }
}

/// A QA flag as persisted against a segment/locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaFlagRecord {
    pub id: String,
    pub segment_id: String,
    pub target_locale: String,
    pub issue_type: String,
    pub severity: String,
    pub message: String,
    pub span: Value,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

/// Deletes every existing flag for `(segment_id, target_locale)` and
/// inserts `issues` in place, so a re-run of the pipeline never leaves
/// stale flags behind from a prior candidate generation.
pub fn replace_qa_flags(
    conn: &Connection,
    segment_id: &str,
    target_locale: &str,
    issues: &[QaIssue],
) -> Result<()> {
    conn.execute(
        "DELETE FROM qa_flags WHERE segment_id = ?1 AND target_locale = ?2",
        params![segment_id, target_locale],
    )?;

    let now = now_iso();
    for issue in issues {
        conn.execute(
            "INSERT INTO qa_flags(id, segment_id, target_locale, type, severity, message, span_json,
                                   created_at, resolved_at, resolved_by, resolution)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, NULL)",
            params![
                Uuid::new_v4().to_string(),
                segment_id,
                target_locale,
                issue.issue_type,
                issue.severity,
                issue.message,
                issue.span.to_string(),
                now,
            ],
        )?;
    }
    Ok(())
}

/// Flags still outstanding for a segment/locale, in creation order.
pub fn list_unresolved_qa_flags(
    conn: &Connection,
    segment_id: &str,
    target_locale: &str,
) -> Result<Vec<QaFlagRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, segment_id, target_locale, type, severity, message, span_json, created_at, resolved_at
         FROM qa_flags
         WHERE segment_id = ?1 AND target_locale = ?2 AND resolved_at IS NULL
         ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map(params![segment_id, target_locale], |row| {
            let span_raw: String = row.get(6)?;
            Ok(QaFlagRecord {
                id: row.get(0)?,
                segment_id: row.get(1)?,
                target_locale: row.get(2)?,
                issue_type: row.get(3)?,
                severity: row.get(4)?,
                message: row.get(5)?,
                span: serde_json::from_str(&span_raw).unwrap_or(json!({})),
                created_at: row.get(7)?,
                resolved_at: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Flags any placeholder that went missing, was duplicated, or changed
/// order between `source` and `target`.
pub fn check_placeholders_unchanged(source: &str, target: &str) -> Vec<QaIssue> {
    validate_placeholders(source, target)
        .into_iter()
        .map(|message| QaIssue::new("placeholder_mismatch", "error", message))
        .collect()
}

/// Flags a change in the number of real newlines or in the number of
/// literal `\n` escape sequences; the two are tracked independently since a
/// translator can corrupt either without touching the other.
pub fn check_newlines_preserved(source: &str, target: &str) -> Vec<QaIssue> {
    let mut issues = Vec::new();

    let source_newlines = source.matches('\n').count();
    let target_newlines = target.matches('\n').count();
    if source_newlines != target_newlines {
        let mut issue = QaIssue::new(
            "newline_mismatch",
            "error",
            format!(
                "Actual newline count changed (expected {source_newlines}, found {target_newlines})."
            ),
        );
        issue.span = json!({"kind": "newline"});
        issues.push(issue);
    }

    let source_escaped = source.matches("\\n").count();
    let target_escaped = target.matches("\\n").count();
    if source_escaped != target_escaped {
        let mut issue = QaIssue::new(
            "newline_mismatch",
            "error",
            format!(
                "Escaped newline count changed (expected {source_escaped}, found {target_escaped})."
            ),
        );
        issue.span = json!({"kind": "escaped_newline"});
        issues.push(issue);
    }

    issues
}

/// Flags glossary term enforcement failures in a translated segment: a
/// `⟦TERM_k⟧` token the translator mangled before reinjection, a token that
/// survived untouched into the final text, or an expected target term that
/// appears fewer times in the final text than the enforcement called for.
pub fn check_glossary_compliance(
    final_text_with_tokens: &str,
    final_text: &str,
    expected: &[ExpectedEnforcement],
) -> Vec<QaIssue> {
    let mut issues = Vec::new();

    for enforcement in expected {
        if !final_text_with_tokens.contains(&enforcement.token) {
            issues.push(QaIssue::new(
                "glossary_violation",
                "error",
                format!(
                    "Glossary term token '{}' for source term '{}' was altered before reinjection.",
                    enforcement.token, enforcement.source_term
                ),
            ));
        }
    }

    if final_text.contains('\u{27e6}') {
        for enforcement in expected {
            if final_text.contains(&enforcement.token) {
                issues.push(QaIssue::new(
                    "glossary_violation",
                    "error",
                    format!(
                        "Glossary token '{}' survived into the final text untranslated.",
                        enforcement.token
                    ),
                ));
            }
        }
    }

    let mut required_counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for enforcement in expected {
        *required_counts.entry(enforcement.enforced_text.as_str()).or_insert(0) += 1;
    }
    for (term_text, required) in required_counts {
        let found = final_text.matches(term_text).count();
        if found < required {
            issues.push(QaIssue::new(
                "glossary_violation",
                "error",
                format!(
                    "Expected target term '{term_text}' to appear at least {required} time(s), found {found}."
                ),
            ));
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_flag_missing_entries() {
        let issues = check_placeholders_unchanged("Hit {target} for {amount}", "Hit {target}");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, "placeholder_mismatch");
    }

    #[test]
    fn newlines_track_real_and_escaped_independently() {
        let issues = check_newlines_preserved("line one\nline two", "line one line two");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].span, json!({"kind": "newline"}));

        let issues = check_newlines_preserved("has \\n escape", "has no escape");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].span, json!({"kind": "escaped_newline"}));
    }

    #[test]
    fn glossary_compliance_flags_missing_required_term() {
        let expected = vec![ExpectedEnforcement {
            token: "\u{27e6}TERM_1\u{27e7}".to_string(),
            source_term: "HP".to_string(),
            target_term: "Health".to_string(),
            enforced_text: "Health".to_string(),
            start: 0,
            end: 2,
            is_compound: false,
        }];
        let issues = check_glossary_compliance(
            "\u{27e6}TERM_1\u{27e7} is low",
            "Vitality is low",
            &expected,
        );
        assert!(issues.iter().any(|i| i.message.contains("Health")));
    }

    #[test]
    fn glossary_compliance_flags_surviving_token() {
        let expected = vec![ExpectedEnforcement {
            token: "\u{27e6}TERM_1\u{27e7}".to_string(),
            source_term: "HP".to_string(),
            target_term: "Health".to_string(),
            enforced_text: "Health".to_string(),
            start: 0,
            end: 2,
            is_compound: false,
        }];
        let issues = check_glossary_compliance(
            "\u{27e6}TERM_1\u{27e7} is low",
            "\u{27e6}TERM_1\u{27e7} is low",
            &expected,
        );
        assert!(issues
            .iter()
            .any(|i| i.message.contains("survived into the final text")));
    }

    #[test]
    fn glossary_compliance_passes_clean_translation() {
        let expected = vec![ExpectedEnforcement {
            token: "\u{27e6}TERM_1\u{27e7}".to_string(),
            source_term: "HP".to_string(),
            target_term: "Health".to_string(),
            enforced_text: "Health".to_string(),
            start: 0,
            end: 2,
            is_compound: false,
        }];
        let issues = check_glossary_compliance(
            "\u{27e6}TERM_1\u{27e7} is low",
            "Health is low",
            &expected,
        );
        assert!(issues.is_empty());
    }
}
