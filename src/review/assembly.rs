use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::Result;
use crate::qa::{list_unresolved_qa_flags, QaFlagRecord};

use super::SegmentRow;

/// One row of the change-review surface for a single (asset, locale) pair.
///
/// `baseline` is what a reviewer compares against: the already-approved
/// text if one exists, else the `existing_target` candidate carried over
/// from the prior import. `proposed` is what the reviewer is being asked to
/// accept: the latest change-variant candidate if the job pipeline produced
/// one, else whatever non-baseline candidate is freshest.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRowAssembly {
    pub segment_id: String,
    pub row_index: Option<i64>,
    pub key: Option<String>,
    pub sheet_name: Option<String>,
    pub source_text: String,
    pub source_text_old: Option<String>,
    pub baseline_text: Option<String>,
    pub proposed_text: Option<String>,
    pub is_changed: bool,
    pub change_decision: Option<String>,
    pub change_confidence: Option<f64>,
    pub change_reason: Option<String>,
    pub has_qa_flags: bool,
    pub qa_messages: Vec<String>,
}

struct CandidateSlot {
    candidate_text: String,
    candidate_type: String,
    model_info_json: String,
}

fn load_candidate_of_types(
    conn: &Connection,
    segment_id: &str,
    target_locale: &str,
    candidate_types: &[&str],
) -> Result<Option<CandidateSlot>> {
    let placeholders = candidate_types
        .iter()
        .enumerate()
        .map(|(i, _)| format!("?{}", i + 3))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT candidate_text, candidate_type, model_info_json
         FROM translation_candidates
         WHERE segment_id = ?1 AND target_locale = ?2 AND candidate_type IN ({placeholders})
         ORDER BY generated_at DESC, id DESC
         LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut query_params: Vec<&dyn rusqlite::ToSql> = vec![&segment_id, &target_locale];
    for candidate_type in candidate_types {
        query_params.push(candidate_type);
    }
    let mut rows = stmt.query(query_params.as_slice())?;
    if let Some(row) = rows.next()? {
        Ok(Some(CandidateSlot {
            candidate_text: row.get(0)?,
            candidate_type: row.get(1)?,
            model_info_json: row.get(2)?,
        }))
    } else {
        Ok(None)
    }
}

fn load_latest_candidate_excluding(
    conn: &Connection,
    segment_id: &str,
    target_locale: &str,
    excluded_type: &str,
) -> Result<Option<CandidateSlot>> {
    conn.query_row(
        "SELECT candidate_text, candidate_type, model_info_json
         FROM translation_candidates
         WHERE segment_id = ?1 AND target_locale = ?2 AND candidate_type != ?3
         ORDER BY generated_at DESC, id DESC
         LIMIT 1",
        params![segment_id, target_locale, excluded_type],
        |row| {
            Ok(CandidateSlot {
                candidate_text: row.get(0)?,
                candidate_type: row.get(1)?,
                model_info_json: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

fn load_approved_text(conn: &Connection, segment_id: &str, target_locale: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT final_text FROM approved_translations WHERE segment_id = ?1 AND target_locale = ?2",
        params![segment_id, target_locale],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

fn extract_change_fields(model_info_json: &str) -> (Option<String>, Option<f64>, Option<String>) {
    let parsed: Value = serde_json::from_str(model_info_json).unwrap_or(Value::Null);
    let decision = parsed.get("change_decision").and_then(Value::as_str).map(str::to_string);
    let confidence = parsed.get("change_confidence").and_then(Value::as_f64);
    let reason = parsed.get("change_reason").and_then(Value::as_str).map(str::to_string);
    (decision, confidence, reason)
}

fn extract_change_fields_from_flag(flag: &QaFlagRecord) -> (Option<String>, Option<f64>, Option<String>) {
    let decision = flag.span.get("change_decision").and_then(Value::as_str).map(str::to_string);
    let confidence = flag.span.get("change_confidence").and_then(Value::as_f64);
    let reason = Some(flag.message.clone());
    (decision, confidence, reason)
}

/// Builds one [`ReviewRowAssembly`] per segment of `asset_id`, richer than a
/// flat candidate/approval listing: it resolves a baseline/proposed pair,
/// bundles unresolved QA messages, and surfaces the change decision a
/// stale-source re-import produced (if any).
pub fn assemble_review_rows(
    conn: &Connection,
    asset_id: &str,
    target_locale: &str,
) -> Result<Vec<ReviewRowAssembly>> {
    let segments = super::list_segments(conn, asset_id)?;
    let mut rows = Vec::with_capacity(segments.len());

    for segment in segments {
        rows.push(assemble_one(conn, &segment, target_locale)?);
    }

    Ok(rows)
}

fn assemble_one(conn: &Connection, segment: &SegmentRow, target_locale: &str) -> Result<ReviewRowAssembly> {
    let approved_text = load_approved_text(conn, &segment.id, target_locale)?;

    let baseline_text = match approved_text {
        Some(text) => Some(text),
        None => {
            load_candidate_of_types(conn, &segment.id, target_locale, &["existing_target"])?
                .map(|slot| slot.candidate_text)
        }
    };

    let proposed = match load_candidate_of_types(
        conn,
        &segment.id,
        target_locale,
        &["change_proposed", "change_flagged_proposed"],
    )? {
        Some(slot) => Some(slot),
        None => load_latest_candidate_excluding(conn, &segment.id, target_locale, "existing_target")?,
    };

    let (change_decision, change_confidence, change_reason, proposed_text) = match &proposed {
        Some(slot) => {
            let (decision, confidence, reason) = extract_change_fields(&slot.model_info_json);
            (decision, confidence, reason, Some(slot.candidate_text.clone()))
        }
        None => (None, None, None, None),
    };

    let qa_flags = list_unresolved_qa_flags(conn, &segment.id, target_locale)?;
    let has_qa_flags = !qa_flags.is_empty();
    let qa_messages: Vec<String> = qa_flags.iter().map(|flag| flag.message.clone()).collect();

    let (change_decision, change_confidence, change_reason) =
        if change_decision.is_none() && change_reason.is_none() {
            qa_flags
                .iter()
                .find(|flag| flag.issue_type == "stale_source_change" || flag.issue_type == "impact_flagged")
                .map(extract_change_fields_from_flag)
                .unwrap_or((change_decision, change_confidence, change_reason))
        } else {
            (change_decision, change_confidence, change_reason)
        };

    let is_changed = match &segment.source_text_old {
        Some(old) => old.trim() != segment.source_text.trim(),
        None => false,
    };

    Ok(ReviewRowAssembly {
        segment_id: segment.id.clone(),
        row_index: segment.row_index,
        key: segment.key.clone(),
        sheet_name: segment.sheet_name.clone(),
        source_text: segment.source_text.clone(),
        source_text_old: segment.source_text_old.clone(),
        baseline_text,
        proposed_text,
        is_changed,
        change_decision,
        change_confidence,
        change_reason,
        has_qa_flags,
        qa_messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{upsert_candidate, upsert_change_proposal, UpsertCandidate};
    use crate::store::Store;

    fn seed_segment(conn: &Connection, source_text_old: Option<&str>) -> String {
        conn.execute(
            "INSERT INTO projects(id, name, slug, default_source_locale, default_target_locale, created_at, updated_at)
             VALUES ('demo', 'Demo', 'demo', 'en', 'de-DE', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO assets(id, project_id, asset_type, received_at) VALUES ('asset1', 'demo', 'xlsx', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO segments(id, asset_id, sheet_name, row_index, source_locale, source_text, source_text_old)
             VALUES ('seg1', 'asset1', 'Sheet1', 2, 'en', 'Heal for 10 HP', ?1)",
            params![source_text_old],
        )
        .unwrap();
        "seg1".to_string()
    }

    #[test]
    fn resolves_baseline_from_existing_target_when_unapproved() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        seed_segment(conn, None);

        upsert_candidate(
            conn,
            UpsertCandidate {
                segment_id: "seg1",
                target_locale: "de-DE",
                candidate_text: "Heile um 10 HP",
                candidate_type: "existing_target",
                score: 1.0,
                model_info_json: "{}",
                generated_at: None,
            },
        )
        .unwrap();

        let rows = assemble_review_rows(conn, "asset1", "de-DE").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].baseline_text.as_deref(), Some("Heile um 10 HP"));
        assert!(!rows[0].is_changed);
    }

    #[test]
    fn proposed_prefers_change_proposed_and_exposes_decision() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        seed_segment(conn, Some("Heal for 5 HP"));

        upsert_change_proposal(
            conn,
            "seg1",
            "de-DE",
            "Heile um 10 HP",
            0.9,
            r#"{"change_decision":"UPDATE","change_confidence":0.82,"change_reason":"length delta"}"#,
        )
        .unwrap();

        let rows = assemble_review_rows(conn, "asset1", "de-DE").unwrap();
        assert_eq!(rows[0].proposed_text.as_deref(), Some("Heile um 10 HP"));
        assert_eq!(rows[0].change_decision.as_deref(), Some("UPDATE"));
        assert!(rows[0].is_changed);
    }

    #[test]
    fn bundles_unresolved_qa_messages() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        seed_segment(conn, None);

        crate::qa::replace_qa_flags(
            conn,
            "seg1",
            "de-DE",
            &[crate::qa::QaIssue::with_span(
                "placeholder_mismatch",
                "error",
                "missing {amount}",
                serde_json::json!({}),
            )],
        )
        .unwrap();

        let rows = assemble_review_rows(conn, "asset1", "de-DE").unwrap();
        assert!(rows[0].has_qa_flags);
        assert_eq!(rows[0].qa_messages, vec!["missing {amount}".to_string()]);
    }
}
