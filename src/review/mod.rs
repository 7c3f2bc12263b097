pub mod assembly;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::store::now_iso;
use crate::tm;

pub use assembly::{assemble_review_rows, ReviewRowAssembly};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetListItem {
    pub id: String,
    pub original_name: Option<String>,
    pub received_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRow {
    pub id: String,
    pub asset_id: String,
    pub row_index: Option<i64>,
    pub key: Option<String>,
    pub source_text: String,
    pub source_text_old: Option<String>,
    pub cn_text: Option<String>,
    pub sheet_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRow {
    pub id: String,
    pub segment_id: String,
    pub target_locale: String,
    pub candidate_text: String,
    pub candidate_type: String,
    pub score: f64,
    pub model_info_json: String,
    pub generated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedPatchRow {
    pub segment_id: String,
    pub row_index: Option<i64>,
    pub key: Option<String>,
    pub source_text: String,
    pub approved_target_text: String,
    pub cn_text: Option<String>,
    pub sheet_name: Option<String>,
}

pub fn list_assets(conn: &Connection, project_id: &str) -> Result<Vec<AssetListItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, original_name, received_at FROM assets WHERE project_id = ?1 ORDER BY received_at DESC",
    )?;
    let rows = stmt
        .query_map(params![project_id], |row| {
            Ok(AssetListItem {
                id: row.get(0)?,
                original_name: row.get(1)?,
                received_at: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn list_segments(conn: &Connection, asset_id: &str) -> Result<Vec<SegmentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, asset_id, row_index, key, source_text, source_text_old, cn_text, sheet_name
         FROM segments WHERE asset_id = ?1 ORDER BY row_index, id",
    )?;
    let rows = stmt
        .query_map(params![asset_id], |row| {
            Ok(SegmentRow {
                id: row.get(0)?,
                asset_id: row.get(1)?,
                row_index: row.get(2)?,
                key: row.get(3)?,
                source_text: row.get(4)?,
                source_text_old: row.get(5)?,
                cn_text: row.get(6)?,
                sheet_name: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub struct UpsertCandidate<'a> {
    pub segment_id: &'a str,
    pub target_locale: &'a str,
    pub candidate_text: &'a str,
    pub candidate_type: &'a str,
    pub score: f64,
    pub model_info_json: &'a str,
    pub generated_at: Option<&'a str>,
}

/// Inserts or updates the candidate keyed by `(segment, locale,
/// candidate_type)` — the latest row of that type is replaced in place,
/// never duplicated.
pub fn upsert_candidate(conn: &Connection, candidate: UpsertCandidate<'_>) -> Result<String> {
    let generated_at = candidate.generated_at.map(str::to_string).unwrap_or_else(now_iso);

    let existing_id: Option<String> = conn
        .query_row(
            "SELECT id FROM translation_candidates
             WHERE segment_id = ?1 AND target_locale = ?2 AND candidate_type = ?3
             ORDER BY generated_at DESC, id DESC
             LIMIT 1",
            params![candidate.segment_id, candidate.target_locale, candidate.candidate_type],
            |row| row.get(0),
        )
        .optional()?;

    let candidate_id = match existing_id {
        None => {
            let candidate_id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO translation_candidates(
                    id, segment_id, target_locale, candidate_text, candidate_type, score,
                    model_info_json, generated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    candidate_id,
                    candidate.segment_id,
                    candidate.target_locale,
                    candidate.candidate_text,
                    candidate.candidate_type,
                    candidate.score,
                    candidate.model_info_json,
                    generated_at,
                ],
            )?;
            candidate_id
        }
        Some(candidate_id) => {
            conn.execute(
                "UPDATE translation_candidates
                 SET candidate_text = ?1, score = ?2, model_info_json = ?3, generated_at = ?4
                 WHERE id = ?5",
                params![
                    candidate.candidate_text,
                    candidate.score,
                    candidate.model_info_json,
                    generated_at,
                    candidate_id,
                ],
            )?;
            candidate_id
        }
    };

    Ok(candidate_id)
}

/// Replaces the `change_proposed` candidate for a segment/locale — the
/// natural-key target both change-variant job runners write to.
pub fn upsert_change_proposal(
    conn: &Connection,
    segment_id: &str,
    target_locale: &str,
    candidate_text: &str,
    score: f64,
    model_info_json: &str,
) -> Result<String> {
    upsert_candidate(
        conn,
        UpsertCandidate {
            segment_id,
            target_locale,
            candidate_text,
            candidate_type: "change_proposed",
            score,
            model_info_json,
            generated_at: None,
        },
    )
}

pub fn get_latest_candidate(
    conn: &Connection,
    segment_id: &str,
    target_locale: &str,
) -> Result<Option<CandidateRow>> {
    conn.query_row(
        "SELECT id, segment_id, target_locale, candidate_text, candidate_type, score,
                model_info_json, generated_at
         FROM translation_candidates
         WHERE segment_id = ?1 AND target_locale = ?2
         ORDER BY generated_at DESC, id DESC
         LIMIT 1",
        params![segment_id, target_locale],
        |row| {
            Ok(CandidateRow {
                id: row.get(0)?,
                segment_id: row.get(1)?,
                target_locale: row.get(2)?,
                candidate_text: row.get(3)?,
                candidate_type: row.get(4)?,
                score: row.get(5)?,
                model_info_json: row.get(6)?,
                generated_at: row.get(7)?,
            })
        },
    )
    .optional()
    .map_err(CoreError::from)
}

pub fn get_latest_candidate_of_type(
    conn: &Connection,
    segment_id: &str,
    target_locale: &str,
    candidate_type: &str,
) -> Result<Option<CandidateRow>> {
    conn.query_row(
        "SELECT id, segment_id, target_locale, candidate_text, candidate_type, score,
                model_info_json, generated_at
         FROM translation_candidates
         WHERE segment_id = ?1 AND target_locale = ?2 AND candidate_type = ?3
         ORDER BY generated_at DESC, id DESC
         LIMIT 1",
        params![segment_id, target_locale, candidate_type],
        |row| {
            Ok(CandidateRow {
                id: row.get(0)?,
                segment_id: row.get(1)?,
                target_locale: row.get(2)?,
                candidate_text: row.get(3)?,
                candidate_type: row.get(4)?,
                score: row.get(5)?,
                model_info_json: row.get(6)?,
                generated_at: row.get(7)?,
            })
        },
    )
    .optional()
    .map_err(CoreError::from)
}

/// Deletes every candidate of `candidate_type` for a segment/locale; used
/// to retract a stale `change_proposed`/`change_flagged_proposed` row when
/// a later pass decides the segment no longer needs one.
pub fn delete_candidates_of_type(
    conn: &Connection,
    segment_id: &str,
    target_locale: &str,
    candidate_type: &str,
) -> Result<()> {
    conn.execute(
        "DELETE FROM translation_candidates WHERE segment_id = ?1 AND target_locale = ?2 AND candidate_type = ?3",
        params![segment_id, target_locale, candidate_type],
    )?;
    Ok(())
}

/// Upserts the approved translation for `(segment, locale)` and, in the
/// same transaction, learns it into translation memory keyed by the
/// segment's own project/source-locale/source-text, with
/// `origin_row_ref = "{sheet}:{row_index}"`.
pub fn upsert_approved_translation(
    conn: &Connection,
    segment_id: &str,
    target_locale: &str,
    final_text: &str,
    approved_by: &str,
) -> Result<String> {
    if final_text.trim().is_empty() {
        return Err(CoreError::validation("approval text must not be empty"));
    }

    let now = now_iso();
    let approval_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO approved_translations(
            id, segment_id, target_locale, final_text, status, approved_by, approved_at,
            revision_of_id, is_pinned
         ) VALUES (?1, ?2, ?3, ?4, 'approved', ?5, ?6, NULL, 0)
         ON CONFLICT(segment_id, target_locale) DO UPDATE SET
            final_text = excluded.final_text,
            status = excluded.status,
            approved_by = excluded.approved_by,
            approved_at = excluded.approved_at",
        params![approval_id, segment_id, target_locale, final_text, approved_by, now],
    )?;

    let approval_id: String = conn.query_row(
        "SELECT id FROM approved_translations WHERE segment_id = ?1 AND target_locale = ?2",
        params![segment_id, target_locale],
        |row| row.get(0),
    )?;

    let (project_id, source_locale, source_text, sheet_name, row_index): (
        String,
        String,
        String,
        Option<String>,
        Option<i64>,
    ) = conn.query_row(
        "SELECT a.project_id, s.source_locale, s.source_text, s.sheet_name, s.row_index
         FROM segments AS s
         INNER JOIN assets AS a ON a.id = s.asset_id
         WHERE s.id = ?1",
        params![segment_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
    )?;

    let origin_row_ref = format!("{}:{}", sheet_name.unwrap_or_default(), row_index.unwrap_or_default());

    tm::upsert_tm_entry(
        conn,
        tm::UpsertTmEntry {
            project_id: &project_id,
            source_locale: &source_locale,
            target_locale,
            source_text: &source_text,
            target_text: final_text,
            origin: "approval",
            origin_asset_id: None,
            origin_row_ref: Some(&origin_row_ref),
            quality_tag: "trusted",
        },
    )?;

    Ok(approval_id)
}

pub fn list_approved_for_asset(
    conn: &Connection,
    asset_id: &str,
    target_locale: &str,
) -> Result<Vec<ApprovedPatchRow>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.row_index, s.key, s.source_text, a.final_text, s.cn_text, s.sheet_name
         FROM approved_translations AS a
         INNER JOIN segments AS s ON s.id = a.segment_id
         WHERE s.asset_id = ?1 AND a.target_locale = ?2
         ORDER BY s.row_index, s.id",
    )?;
    let rows = stmt
        .query_map(params![asset_id, target_locale], |row| {
            Ok(ApprovedPatchRow {
                segment_id: row.get(0)?,
                row_index: row.get(1)?,
                key: row.get(2)?,
                source_text: row.get(3)?,
                approved_target_text: row.get(4)?,
                cn_text: row.get(5)?,
                sheet_name: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
