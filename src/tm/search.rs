use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

use super::fuzzy::token_set_ratio;
use super::normalize::normalize_source_text;
use super::store::{row_to_entry, TmEntry, TM_ENTRY_COLUMNS};

static QUOTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"['"]"#).unwrap());
static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmHit {
    pub tm_id: String,
    pub source_text: String,
    pub target_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TmHitWithScore {
    pub tm_id: String,
    pub source_text: String,
    pub target_text: String,
    pub score: f64,
}

/// Strips quotes and non-alphanumeric characters to build an FTS5 `MATCH`
/// expression of distinct, lowercased OR-joined tokens, in first-seen
/// order. Returns an empty string when the query carries no usable tokens.
fn sanitize_fts_query(query_text: &str) -> String {
    let stripped = QUOTE_PATTERN.replace_all(query_text, " ");
    let mut seen = HashSet::new();
    let mut deduped = Vec::new();
    for m in TOKEN_PATTERN.find_iter(&stripped) {
        let lowered = m.as_str().to_lowercase();
        if seen.insert(lowered.clone()) {
            deduped.push(lowered);
        }
    }
    if deduped.is_empty() {
        return String::new();
    }
    deduped
        .iter()
        .map(|token| format!("\"{token}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Looks up the most recently updated translation memory entry whose
/// normalized source hash matches `source_text` exactly.
pub fn find_exact(
    conn: &Connection,
    project_id: &str,
    source_locale: &str,
    target_locale: &str,
    source_text: &str,
) -> Result<Option<TmEntry>> {
    let normalized_hash = super::normalize::normalized_source_hash(source_text);
    let sql = format!(
        "SELECT {TM_ENTRY_COLUMNS} FROM tm_entries
         WHERE project_id = ?1 AND source_locale = ?2 AND target_locale = ?3
           AND normalized_source_hash = ?4
         ORDER BY updated_at DESC, id DESC
         LIMIT 1"
    );
    let entry = conn
        .query_row(
            &sql,
            params![project_id, source_locale, target_locale, normalized_hash],
            row_to_entry,
        )
        .optional()?;
    Ok(entry)
}

/// Full-text search over the TM mirror. When `query_text` sanitizes down
/// to nothing usable (pure punctuation, empty string), falls back to a
/// plain listing ordered to favor an exact source-text match.
pub fn search_fts(
    conn: &Connection,
    project_id: &str,
    source_locale: &str,
    target_locale: &str,
    query_text: &str,
    limit: i64,
) -> Result<Vec<TmHit>> {
    let normalized_limit = limit.max(1);
    let sanitized = sanitize_fts_query(query_text);

    let mut stmt;
    let rows = if !sanitized.is_empty() {
        stmt = conn.prepare(
            "SELECT tm_id, source_text, target_text FROM tm_fts
             WHERE tm_fts MATCH ?1 AND project_id = ?2 AND source_locale = ?3 AND target_locale = ?4
             ORDER BY bm25(tm_fts)
             LIMIT ?5",
        )?;
        stmt.query_map(
            params![sanitized, project_id, source_locale, target_locale, normalized_limit],
            |row| {
                Ok(TmHit {
                    tm_id: row.get(0)?,
                    source_text: row.get(1)?,
                    target_text: row.get(2)?,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?
    } else {
        stmt = conn.prepare(
            "SELECT tm_id, source_text, target_text FROM tm_fts
             WHERE project_id = ?1 AND source_locale = ?2 AND target_locale = ?3
             ORDER BY CASE WHEN source_text = ?4 THEN 0 ELSE 1 END, rowid DESC
             LIMIT ?5",
        )?;
        stmt.query_map(
            params![project_id, source_locale, target_locale, query_text, normalized_limit],
            |row| {
                Ok(TmHit {
                    tm_id: row.get(0)?,
                    source_text: row.get(1)?,
                    target_text: row.get(2)?,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?
    };

    Ok(rows)
}

/// Re-ranks a wider FTS candidate pool by normalized-text similarity,
/// returning the top `limit` hits ordered by descending score (ties broken
/// by `tm_id` for determinism).
pub fn search_fuzzy(
    conn: &Connection,
    project_id: &str,
    source_locale: &str,
    target_locale: &str,
    source_text: &str,
    limit: i64,
) -> Result<Vec<TmHitWithScore>> {
    let normalized_limit = limit.max(1);
    let candidates = search_fts(
        conn,
        project_id,
        source_locale,
        target_locale,
        source_text,
        (normalized_limit * 10).max(50),
    )?;

    let normalized_source = normalize_source_text(source_text);
    let mut scored: Vec<TmHitWithScore> = candidates
        .into_iter()
        .map(|hit| {
            let score = token_set_ratio(&normalized_source, &normalize_source_text(&hit.source_text));
            TmHitWithScore {
                tm_id: hit.tm_id,
                source_text: hit.source_text,
                target_text: hit.target_text,
                score,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.tm_id.cmp(&b.tm_id))
    });
    scored.truncate(normalized_limit as usize);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_and_dedupes_query_tokens() {
        assert_eq!(sanitize_fts_query("Hello, \"hello\" world!"), "\"hello\" OR \"world\"");
        assert_eq!(sanitize_fts_query("   !!! "), "");
    }
}
