use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use rusqlite::Connection;

use crate::error::{CoreError, Result};
use crate::review::{list_approved_for_asset, ApprovedPatchRow};

static SAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]+").unwrap());

fn utc_timestamp_token() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// A single row of a patch export, ready for a caller to serialize to CSV
/// or XLSX. `cn_text` is only populated when at least one row in the
/// asset/locale pair carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRow {
    pub key: Option<String>,
    pub source_text: String,
    pub approved_target_text: String,
    pub row_index: Option<i64>,
    pub sheet_name: Option<String>,
    pub cn_text: Option<String>,
}

/// A flat in-memory patch table. This crate assembles the rows; writing
/// them out as CSV or XLSX bytes is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTable {
    pub rows: Vec<PatchRow>,
    pub includes_cn_text: bool,
    pub suggested_filename: String,
}

fn safe_fragment(value: &str) -> String {
    let cleaned = SAFE_CHARS.replace_all(value.trim(), "_");
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "patch".to_string()
    } else {
        trimmed.to_string()
    }
}

fn asset_id_fragment(asset_id: &str) -> &str {
    let end = asset_id.char_indices().nth(8).map(|(i, _)| i).unwrap_or(asset_id.len());
    &asset_id[..end]
}

/// Builds the patch table for every approved translation of an asset/locale
/// pair, and the filename a caller should save it under. Errors if no
/// approved translation exists for the pair — there is nothing to export.
pub fn build_patch_table(
    conn: &Connection,
    project_slug: &str,
    asset_id: &str,
    target_locale: &str,
    filename_prefix: &str,
    file_format: &str,
) -> Result<PatchTable> {
    let normalized_format = file_format.trim().to_lowercase();
    if normalized_format != "xlsx" && normalized_format != "csv" {
        return Err(CoreError::validation("file_format must be 'xlsx' or 'csv'"));
    }

    let approved: Vec<ApprovedPatchRow> = list_approved_for_asset(conn, asset_id, target_locale)?;
    if approved.is_empty() {
        return Err(CoreError::not_found(
            "no approved translations found for this asset and locale",
        ));
    }

    let includes_cn_text = approved.iter().any(|row| row.cn_text.is_some());
    let rows = approved
        .into_iter()
        .map(|row| PatchRow {
            key: row.key,
            source_text: row.source_text,
            approved_target_text: row.approved_target_text,
            row_index: row.row_index,
            sheet_name: row.sheet_name,
            cn_text: if includes_cn_text { row.cn_text } else { None },
        })
        .collect::<Vec<_>>();

    let suggested_filename = format!(
        "{}_{}_{}_{}_{}.{}",
        safe_fragment(filename_prefix),
        safe_fragment(project_slug),
        asset_id_fragment(asset_id),
        safe_fragment(target_locale),
        utc_timestamp_token(),
        normalized_format,
    );

    Ok(PatchTable {
        rows,
        includes_cn_text,
        suggested_filename,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::upsert_approved_translation;
    use crate::store::Store;

    fn seed_segment(conn: &Connection) -> String {
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
            "INSERT INTO segments(id, asset_id, sheet_name, row_index, key, source_locale, source_text)
             VALUES ('seg1', 'asset1', 'Sheet1', 2, 'greeting', 'en', 'Hello there')",
            [],
        )
        .unwrap();
        "seg1".to_string()
    }

    #[test]
    fn builds_table_and_filename_for_approved_rows() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        let segment_id = seed_segment(conn);
        upsert_approved_translation(conn, &segment_id, "de-DE", "Hallo da", "me").unwrap();

        let table = build_patch_table(conn, "demo", "asset1", "de-DE", "patch", "xlsx").unwrap();
        assert_eq!(table.rows.len(), 1);
        assert!(!table.includes_cn_text);
        assert!(table.suggested_filename.starts_with("patch_demo_asset1_de-DE_"));
        assert!(table.suggested_filename.ends_with(".xlsx"));
    }

    #[test]
    fn rejects_unknown_file_format() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        seed_segment(conn);
        let err = build_patch_table(conn, "demo", "asset1", "de-DE", "patch", "json").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn errors_when_nothing_is_approved() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        seed_segment(conn);
        let err = build_patch_table(conn, "demo", "asset1", "de-DE", "patch", "csv").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
