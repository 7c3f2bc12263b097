pub mod fingerprint;

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::store::now_iso;

use fingerprint::compute_schema_signature;

/// A read-only view over tabular row data. The importer never parses raw
/// bytes itself; a caller hands it this view plus file metadata.
pub trait RowView {
    fn column_names(&self) -> &[String];
    fn row_count(&self) -> usize;
    /// Cell value at `row` for `column`, or `None` for a null/missing cell.
    fn cell(&self, row: usize, column: &str) -> Option<String>;
    /// The row-view's own notion of row identity (e.g. a spreadsheet row
    /// number), if one exists independent of iteration position.
    fn original_index(&self, row: usize) -> Option<i64>;
}

/// In-memory row view used by tests and by callers without a richer
/// tabular source.
pub struct MemoryRowView {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowView for MemoryRowView {
    fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, column: &str) -> Option<String> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(index).cloned().flatten()
    }

    fn original_index(&self, _row: usize) -> Option<i64> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Lp,
    ChangeSourceUpdate,
}

#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pub mode: ImportMode,
    pub source_new: String,
    pub source_old: Option<String>,
    pub target: Option<String>,
    pub target_locale: Option<String>,
    pub cn: Option<String>,
    pub key: Option<String>,
    pub char_limit: Option<String>,
    pub context: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub asset_id: String,
    pub schema_profile_id: String,
    pub signature: String,
    pub imported_rows: usize,
    pub skipped_rows: usize,
    pub mapped_columns: serde_json::Value,
}

fn clean(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn unique_preserve(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut output = Vec::new();
    for value in values {
        let normalized = value.trim().to_string();
        if normalized.is_empty() || !seen.insert(normalized.clone()) {
            continue;
        }
        output.push(normalized);
    }
    output
}

fn validate_mapping(mapping: &ColumnMapping, available: &[String]) -> Result<()> {
    let available_set: HashSet<&str> = available.iter().map(String::as_str).collect();

    if mapping.source_new.trim().is_empty() {
        return Err(CoreError::validation("a source column is required"));
    }
    if !available_set.contains(mapping.source_new.as_str()) {
        return Err(CoreError::validation(format!(
            "mapped source column does not exist: {}",
            mapping.source_new
        )));
    }

    if mapping.mode == ImportMode::ChangeSourceUpdate {
        let Some(source_old) = &mapping.source_old else {
            return Err(CoreError::validation(
                "mode change_source_update requires source_old",
            ));
        };
        if !available_set.contains(source_old.as_str()) {
            return Err(CoreError::validation(format!(
                "mapped column does not exist: {source_old}"
            )));
        }
    }

    if mapping.target_locale.is_some() && mapping.target.is_none() {
        return Err(CoreError::validation(
            "setting target_locale without target is invalid",
        ));
    }

    for optional in [&mapping.target, &mapping.cn, &mapping.key, &mapping.char_limit] {
        if let Some(column) = optional {
            if !available_set.contains(column.as_str()) {
                return Err(CoreError::validation(format!(
                    "mapped column does not exist: {column}"
                )));
            }
        }
    }

    let missing_context: Vec<&String> = mapping
        .context
        .iter()
        .filter(|c| !available_set.contains(c.as_str()))
        .collect();
    if !missing_context.is_empty() {
        return Err(CoreError::validation(format!(
            "mapped context columns do not exist: {}",
            missing_context
                .into_iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    Ok(())
}

fn compute_row_index(original_index: Option<i64>, position: usize) -> i64 {
    match original_index {
        Some(index) => index + 2,
        None => position as i64 + 2,
    }
}

fn parse_char_limit(raw: &Option<String>) -> Option<i64> {
    let raw = raw.as_ref()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    raw.parse::<f64>().ok().filter(|v| v.fract() == 0.0).map(|v| v as i64)
}

/// Imports one asset's rows into segments, a freshly-created asset row, and
/// an upserted schema profile for its column shape. `confirmed_by_user`
/// reflects whether a human just reviewed this mapping (always true for a
/// direct UI-driven import); the profile's stored flag only ever moves
/// toward "confirmed", never back down, across repeated imports of the
/// same signature.
#[allow(clippy::too_many_arguments)]
pub fn import_asset(
    conn: &Connection,
    project_id: &str,
    source_locale: &str,
    rows: &dyn RowView,
    file_type: &str,
    original_name: &str,
    mapping: &ColumnMapping,
    sheet_name: Option<&str>,
    content_hash: Option<&str>,
    storage_path: Option<&str>,
    size_bytes: Option<i64>,
    confirmed_by_user: bool,
) -> Result<ImportSummary> {
    let normalized_file_type = file_type.to_lowercase();
    if normalized_file_type != "xlsx" && normalized_file_type != "csv" {
        return Err(CoreError::validation(format!(
            "unsupported file_type: {file_type}"
        )));
    }
    let normalized_sheet_name = if normalized_file_type == "xlsx" {
        sheet_name.unwrap_or("")
    } else {
        ""
    };

    let available_columns: Vec<String> = rows.column_names().to_vec();
    let mapping = ColumnMapping {
        mode: mapping.mode,
        source_new: mapping.source_new.trim().to_string(),
        source_old: clean(&mapping.source_old),
        target: clean(&mapping.target),
        target_locale: mapping.target_locale.clone(),
        cn: clean(&mapping.cn),
        key: clean(&mapping.key),
        char_limit: clean(&mapping.char_limit),
        context: unique_preserve(&mapping.context),
    };
    validate_mapping(&mapping, &available_columns)?;

    let signature = compute_schema_signature(
        &normalized_file_type,
        Some(normalized_sheet_name),
        &available_columns,
    );

    let now = now_iso();
    let asset_id = Uuid::new_v4().to_string();

    struct PendingSegment {
        id: String,
        row_index: i64,
        key: Option<String>,
        source_text: String,
        source_text_old: Option<String>,
        cn_text: Option<String>,
        context_json: String,
        char_limit: Option<i64>,
        existing_target_text: Option<String>,
    }

    let mut pending = Vec::new();
    let mut skipped_rows = 0usize;

    for position in 0..rows.row_count() {
        let source_text = rows.cell(position, &mapping.source_new);
        let source_text = source_text.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let Some(source_text) = source_text else {
            skipped_rows += 1;
            continue;
        };

        let source_text_old = match mapping.mode {
            ImportMode::ChangeSourceUpdate => {
                let column = mapping.source_old.as_ref().expect("validated above");
                rows.cell(position, column)
            }
            ImportMode::Lp => None,
        };

        let mut context = serde_json::Map::new();
        for column in &mapping.context {
            context.insert(column.clone(), json!(rows.cell(position, column)));
        }

        let existing_target_text = match (&mapping.target, &mapping.target_locale) {
            (Some(target_column), Some(_)) => rows
                .cell(position, target_column)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            _ => None,
        };

        pending.push(PendingSegment {
            id: Uuid::new_v4().to_string(),
            row_index: compute_row_index(rows.original_index(position), position),
            key: mapping.key.as_ref().and_then(|c| rows.cell(position, c)),
            source_text: source_text.to_string(),
            source_text_old,
            cn_text: mapping.cn.as_ref().and_then(|c| rows.cell(position, c)),
            context_json: serde_json::Value::Object(context).to_string(),
            char_limit: mapping
                .char_limit
                .as_ref()
                .and_then(|column| parse_char_limit(&rows.cell(position, column))),
            existing_target_text,
        });
    }

    conn.execute(
        "INSERT INTO assets(id, project_id, asset_type, original_name, source_channel, received_at,
                             content_hash, storage_path, size_bytes)
         VALUES (?1, ?2, ?3, ?4, 'manual', ?5, ?6, ?7, ?8)",
        params![
            asset_id,
            project_id,
            normalized_file_type,
            original_name,
            now,
            content_hash,
            storage_path,
            size_bytes,
        ],
    )?;

    for segment in &pending {
        conn.execute(
            "INSERT INTO segments(id, asset_id, sheet_name, row_index, key, source_locale,
                                   source_text, source_text_old, cn_text, context_json, char_limit,
                                   placeholders_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, '[]')",
            params![
                segment.id,
                asset_id,
                if normalized_sheet_name.is_empty() { None } else { Some(normalized_sheet_name) },
                segment.row_index,
                segment.key,
                source_locale,
                segment.source_text,
                segment.source_text_old,
                segment.cn_text,
                segment.context_json,
                segment.char_limit,
            ],
        )?;

        if let (Some(target_text), Some(target_locale)) =
            (&segment.existing_target_text, &mapping.target_locale)
        {
            let already_approved: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM approved_translations WHERE segment_id = ?1 AND target_locale = ?2",
                    params![segment.id, target_locale],
                    |row| row.get(0),
                )
                .optional()?;
            if already_approved.is_none() {
                conn.execute(
                    "INSERT INTO translation_candidates(
                        id, segment_id, target_locale, candidate_text, candidate_type, score,
                        model_info_json, generated_at
                     ) VALUES (?1, ?2, ?3, ?4, 'existing_target', 1.0, '{}', ?5)",
                    params![
                        Uuid::new_v4().to_string(),
                        segment.id,
                        target_locale,
                        target_text,
                        now,
                    ],
                )?;
            }
        }
    }

    let mapping_payload = json!({
        "file_type": normalized_file_type,
        "sheet_name": normalized_sheet_name,
        "columns": {
            "source_new": mapping.source_new,
            "source_old": mapping.source_old,
            "target": mapping.target,
            "cn": mapping.cn,
            "key": mapping.key,
            "char_limit": mapping.char_limit,
            "context": mapping.context,
        },
    });

    let existing_confirmed: Option<i64> = conn
        .query_row(
            "SELECT confirmed_by_user FROM schema_profiles WHERE project_id = ?1 AND signature = ?2",
            params![project_id, signature],
            |row| row.get(0),
        )
        .optional()?;
    let new_confirmed = existing_confirmed
        .unwrap_or(0)
        .max(if confirmed_by_user { 1 } else { 0 });

    let schema_profile_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO schema_profiles(id, project_id, signature, mapping_json, confidence,
                                      confirmed_by_user, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 1.0, ?5, ?6, ?6)
         ON CONFLICT(project_id, signature) DO UPDATE SET
            mapping_json = excluded.mapping_json,
            confidence = excluded.confidence,
            confirmed_by_user = ?5,
            updated_at = excluded.updated_at",
        params![
            schema_profile_id,
            project_id,
            signature,
            mapping_payload.to_string(),
            new_confirmed,
            now,
        ],
    )?;

    let schema_profile_id: String = conn.query_row(
        "SELECT id FROM schema_profiles WHERE project_id = ?1 AND signature = ?2",
        params![project_id, signature],
        |row| row.get(0),
    )?;

    Ok(ImportSummary {
        asset_id,
        schema_profile_id,
        signature,
        imported_rows: pending.len(),
        skipped_rows,
        mapped_columns: json!({
            "source_new": mapping.source_new,
            "source_old": mapping.source_old,
            "target": mapping.target,
            "cn": mapping.cn,
            "key": mapping.key,
            "char_limit": mapping.char_limit,
            "context": mapping.context,
        }),
    })
}
