use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{SubsecRound, Utc};
use regex::Regex;
use rusqlite::{params, Connection};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::review::{list_approved_for_asset, ApprovedPatchRow};

static SAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]+").unwrap());

fn utc_filename_timestamp() -> String {
    Utc::now()
        .trunc_subsecs(0)
        .to_rfc3339()
        .replace("+00:00", "Z")
        .replace(':', "-")
}

/// Decouples sheet-resolution and cell-targeting from a concrete XLSX
/// codec. A real implementation wraps a loaded workbook; this crate never
/// opens a file itself.
pub trait WorkbookEditor {
    fn sheet_names(&self) -> Vec<String>;
    fn active_sheet_name(&self) -> String;
    /// Returns the 1-based column index of `column_name`'s header cell in
    /// `sheet`, creating it at the end of the header row if absent.
    fn ensure_header_cell(&mut self, sheet: &str, column_name: &str) -> Result<usize>;
    fn write_cell(&mut self, sheet: &str, row_index: i64, column_index: usize, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpCopyResult {
    pub row_count: i64,
    pub new_column_name: String,
    pub suggested_filename: String,
    pub warnings: Vec<String>,
}

fn safe_fragment(value: &str) -> String {
    let cleaned = SAFE_CHARS.replace_all(value.trim(), "_");
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "export".to_string()
    } else {
        trimmed.to_string()
    }
}

fn asset_id_fragment(asset_id: &str) -> &str {
    let end = asset_id.char_indices().nth(8).map(|(i, _)| i).unwrap_or(asset_id.len());
    &asset_id[..end]
}

fn locale_short(target_locale: &str) -> String {
    let base = target_locale.split('-').next().unwrap_or("").trim();
    if !base.is_empty() {
        base.to_uppercase()
    } else {
        let fallback = target_locale.trim();
        if fallback.is_empty() {
            "XX".to_string()
        } else {
            fallback.to_uppercase()
        }
    }
}

fn new_column_name(target_locale: &str) -> String {
    format!("NEW {}", locale_short(target_locale))
}

fn new_column_filename_token(target_locale: &str) -> String {
    format!("NEW{}", locale_short(target_locale))
}

/// Picks the sheet name an export should default to, from the project's
/// schema profiles: a profile mapped to `preferred_sheet` wins outright,
/// else the most recently updated xlsx-type profile's sheet is used (with
/// a warning when it disagrees with `preferred_sheet`).
fn resolve_sheet_name(
    conn: &Connection,
    project_id: &str,
    preferred_sheet: Option<&str>,
) -> Result<(Option<String>, Vec<String>)> {
    let mut warnings = Vec::new();
    let preferred = preferred_sheet.map(str::trim).filter(|s| !s.is_empty());

    let mut stmt = conn.prepare(
        "SELECT mapping_json FROM schema_profiles WHERE project_id = ?1 ORDER BY updated_at DESC",
    )?;
    let mapping_rows: Vec<String> = stmt
        .query_map(params![project_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut fallback_sheet: Option<String> = None;
    for mapping_json in mapping_rows {
        let Ok(payload) = serde_json::from_str::<Value>(&mapping_json) else {
            continue;
        };
        let Value::Object(map) = payload else { continue };
        let file_type = map.get("file_type").and_then(Value::as_str).unwrap_or("").to_lowercase();
        if file_type != "xlsx" {
            continue;
        }
        let mapping_sheet = map
            .get("sheet_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let Some(mapping_sheet) = mapping_sheet else { continue };

        if let Some(preferred) = preferred {
            if mapping_sheet == preferred {
                return Ok((Some(mapping_sheet.to_string()), warnings));
            }
        }
        if fallback_sheet.is_none() {
            fallback_sheet = Some(mapping_sheet.to_string());
        }
    }

    if let Some(fallback) = fallback_sheet {
        if let Some(preferred) = preferred {
            if fallback != preferred {
                warnings.push(format!(
                    "Using schema profile sheet '{fallback}' instead of '{preferred}'."
                ));
            }
        }
        return Ok((Some(fallback), warnings));
    }

    Ok((preferred.map(str::to_string), warnings))
}

fn write_rows_for_sheet(
    editor: &mut dyn WorkbookEditor,
    sheet: &str,
    rows: &[ApprovedPatchRow],
    column_name: &str,
) -> Result<i64> {
    let column_index = editor.ensure_header_cell(sheet, column_name)?;
    let mut written = 0i64;
    for row in rows {
        let Some(row_index) = row.row_index else { continue };
        if row_index < 2 {
            continue;
        }
        editor.write_cell(sheet, row_index, column_index, &row.approved_target_text)?;
        written += 1;
    }
    Ok(written)
}

/// Writes every approved translation for an asset/locale into a `NEW
/// <LOCALE>` column of the already-opened workbook `editor`, grouping rows
/// by their original sheet and falling back to the schema-profile mapping
/// or the workbook's active sheet when a row carries no sheet name.
pub fn run(
    conn: &Connection,
    editor: &mut dyn WorkbookEditor,
    project_id: &str,
    project_slug: &str,
    asset_id: &str,
    target_locale: &str,
) -> Result<LpCopyResult> {
    let approved = list_approved_for_asset(conn, asset_id, target_locale)?;
    if approved.is_empty() {
        return Err(CoreError::not_found(
            "no approved translations found for this asset and locale",
        ));
    }

    let fallback_sheet = approved.iter().find_map(|row| row.sheet_name.as_deref());
    let (mapped_sheet_name, mut warnings) = resolve_sheet_name(conn, project_id, fallback_sheet)?;

    let active_sheet = editor.active_sheet_name();
    let sheet_names = editor.sheet_names();

    let default_sheet_name = match mapped_sheet_name {
        Some(sheet) if sheet_names.contains(&sheet) => sheet,
        Some(sheet) => {
            warnings.push(format!("Sheet '{sheet}' not found; using active sheet '{active_sheet}'."));
            active_sheet.clone()
        }
        None => {
            warnings.push(format!("Sheet mapping not found; using active sheet '{active_sheet}'."));
            active_sheet.clone()
        }
    };

    let mut rows_by_sheet: HashMap<String, Vec<ApprovedPatchRow>> = HashMap::new();
    for row in approved {
        let sheet = row
            .sheet_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&default_sheet_name)
            .to_string();
        rows_by_sheet.entry(sheet).or_default().push(row);
    }

    let column_name = new_column_name(target_locale);
    let mut written_rows = 0i64;
    let mut sheets: Vec<String> = rows_by_sheet.keys().cloned().collect();
    sheets.sort();
    for sheet in sheets {
        let rows = &rows_by_sheet[&sheet];
        if !sheet_names.contains(&sheet) {
            warnings.push(format!("Sheet '{sheet}' not found; skipped {} approved row(s).", rows.len()));
            continue;
        }
        written_rows += write_rows_for_sheet(editor, &sheet, rows, &column_name)?;
    }

    let suggested_filename = format!(
        "lp_{}_{}_{}_{}.xlsx",
        safe_fragment(project_slug),
        asset_id_fragment(asset_id),
        safe_fragment(&new_column_filename_token(target_locale)),
        utc_filename_timestamp(),
    );

    Ok(LpCopyResult {
        row_count: written_rows,
        new_column_name: column_name,
        suggested_filename,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::upsert_approved_translation;
    use crate::store::Store;
    use std::cell::RefCell;
    use std::collections::HashMap as Map;

    struct FakeWorkbook {
        sheets: Vec<String>,
        active: String,
        headers: RefCell<Map<String, Vec<String>>>,
        cells: RefCell<Map<(String, i64, usize), String>>,
    }

    impl FakeWorkbook {
        fn new(sheets: &[&str], active: &str) -> Self {
            Self {
                sheets: sheets.iter().map(|s| s.to_string()).collect(),
                active: active.to_string(),
                headers: RefCell::new(Map::new()),
                cells: RefCell::new(Map::new()),
            }
        }
    }

    impl WorkbookEditor for FakeWorkbook {
        fn sheet_names(&self) -> Vec<String> {
            self.sheets.clone()
        }

        fn active_sheet_name(&self) -> String {
            self.active.clone()
        }

        fn ensure_header_cell(&mut self, sheet: &str, column_name: &str) -> Result<usize> {
            let mut headers = self.headers.borrow_mut();
            let entry = headers.entry(sheet.to_string()).or_default();
            if let Some(pos) = entry.iter().position(|h| h == column_name) {
                return Ok(pos + 1);
            }
            entry.push(column_name.to_string());
            Ok(entry.len())
        }

        fn write_cell(&mut self, sheet: &str, row_index: i64, column_index: usize, value: &str) -> Result<()> {
            self.cells
                .borrow_mut()
                .insert((sheet.to_string(), row_index, column_index), value.to_string());
            Ok(())
        }
    }

    fn seed(conn: &Connection) -> String {
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
    fn writes_approved_rows_into_new_locale_column() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        let segment_id = seed(conn);
        upsert_approved_translation(conn, &segment_id, "de-DE", "Hallo da", "me").unwrap();

        let mut workbook = FakeWorkbook::new(&["Sheet1"], "Sheet1");
        let result = run(conn, &mut workbook, "demo", "demo", "asset1", "de-DE").unwrap();

        assert_eq!(result.row_count, 1);
        assert_eq!(result.new_column_name, "NEW DE");
        assert!(result.warnings.is_empty());
        assert!(result.suggested_filename.starts_with("lp_demo_asset1_NEWDE_"));
        assert!(result.suggested_filename.ends_with(".xlsx"));
        assert_eq!(
            workbook.cells.borrow().get(&("Sheet1".to_string(), 2, 1)),
            Some(&"Hallo da".to_string())
        );
    }

    #[test]
    fn falls_back_to_active_sheet_when_row_sheet_missing_from_workbook() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        let segment_id = seed(conn);
        upsert_approved_translation(conn, &segment_id, "de-DE", "Hallo da", "me").unwrap();

        let mut workbook = FakeWorkbook::new(&["Main"], "Main");
        let result = run(conn, &mut workbook, "demo", "demo", "asset1", "de-DE").unwrap();

        assert!(result.warnings.iter().any(|w| w.contains("not found")));
        assert_eq!(result.row_count, 0);
    }

    #[test]
    fn errors_when_nothing_is_approved() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        seed(conn);
        let mut workbook = FakeWorkbook::new(&["Sheet1"], "Sheet1");
        let err = run(conn, &mut workbook, "demo", "demo", "asset1", "de-DE").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
