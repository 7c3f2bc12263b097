use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::Result;
use crate::store::now_iso;

use super::normalize::normalized_source_hash;

/// A translation memory entry as loaded from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmEntry {
    pub id: String,
    pub project_id: String,
    pub source_locale: String,
    pub target_locale: String,
    pub source_text: String,
    pub target_text: String,
    pub normalized_source_hash: String,
    pub origin: String,
    pub origin_asset_id: Option<String>,
    pub origin_row_ref: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_used_at: Option<String>,
    pub use_count: i64,
    pub quality_tag: String,
}

pub struct UpsertTmEntry<'a> {
    pub project_id: &'a str,
    pub source_locale: &'a str,
    pub target_locale: &'a str,
    pub source_text: &'a str,
    pub target_text: &'a str,
    pub origin: &'a str,
    pub origin_asset_id: Option<&'a str>,
    pub origin_row_ref: Option<&'a str>,
    pub quality_tag: &'a str,
}

/// Inserts or updates the translation memory entry keyed on
/// `(project_id, source_locale, target_locale, normalized_source_hash)`,
/// picking the most recently updated match when more than one somehow
/// exists, and mirrors the row into the FTS index (delete then reinsert,
/// since FTS5 doesn't support in-place `UPDATE` of indexed columns).
pub fn upsert_tm_entry(conn: &Connection, entry: UpsertTmEntry<'_>) -> Result<String> {
    let now = now_iso();
    let normalized_hash = normalized_source_hash(entry.source_text);

    let existing_id: Option<String> = conn
        .query_row(
            "SELECT id FROM tm_entries
             WHERE project_id = ?1 AND source_locale = ?2 AND target_locale = ?3
               AND normalized_source_hash = ?4
             ORDER BY updated_at DESC, id DESC
             LIMIT 1",
            params![
                entry.project_id,
                entry.source_locale,
                entry.target_locale,
                normalized_hash
            ],
            |row| row.get(0),
        )
        .optional()?;

    let tm_id = match existing_id {
        None => {
            let tm_id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO tm_entries(
                    id, project_id, source_locale, target_locale, source_text, target_text,
                    normalized_source_hash, origin, origin_asset_id, origin_row_ref,
                    created_at, updated_at, last_used_at, use_count, quality_tag
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, NULL, 0, ?12)",
                params![
                    tm_id,
                    entry.project_id,
                    entry.source_locale,
                    entry.target_locale,
                    entry.source_text,
                    entry.target_text,
                    normalized_hash,
                    entry.origin,
                    entry.origin_asset_id,
                    entry.origin_row_ref,
                    now,
                    entry.quality_tag,
                ],
            )?;
            tm_id
        }
        Some(tm_id) => {
            conn.execute(
                "UPDATE tm_entries
                 SET source_text = ?1, target_text = ?2, origin = ?3, origin_asset_id = ?4,
                     origin_row_ref = ?5, quality_tag = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    entry.source_text,
                    entry.target_text,
                    entry.origin,
                    entry.origin_asset_id,
                    entry.origin_row_ref,
                    entry.quality_tag,
                    now,
                    tm_id,
                ],
            )?;
            tm_id
        }
    };

    conn.execute("DELETE FROM tm_fts WHERE tm_id = ?1", params![tm_id])?;
    conn.execute(
        "INSERT INTO tm_fts(project_id, source_locale, target_locale, source_text, target_text, tm_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.project_id,
            entry.source_locale,
            entry.target_locale,
            entry.source_text,
            entry.target_text,
            tm_id
        ],
    )?;

    Ok(tm_id)
}

/// Bumps `use_count` and stamps `last_used_at` for a translation memory
/// entry that was just reused by the job pipeline.
pub fn record_tm_use(conn: &Connection, tm_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE tm_entries SET use_count = use_count + 1, last_used_at = ?1 WHERE id = ?2",
        params![now_iso(), tm_id],
    )?;
    Ok(())
}

pub(super) fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<TmEntry> {
    Ok(TmEntry {
        id: row.get(0)?,
        project_id: row.get(1)?,
        source_locale: row.get(2)?,
        target_locale: row.get(3)?,
        source_text: row.get(4)?,
        target_text: row.get(5)?,
        normalized_source_hash: row.get(6)?,
        origin: row.get(7)?,
        origin_asset_id: row.get(8)?,
        origin_row_ref: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        last_used_at: row.get(12)?,
        use_count: row.get(13)?,
        quality_tag: row.get(14)?,
    })
}

pub(super) const TM_ENTRY_COLUMNS: &str = "id, project_id, source_locale, target_locale, source_text, target_text,
    normalized_source_hash, origin, origin_asset_id, origin_row_ref,
    created_at, updated_at, last_used_at, use_count, quality_tag";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn seed(conn: &Connection) -> String {
        upsert_tm_entry(
            conn,
            UpsertTmEntry {
                project_id: "demo",
                source_locale: "en",
                target_locale: "de",
                source_text: "Hello World",
                target_text: "Hallo Welt",
                origin: "manual",
                origin_asset_id: None,
                origin_row_ref: None,
                quality_tag: "trusted",
            },
        )
        .unwrap()
    }

    #[test]
    fn upsert_then_upsert_again_updates_same_row() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        let first_id = seed(conn);

        let second_id = upsert_tm_entry(
            conn,
            UpsertTmEntry {
                project_id: "demo",
                source_locale: "en",
                target_locale: "de",
                source_text: "hello   world",
                target_text: "Hallo Welt!",
                origin: "manual",
                origin_asset_id: None,
                origin_row_ref: None,
                quality_tag: "trusted",
            },
        )
        .unwrap();

        assert_eq!(first_id, second_id);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tm_entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let fts_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tm_fts WHERE tm_id = ?1", params![first_id], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(fts_count, 1);
    }

    #[test]
    fn record_tm_use_increments_count() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        let id = seed(conn);
        record_tm_use(conn, &id).unwrap();
        record_tm_use(conn, &id).unwrap();
        let count: i64 = conn
            .query_row("SELECT use_count FROM tm_entries WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 2);
    }
}
