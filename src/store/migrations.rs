use rusqlite::{OptionalExtension, Transaction};

use crate::error::Result;

/// Forward-only migration: a tuple of (version, SQL batch). Batches must be
/// idempotent for the tables they create (`CREATE TABLE IF NOT EXISTS`).
pub struct Migration {
    pub version: i64,
    pub sql: &'static str,
}

/// The migration list is the single source of truth for the current schema
/// version (`MIGRATIONS.last().version`) — there is deliberately no separate
/// `CURRENT_SCHEMA_VERSION` constant that could drift out of sync with it.
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: V1_SQL,
    },
    Migration {
        version: 2,
        sql: V2_SQL,
    },
    Migration {
        version: 3,
        sql: V3_SQL,
    },
];

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

const V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    default_source_locale TEXT NOT NULL,
    default_target_locale TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS project_locales (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    locale_code TEXT NOT NULL,
    is_enabled INTEGER NOT NULL,
    is_default INTEGER NOT NULL,
    rules_json TEXT NOT NULL DEFAULT '{}',
    FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_project_locales_project_locale
ON project_locales(project_id, locale_code);

CREATE TABLE IF NOT EXISTS assets (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    asset_type TEXT NOT NULL,
    original_name TEXT,
    source_channel TEXT NOT NULL DEFAULT 'manual',
    received_at TEXT NOT NULL,
    content_hash TEXT,
    storage_path TEXT,
    size_bytes INTEGER,
    FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_assets_project_received_at
ON assets(project_id, received_at);

CREATE TABLE IF NOT EXISTS schema_profiles (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    signature TEXT NOT NULL,
    mapping_json TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.0,
    confirmed_by_user INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_schema_profiles_project_signature
ON schema_profiles(project_id, signature);

CREATE TABLE IF NOT EXISTS segments (
    id TEXT PRIMARY KEY,
    asset_id TEXT NOT NULL,
    sheet_name TEXT,
    row_index INTEGER,
    key TEXT,
    source_locale TEXT NOT NULL,
    source_text TEXT NOT NULL,
    cn_text TEXT,
    context_json TEXT NOT NULL DEFAULT '{}',
    char_limit INTEGER,
    placeholders_json TEXT NOT NULL DEFAULT '[]',
    FOREIGN KEY(asset_id) REFERENCES assets(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_segments_asset_row_index
ON segments(asset_id, row_index);

CREATE TABLE IF NOT EXISTS translation_candidates (
    id TEXT PRIMARY KEY,
    segment_id TEXT NOT NULL,
    target_locale TEXT NOT NULL,
    candidate_text TEXT NOT NULL,
    candidate_type TEXT NOT NULL,
    score REAL NOT NULL DEFAULT 0.0,
    model_info_json TEXT NOT NULL DEFAULT '{}',
    generated_at TEXT NOT NULL,
    FOREIGN KEY(segment_id) REFERENCES segments(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_translation_candidates_segment_target
ON translation_candidates(segment_id, target_locale);

CREATE TABLE IF NOT EXISTS approved_translations (
    id TEXT PRIMARY KEY,
    segment_id TEXT NOT NULL,
    target_locale TEXT NOT NULL,
    final_text TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'approved',
    approved_by TEXT,
    approved_at TEXT NOT NULL,
    revision_of_id TEXT,
    is_pinned INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY(segment_id) REFERENCES segments(id) ON DELETE CASCADE,
    FOREIGN KEY(revision_of_id) REFERENCES approved_translations(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_approved_translations_segment_target
ON approved_translations(segment_id, target_locale);

CREATE TABLE IF NOT EXISTS tm_entries (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    source_locale TEXT NOT NULL,
    target_locale TEXT NOT NULL,
    source_text TEXT NOT NULL,
    target_text TEXT NOT NULL,
    normalized_source_hash TEXT NOT NULL,
    origin TEXT NOT NULL,
    origin_asset_id TEXT,
    origin_row_ref TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_used_at TEXT,
    use_count INTEGER NOT NULL DEFAULT 0,
    quality_tag TEXT NOT NULL DEFAULT 'trusted',
    FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE,
    FOREIGN KEY(origin_asset_id) REFERENCES assets(id)
);

CREATE INDEX IF NOT EXISTS idx_tm_entries_lookup
ON tm_entries(project_id, source_locale, target_locale, normalized_source_hash);

CREATE TABLE IF NOT EXISTS glossary_terms (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    locale_code TEXT NOT NULL,
    source_term TEXT NOT NULL,
    target_term TEXT NOT NULL,
    rule TEXT NOT NULL DEFAULT 'must_use',
    match_type TEXT NOT NULL DEFAULT 'whole_token',
    case_sensitive INTEGER NOT NULL DEFAULT 1,
    allow_compounds INTEGER NOT NULL DEFAULT 0,
    compound_strategy TEXT NOT NULL DEFAULT 'hyphenate',
    negative_patterns_json TEXT NOT NULL DEFAULT '[]',
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_glossary_terms_project_locale_source
ON glossary_terms(project_id, locale_code, source_term);

CREATE TABLE IF NOT EXISTS qa_flags (
    id TEXT PRIMARY KEY,
    segment_id TEXT NOT NULL,
    target_locale TEXT NOT NULL,
    type TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    span_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    resolved_at TEXT,
    resolved_by TEXT,
    resolution TEXT,
    FOREIGN KEY(segment_id) REFERENCES segments(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_qa_flags_segment_target
ON qa_flags(segment_id, target_locale);

CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    asset_id TEXT,
    job_type TEXT NOT NULL,
    targets_json TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    summary TEXT,
    decision_trace_json TEXT NOT NULL DEFAULT '{}',
    FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE,
    FOREIGN KEY(asset_id) REFERENCES assets(id)
);

CREATE INDEX IF NOT EXISTS idx_jobs_project_created_at
ON jobs(project_id, created_at);
"#;

const V2_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS tm_fts USING fts5(
    project_id UNINDEXED,
    source_locale UNINDEXED,
    target_locale UNINDEXED,
    source_text,
    target_text,
    tm_id UNINDEXED
);
"#;

const V3_SQL: &str = r#"
ALTER TABLE segments ADD COLUMN source_text_old TEXT;
"#;

fn table_exists(tx: &Transaction<'_>, table_name: &str) -> Result<bool> {
    let exists: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1 LIMIT 1",
            [table_name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

pub fn schema_version(tx: &Transaction<'_>) -> Result<i64> {
    if !table_exists(tx, "schema_meta")? {
        return Ok(0);
    }

    let value: Option<String> = tx
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'schema_version' LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
}

fn set_schema_version(tx: &Transaction<'_>, version: i64) -> Result<()> {
    tx.execute(
        "INSERT INTO schema_meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [version.to_string()],
    )?;
    Ok(())
}

/// Advances the store to the highest known version, running every pending
/// migration in order inside the caller's transaction and writing the new
/// version atomically alongside it. Must remain side-effect-free when no
/// migrations are pending.
pub fn migrate_to_latest(tx: &Transaction<'_>) -> Result<i64> {
    let mut current = schema_version(tx)?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tx.execute_batch(migration.sql)?;
        set_schema_version(tx, migration.version)?;
        current = migration.version;
    }

    Ok(current)
}
