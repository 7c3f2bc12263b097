pub mod change;
pub mod pipeline;

use rusqlite::{params, Connection};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::store::now_iso;

pub use change::{classify_change, ChangeClassification};
pub use pipeline::{run_change_variant_a_job, run_change_variant_b_job, run_mock_translation_job, JobRunSummary, PipelineConfig};

/// Inserts a queued job row for one or more target locales, returning its id.
pub fn create_job(
    conn: &Connection,
    project_id: &str,
    asset_id: &str,
    job_type: &str,
    targets: &[String],
    decision_trace: &Value,
) -> Result<String> {
    let job_id = Uuid::new_v4().to_string();
    let now = now_iso();
    conn.execute(
        "INSERT INTO jobs(
            id, project_id, asset_id, job_type, targets_json, status,
            created_at, started_at, finished_at, summary, decision_trace_json
         ) VALUES (?1, ?2, ?3, ?4, ?5, 'queued', ?6, NULL, NULL, NULL, ?7)",
        params![
            job_id,
            project_id,
            asset_id,
            job_type,
            serde_json::to_string(targets)?,
            now,
            decision_trace.to_string(),
        ],
    )?;
    Ok(job_id)
}

pub fn update_job_status(
    conn: &Connection,
    job_id: &str,
    status: &str,
    summary: Option<&str>,
    set_started_at: bool,
    set_finished_at: bool,
) -> Result<()> {
    let now = now_iso();
    conn.execute(
        "UPDATE jobs
         SET status = ?1,
             summary = ?2,
             started_at = CASE WHEN ?3 = 1 THEN COALESCE(started_at, ?4) ELSE started_at END,
             finished_at = CASE WHEN ?5 = 1 THEN ?4 ELSE finished_at END
         WHERE id = ?6",
        params![
            status,
            summary,
            set_started_at as i64,
            now,
            set_finished_at as i64,
            job_id,
        ],
    )?;
    Ok(())
}

pub fn update_job_decision_trace(conn: &Connection, job_id: &str, decision_trace: &Value) -> Result<()> {
    conn.execute(
        "UPDATE jobs SET decision_trace_json = ?1 WHERE id = ?2",
        params![decision_trace.to_string(), job_id],
    )?;
    Ok(())
}

/// Most recent schema-profile signature recorded for a project, surfaced in
/// a job's decision trace so a reviewer can tell which column mapping
/// produced the segments it touched.
pub fn latest_mapping_signature(conn: &Connection, project_id: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT signature FROM schema_profiles WHERE project_id = ?1 ORDER BY updated_at DESC LIMIT 1",
        params![project_id],
        |row| row.get(0),
    )
    .map_err(|err| match err {
        rusqlite::Error::QueryReturnedNoRows => err,
        other => other,
    })
    .or_else(|err| match err {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    })
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn create_job_then_update_status_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
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

        let job_id = create_job(
            conn,
            "demo",
            "asset1",
            "mock_translate",
            &["de-DE".to_string()],
            &serde_json::json!({}),
        )
        .unwrap();

        update_job_status(conn, &job_id, "running", Some("Job is running"), true, false).unwrap();
        let status: String = conn
            .query_row("SELECT status FROM jobs WHERE id = ?1", params![job_id], |row| row.get(0))
            .unwrap();
        assert_eq!(status, "running");
    }
}
