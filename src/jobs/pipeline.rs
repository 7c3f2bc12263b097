use rusqlite::{params, Connection};
use serde_json::json;
use tracing::{info, warn};

use crate::error::Result;
use crate::glossary::{enforce_must_use, load_must_use_terms, reinject_term_tokens, GlossaryTerm};
use crate::placeholder::{protect_text, reinject};
use crate::providers::policy::{ModelPolicy, TaskPolicy, TASK_REVIEWER, TASK_TRANSLATOR};
use crate::providers::{default_provider_factory, LlmProvider};
use crate::qa::{check_glossary_compliance, check_newlines_preserved, check_placeholders_unchanged, replace_qa_flags, QaIssue};
use crate::review::{delete_candidates_of_type, upsert_candidate, upsert_change_proposal, UpsertCandidate};
use crate::secrets::SecretStore;
use crate::tm::{find_exact, record_tm_use, search_fuzzy};

use super::change::classify_change;
use super::{create_job, latest_mapping_signature, update_job_decision_trace, update_job_status};

pub const TM_FUZZY_THRESHOLD: f64 = 92.0;
pub const REVIEW_RISK_THRESHOLD: i32 = 5;

const CHANGE_PROPOSED_CANDIDATE_TYPES: &[&str] = &["change_proposed", "change_flagged_proposed"];
const CHANGE_QA_FLAG_TYPES: &[&str] = &["stale_source_change", "impact_flagged"];

#[derive(Debug, Clone, PartialEq)]
pub struct JobRunSummary {
    pub job_id: String,
    pub project_id: String,
    pub asset_id: String,
    pub target_locale: String,
    pub job_type: &'static str,
    pub processed_segments: i64,
    pub changed_segments: i64,
    pub keep_count: i64,
    pub update_count: i64,
    pub flag_count: i64,
    pub proposals_created: i64,
    pub status: &'static str,
}

/// Everything a job run needs besides the open connection: which project,
/// asset, and locale it targets, whether the global glossary and which
/// style hints apply, and how provider resolution should behave when a
/// configured provider's credentials are missing.
pub struct PipelineConfig<'a> {
    pub project_id: &'a str,
    pub asset_id: &'a str,
    pub target_locale: &'a str,
    pub include_global_glossary: bool,
    pub style_hints: Option<&'a str>,
    pub policy: &'a ModelPolicy,
    pub secrets: &'a dyn SecretStore,
    pub strict_provider_selection: bool,
}

struct ResolvedProvider {
    provider_name: String,
    model: String,
    provider: Box<dyn LlmProvider>,
    fallback_from: Option<String>,
}

fn resolve_provider(task_policy: &TaskPolicy, secrets: &dyn SecretStore, strict: bool) -> Result<ResolvedProvider> {
    let mut provider_name = task_policy.provider.clone();
    let mut model = task_policy.model.clone();
    let mut fallback_from = None;

    if provider_name == "openai" && secrets.get("openai_api_key").is_none() {
        if strict {
            return Err(crate::error::CoreError::provider(
                "OpenAI provider was selected, but openai_api_key is not configured",
            ));
        }
        fallback_from = Some("openai".to_string());
        provider_name = "mock".to_string();
        model = "mock-v1".to_string();
    }

    let provider = default_provider_factory(&provider_name, &model)?;
    Ok(ResolvedProvider {
        provider_name,
        model,
        provider,
        fallback_from,
    })
}

fn model_info(translator: &ResolvedProvider, reviewer: Option<&ResolvedProvider>, risk_score: i32) -> serde_json::Value {
    match reviewer {
        None => {
            let mut payload = json!({
                "provider": translator.provider_name,
                "model": translator.model,
                "risk_score": risk_score.to_string(),
            });
            if let Some(from) = &translator.fallback_from {
                payload["fallback_from"] = json!(from);
            }
            payload
        }
        Some(reviewer) => {
            let mut payload = json!({
                "provider": reviewer.provider_name,
                "model": reviewer.model,
                "translator_provider": translator.provider_name,
                "translator_model": translator.model,
                "risk_score": risk_score.to_string(),
            });
            if let Some(from) = &translator.fallback_from {
                payload["translator_fallback_from"] = json!(from);
            }
            if let Some(from) = &reviewer.fallback_from {
                payload["fallback_from"] = json!(from);
            }
            payload
        }
    }
}

fn compute_risk_score(
    source_text: &str,
    char_limit: Option<i64>,
    placeholder_count: usize,
    has_angle_tag_placeholder: bool,
    glossary_hits: usize,
) -> i32 {
    let mut score = 0;
    if char_limit.is_some() {
        score += 3;
    }
    if placeholder_count > 0 {
        score += 2;
    }
    if has_angle_tag_placeholder {
        score += 2;
    }
    if glossary_hits > 1 {
        score += 1;
    }
    if source_text.trim().chars().count() < 12 {
        score += 2;
    }
    score
}

struct GeneratedCandidate {
    candidate_text: String,
    candidate_type: &'static str,
    score: f64,
    model_info: serde_json::Value,
    qa_issues: Vec<QaIssue>,
}

fn collect_qa_issues(
    source_text: &str,
    final_text: &str,
    expected_enforcements: &[crate::glossary::ExpectedEnforcement],
    translated_with_tokens: Option<&str>,
) -> Vec<QaIssue> {
    let mut issues = check_placeholders_unchanged(source_text, final_text);
    issues.extend(check_newlines_preserved(source_text, final_text));
    if let Some(with_tokens) = translated_with_tokens {
        issues.extend(check_glossary_compliance(with_tokens, final_text, expected_enforcements));
    }
    issues
}

/// Runs one segment through protect -> enforce -> TM exact/fuzzy lookup ->
/// translator call -> term/placeholder reinjection -> QA, escalating to a
/// reviewer pass when the computed risk score clears the review threshold.
#[allow(clippy::too_many_arguments)]
fn generate_translation_candidate(
    conn: &Connection,
    project_id: &str,
    source_locale: &str,
    source_text: &str,
    target_locale: &str,
    char_limit: Option<i64>,
    glossary_terms: &[GlossaryTerm],
    translator: &ResolvedProvider,
    reviewer: &ResolvedProvider,
    style_hints: Option<&str>,
) -> Result<GeneratedCandidate> {
    let protected_source = protect_text(source_text);
    let enforced = enforce_must_use(&protected_source.protected, glossary_terms);

    if let Some(exact) = find_exact(conn, project_id, source_locale, target_locale, source_text)? {
        record_tm_use(conn, &exact.id)?;
        return Ok(GeneratedCandidate {
            candidate_text: exact.target_text.clone(),
            candidate_type: "tm_exact",
            score: 1.0,
            model_info: json!({"provider": "tm", "version": "1", "match": "exact"}),
            qa_issues: collect_qa_issues(source_text, &exact.target_text, &enforced.expected_enforcements, None),
        });
    }

    let fuzzy_hits = search_fuzzy(conn, project_id, source_locale, target_locale, source_text, 5)?;
    if let Some(best) = fuzzy_hits.first() {
        if best.score >= TM_FUZZY_THRESHOLD {
            record_tm_use(conn, &best.tm_id)?;
            return Ok(GeneratedCandidate {
                candidate_text: best.target_text.clone(),
                candidate_type: "tm_fuzzy",
                score: best.score / 100.0,
                model_info: json!({"provider": "tm", "version": "1", "match": "fuzzy"}),
                qa_issues: collect_qa_issues(source_text, &best.target_text, &enforced.expected_enforcements, None),
            });
        }
    }

    let translator_prompt = if translator.provider_name == "mock" {
        enforced.text_with_term_tokens.clone()
    } else {
        crate::providers::prompts::build_translation_prompt(
            source_text,
            &enforced.text_with_term_tokens,
            target_locale,
            style_hints,
        )
    };
    let translated_with_term_tokens = translator.provider.generate(TASK_TRANSLATOR, &translator_prompt, 0.1, 512)?;
    let translated_with_terms = reinject_term_tokens(&translated_with_term_tokens, &enforced.term_map);
    let draft_text = reinject(&protected_source, &translated_with_terms);

    let draft_issues = collect_qa_issues(
        source_text,
        &draft_text,
        &enforced.expected_enforcements,
        Some(&translated_with_term_tokens),
    );

    let risk_score = compute_risk_score(
        source_text,
        char_limit,
        protected_source.placeholders.len(),
        protected_source.placeholders.iter().any(|p| p.kind == "angle_tag"),
        enforced.expected_enforcements.len(),
    );

    if risk_score < REVIEW_RISK_THRESHOLD {
        return Ok(GeneratedCandidate {
            candidate_text: draft_text,
            candidate_type: "llm_draft",
            score: 1.0,
            model_info: model_info(translator, None, risk_score),
            qa_issues: draft_issues,
        });
    }

    let reviewer_prompt = if reviewer.provider_name == "mock" {
        translated_with_term_tokens.clone()
    } else {
        crate::providers::prompts::build_reviewer_prompt(source_text, &translated_with_term_tokens, target_locale, style_hints)
    };
    let reviewed_with_term_tokens = reviewer.provider.generate(TASK_REVIEWER, &reviewer_prompt, 0.0, 512)?;
    let reviewed_with_terms = reinject_term_tokens(&reviewed_with_term_tokens, &enforced.term_map);
    let reviewed_text = reinject(&protected_source, &reviewed_with_terms);

    Ok(GeneratedCandidate {
        candidate_text: reviewed_text.clone(),
        candidate_type: "llm_reviewed",
        score: 1.0,
        model_info: model_info(translator, Some(reviewer), risk_score),
        qa_issues: collect_qa_issues(
            source_text,
            &reviewed_text,
            &enforced.expected_enforcements,
            Some(&reviewed_with_term_tokens),
        ),
    })
}

fn update_segment_placeholders_json(conn: &Connection, segment_id: &str, source_text: &str) -> Result<()> {
    let placeholders = protect_text(source_text).placeholders;
    let payload: Vec<serde_json::Value> = placeholders
        .iter()
        .map(|p| json!({"type": p.kind, "value": p.value, "start": p.start, "end": p.end, "token": p.token}))
        .collect();
    conn.execute(
        "UPDATE segments SET placeholders_json = ?1 WHERE id = ?2",
        params![serde_json::to_string(&payload)?, segment_id],
    )?;
    Ok(())
}

fn resolve_translator_reviewer(config: &PipelineConfig<'_>) -> Result<(ResolvedProvider, ResolvedProvider)> {
    let translator = resolve_provider(&config.policy.translator, config.secrets, config.strict_provider_selection)?;
    let reviewer = resolve_provider(&config.policy.reviewer, config.secrets, config.strict_provider_selection)?;
    Ok((translator, reviewer))
}

/// Translates every non-empty segment of the asset for `config.target_locale`,
/// writing one draft/TM/reviewed candidate per segment.
pub fn run_mock_translation_job(conn: &Connection, config: &PipelineConfig<'_>) -> Result<JobRunSummary> {
    let mapping_signature = latest_mapping_signature(conn, config.project_id)?;
    let decision_trace = json!({"selected_asset_id": config.asset_id, "mapping_signature": mapping_signature});
    let job_id = create_job(
        conn,
        config.project_id,
        config.asset_id,
        "mock_translate",
        &[config.target_locale.to_string()],
        &decision_trace,
    )?;
    update_job_status(conn, &job_id, "running", Some("Job is running"), true, false)?;
    info!(job_id = %job_id, asset_id = config.asset_id, target_locale = config.target_locale, "mock translation job started");

    let run = || -> Result<i64> {
        let (translator, reviewer) = resolve_translator_reviewer(config)?;
        let glossary_terms = load_must_use_terms(conn, config.project_id, config.target_locale, config.include_global_glossary)?;

        let mut stmt = conn.prepare(
            "SELECT id, source_locale, source_text, char_limit FROM segments WHERE asset_id = ?1 ORDER BY row_index, id",
        )?;
        let segments: Vec<(String, String, String, Option<i64>)> = stmt
            .query_map(params![config.asset_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut processed = 0i64;
        for (segment_id, source_locale, source_text, char_limit) in segments {
            update_segment_placeholders_json(conn, &segment_id, &source_text)?;

            if source_text.trim().is_empty() {
                replace_qa_flags(conn, &segment_id, config.target_locale, &[])?;
                continue;
            }

            let generated = generate_translation_candidate(
                conn,
                config.project_id,
                &source_locale,
                &source_text,
                config.target_locale,
                char_limit,
                &glossary_terms,
                &translator,
                &reviewer,
                config.style_hints,
            )?;
            replace_qa_flags(conn, &segment_id, config.target_locale, &generated.qa_issues)?;
            upsert_candidate(
                conn,
                UpsertCandidate {
                    segment_id: &segment_id,
                    target_locale: config.target_locale,
                    candidate_text: &generated.candidate_text,
                    candidate_type: generated.candidate_type,
                    score: generated.score,
                    model_info_json: &generated.model_info.to_string(),
                    generated_at: None,
                },
            )?;
            processed += 1;
        }
        Ok(processed)
    };

    let processed = match run() {
        Ok(processed) => processed,
        Err(err) => {
            warn!(job_id = %job_id, error = %err, "mock translation job failed");
            update_job_status(conn, &job_id, "failed", Some(&format!("Job failed: {err}")), false, true)?;
            return Err(err);
        }
    };

    update_job_status(
        conn,
        &job_id,
        "done",
        Some(&format!("Processed {processed} segment(s) for {}", config.target_locale)),
        false,
        true,
    )?;
    info!(job_id = %job_id, processed, "mock translation job done");

    Ok(JobRunSummary {
        job_id,
        project_id: config.project_id.to_string(),
        asset_id: config.asset_id.to_string(),
        target_locale: config.target_locale.to_string(),
        job_type: "mock_translate",
        processed_segments: processed,
        changed_segments: 0,
        keep_count: 0,
        update_count: 0,
        flag_count: 0,
        proposals_created: 0,
        status: "done",
    })
}

fn change_proposal_score(generated: &GeneratedCandidate) -> f64 {
    match generated.candidate_type {
        "tm_exact" => 1.0,
        "tm_fuzzy" => generated.score,
        _ => 0.5,
    }
}

fn stale_source_change_issue() -> QaIssue {
    QaIssue::with_span(
        "stale_source_change",
        "warn",
        "Source changed from OLD to NEW. Proposed updated target for review.",
        json!({"decision": "UPDATE", "confidence": 50, "reason": "Source changed from OLD to NEW."}),
    )
}

/// For every segment whose source text changed since the prior import,
/// unconditionally proposes an updated translation (no KEEP/FLAG triage —
/// that's variant B). Segments whose source is unchanged are left alone.
pub fn run_change_variant_a_job(conn: &Connection, config: &PipelineConfig<'_>) -> Result<JobRunSummary> {
    let mapping_signature = latest_mapping_signature(conn, config.project_id)?;
    let decision_trace = json!({"selected_asset_id": config.asset_id, "mapping_signature": mapping_signature});
    let job_id = create_job(
        conn,
        config.project_id,
        config.asset_id,
        "change_variant_a",
        &[config.target_locale.to_string()],
        &decision_trace,
    )?;
    update_job_status(conn, &job_id, "running", Some("Change fill job is running"), true, false)?;
    info!(job_id = %job_id, asset_id = config.asset_id, target_locale = config.target_locale, "change fill job started");

    let run = || -> Result<(i64, i64)> {
        let (translator, reviewer) = resolve_translator_reviewer(config)?;
        let glossary_terms = load_must_use_terms(conn, config.project_id, config.target_locale, config.include_global_glossary)?;

        let mut stmt = conn.prepare(
            "SELECT id, source_locale, source_text, source_text_old, char_limit FROM segments WHERE asset_id = ?1 ORDER BY row_index, id",
        )?;
        let segments: Vec<(String, String, String, Option<String>, Option<i64>)> = stmt
            .query_map(params![config.asset_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut changed_segments = 0i64;
        let mut proposals_created = 0i64;
        for (segment_id, source_locale, source_text, source_text_old, char_limit) in segments {
            update_segment_placeholders_json(conn, &segment_id, &source_text)?;

            if source_text.trim().is_empty() {
                continue;
            }

            let is_changed = match &source_text_old {
                Some(old) => old.trim() != source_text.trim(),
                None => false,
            };
            if !is_changed {
                continue;
            }
            changed_segments += 1;

            let generated = generate_translation_candidate(
                conn,
                config.project_id,
                &source_locale,
                &source_text,
                config.target_locale,
                char_limit,
                &glossary_terms,
                &translator,
                &reviewer,
                config.style_hints,
            )?;

            let mut issues = vec![stale_source_change_issue()];
            issues.extend(generated.qa_issues.clone());
            replace_qa_flags(conn, &segment_id, config.target_locale, &issues)?;

            let mut model_info = generated.model_info.clone();
            model_info["source_candidate_type"] = json!(generated.candidate_type);
            model_info["workflow"] = json!("change_variant_a");

            upsert_change_proposal(
                conn,
                &segment_id,
                config.target_locale,
                &generated.candidate_text,
                change_proposal_score(&generated),
                &model_info.to_string(),
            )?;
            proposals_created += 1;
        }
        Ok((changed_segments, proposals_created))
    };

    let (changed_segments, proposals_created) = match run() {
        Ok(counts) => counts,
        Err(err) => {
            warn!(job_id = %job_id, error = %err, "change fill job failed");
            update_job_status(conn, &job_id, "failed", Some(&format!("Job failed: {err}")), false, true)?;
            return Err(err);
        }
    };

    let final_trace = json!({
        "selected_asset_id": config.asset_id,
        "mapping_signature": mapping_signature,
        "summary_counts": {"changed_rows": changed_segments, "proposals_created": proposals_created},
    });
    update_job_decision_trace(conn, &job_id, &final_trace)?;
    update_job_status(
        conn,
        &job_id,
        "done",
        Some(&format!(
            "Processed {changed_segments} changed segment(s) for {} (proposals={proposals_created})",
            config.target_locale
        )),
        false,
        true,
    )?;
    info!(job_id = %job_id, changed_segments, proposals_created, "change fill job done");

    Ok(JobRunSummary {
        job_id,
        project_id: config.project_id.to_string(),
        asset_id: config.asset_id.to_string(),
        target_locale: config.target_locale.to_string(),
        job_type: "change_variant_a",
        processed_segments: proposals_created,
        changed_segments,
        keep_count: 0,
        update_count: proposals_created,
        flag_count: 0,
        proposals_created,
        status: "done",
    })
}

/// Triages every changed segment through [`classify_change`] before
/// spending a provider call: `KEEP` and `FLAG` decisions short-circuit
/// without generating a candidate, only `UPDATE` runs the full translation
/// pipeline. Segments whose source reverted to unchanged have their
/// change-review candidates and flags retracted.
pub fn run_change_variant_b_job(conn: &Connection, config: &PipelineConfig<'_>) -> Result<JobRunSummary> {
    let mapping_signature = latest_mapping_signature(conn, config.project_id)?;
    let rules_used = json!([
        "trimmed text equality => KEEP",
        "punctuation-only change => KEEP",
        "placeholder/tag pattern change => FLAG",
        "length delta >30% => UPDATE",
        "word-count delta >20% => UPDATE",
        "fallback => FLAG",
    ]);
    let decision_trace = json!({
        "selected_asset_id": config.asset_id,
        "mapping_signature": mapping_signature,
        "rules_used": rules_used,
    });
    let job_id = create_job(
        conn,
        config.project_id,
        config.asset_id,
        "change_variant_b",
        &[config.target_locale.to_string()],
        &decision_trace,
    )?;
    update_job_status(conn, &job_id, "running", Some("Change review job is running"), true, false)?;
    info!(job_id = %job_id, asset_id = config.asset_id, target_locale = config.target_locale, "change review job started");

    let run = || -> Result<(i64, i64, i64, i64)> {
        let (translator, reviewer) = resolve_translator_reviewer(config)?;
        let glossary_terms = load_must_use_terms(conn, config.project_id, config.target_locale, config.include_global_glossary)?;

        let mut stmt = conn.prepare(
            "SELECT id, source_locale, source_text, source_text_old, char_limit FROM segments WHERE asset_id = ?1 ORDER BY row_index, id",
        )?;
        let segments: Vec<(String, String, String, Option<String>, Option<i64>)> = stmt
            .query_map(params![config.asset_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut changed_segments = 0i64;
        let mut keep_count = 0i64;
        let mut update_count = 0i64;
        let mut flag_count = 0i64;

        for (segment_id, source_locale, source_text, source_text_old, char_limit) in segments {
            update_segment_placeholders_json(conn, &segment_id, &source_text)?;

            if source_text.trim().is_empty() {
                continue;
            }

            let is_changed = match &source_text_old {
                Some(old) => old.trim() != source_text.trim(),
                None => false,
            };
            if !is_changed {
                delete_candidates_of_type(conn, &segment_id, config.target_locale, CHANGE_PROPOSED_CANDIDATE_TYPES[0])?;
                delete_candidates_of_type(conn, &segment_id, config.target_locale, CHANGE_PROPOSED_CANDIDATE_TYPES[1])?;
                for flag_type in CHANGE_QA_FLAG_TYPES {
                    delete_qa_flags_of_type(conn, &segment_id, config.target_locale, flag_type)?;
                }
                continue;
            }
            changed_segments += 1;

            let classification = match &source_text_old {
                None => crate::jobs::change::ChangeClassification {
                    decision: "FLAG",
                    confidence: 25,
                    reason: "Missing previous source text.",
                },
                Some(old) => classify_change(old, &source_text),
            };

            let base_issue = QaIssue::with_span(
                "stale_source_change",
                "warn",
                format!(
                    "Source changed from OLD to NEW. Decision: {}. {}",
                    classification.decision, classification.reason
                ),
                json!({
                    "decision": classification.decision,
                    "confidence": classification.confidence,
                    "reason": classification.reason,
                }),
            );

            match classification.decision {
                "KEEP" => {
                    delete_candidates_of_type(conn, &segment_id, config.target_locale, CHANGE_PROPOSED_CANDIDATE_TYPES[0])?;
                    delete_candidates_of_type(conn, &segment_id, config.target_locale, CHANGE_PROPOSED_CANDIDATE_TYPES[1])?;
                    replace_qa_flags(conn, &segment_id, config.target_locale, &[base_issue])?;
                    keep_count += 1;
                }
                "FLAG" => {
                    delete_candidates_of_type(conn, &segment_id, config.target_locale, CHANGE_PROPOSED_CANDIDATE_TYPES[0])?;
                    delete_candidates_of_type(conn, &segment_id, config.target_locale, CHANGE_PROPOSED_CANDIDATE_TYPES[1])?;
                    let impact_issue = QaIssue::with_span(
                        "impact_flagged",
                        "warn",
                        classification.reason,
                        json!({
                            "decision": classification.decision,
                            "confidence": classification.confidence,
                            "reason": classification.reason,
                        }),
                    );
                    replace_qa_flags(conn, &segment_id, config.target_locale, &[base_issue, impact_issue])?;
                    flag_count += 1;
                }
                _ => {
                    let generated = generate_translation_candidate(
                        conn,
                        config.project_id,
                        &source_locale,
                        &source_text,
                        config.target_locale,
                        char_limit,
                        &glossary_terms,
                        &translator,
                        &reviewer,
                        config.style_hints,
                    )?;
                    let mut issues = vec![base_issue];
                    issues.extend(generated.qa_issues.clone());
                    replace_qa_flags(conn, &segment_id, config.target_locale, &issues)?;

                    let mut model_info = generated.model_info.clone();
                    model_info["change_decision"] = json!(classification.decision);
                    model_info["change_confidence"] = json!(classification.confidence.to_string());
                    model_info["change_reason"] = json!(classification.reason);
                    model_info["source_candidate_type"] = json!(generated.candidate_type);

                    let score = if generated.candidate_type == "tm_exact" {
                        1.0
                    } else {
                        classification.confidence as f64 / 100.0
                    };
                    upsert_candidate(
                        conn,
                        UpsertCandidate {
                            segment_id: &segment_id,
                            target_locale: config.target_locale,
                            candidate_text: &generated.candidate_text,
                            candidate_type: "change_proposed",
                            score,
                            model_info_json: &model_info.to_string(),
                            generated_at: None,
                        },
                    )?;
                    update_count += 1;
                }
            }
        }
        Ok((changed_segments, keep_count, update_count, flag_count))
    };

    let (changed_segments, keep_count, update_count, flag_count) = match run() {
        Ok(counts) => counts,
        Err(err) => {
            warn!(job_id = %job_id, error = %err, "change review job failed");
            update_job_status(conn, &job_id, "failed", Some(&format!("Job failed: {err}")), false, true)?;
            return Err(err);
        }
    };

    let final_trace = json!({
        "selected_asset_id": config.asset_id,
        "mapping_signature": mapping_signature,
        "rules_used": rules_used,
        "summary_counts": {
            "changed_rows": changed_segments,
            "keep": keep_count,
            "update": update_count,
            "flag": flag_count,
        },
    });
    update_job_decision_trace(conn, &job_id, &final_trace)?;
    update_job_status(
        conn,
        &job_id,
        "done",
        Some(&format!(
            "Reviewed {changed_segments} changed segment(s) for {} (keep={keep_count}, update={update_count}, flag={flag_count})",
            config.target_locale
        )),
        false,
        true,
    )?;
    info!(job_id = %job_id, changed_segments, keep_count, update_count, flag_count, "change review job done");

    Ok(JobRunSummary {
        job_id,
        project_id: config.project_id.to_string(),
        asset_id: config.asset_id.to_string(),
        target_locale: config.target_locale.to_string(),
        job_type: "change_variant_b",
        processed_segments: changed_segments,
        changed_segments,
        keep_count,
        update_count,
        flag_count,
        proposals_created: update_count,
        status: "done",
    })
}

fn delete_qa_flags_of_type(conn: &Connection, segment_id: &str, target_locale: &str, flag_type: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM qa_flags WHERE segment_id = ?1 AND target_locale = ?2 AND type = ?3",
        params![segment_id, target_locale, flag_type],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretStore;
    use crate::store::Store;

    fn seed_project(conn: &Connection) {
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
    }

    fn mock_policy() -> ModelPolicy {
        ModelPolicy {
            translator: TaskPolicy { provider: "mock".to_string(), model: "mock-v1".to_string() },
            reviewer: TaskPolicy { provider: "mock".to_string(), model: "mock-v1".to_string() },
            schema_resolver: TaskPolicy { provider: "mock".to_string(), model: "mock-v1".to_string() },
        }
    }

    #[test]
    fn mock_translation_job_drafts_every_non_empty_segment() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        seed_project(conn);
        conn.execute(
            "INSERT INTO segments(id, asset_id, sheet_name, row_index, source_locale, source_text)
             VALUES ('seg1', 'asset1', 'Sheet1', 2, 'en', 'Heal for 10 HP')",
            [],
        )
        .unwrap();

        let secrets = MemorySecretStore::new();
        let policy = mock_policy();
        let config = PipelineConfig {
            project_id: "demo",
            asset_id: "asset1",
            target_locale: "de-DE",
            include_global_glossary: false,
            style_hints: None,
            policy: &policy,
            secrets: &secrets,
            strict_provider_selection: false,
        };

        let summary = run_mock_translation_job(conn, &config).unwrap();
        assert_eq!(summary.processed_segments, 1);
        assert_eq!(summary.status, "done");
    }

    #[test]
    fn change_variant_b_keeps_whitespace_only_changes() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        seed_project(conn);
        conn.execute(
            "INSERT INTO segments(id, asset_id, sheet_name, row_index, source_locale, source_text, source_text_old)
             VALUES ('seg1', 'asset1', 'Sheet1', 2, 'en', 'Heal  for 10 HP', 'Heal for 10 HP')",
            [],
        )
        .unwrap();

        let secrets = MemorySecretStore::new();
        let policy = mock_policy();
        let config = PipelineConfig {
            project_id: "demo",
            asset_id: "asset1",
            target_locale: "de-DE",
            include_global_glossary: false,
            style_hints: None,
            policy: &policy,
            secrets: &secrets,
            strict_provider_selection: false,
        };

        let summary = run_change_variant_b_job(conn, &config).unwrap();
        assert_eq!(summary.keep_count, 1);
        assert_eq!(summary.update_count, 0);
    }

    #[test]
    fn change_variant_a_proposes_for_every_changed_segment() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        seed_project(conn);
        conn.execute(
            "INSERT INTO segments(id, asset_id, sheet_name, row_index, source_locale, source_text, source_text_old)
             VALUES ('seg1', 'asset1', 'Sheet1', 2, 'en', 'Heal for 10 HP over time', 'Heal for 10 HP')",
            [],
        )
        .unwrap();

        let secrets = MemorySecretStore::new();
        let policy = mock_policy();
        let config = PipelineConfig {
            project_id: "demo",
            asset_id: "asset1",
            target_locale: "de-DE",
            include_global_glossary: false,
            style_hints: None,
            policy: &policy,
            secrets: &secrets,
            strict_provider_selection: false,
        };

        let summary = run_change_variant_a_job(conn, &config).unwrap();
        assert_eq!(summary.changed_segments, 1);
        assert_eq!(summary.proposals_created, 1);
    }

    #[test]
    fn strict_provider_selection_fails_without_openai_key() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        seed_project(conn);

        let secrets = MemorySecretStore::new();
        let mut policy = mock_policy();
        policy.translator = TaskPolicy { provider: "openai".to_string(), model: "gpt-4o-mini".to_string() };
        let config = PipelineConfig {
            project_id: "demo",
            asset_id: "asset1",
            target_locale: "de-DE",
            include_global_glossary: false,
            style_hints: None,
            policy: &policy,
            secrets: &secrets,
            strict_provider_selection: true,
        };

        let err = run_mock_translation_job(conn, &config).unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Provider(_)));
    }
}
