use std::collections::HashMap;

use rusqlite::Connection;

use crate::error::Result;

/// A must-use glossary entry as loaded from storage; `rule` is currently
/// always `"must_use"` but the column exists for forward compatibility with
/// other glossary policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlossaryTerm {
    pub id: String,
    pub project_id: String,
    pub locale_code: String,
    pub source_term: String,
    pub target_term: String,
    pub rule: String,
    pub match_type: String,
    pub case_sensitive: bool,
    pub allow_compounds: bool,
    pub compound_strategy: String,
    pub negative_patterns: Vec<String>,
    pub notes: Option<String>,
}

fn parse_negative_patterns(raw: Option<String>) -> Vec<String> {
    let Some(raw) = raw else { return Vec::new() };
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(&raw)
    else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| item.as_str().map(str::trim).map(str::to_string))
        .filter(|s| !s.is_empty())
        .collect()
}

fn load_must_use_for_project(
    conn: &Connection,
    project_id: &str,
    locale_code: &str,
) -> Result<HashMap<String, GlossaryTerm>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, locale_code, source_term, target_term, rule, match_type,
                case_sensitive, allow_compounds, compound_strategy, negative_patterns_json, notes
         FROM glossary_terms
         WHERE project_id = ?1 AND locale_code = ?2 AND rule = 'must_use'
         ORDER BY source_term, id",
    )?;

    let rows = stmt.query_map([project_id, locale_code], |row| {
        Ok(GlossaryTerm {
            id: row.get(0)?,
            project_id: row.get(1)?,
            locale_code: row.get(2)?,
            source_term: row.get(3)?,
            target_term: row.get(4)?,
            rule: row.get(5)?,
            match_type: row.get(6)?,
            case_sensitive: row.get::<_, i64>(7)? != 0,
            allow_compounds: row.get::<_, i64>(8)? != 0,
            compound_strategy: row.get(9)?,
            negative_patterns: parse_negative_patterns(row.get(10)?),
            notes: row.get(11)?,
        })
    })?;

    let mut output = HashMap::new();
    for row in rows {
        let term = row?;
        output.insert(term.source_term.clone(), term);
    }
    Ok(output)
}

/// Loads the effective must-use term set for a project/locale pair: the
/// project's own terms, overlaid on the `"global"` project's terms when
/// `include_global` is set (project wins on source-term collision), sorted
/// longest-source-term-first so greedy matching prefers the most specific
/// term.
pub fn load_must_use_terms(
    conn: &Connection,
    project_id: &str,
    locale_code: &str,
    include_global: bool,
) -> Result<Vec<GlossaryTerm>> {
    let mut merged: HashMap<String, GlossaryTerm> = HashMap::new();

    if include_global {
        merged.extend(load_must_use_for_project(conn, "global", locale_code)?);
    }
    merged.extend(load_must_use_for_project(conn, project_id, locale_code)?);

    let mut terms: Vec<GlossaryTerm> = merged.into_values().collect();
    terms.sort_by(|a, b| {
        b.source_term
            .len()
            .cmp(&a.source_term.len())
            .then_with(|| a.source_term.to_lowercase().cmp(&b.source_term.to_lowercase()))
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(id: &str, source: &str, locale: &str, project: &str) -> GlossaryTerm {
        GlossaryTerm {
            id: id.to_string(),
            project_id: project.to_string(),
            locale_code: locale.to_string(),
            source_term: source.to_string(),
            target_term: format!("{source}_t"),
            rule: "must_use".to_string(),
            match_type: "whole_token".to_string(),
            case_sensitive: true,
            allow_compounds: false,
            compound_strategy: "hyphenate".to_string(),
            negative_patterns: Vec::new(),
            notes: None,
        }
    }

    #[test]
    fn parses_negative_patterns_tolerantly() {
        assert_eq!(parse_negative_patterns(None), Vec::<String>::new());
        assert_eq!(parse_negative_patterns(Some("".to_string())), Vec::<String>::new());
        assert_eq!(parse_negative_patterns(Some("not json".to_string())), Vec::<String>::new());
        assert_eq!(
            parse_negative_patterns(Some(r#"["foo", " bar ", "", 5]"#.to_string())),
            vec!["foo".to_string(), "bar".to_string()]
        );
    }

    #[test]
    fn term_struct_roundtrips_fields() {
        let t = term("1", "HP", "en", "demo");
        assert_eq!(t.source_term, "HP");
        assert_eq!(t.target_term, "HP_t");
    }
}
