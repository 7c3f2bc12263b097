use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// On-disk project configuration. The core reads `global_game_glossary_enabled`,
/// `model_policy`, and `translation_style_hints`, and writes back only
/// `model_policy`; the rest is owned by whatever created the project.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub project_name: String,
    pub slug: String,
    pub default_source_locale: String,
    pub default_target_locale: String,
    #[serde(default)]
    pub enabled_locales: Vec<String>,
    #[serde(default = "default_global_glossary_enabled")]
    pub global_game_glossary_enabled: bool,
    #[serde(default = "default_model_policy")]
    pub model_policy: HashMap<String, String>,
    #[serde(default)]
    pub translation_style_hints: Option<String>,
}

fn default_global_glossary_enabled() -> bool {
    true
}

fn default_model_policy() -> HashMap<String, String> {
    HashMap::from([
        ("translation".to_string(), "provider_placeholder".to_string()),
        ("qa".to_string(), "provider_placeholder".to_string()),
        ("schema_mapping".to_string(), "provider_placeholder".to_string()),
    ])
}

impl ProjectConfig {
    pub fn new(
        project_name: impl Into<String>,
        slug: impl Into<String>,
        default_source_locale: impl Into<String>,
        default_target_locale: impl Into<String>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            slug: slug.into(),
            default_source_locale: default_source_locale.into(),
            default_target_locale: default_target_locale.into(),
            enabled_locales: Vec::new(),
            global_game_glossary_enabled: default_global_glossary_enabled(),
            model_policy: default_model_policy(),
            translation_style_hints: None,
        }
    }
}

/// Derives a project slug from a human-entered name: lowercase, collapse
/// non-alphanumerics into single dashes, trim the edges.
pub fn slugify(name: &str) -> crate::error::Result<String> {
    let lowered = name.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut last_was_dash = false;
    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = slug.trim_matches('-').to_string();
    if trimmed.is_empty() {
        return Err(crate::error::CoreError::validation(
            "unable to generate a valid slug from project name",
        ));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("  My Cool Game!! ").unwrap(), "my-cool-game");
        assert_eq!(slugify("Foo---Bar").unwrap(), "foo-bar");
    }

    #[test]
    fn slugify_rejects_empty_result() {
        assert!(slugify("!!!").is_err());
    }

    #[test]
    fn default_config_has_sensible_defaults() {
        let config = ProjectConfig::new("Demo", "demo", "en", "de-DE");
        assert!(config.global_game_glossary_enabled);
        assert!(config.enabled_locales.is_empty());
        assert_eq!(
            config.model_policy.get("translation").map(String::as_str),
            Some("provider_placeholder")
        );
    }

    #[test]
    fn roundtrips_through_json() {
        let config = ProjectConfig::new("Demo", "demo", "en", "de-DE");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("projectName"));
        let parsed: ProjectConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn tolerates_missing_optional_fields() {
        let json = r#"{
            "projectName": "Demo",
            "slug": "demo",
            "defaultSourceLocale": "en",
            "defaultTargetLocale": "de-DE"
        }"#;
        let config: ProjectConfig = serde_json::from_str(json).unwrap();
        assert!(config.global_game_glossary_enabled);
        assert!(config.translation_style_hints.is_none());
    }
}
