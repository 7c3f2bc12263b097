use std::collections::HashMap;

use crate::config::ProjectConfig;
use crate::secrets::SecretStore;

pub const TASK_TRANSLATOR: &str = "translator";
pub const TASK_REVIEWER: &str = "reviewer";
pub const TASK_SCHEMA_RESOLVER: &str = "schema_resolver";

pub const PROVIDERS: &[&str] = &["mock", "openai", "local"];

fn default_model_for_provider(provider: &str) -> &'static str {
    match provider {
        "openai" => "gpt-4o-mini",
        "local" => "local-stub-v1",
        _ => "mock-v1",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPolicy {
    pub provider: String,
    pub model: String,
}

impl TaskPolicy {
    fn for_provider(provider: impl Into<String>) -> Self {
        let provider = provider.into();
        let model = default_model_for_provider(&provider).to_string();
        Self { provider, model }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPolicy {
    pub translator: TaskPolicy,
    pub reviewer: TaskPolicy,
    pub schema_resolver: TaskPolicy,
}

impl ModelPolicy {
    pub fn for_task(&self, task: &str) -> Option<&TaskPolicy> {
        match task {
            TASK_TRANSLATOR => Some(&self.translator),
            TASK_REVIEWER => Some(&self.reviewer),
            TASK_SCHEMA_RESOLVER => Some(&self.schema_resolver),
            _ => None,
        }
    }

    /// Serializes back to the flat `{translation, qa, schema_mapping}`
    /// provider-name map `ProjectConfig::model_policy` stores on disk.
    pub fn to_legacy_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("translation".to_string(), self.translator.provider.clone()),
            ("qa".to_string(), self.reviewer.provider.clone()),
            ("schema_mapping".to_string(), self.schema_resolver.provider.clone()),
        ])
    }
}

fn coerce_provider(raw: Option<&String>, fallback: &str) -> String {
    raw.map(|value| value.trim().to_lowercase())
        .filter(|value| PROVIDERS.contains(&value.as_str()))
        .unwrap_or_else(|| fallback.to_string())
}

/// Falls back to `openai` for the translator task when an API key is on
/// hand, else everything defaults to the free `mock` provider.
fn default_policy(secrets: &dyn SecretStore) -> ModelPolicy {
    let has_openai_key = secrets.get("openai_api_key").is_some();
    let translator_provider = if has_openai_key { "openai" } else { "mock" };
    ModelPolicy {
        translator: TaskPolicy::for_provider(translator_provider),
        reviewer: TaskPolicy::for_provider("mock"),
        schema_resolver: TaskPolicy::for_provider("mock"),
    }
}

/// Reads the project's `model_policy` map, a flat `{translation, qa,
/// schema_mapping}` provider-name dictionary kept for backward compatibility
/// with projects configured before model policy gained distinct
/// translator/reviewer/schema-resolver slots.
pub fn load_policy(config: &ProjectConfig, secrets: &dyn SecretStore) -> ModelPolicy {
    let defaults = default_policy(secrets);
    if config.model_policy.is_empty() {
        return defaults;
    }

    let translator_provider = coerce_provider(config.model_policy.get("translation"), &defaults.translator.provider);
    let reviewer_provider = coerce_provider(config.model_policy.get("qa"), &defaults.reviewer.provider);
    let schema_provider = coerce_provider(config.model_policy.get("schema_mapping"), &defaults.schema_resolver.provider);

    ModelPolicy {
        translator: TaskPolicy::for_provider(translator_provider),
        reviewer: TaskPolicy::for_provider(reviewer_provider),
        schema_resolver: TaskPolicy::for_provider(schema_provider),
    }
}

pub fn save_policy(config: &mut ProjectConfig, policy: &ModelPolicy) {
    config.model_policy = policy.to_legacy_map();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretStore;

    #[test]
    fn defaults_to_mock_without_openai_key() {
        let secrets = MemorySecretStore::new();
        let policy = default_policy(&secrets);
        assert_eq!(policy.translator.provider, "mock");
        assert_eq!(policy.translator.model, "mock-v1");
    }

    #[test]
    fn defaults_translator_to_openai_with_key_present() {
        let secrets = MemorySecretStore::new();
        secrets.set("openai_api_key", "sk-test");
        let policy = default_policy(&secrets);
        assert_eq!(policy.translator.provider, "openai");
        assert_eq!(policy.translator.model, "gpt-4o-mini");
    }

    #[test]
    fn load_policy_reads_legacy_map_and_rejects_unknown_providers() {
        let secrets = MemorySecretStore::new();
        let mut config = ProjectConfig::new("Demo", "demo", "en", "de-DE");
        config.model_policy = HashMap::from([
            ("translation".to_string(), "openai".to_string()),
            ("qa".to_string(), "not-a-real-provider".to_string()),
        ]);

        let policy = load_policy(&config, &secrets);
        assert_eq!(policy.translator.provider, "openai");
        assert_eq!(policy.reviewer.provider, "mock");
    }

    #[test]
    fn save_policy_round_trips_through_legacy_map() {
        let secrets = MemorySecretStore::new();
        let mut config = ProjectConfig::new("Demo", "demo", "en", "de-DE");
        let policy = ModelPolicy {
            translator: TaskPolicy::for_provider("local"),
            reviewer: TaskPolicy::for_provider("mock"),
            schema_resolver: TaskPolicy::for_provider("mock"),
        };
        save_policy(&mut config, &policy);
        let reloaded = load_policy(&config, &secrets);
        assert_eq!(reloaded.translator.provider, "local");
    }
}
