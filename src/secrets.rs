use std::collections::HashMap;
use std::sync::RwLock;

/// Key-value secret lookup. Absence of a required key is not itself an
/// error here; callers decide whether to fall back to mock or fail in
/// strict mode (`jobs::pipeline`).
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// In-memory test double. OS keychain / `secret-tool` integration is out of
/// scope for this crate.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.values.write().unwrap().insert(name.into(), value.into());
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, name: &str) -> Option<String> {
        self.values.read().unwrap().get(name).cloned()
    }
}
