//! Credential store collaborator
//!
//! LLM bindings carry a credential *reference*, never the secret
//! itself. The engine resolves the reference at invocation time and the
//! resolved value lives only inside the request for that single call.

use std::collections::HashMap;

use crate::error::WeftError;

/// Resolves credential references to secrets
pub trait SecretStore: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<String, WeftError>;
}

/// Resolves references as environment variable names.
/// An optional `env:` prefix is accepted and stripped.
#[derive(Debug, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    pub fn new() -> Self {
        Self
    }
}

impl SecretStore for EnvSecretStore {
    fn resolve(&self, reference: &str) -> Result<String, WeftError> {
        let name = reference.strip_prefix("env:").unwrap_or(reference);
        std::env::var(name).map_err(|e| WeftError::SecretUnresolved {
            reference: reference.to_string(),
            details: e.to_string(),
        })
    }
}

/// Fixed in-memory store, for tests and embedding
#[derive(Debug, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, String>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, reference: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(reference.into(), value.into());
        self
    }
}

impl SecretStore for StaticSecretStore {
    fn resolve(&self, reference: &str) -> Result<String, WeftError> {
        self.secrets
            .get(reference)
            .cloned()
            .ok_or_else(|| WeftError::SecretUnresolved {
                reference: reference.to_string(),
                details: "not present in static store".to_string(),
            })
    }
}
