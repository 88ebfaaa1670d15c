//! Credential resolution.
//!
//! Credentials are referred to by name everywhere; only connectors that need
//! the value resolve it, and the value is never logged.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::{Error, Result};

/// A resolved credential. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw value. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

/// Trait for credential providers.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolve a credential by name.
    async fn resolve(&self, name: &str) -> Result<SecretValue>;
}

/// Resolves `name` from the environment variable `{prefix}{NAME}`, with the
/// name upper-cased and `-`/`.` mapped to `_`.
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    prefix: String,
}

impl EnvCredentialProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn variable_name(&self, name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|c| match c {
                '-' | '.' | '/' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new("EDGESHIP_SECRET_")
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn resolve(&self, name: &str) -> Result<SecretValue> {
        let var = self.variable_name(name);
        std::env::var(&var)
            .map(SecretValue)
            .map_err(|_| Error::Unauthorized(format!("credential '{}' is not set ({})", name, var)))
    }
}

/// Fixed credentials, for local runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    values: HashMap<String, SecretValue>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), SecretValue::new(value));
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn resolve(&self, name: &str) -> Result<SecretValue> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Unauthorized(format!("credential '{}' is not set", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_value() {
        let secret = SecretValue::new("ghp_supersecret");
        assert_eq!(format!("{:?}", secret), "SecretValue(***)");
        assert_eq!(secret.expose(), "ghp_supersecret");
    }

    #[test]
    fn test_env_variable_name() {
        let provider = EnvCredentialProvider::default();
        assert_eq!(
            provider.variable_name("github-connection"),
            "EDGESHIP_SECRET_GITHUB_CONNECTION"
        );
    }

    #[tokio::test]
    async fn test_static_credentials() {
        let creds = StaticCredentials::new().with("github", "token-1");
        assert_eq!(creds.resolve("github").await.unwrap().expose(), "token-1");
        assert!(matches!(
            creds.resolve("missing").await,
            Err(Error::Unauthorized(_))
        ));
    }
}
