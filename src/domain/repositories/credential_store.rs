//! Credential store abstraction.
//!
//! Credential CRUD and encryption-at-rest belong to a collaborator service;
//! this core only ever sees already-decrypted keys.

use crate::domain::errors::BotError;
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Decrypted API credentials for a user on a given exchange.
    async fn credentials(&self, user_id: &str, exchange: &str) -> Result<ApiCredentials, BotError>;
}

/// In-memory credential store for single-operator deployments and tests.
#[derive(Default)]
pub struct StaticCredentialStore {
    entries: HashMap<(String, String), ApiCredentials>,
    fallback: Option<ApiCredentials>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credentials used for any user without an explicit entry.
    pub fn with_fallback(credentials: ApiCredentials) -> Self {
        StaticCredentialStore {
            entries: HashMap::new(),
            fallback: Some(credentials),
        }
    }

    pub fn insert(&mut self, user_id: &str, exchange: &str, credentials: ApiCredentials) {
        self.entries
            .insert((user_id.to_string(), exchange.to_string()), credentials);
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn credentials(&self, user_id: &str, exchange: &str) -> Result<ApiCredentials, BotError> {
        if let Some(c) = self
            .entries
            .get(&(user_id.to_string(), exchange.to_string()))
        {
            return Ok(c.clone());
        }
        self.fallback.clone().ok_or_else(|| {
            BotError::CredentialsUnavailable(format!(
                "exchange {} not connected for user {}",
                exchange, user_id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_entry_wins_over_fallback() {
        let mut store = StaticCredentialStore::with_fallback(ApiCredentials {
            api_key: "shared".into(),
            api_secret: "shared".into(),
        });
        store.insert(
            "alice",
            "delta",
            ApiCredentials {
                api_key: "alice-key".into(),
                api_secret: "alice-secret".into(),
            },
        );

        let creds = store.credentials("alice", "delta").await.unwrap();
        assert_eq!(creds.api_key, "alice-key");

        let creds = store.credentials("bob", "delta").await.unwrap();
        assert_eq!(creds.api_key, "shared");
    }

    #[tokio::test]
    async fn test_missing_credentials_error() {
        let store = StaticCredentialStore::new();
        let result = store.credentials("bob", "delta").await;
        assert!(matches!(result, Err(BotError::CredentialsUnavailable(_))));
    }
}
