//! Secret store capability and its SSM Parameter Store implementation.

use async_trait::async_trait;
use aws_sdk_ssm::Client;
use aws_sdk_ssm::error::{DisplayErrorContext, SdkError};
use aws_sdk_ssm::operation::get_parameter::GetParameterError;
use chrono::{DateTime, Utc};
use lambda_runtime::tracing::debug;
use std::fmt;

pub use crate::models::SecretStoreError;

/// A secret as returned by the store.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretRecord {
    pub name: String,
    pub value: String,
    pub fetched_at: DateTime<Utc>,
}

impl SecretRecord {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            fetched_at: Utc::now(),
        }
    }
}

// Never print secret values.
impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

/// Get-by-name access to per-user secrets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the secret stored under `name`.
    ///
    /// # Errors
    ///
    /// [`SecretStoreError::NotFound`] when nothing is stored under `name`,
    /// [`SecretStoreError::Transient`] for any other failure.
    async fn get(&self, name: &str) -> Result<SecretRecord, SecretStoreError>;
}

/// Reads `SecureString` parameters from AWS Systems Manager.
#[derive(Debug, Clone)]
pub struct SsmSecretStore {
    client: Client,
}

impl SsmSecretStore {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the Lambda execution environment's credentials.
    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl SecretStore for SsmSecretStore {
    async fn get(&self, name: &str) -> Result<SecretRecord, SecretStoreError> {
        debug!(parameter = %name, "Fetching parameter from SSM");

        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|err| classify(name, &err))?;

        let value = output
            .parameter()
            .and_then(|parameter| parameter.value())
            .ok_or_else(|| SecretStoreError::NotFound(name.to_string()))?;

        Ok(SecretRecord::new(name, value))
    }
}

fn classify<R: fmt::Debug>(name: &str, err: &SdkError<GetParameterError, R>) -> SecretStoreError {
    match err.as_service_error() {
        Some(service)
            if service.is_parameter_not_found() || service.is_parameter_version_not_found() =>
        {
            SecretStoreError::NotFound(name.to_string())
        }
        _ => SecretStoreError::Transient(DisplayErrorContext(err).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_value() {
        let record = SecretRecord::new("/users/bob", "hunter2");
        let printed = format!("{record:?}");

        assert!(printed.contains("/users/bob"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn transient_classification() {
        assert!(SecretStoreError::Transient("throttled".into()).is_transient());
        assert!(!SecretStoreError::NotFound("/users/bob".into()).is_transient());
    }
}
