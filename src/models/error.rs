//! Error types for the proxy and authorizer Lambdas.
//!
//! Authorizer errors never reach the caller: they are logged and collapsed
//! into a single `Unauthorized` diagnostic. Proxy errors propagate to the
//! Lambda runtime as function errors.

use lambda_runtime::Diagnostic;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Configuration errors raised while reading the environment at cold start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid UPSTREAM {value:?}: {reason}")]
    InvalidUpstream { value: String, reason: String },
}

/// Errors raised by a [`SecretStore`](crate::secrets::SecretStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecretStoreError {
    /// The parameter does not exist. Never retried.
    #[error("secret {0} not found")]
    NotFound(String),
    /// Throttling, network or any other service failure. Retried with backoff.
    #[error("secret store request failed: {0}")]
    Transient(String),
}

impl SecretStoreError {
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Reasons an authorization attempt could not reach a decision.
///
/// A wrong password is not an error: it yields an `AccessDecision` with `Effect::Deny`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed credential: {0}")]
    MalformedCredential(String),
    #[error("no secret stored for user: {0}")]
    SecretNotFound(String),
    #[error("secret lookup failed after retries: {0}")]
    SecretLookupTransient(String),
    #[error("unrecognised method ARN: {0}")]
    InvalidResource(String),
}

impl From<SecretStoreError> for AuthError {
    fn from(error: SecretStoreError) -> Self {
        match error {
            SecretStoreError::NotFound(name) => Self::SecretNotFound(name),
            SecretStoreError::Transient(message) => Self::SecretLookupTransient(message),
        }
    }
}

/// The only error the authorizer ever returns to API Gateway.
///
/// API Gateway maps an `Unauthorized` error message to a 401 response.
#[must_use]
pub fn unauthorized() -> Diagnostic {
    Diagnostic {
        error_type: "Unauthorized".to_string(),
        error_message: "Unauthorized".to_string(),
    }
}

/// Errors raised while forwarding a request upstream.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("invalid request header: {0}")]
    InvalidHeader(String),
    #[error("request body is not valid base64: {0}")]
    BodyEncoding(#[from] base64::DecodeError),
    #[error("request body is not valid UTF-8: {0}")]
    BodyUtf8(#[from] FromUtf8Error),
    #[error("failed to connect to upstream: {0}")]
    UpstreamConnection(#[source] reqwest::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[source] reqwest::Error),
    #[error("failed to read upstream response: {0}")]
    ResponseBody(#[from] std::io::Error),
}

impl ProxyError {
    /// Short machine-readable kind reported as the Lambda `errorType`.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidMethod(_) => "InvalidMethod",
            Self::InvalidHeader(_) => "InvalidHeader",
            Self::BodyEncoding(_) | Self::BodyUtf8(_) => "InvalidBody",
            Self::UpstreamConnection(_) => "UpstreamConnection",
            Self::Upstream(_) => "UpstreamError",
            Self::ResponseBody(_) => "ResponseBody",
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() {
            Self::UpstreamConnection(error)
        } else {
            Self::Upstream(error)
        }
    }
}

impl From<ProxyError> for Diagnostic {
    fn from(error: ProxyError) -> Self {
        Self {
            error_type: error.error_type().to_string(),
            error_message: error.to_string(),
        }
    }
}
