//! Environment configuration, read once per cold start.

use url::Url;

use crate::models::ConfigError;

pub const UPSTREAM_VAR: &str = "UPSTREAM";
pub const SSM_AUTHORIZATION_PATH_VAR: &str = "SSM_AUTHORIZATION_PATH";
pub const LOG_LEVEL_VAR: &str = "LOGLEVEL";
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Settings for the proxy Lambda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Base URL every inbound path is appended to.
    pub upstream: String,
    /// `host[:port]` of `upstream`, sent as the outbound `Host` header.
    pub upstream_host: String,
    pub log_level: String,
}

impl ProxyConfig {
    /// # Errors
    ///
    /// Fails when `UPSTREAM` is unset or not an `http(s)` URL with a host.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`] with an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Fails when `UPSTREAM` is missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let upstream = lookup(UPSTREAM_VAR).ok_or(ConfigError::Missing(UPSTREAM_VAR))?;
        let upstream_host = upstream_host(&upstream)?;
        Ok(Self {
            upstream,
            upstream_host,
            log_level: log_level(&lookup),
        })
    }
}

/// Settings for the authorizer Lambda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizerConfig {
    /// Prepended to the user name to form the SSM parameter name.
    pub parameter_prefix: String,
    pub log_level: String,
}

impl AuthorizerConfig {
    /// # Errors
    ///
    /// Fails when `SSM_AUTHORIZATION_PATH` is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// # Errors
    ///
    /// Fails when `SSM_AUTHORIZATION_PATH` is missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parameter_prefix = lookup(SSM_AUTHORIZATION_PATH_VAR)
            .ok_or(ConfigError::Missing(SSM_AUTHORIZATION_PATH_VAR))?;
        Ok(Self {
            parameter_prefix,
            log_level: log_level(&lookup),
        })
    }
}

fn log_level<F>(lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(LOG_LEVEL_VAR)
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// Extracts `host[:port]` from an upstream base URL.
///
/// # Errors
///
/// Fails unless `upstream` is an absolute `http` or `https` URL with a host.
pub fn upstream_host(upstream: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUpstream {
        value: upstream.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(upstream).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;

    Ok(url
        .port()
        .map_or_else(|| host.to_string(), |port| format!("{host}:{port}")))
}
