//! Subscriber setup for CloudWatch Logs.
//!
//! `LOGLEVEL` accepts the usual level names, including `WARNING`, `CRITICAL`
//! and `NOTSET`. AWS SDK and HTTP client internals are held at `error`.

use lambda_runtime::Error;
use tracing_subscriber::EnvFilter;

const QUIET_TARGETS: &[&str] = &[
    "aws_config",
    "aws_sdk_ssm",
    "aws_smithy_runtime",
    "aws_smithy_runtime_api",
    "hyper",
    "hyper_util",
    "reqwest",
    "rustls",
];

/// Maps a `LOGLEVEL` value onto a `tracing` level directive.
#[must_use]
pub fn level_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" | "FATAL" | "ERROR" => "error",
        "WARNING" | "WARN" => "warn",
        "DEBUG" => "debug",
        "TRACE" | "NOTSET" => "trace",
        _ => "info",
    }
}

/// Builds the filter: `level` for this crate and the runtime, `error` for noisy dependencies.
#[must_use]
pub fn env_filter(level: &str) -> EnvFilter {
    let mut directives = level_directive(level).to_string();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=error"));
    }
    EnvFilter::new(directives)
}

/// Installs a JSON subscriber as the global default.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(level: &str) -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter(level))
        .with_target(false)
        .with_current_span(false)
        .without_time()
        .try_init()
}
