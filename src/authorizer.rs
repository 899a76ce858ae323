//! API Gateway custom authorizer validating Basic credentials against SSM.
//!
//! Flow per invocation: select credential → parse → look up secret (memoized)
//! → compare → derive resource. Every failure is logged with its reason and
//! reported to API Gateway as the same `Unauthorized` error.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use lambda_runtime::tracing::{debug, error, info};
use lambda_runtime::{Diagnostic, LambdaEvent};
use serde_json::Value;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::models::error::unauthorized;
use crate::models::{AccessDecision, AuthError, AuthorizerEvent, AuthorizerResponse, Effect};
use crate::retry::{RetryPolicy, retry};
use crate::secrets::{SecretRecord, SecretStore, SecretStoreError};

/// How long a fetched secret may be reused.
pub const SECRET_CACHE_TTL: Duration = Duration::from_secs(300);
/// Maximum number of users whose secrets are held at once.
pub const SECRET_CACHE_CAPACITY: usize = 1000;

const UNKNOWN_USER: &str = "Unknown";
const UNKNOWN_METHOD: &str = "N/A";
const EXECUTE_API_ARN_PREFIX: &str = "arn:aws:execute-api:";

/// Username and password decoded from a `<scheme> <base64(user:pass)>` value.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredential {
    pub scheme: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredential")
            .field("scheme", &self.scheme)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Splits `<scheme> <payload>`; exactly one space is allowed.
///
/// # Errors
///
/// Returns [`AuthError::MalformedCredential`] for any other shape.
pub fn split_scheme(raw: &str) -> Result<(&str, &str), AuthError> {
    let mut parts = raw.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(payload), None) => Ok((scheme, payload)),
        _ => Err(AuthError::MalformedCredential(
            "expected '<scheme> <credentials>'".to_string(),
        )),
    }
}

/// Decodes `base64(username:password)`. The decoded text must contain exactly one `:`.
///
/// # Errors
///
/// Returns [`AuthError::MalformedCredential`] on bad base64, bad UTF-8 or a wrong field count.
pub fn decode_user_pass(payload: &str) -> Result<(String, String), AuthError> {
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| AuthError::MalformedCredential(format!("invalid base64: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| AuthError::MalformedCredential(format!("invalid UTF-8: {e}")))?;

    let mut fields = text.split(':');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(username), Some(password), None) => Ok((username.to_string(), password.to_string())),
        _ => Err(AuthError::MalformedCredential(
            "expected 'username:password'".to_string(),
        )),
    }
}

/// Parses a full `Authorization` value.
///
/// # Errors
///
/// Returns [`AuthError::MalformedCredential`] if either step fails.
pub fn parse_basic_credential(raw: &str) -> Result<BasicCredential, AuthError> {
    let (scheme, payload) = split_scheme(raw)?;
    let (username, password) = decode_user_pass(payload)?;
    Ok(BasicCredential {
        scheme: scheme.to_string(),
        username,
        password,
    })
}

/// Narrows a method ARN to its API and stage, granting every method and path
/// under it.
///
/// `arn:aws:execute-api:us-east-1:123:abc/prod/GET/foo` becomes
/// `arn:aws:execute-api:us-east-1:123:abc/prod/*`.
#[must_use]
pub fn effective_resource(method_arn: &str) -> Option<String> {
    let rest = method_arn.strip_prefix(EXECUTE_API_ARN_PREFIX)?;
    let mut fields = rest.splitn(3, ':');
    let region = fields.next().filter(|s| !s.is_empty())?;
    let account = fields.next().filter(|s| !s.is_empty())?;
    let path = fields.next()?;

    let mut segments = path.splitn(3, '/');
    let api_id = segments.next().filter(|s| !s.is_empty())?;
    let stage = segments.next().filter(|s| !s.is_empty())?;

    Some(format!(
        "{EXECUTE_API_ARN_PREFIX}{region}:{account}:{api_id}/{stage}/*"
    ))
}

/// Who the caller claimed to be, as far as parsing got.
#[derive(Debug)]
struct Identity {
    method: String,
    user: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            method: UNKNOWN_METHOD.to_string(),
            user: UNKNOWN_USER.to_string(),
        }
    }
}

/// Basic-auth authorizer backed by a [`SecretStore`].
///
/// The secret cache sits behind a mutex that is never held across an await,
/// so one instance may serve concurrent invocations.
pub struct Authorizer<S, C = SystemClock> {
    store: S,
    parameter_prefix: String,
    cache: Mutex<TtlCache<String, SecretRecord, C>>,
    retry_policy: RetryPolicy,
}

impl<S: SecretStore> Authorizer<S> {
    pub fn new(store: S, parameter_prefix: impl Into<String>) -> Self {
        Self::with_cache(
            store,
            parameter_prefix,
            TtlCache::new(SECRET_CACHE_CAPACITY, SECRET_CACHE_TTL),
        )
    }
}

impl<S: SecretStore, C: Clock> Authorizer<S, C> {
    pub fn with_cache(
        store: S,
        parameter_prefix: impl Into<String>,
        cache: TtlCache<String, SecretRecord, C>,
    ) -> Self {
        Self {
            store,
            parameter_prefix: parameter_prefix.into(),
            cache: Mutex::new(cache),
            retry_policy: RetryPolicy::DEFAULT,
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Decides one event and logs the outcome.
    ///
    /// # Errors
    ///
    /// Every non-`Allow` outcome returns the `Unauthorized` diagnostic.
    pub async fn authorize(
        &self,
        event: &AuthorizerEvent,
    ) -> Result<AuthorizerResponse, Diagnostic> {
        let mut identity = Identity::default();

        match self.evaluate(event, &mut identity).await {
            Ok(decision) if decision.is_allowed() => {
                info!(
                    method = %identity.method,
                    user = %identity.user,
                    effect = "Allow",
                    "Authorization decision"
                );
                let policy = AuthorizerResponse::from(decision);
                info!(
                    authorization = "Success",
                    policy = ?policy,
                    "Issued policy"
                );
                Ok(policy)
            }
            Ok(_) => Err(deny(&identity)),
            Err(e) => {
                error!(error = %e, "Authorization failed");
                Err(deny(&identity))
            }
        }
    }

    async fn evaluate(
        &self,
        event: &AuthorizerEvent,
        identity: &mut Identity,
    ) -> Result<AccessDecision, AuthError> {
        let raw = event
            .credential()
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| AuthError::MalformedCredential("no credential presented".to_string()))?;

        let (scheme, payload) = split_scheme(raw)?;
        identity.method = scheme.to_string();
        let (username, password) = decode_user_pass(payload)?;
        identity.user.clone_from(&username);

        let secret = self.secret_for(&username).await?;
        if secret.value.as_bytes() != password.as_bytes() {
            debug!(user = %username, "Password mismatch");
            return Ok(AccessDecision {
                principal: username,
                effect: Effect::Deny,
                resource: event.method_arn.clone(),
            });
        }

        let resource = effective_resource(&event.method_arn)
            .ok_or_else(|| AuthError::InvalidResource(event.method_arn.clone()))?;

        Ok(AccessDecision {
            principal: username,
            effect: Effect::Allow,
            resource,
        })
    }

    /// Cached lookup of the user's secret. Only successful lookups are cached.
    async fn secret_for(&self, username: &str) -> Result<SecretRecord, AuthError> {
        if let Some(record) = self.lock_cache().get(username) {
            debug!(user = %username, "Secret cache hit");
            return Ok(record);
        }

        let name = format!("{}{username}", self.parameter_prefix);
        let record = retry(
            &self.retry_policy,
            || self.store.get(&name),
            SecretStoreError::is_transient,
        )
        .await?;

        self.lock_cache().insert(username.to_string(), record.clone());
        Ok(record)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, TtlCache<String, SecretRecord, C>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn deny(identity: &Identity) -> Diagnostic {
    info!(
        method = %identity.method,
        user = %identity.user,
        effect = "Deny",
        "Authorization decision"
    );
    unauthorized()
}

/// Lambda entry point for the authorizer.
///
/// The payload is taken as raw JSON so that even an unparseable event
/// yields `Unauthorized` instead of a runtime deserialization error.
///
/// # Errors
///
/// Returns the `Unauthorized` diagnostic for every denied or failed request.
pub async fn function_handler<S, C>(
    authorizer: &Authorizer<S, C>,
    event: LambdaEvent<Value>,
) -> Result<AuthorizerResponse, Diagnostic>
where
    S: SecretStore,
    C: Clock,
{
    let (payload, _context) = event.into_parts();
    debug!(
        method_arn = ?payload.get("methodArn"),
        event_type = ?payload.get("type"),
        "Authorizer invoked"
    );

    let event: AuthorizerEvent = match serde_json::from_value(payload) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Failed to parse authorizer event");
            return Err(deny(&Identity::default()));
        }
    };

    authorizer.authorize(&event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MockSecretStore;

    const METHOD_ARN: &str = "arn:aws:execute-api:us-east-1:123:abc/prod/GET/foo";

    fn basic(user_pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(user_pass))
    }

    fn token_event(token: &str) -> AuthorizerEvent {
        AuthorizerEvent {
            kind: "TOKEN".into(),
            authorization_token: Some(token.into()),
            method_arn: METHOD_ARN.into(),
            ..AuthorizerEvent::default()
        }
    }

    #[test]
    fn test_parse_basic_credential() {
        let credential = parse_basic_credential(&basic("bob:secret"));
        assert_eq!(
            credential.ok(),
            Some(BasicCredential {
                scheme: "Basic".into(),
                username: "bob".into(),
                password: "secret".into(),
            })
        );
    }

    #[test]
    fn test_parse_rejects_malformed_values() {
        let cases = [
            String::new(),
            "Basic".to_string(),
            STANDARD.encode("bob:secret"),
            "Basic not*base64".to_string(),
            basic("bobsecret"),
            basic("bob:sec:ret"),
            format!("Basic  {}", STANDARD.encode("bob:secret")),
            format!("Basic {}", STANDARD.encode([0xff, 0xfe, b':', b'x'])),
        ];

        for raw in cases {
            assert!(
                matches!(parse_basic_credential(&raw), Err(AuthError::MalformedCredential(_))),
                "expected {raw:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_effective_resource() {
        assert_eq!(
            effective_resource(METHOD_ARN).as_deref(),
            Some("arn:aws:execute-api:us-east-1:123:abc/prod/*")
        );
        assert_eq!(
            effective_resource("arn:aws:execute-api:eu-west-1:999:xyz/dev").as_deref(),
            Some("arn:aws:execute-api:eu-west-1:999:xyz/dev/*")
        );
        assert_eq!(effective_resource("arn:aws:execute-api:us-east-1:123:abc"), None);
        assert_eq!(effective_resource("arn:aws:s3:::bucket/key"), None);
        assert_eq!(effective_resource(""), None);
    }

    #[tokio::test]
    async fn test_allow_issues_stage_wide_policy() {
        let mut store = MockSecretStore::new();
        store
            .expect_get()
            .withf(|name| name == "/users/bob")
            .times(1)
            .returning(|name| Ok(SecretRecord::new(name, "secret")));
        let authorizer = Authorizer::new(store, "/users/");

        let response = authorizer.authorize(&token_event(&basic("bob:secret"))).await;

        let response = response.ok();
        assert_eq!(response.as_ref().map(|r| r.principal_id.as_str()), Some("bob"));
        assert_eq!(
            response.map(|r| r.policy_document.statement[0].resource.clone()),
            Some("arn:aws:execute-api:us-east-1:123:abc/prod/*".to_string())
        );
    }

    #[tokio::test]
    async fn test_mismatch_is_unauthorized() {
        let mut store = MockSecretStore::new();
        store
            .expect_get()
            .returning(|name| Ok(SecretRecord::new(name, "secret")));
        let authorizer = Authorizer::new(store, "/users/");

        let result = authorizer.authorize(&token_event(&basic("bob:wrong"))).await;

        assert_eq!(result.err().map(|d| d.error_message), Some("Unauthorized".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_credential_skips_store() {
        let mut store = MockSecretStore::new();
        store.expect_get().times(0);
        let authorizer = Authorizer::new(store, "/users/");

        let result = authorizer.authorize(&token_event("Basic ???")).await;

        assert_eq!(result.err().map(|d| d.error_type), Some("Unauthorized".to_string()));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let mut store = MockSecretStore::new();
        store
            .expect_get()
            .times(1)
            .returning(|name| Err(SecretStoreError::NotFound(name.to_string())));
        let authorizer = Authorizer::new(store, "/users/");

        let result = authorizer.authorize(&token_event(&basic("bob:secret"))).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_method_arn_is_unauthorized() {
        let mut store = MockSecretStore::new();
        store
            .expect_get()
            .returning(|name| Ok(SecretRecord::new(name, "secret")));
        let authorizer = Authorizer::new(store, "/users/");
        let mut event = token_event(&basic("bob:secret"));
        event.method_arn = "not-an-arn".into();

        assert!(authorizer.authorize(&event).await.is_err());
    }
}
