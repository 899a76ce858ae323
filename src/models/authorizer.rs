//! API Gateway custom authorizer request/response models.
//!
//! Covers both `TOKEN` authorizers (credential in `authorizationToken`) and
//! `REQUEST` authorizers (credential in the `Authorization` header).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::null_as_default;

/// Policy language version required by API Gateway.
pub const POLICY_VERSION: &str = "2012-10-17";
/// IAM action granting invoke rights on an API Gateway stage.
pub const INVOKE_ACTION: &str = "execute-api:Invoke";

/// Authorizer invocation event sent by API Gateway.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub authorization_token: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub method_arn: String,
}

impl AuthorizerEvent {
    /// Picks the raw credential: `TOKEN` events carry it in `authorizationToken`,
    /// every other type in the `Authorization` header.
    #[must_use]
    pub fn credential(&self) -> Option<&str> {
        if self.kind == "TOKEN" {
            self.authorization_token.as_deref()
        } else {
            self.headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
                .map(|(_, value)| value.as_str())
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

/// Outcome of evaluating one credential against one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub principal: String,
    pub effect: Effect,
    pub resource: String,
}

impl AccessDecision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self.effect, Effect::Allow)
    }
}

/// IAM policy returned to API Gateway.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerResponse {
    pub principal_id: String,
    pub policy_document: PolicyDocument,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub action: String,
    pub effect: Effect,
    pub resource: String,
}

impl From<AccessDecision> for AuthorizerResponse {
    fn from(decision: AccessDecision) -> Self {
        Self {
            principal_id: decision.principal,
            policy_document: PolicyDocument {
                version: POLICY_VERSION.to_string(),
                statement: vec![PolicyStatement {
                    action: INVOKE_ACTION.to_string(),
                    effect: decision.effect,
                    resource: decision.resource,
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_event_reads_authorization_token() {
        let event: AuthorizerEvent = serde_json::from_value(json!({
            "type": "TOKEN",
            "authorizationToken": "Basic Ym9iOnNlY3JldA==",
            "methodArn": "arn:aws:execute-api:us-east-1:123:abc/prod/GET/foo"
        }))
        .unwrap_or_default();

        assert_eq!(event.credential(), Some("Basic Ym9iOnNlY3JldA=="));
    }

    #[test]
    fn request_event_reads_header_case_insensitively() {
        let event: AuthorizerEvent = serde_json::from_value(json!({
            "type": "REQUEST",
            "authorizationToken": "ignored",
            "headers": { "authorization": "Basic abc" },
            "methodArn": "arn"
        }))
        .unwrap_or_default();

        assert_eq!(event.credential(), Some("Basic abc"));
    }

    #[test]
    fn null_headers_deserialize_as_empty() {
        let event: AuthorizerEvent = serde_json::from_value(json!({
            "type": "REQUEST",
            "headers": null,
            "methodArn": "arn"
        }))
        .unwrap_or_default();

        assert!(event.headers.is_empty());
        assert_eq!(event.credential(), None);
    }

    #[test]
    fn policy_serializes_in_gateway_shape() {
        let response = AuthorizerResponse::from(AccessDecision {
            principal: "bob".into(),
            effect: Effect::Allow,
            resource: "arn:aws:execute-api:us-east-1:123:abc/prod/*".into(),
        });

        assert_eq!(
            serde_json::to_value(response).unwrap_or_default(),
            json!({
                "principalId": "bob",
                "policyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Action": "execute-api:Invoke",
                        "Effect": "Allow",
                        "Resource": "arn:aws:execute-api:us-east-1:123:abc/prod/*"
                    }]
                }
            })
        );
    }
}
