//! API Gateway proxy integration request/response models.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::null_as_default;

/// Inbound proxy integration event (REST API payload format 1.0).
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    pub path: String,
    pub http_method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub multi_value_query_string_parameters: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_base64_encoded: bool,
}

/// Proxy integration result. The body is always base64 encoded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub is_base64_encoded: bool,
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}
