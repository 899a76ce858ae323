//! Reverse proxy forwarding API Gateway requests to a single upstream.
//!
//! The upstream response is read to completion and returned base64 encoded,
//! so binary payloads survive the proxy integration unchanged.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::TryStreamExt;
use lambda_runtime::tracing::{debug, error, info};
use lambda_runtime::{Diagnostic, LambdaEvent};
use reqwest::header::{
    ACCEPT_ENCODING, ACCEPT_RANGES, AUTHORIZATION, CONTENT_LENGTH, HOST, HeaderMap, HeaderName,
    HeaderValue,
};
use reqwest::{Client, Method, Response, StatusCode};
use std::collections::HashMap;
use std::io;
use std::pin::pin;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

use crate::config::ProxyConfig;
use crate::models::{ProxyError, ProxyRequest, ProxyResponse};
use crate::retry::{RetryPolicy, retry};

/// Size of each read while draining the upstream body.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Rewrites inbound headers for the upstream.
///
/// - `Host` becomes `upstream_host`
/// - a missing or empty `Accept-Encoding` is sent as empty, so the upstream
///   does not compress
/// - `Authorization` is dropped; credentials stay at the gateway
///
/// # Errors
///
/// Returns [`ProxyError::InvalidHeader`] for invalid names and for values
/// holding control bytes such as CR, LF or NUL. Non-ASCII values pass through.
#[allow(clippy::implicit_hasher)]
pub fn sanitize_headers(
    headers: &HashMap<String, String>,
    upstream_host: &str,
) -> Result<HeaderMap, ProxyError> {
    let mut sanitized = HeaderMap::with_capacity(headers.len() + 2);
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ProxyError::InvalidHeader(format!("{name}: {e}")))?;
        let header_value = HeaderValue::from_bytes(value.as_bytes())
            .map_err(|e| ProxyError::InvalidHeader(format!("{name}: {e}")))?;
        sanitized.insert(header_name, header_value);
    }

    let host = HeaderValue::from_str(upstream_host)
        .map_err(|e| ProxyError::InvalidHeader(format!("Host: {e}")))?;
    sanitized.insert(HOST, host);

    if sanitized.get(ACCEPT_ENCODING).is_none_or(HeaderValue::is_empty) {
        sanitized.insert(ACCEPT_ENCODING, HeaderValue::from_static(""));
    }

    sanitized.remove(AUTHORIZATION);
    Ok(sanitized)
}

/// Returns the body to send upstream, decoding base64 payloads to text.
///
/// # Errors
///
/// Fails when an encoded body is not valid base64 or does not decode to UTF-8.
pub fn decode_body(request: &ProxyRequest) -> Result<String, ProxyError> {
    match request.body.as_deref() {
        None | Some("") => Ok(String::new()),
        Some(body) if request.is_base64_encoded => Ok(String::from_utf8(STANDARD.decode(body)?)?),
        Some(body) => Ok(body.to_string()),
    }
}

/// Flattens multi-value query parameters into ordered pairs.
#[allow(clippy::implicit_hasher)]
#[must_use]
pub fn query_pairs(parameters: &HashMap<String, Vec<String>>) -> Vec<(&str, &str)> {
    let mut pairs: Vec<(&str, &str)> = parameters
        .iter()
        .flat_map(|(name, values)| {
            values
                .iter()
                .map(move |value| (name.as_str(), value.as_str()))
        })
        .collect();
    // HashMap order is random; repeated values keep their event order
    pairs.sort_by_key(|(name, _)| *name);
    pairs
}

/// Reads `reader` to the end in [`READ_CHUNK_SIZE`] chunks.
///
/// # Errors
///
/// Propagates the first read error.
pub async fn drain<R: AsyncRead>(reader: R) -> io::Result<Vec<u8>> {
    let mut reader = pin!(reader);
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; READ_CHUNK_SIZE];
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            return Ok(buffer);
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}

/// Fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    /// Drains a streamed response into memory.
    ///
    /// # Errors
    ///
    /// Fails if the body stream breaks before completion.
    pub async fn read(response: Response) -> Result<Self, ProxyError> {
        let status = response.status();
        let headers = response.headers().clone();
        let stream = response.bytes_stream().map_err(io::Error::other);
        let body = drain(StreamReader::new(stream)).await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    /// Converts into the gateway result, dropping headers that no longer
    /// describe the re-framed body. Repeated headers are joined with `, `.
    #[must_use]
    pub fn into_proxy_response(mut self) -> ProxyResponse {
        self.headers.remove(CONTENT_LENGTH);
        self.headers.remove(ACCEPT_RANGES);

        let mut headers: HashMap<String, String> = HashMap::with_capacity(self.headers.keys_len());
        for (name, value) in &self.headers {
            let value = String::from_utf8_lossy(value.as_bytes());
            headers
                .entry(name.as_str().to_string())
                .and_modify(|joined| {
                    joined.push_str(", ");
                    joined.push_str(&value);
                })
                .or_insert_with(|| value.into_owned());
        }

        ProxyResponse {
            is_base64_encoded: true,
            status_code: self.status.as_u16(),
            body: STANDARD.encode(&self.body),
            headers,
        }
    }
}

/// Request ready to be sent, reusable across retries.
#[derive(Debug)]
struct OutboundRequest<'a> {
    method: Method,
    url: String,
    headers: HeaderMap,
    query: Vec<(&'a str, &'a str)>,
    body: String,
}

/// Forwards requests to the configured upstream.
#[derive(Debug, Clone)]
pub struct Proxy {
    client: Client,
    upstream: String,
    upstream_host: String,
    retry_policy: RetryPolicy,
}

impl Proxy {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built (e.g. no TLS roots available).
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .map_err(ProxyError::Upstream)?;
        Ok(Self::with_client(client, config))
    }

    #[must_use]
    pub fn with_client(client: Client, config: &ProxyConfig) -> Self {
        Self {
            client,
            upstream: config.upstream.clone(),
            upstream_host: config.upstream_host.clone(),
            retry_policy: RetryPolicy::DEFAULT,
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Upstream base URL joined with the inbound path.
    #[must_use]
    pub fn target_url(&self, path: &str) -> String {
        format!("{}{path}", self.upstream)
    }

    /// Forwards one request and buffers the full response.
    ///
    /// # Errors
    ///
    /// Any request, connection or body error; connection failures only after
    /// the retry budget is spent.
    pub async fn forward(&self, request: &ProxyRequest) -> Result<UpstreamResponse, ProxyError> {
        let method = Method::from_bytes(request.http_method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ProxyError::InvalidMethod(request.http_method.clone()))?;

        let outbound = OutboundRequest {
            method,
            url: self.target_url(&request.path),
            headers: sanitize_headers(&request.headers, &self.upstream_host)?,
            query: query_pairs(&request.multi_value_query_string_parameters),
            body: decode_body(request)?,
        };
        info!(method = %outbound.method, url = %outbound.url, "Forwarding request");

        let response = retry(
            &self.retry_policy,
            || self.send(&outbound),
            reqwest::Error::is_connect,
        )
        .await?;

        debug!(status = %response.status(), headers = ?response.headers(), "Upstream responded");
        UpstreamResponse::read(response).await
    }

    async fn send(&self, outbound: &OutboundRequest<'_>) -> Result<Response, reqwest::Error> {
        self.client
            .request(outbound.method.clone(), &outbound.url)
            .headers(outbound.headers.clone())
            .query(&outbound.query)
            .body(outbound.body.clone())
            .send()
            .await
    }

    /// Forwards and converts to the gateway result shape.
    ///
    /// # Errors
    ///
    /// See [`Self::forward`].
    pub async fn handle(&self, request: &ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let upstream = self.forward(request).await?;
        let response = upstream.into_proxy_response();
        info!(
            status = response.status_code,
            body_len = response.body.len(),
            "Returning upstream response"
        );
        debug!(response = ?response, "Proxy result");
        Ok(response)
    }
}

/// Lambda entry point for the proxy.
///
/// Logs the full event only at debug level.
///
/// # Errors
///
/// Returns a `Diagnostic` whose `error_type` is one of `InvalidMethod`,
/// `InvalidHeader`, `InvalidBody`, `UpstreamConnection`, `UpstreamError` or
/// `ResponseBody`.
pub async fn function_handler(
    proxy: &Proxy,
    event: LambdaEvent<ProxyRequest>,
) -> Result<ProxyResponse, Diagnostic> {
    let (request, _context) = event.into_parts();
    debug!(event = ?request, "Proxy invoked");

    proxy.handle(&request).await.map_err(|e| {
        error!(error = %e, "Proxy request failed");
        Diagnostic::from(e)
    })
}
