//! HTTP utilities for Azure Resource Manager calls

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Per-request timeout; long-running work is polled, not waited on
const REQUEST_TIMEOUT: Duration = Duration::from_secs(100);

/// Header carrying a per-request correlation id
pub const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control() && c != ' ', "")
}

/// A response read to the end
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    /// Header value as a string, if present and readable
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v: &HeaderValue| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    /// Body parsed as JSON; an empty body is `null`
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body)
    }
}

/// HTTP client wrapper for ARM calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
}

impl ArmHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("aery/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client })
    }

    /// PUT a JSON body
    pub async fn put_json(
        &self,
        url: &str,
        token: &str,
        body: &Value,
    ) -> Result<RawResponse, reqwest::Error> {
        tracing::debug!("PUT {}", url);
        let request = self.client.put(url).bearer_auth(token).json(body);
        self.send(request).await
    }

    /// GET a status or resource URL
    pub async fn get(&self, url: &str, token: &str) -> Result<RawResponse, reqwest::Error> {
        tracing::debug!("GET {}", url);
        let request = self.client.get(url).bearer_auth(token);
        self.send(request).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<RawResponse, reqwest::Error> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let response = request.header(CLIENT_REQUEST_ID, &request_id).send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if status.is_success() {
            tracing::trace!("{} [{}] {}", status, request_id, sanitize_for_log(&body));
        } else {
            tracing::debug!("{} [{}] {}", status, request_id, sanitize_for_log(&body));
        }

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
