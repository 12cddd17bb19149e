// # HTTP Source Adapter
//
// Fetches the published verification code from a repository contents API
// (GitHub or Gitee).
//
// ## Request
//
// ```http
// GET {api_base}/repos/{repository}/contents/{path}
// Authorization: token <token>
// Accept: application/vnd.github.v3+json      (GitHub only)
// User-Agent: codewatch/<version>
// ```
//
// ## Response
//
// Both hosts wrap the file in the same envelope:
//
// ```json
// { "encoding": "base64", "content": "eyJ2ZXJpZnlDb2RlIjoiMTIzNDU2IiwiZGF0ZSI6InQxIn0=\n", ... }
// ```
//
// and the decoded content is the code document:
//
// ```json
// { "verifyCode": "123456", "date": "2024-05-01 10:00:00" }
// ```
//
// ## Status Classification
//
// | Status            | Result             |
// |-------------------|--------------------|
// | 2xx               | decode the payload |
// | 408, 429          | `TransientFailure` |
// | other 4xx         | `ConfigError`      |
// | 5xx, anything else| `TransientFailure` |
//
// A 2xx whose payload does not decode is a `TransientFailure`: the file may be
// caught mid-write.
//
// ## Trust Level: Untrusted (Source Adapter)
//
// - ✅ One HTTP request per `fetch()`
// - ❌ NO retry logic (the next timer tick is the retry)
// - ❌ NO caching (change detection is owned by `CodeCache`)
// - ❌ NO background tasks
//
// ## Security Requirements
//
// - The token NEVER appears in logs or failure messages
// - The token is sent only in the `Authorization` header, never in the URL

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use codewatch_core::config::{HostKind, SourceConfig};
use codewatch_core::traits::{CodeRecord, FetchFailure, FetchResult, SourceAdapter};
use codewatch_core::{Error, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Default HTTP timeout for API requests (10 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Media type GitHub recommends for the v3 REST API
const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// GitHub rejects requests without a user agent
const USER_AGENT: &str = concat!("codewatch/", env!("CARGO_PKG_VERSION"));

/// Longest response body carried in a failure message
const MAX_ERROR_BODY: usize = 256;

/// Why a 2xx response did not yield a code
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The outer JSON envelope is malformed or lacks `content`
    #[error("invalid contents envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The envelope declares an encoding other than base64
    #[error("unsupported content encoding: {0}")]
    UnsupportedEncoding(String),

    /// `content` is not valid base64
    #[error("invalid base64 content: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded content is not a code document
    #[error("invalid code document: {0}")]
    Payload(#[source] serde_json::Error),
}

#[derive(Deserialize)]
struct ContentsEnvelope {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

/// Unwrap both layers of a contents API response body
///
/// # Returns
///
/// - `Ok(CodeRecord)`: The code document carried by the envelope
/// - `Err(DecodeError)`: Which layer failed
pub fn decode_payload(body: &[u8]) -> std::result::Result<CodeRecord, DecodeError> {
    let envelope: ContentsEnvelope = serde_json::from_slice(body).map_err(DecodeError::Envelope)?;

    if let Some(encoding) = envelope.encoding
        && !encoding.eq_ignore_ascii_case("base64")
    {
        return Err(DecodeError::UnsupportedEncoding(encoding));
    }

    // GitHub wraps the base64 text at 60 columns
    let compact: String = envelope
        .content
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let decoded = STANDARD.decode(compact)?;

    serde_json::from_slice(&decoded).map_err(DecodeError::Payload)
}

/// Map a non-2xx status to a failure
pub fn classify_status(status: u16, body: &str) -> FetchResult {
    let failure = FetchFailure::with_status(status, truncate(body.trim(), MAX_ERROR_BODY));
    match status {
        408 | 429 => FetchResult::TransientFailure(failure),
        400..=499 => FetchResult::ConfigError(failure),
        _ => FetchResult::TransientFailure(failure),
    }
}

/// Contents API URL of a source's code document
pub fn contents_url(source: &SourceConfig) -> String {
    format!(
        "{}/repos/{}/contents/{}",
        source.api_base(),
        source.repository,
        source.path
    )
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

/// Source adapter for the GitHub and Gitee contents APIs
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot. Retries, timing and change detection belong to
/// the core engine.
#[derive(Debug, Clone)]
pub struct HttpSourceAdapter {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpSourceAdapter {
    /// Create an adapter with the default 10 second timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Create an adapter whose requests give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request(&self, source: &SourceConfig) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(contents_url(source))
            .header(AUTHORIZATION, format!("token {}", source.token));

        match source.host {
            HostKind::Github => request.header(ACCEPT, GITHUB_ACCEPT),
            HostKind::Gitee => request,
        }
    }
}

#[async_trait]
impl SourceAdapter for HttpSourceAdapter {
    async fn fetch(&self, source: &SourceConfig) -> FetchResult {
        debug!("GET {}", contents_url(source));

        let response = match self.request(source).send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("request timed out after {:?}", self.timeout)
                } else {
                    format!("HTTP request failed: {}", e)
                };
                return FetchResult::transient(reason);
            }
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                return FetchResult::TransientFailure(FetchFailure::with_status(
                    status.as_u16(),
                    format!("Failed to read response body: {}", e),
                ));
            }
        };

        if !status.is_success() {
            return classify_status(status.as_u16(), &String::from_utf8_lossy(&body));
        }

        match decode_payload(&body) {
            Ok(record) => FetchResult::Success(record),
            Err(e) => {
                warn!("{} returned an undecodable payload: {}", source.id, e);
                FetchResult::transient(format!("decode error: {}", e))
            }
        }
    }

    fn supports_host(&self, _host: HostKind) -> bool {
        // Both hosts expose the same contents envelope
        true
    }

    fn adapter_name(&self) -> &'static str {
        "http"
    }
}
