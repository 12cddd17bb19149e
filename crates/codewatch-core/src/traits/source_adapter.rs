// # Source Adapter Trait
//
// Defines the interface for retrieving the current verification code from a
// remote content host.
//
// ## Implementations
//
// - GitHub / Gitee contents API: `codewatch-source-http` crate
//
// ## Usage
//
// ```rust,ignore
// use codewatch_core::traits::{FetchResult, SourceAdapter};
//
// let adapter = /* SourceAdapter implementation */;
// match adapter.fetch(&source_config).await {
//     FetchResult::Success(record) => println!("{}", record),
//     FetchResult::TransientFailure(failure) => eprintln!("retry later: {}", failure),
//     FetchResult::ConfigError(failure) => eprintln!("fix config: {}", failure),
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{HostKind, SourceConfig};

/// One observed verification code
///
/// Equality of `value` is the only change-detection signal. The origin
/// timestamp is opaque and only carried for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRecord {
    /// The verification code
    #[serde(rename = "verifyCode")]
    pub value: String,
    /// Timestamp published by the remote host alongside the code
    #[serde(rename = "date")]
    pub origin_timestamp: String,
}

impl CodeRecord {
    /// Create a new code record
    pub fn new(value: impl Into<String>, origin_timestamp: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            origin_timestamp: origin_timestamp.into(),
        }
    }
}

impl fmt::Display for CodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.value, self.origin_timestamp)
    }
}

/// Why a fetch did not produce a code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    /// HTTP status, when the host answered
    pub status: Option<u16>,
    /// Human-readable reason (response body, decode error, transport error)
    pub message: String,
}

impl FetchFailure {
    /// A failure that happened before or without an HTTP status
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// A failure carrying the host's HTTP status
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Tagged outcome of a single fetch
///
/// Produced once per call, consumed once by the change propagator, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// The host returned a well-formed code document
    Success(CodeRecord),
    /// Network, server or decode failure; the next tick may succeed
    TransientFailure(FetchFailure),
    /// The host rejected the request; retrying without a config change will not help
    ConfigError(FetchFailure),
}

impl FetchResult {
    /// Shorthand for a transient failure without HTTP status
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientFailure(FetchFailure::new(message))
    }
}

/// Trait for source adapter implementations
///
/// # Trust Level: Untrusted
///
/// Adapters are isolated, stateless and single-shot:
///
/// ## Allowed Capabilities
/// - ✅ Perform one HTTP/HTTPS call to the configured host per `fetch()`
/// - ✅ Decode host-specific payloads
/// - ✅ Classify failures as transient or configuration-related
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off (the scheduler's next tick is the retry)
/// - ❌ Cache codes or decide whether a code is new (owned by `CodeCache`)
/// - ❌ Touch the clipboard or keystroke sinks (owned by `ChangePropagator`)
/// - ❌ Spawn tasks or make scheduling decisions (owned by `PollScheduler`)
///
/// Failures are values, not errors: every call yields a [`FetchResult`].
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch the current code for one source
    ///
    /// Must not retry internally and should bound its own network time.
    async fn fetch(&self, source: &SourceConfig) -> FetchResult;

    /// Check if this adapter can talk to the given host
    fn supports_host(&self, host: HostKind) -> bool;

    /// Get the adapter name (for logging/debugging)
    fn adapter_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_display_shows_code_and_date() {
        let record = CodeRecord::new("123456", "t1");
        assert_eq!(record.to_string(), "123456 / t1");
    }

    #[test]
    fn record_uses_remote_field_names() {
        let record: CodeRecord =
            serde_json::from_str(r#"{"verifyCode":"654321","date":"2024-05-01 10:00:00"}"#)
                .unwrap();
        assert_eq!(record.value, "654321");
        assert_eq!(record.origin_timestamp, "2024-05-01 10:00:00");
    }

    #[test]
    fn failure_display_includes_status() {
        assert_eq!(
            FetchFailure::with_status(401, "Bad credentials").to_string(),
            "HTTP 401: Bad credentials"
        );
        assert_eq!(FetchFailure::new("timed out").to_string(), "timed out");
    }
}
