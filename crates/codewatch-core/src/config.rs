//! Configuration types for the codewatch engine
//!
//! The configuration is resolved before the engine is built (from a file, the
//! environment, or code) and handed over as a [`CodewatchConfig`]. Validation
//! collects every violation so an operator sees all problems at once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Longest accepted polling interval (one week)
pub const MAX_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Main codewatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodewatchConfig {
    /// Configured sources, keyed by source identifier
    pub sources: BTreeMap<String, SourceSettings>,

    /// Source polled after `start()`. Defaults to the first identifier.
    #[serde(default)]
    pub active_source: Option<String>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl CodewatchConfig {
    /// Create an empty configuration with default engine settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source
    pub fn with_source(mut self, id: impl Into<String>, settings: SourceSettings) -> Self {
        self.sources.insert(id.into(), settings);
        self
    }

    /// Select the source polled after `start()`
    pub fn with_active_source(mut self, id: impl Into<String>) -> Self {
        self.active_source = Some(id.into());
        self
    }

    /// Replace the engine settings
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Identifier of the source polled after `start()`
    pub fn initial_source(&self) -> Option<&str> {
        self.active_source
            .as_deref()
            .or_else(|| self.sources.keys().next().map(String::as_str))
    }

    /// Validate the configuration
    ///
    /// Every violation is collected; the result is a single
    /// [`Error::ConfigInvalid`](crate::Error::ConfigInvalid) listing all of them.
    pub fn validate(&self) -> Result<(), crate::Error> {
        let mut violations = Vec::new();

        if self.sources.is_empty() {
            violations.push("No sources configured".to_string());
        }

        for (id, settings) in &self.sources {
            if let Err(errors) = settings.resolve(id) {
                violations.extend(errors);
            }
        }

        if let Some(active) = &self.active_source
            && !self.sources.contains_key(active)
        {
            violations.push(format!("active source '{}' is not configured", active));
        }

        violations.extend(self.engine.violations());

        if violations.is_empty() {
            Ok(())
        } else {
            Err(crate::Error::config_invalid(violations))
        }
    }
}

/// Remote content hosts supported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    /// GitHub contents API
    Github,
    /// Gitee contents API (v5)
    Gitee,
}

impl HostKind {
    /// Default API base URL for this host
    pub fn default_api_base(&self) -> &'static str {
        match self {
            HostKind::Github => "https://api.github.com",
            HostKind::Gitee => "https://gitee.com/api/v5",
        }
    }

    /// Lowercase host name
    pub fn as_str(&self) -> &'static str {
        match self {
            HostKind::Github => "github",
            HostKind::Gitee => "gitee",
        }
    }
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(HostKind::Github),
            "gitee" => Ok(HostKind::Gitee),
            other => Err(crate::Error::config(format!(
                "Unsupported host '{}'. Supported hosts: github, gitee",
                other
            ))),
        }
    }
}

/// Connection parameters for one source, as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Host kind; when omitted the source identifier must name a host
    #[serde(default)]
    pub host: Option<HostKind>,

    /// Repository locator, e.g. "owner/name"
    pub repository: String,

    /// Path of the code document inside the repository
    #[serde(default = "default_path")]
    pub path: String,

    /// API token sent as a bearer credential
    pub token: String,

    /// Polling interval in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Override of the host's API base URL (enterprise hosts, test servers)
    #[serde(default)]
    pub api_base: Option<String>,
}

impl SourceSettings {
    /// Create settings with the default path and interval
    pub fn new(repository: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: None,
            repository: repository.into(),
            path: default_path(),
            token: token.into(),
            interval_secs: default_interval_secs(),
            api_base: None,
        }
    }

    /// Set the host kind explicitly
    pub fn with_host(mut self, host: HostKind) -> Self {
        self.host = Some(host);
        self
    }

    /// Set the content path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the polling interval in seconds
    pub fn with_interval_secs(mut self, interval_secs: u64) -> Self {
        self.interval_secs = interval_secs;
        self
    }

    /// Override the API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Validate and turn these settings into an immutable [`SourceConfig`]
    ///
    /// Returns every violation found, each prefixed with the source identifier.
    pub fn resolve(&self, id: &str) -> Result<SourceConfig, Vec<String>> {
        let mut violations = Vec::new();

        if id.trim().is_empty() {
            violations.push("source identifier cannot be empty".to_string());
        }

        let host = match self.host {
            Some(host) => Some(host),
            None => match id.parse::<HostKind>() {
                Ok(host) => Some(host),
                Err(_) => {
                    violations.push(format!(
                        "{}: host must be set (identifier is not one of github, gitee)",
                        id
                    ));
                    None
                }
            },
        };

        if self.token.trim().is_empty() {
            violations.push(format!("{}: token cannot be empty", id));
        }
        if self.repository.trim().is_empty() {
            violations.push(format!("{}: repository cannot be empty", id));
        }
        if self.path.trim().is_empty() {
            violations.push(format!("{}: path cannot be empty", id));
        }
        if self.interval_secs == 0 {
            violations.push(format!("{}: interval must be > 0", id));
        } else if self.interval_secs > MAX_INTERVAL.as_secs() {
            violations.push(format!(
                "{}: interval must be at most {} seconds. Got: {}",
                id,
                MAX_INTERVAL.as_secs(),
                self.interval_secs
            ));
        }
        if let Some(api_base) = &self.api_base
            && !api_base.starts_with("https://")
            && !api_base.starts_with("http://")
        {
            violations.push(format!(
                "{}: api_base must use HTTP or HTTPS scheme. Got: {}",
                id, api_base
            ));
        }

        match host {
            Some(host) if violations.is_empty() => Ok(SourceConfig {
                id: id.to_string(),
                host,
                repository: self.repository.trim().to_string(),
                path: self.path.trim().trim_start_matches('/').to_string(),
                token: self.token.trim().to_string(),
                interval: Duration::from_secs(self.interval_secs),
                api_base: self
                    .api_base
                    .as_ref()
                    .map(|base| base.trim_end_matches('/').to_string()),
            }),
            _ => Err(violations),
        }
    }
}

/// Validated, immutable connection parameters of one source
///
/// # Security
///
/// The Debug implementation does NOT expose the token.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Source identifier
    pub id: String,
    /// Host kind
    pub host: HostKind,
    /// Repository locator
    pub repository: String,
    /// Path of the code document
    pub path: String,
    /// API token. ⚠️ NEVER log this value
    pub token: String,
    /// Polling interval (always > 0 and at most [`MAX_INTERVAL`])
    pub interval: Duration,
    /// API base override
    pub api_base: Option<String>,
}

impl SourceConfig {
    /// The API base URL requests are sent to
    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or_else(|| self.host.default_api_base())
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("repository", &self.repository)
            .field("path", &self.path)
            .field("token", &"<REDACTED>")
            .field("interval", &self.interval)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum time between two keystroke injections (in milliseconds)
    ///
    /// Guards against a manual fetch racing a timer tick and typing the
    /// same code twice into the focused input.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Upper bound on a single fetch (in seconds). Expiry is a transient failure.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Whether timer-driven changes are typed into the focused input
    #[serde(default = "default_auto_type")]
    pub auto_type: bool,

    /// Capacity of the update broadcast channel
    ///
    /// Subscribers that fall further behind than this lose the oldest updates.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Debounce window as a duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.request_timeout_secs == 0 {
            violations.push("engine: request_timeout_secs must be > 0".to_string());
        }
        if self.event_channel_capacity == 0 {
            violations.push("engine: event_channel_capacity must be > 0".to_string());
        }
        violations
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            auto_type: default_auto_type(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_path() -> String {
    "code.json".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_auto_type() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    64
}
