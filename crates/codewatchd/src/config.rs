//! Daemon configuration
//!
//! Everything comes from environment variables. Sources are described either
//! by a JSON document (`CODEWATCH_CONFIG`) or by per-source variables.

use anyhow::{Context, Result};
use codewatch_core::config::{CodewatchConfig, HostKind, SourceSettings};
use std::env;
use std::str::FromStr;

/// Daemon configuration
pub struct Config {
    /// Sources and engine settings handed to the watcher
    pub watch: CodewatchConfig,
    /// Maximum log level
    pub log_level: String,
    /// Shell command that receives each new code on stdin
    pub clipboard_cmd: Option<String>,
    /// Shell command that types each timer-driven new code
    pub type_cmd: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut watch = match var("CODEWATCH_CONFIG") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read CODEWATCH_CONFIG file {}", path))?;
                serde_json::from_str::<CodewatchConfig>(&raw)
                    .with_context(|| format!("Failed to parse CODEWATCH_CONFIG file {}", path))?
            }
            None => sources_from_vars(&var)?,
        };

        if let Some(active) = var("CODEWATCH_ACTIVE_SOURCE") {
            watch.active_source = Some(active.trim().to_string());
        }
        if let Some(debounce_ms) = parse_var(&var, "CODEWATCH_DEBOUNCE_MS")? {
            watch.engine.debounce_ms = debounce_ms;
        }
        if let Some(auto_type) = parse_var(&var, "CODEWATCH_AUTO_TYPE")? {
            watch.engine.auto_type = auto_type;
        }

        Ok(Self {
            watch,
            log_level: var("CODEWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            clipboard_cmd: var("CODEWATCH_CLIPBOARD_CMD"),
            type_cmd: var("CODEWATCH_TYPE_CMD"),
        })
    }

    /// Validate the configuration
    ///
    /// Source problems are reported together, as one `ConfigInvalid` error.
    pub fn validate(&self) -> Result<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "CODEWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.watch.validate()?;
        Ok(())
    }
}

fn sources_from_vars(var: &impl Fn(&str) -> Option<String>) -> Result<CodewatchConfig> {
    let ids: Vec<String> = var("CODEWATCH_SOURCES")
        .unwrap_or_else(|| "github".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut config = CodewatchConfig::new();
    for id in ids {
        let prefix = format!("CODEWATCH_{}", id.to_uppercase().replace('-', "_"));
        let key = |suffix: &str| format!("{}_{}", prefix, suffix);

        let mut settings = SourceSettings::new(
            var(&key("REPOSITORY")).unwrap_or_default(),
            var(&key("TOKEN")).unwrap_or_default(),
        );
        if let Some(path) = var(&key("PATH")) {
            settings = settings.with_path(path);
        }
        if let Some(interval) = parse_var(var, &key("INTERVAL"))? {
            settings = settings.with_interval_secs(interval);
        }
        if let Some(host) = parse_var::<HostKind>(var, &key("HOST"))? {
            settings = settings.with_host(host);
        }
        if let Some(api_base) = var(&key("API_BASE")) {
            settings = settings.with_api_base(api_base);
        }

        config = config.with_source(id, settings);
    }

    Ok(config)
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e))
        })
        .transpose()
}
