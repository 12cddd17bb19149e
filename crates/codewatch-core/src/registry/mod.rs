//! Source registry
//!
//! Maps source identifiers to their validated [`SourceConfig`]. The registry
//! is built once from configuration and never changes afterwards.
//! Misconfiguration is reported while building it.
//!
//! ## Usage
//!
//! ```rust
//! use codewatch_core::config::SourceSettings;
//! use codewatch_core::registry::SourceRegistry;
//! use std::collections::BTreeMap;
//!
//! let mut settings = BTreeMap::new();
//! settings.insert("github".to_string(), SourceSettings::new("acme/codes", "token"));
//!
//! let registry = SourceRegistry::from_settings(&settings).unwrap();
//! assert_eq!(registry.resolve("github").unwrap().repository, "acme/codes");
//! assert!(registry.resolve("gitee").is_err());
//! ```

use crate::config::{SourceConfig, SourceSettings};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of configured sources
///
/// ## Thread Safety
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<SourceConfig>>,
}

impl SourceRegistry {
    /// Build the registry, validating every source
    ///
    /// # Returns
    ///
    /// - `Ok(SourceRegistry)`: All sources are valid
    /// - `Err(Error::ConfigInvalid)`: Every violation across all sources
    pub fn from_settings(settings: &BTreeMap<String, SourceSettings>) -> Result<Self> {
        let mut sources = BTreeMap::new();
        let mut violations = Vec::new();

        if settings.is_empty() {
            violations.push("No sources configured".to_string());
        }

        for (id, source) in settings {
            match source.resolve(id) {
                Ok(config) => {
                    sources.insert(id.clone(), Arc::new(config));
                }
                Err(errors) => violations.extend(errors),
            }
        }

        if !violations.is_empty() {
            return Err(Error::config_invalid(violations));
        }

        Ok(Self { sources })
    }

    /// Resolve a source identifier
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<SourceConfig>)`: The source's connection parameters
    /// - `Err(Error::ConfigNotFound)`: The identifier is not configured
    pub fn resolve(&self, id: &str) -> Result<Arc<SourceConfig>> {
        self.sources
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(id))
    }

    /// Check if a source identifier is configured
    pub fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// List all configured source identifiers, in order
    pub fn ids(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    /// Iterate over all configured sources
    pub fn iter(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.values().map(Arc::as_ref)
    }

    /// Number of configured sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no sources are configured
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
