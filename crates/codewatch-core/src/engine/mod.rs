//! Controller
//!
//! [`CodeWatcher`] is the single facade a presentation layer talks to. It owns
//! the registry, the cache, the propagator and the scheduler, and exposes the
//! user-facing operations on top of them.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   UI ─────────► │ CodeWatcher  │ ◄────────── CodeUpdate (broadcast)
//!                 └──────────────┘
//!                   │         │
//!         ┌─────────┘         └──────────┐
//!         ▼                              ▼
//! ┌────────────────┐  fetch   ┌────────────────────┐
//! │ PollScheduler  │ ───────► │ SourceAdapter      │
//! └────────────────┘          └────────────────────┘
//!         │ FetchResult
//!         ▼
//! ┌──────────────────┐        ┌──────────────────────────────┐
//! │ ChangePropagator │ ─────► │ CodeCache / clipboard / keys │
//! └──────────────────┘        └──────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. Create with [`CodeWatcher::new()`]; configuration errors surface here
//! 2. [`CodeWatcher::start()`] selects the initial source and arms its timer
//! 3. Drive it with `switch_source`, `manual_fetch`, `copy_last_code`
//! 4. [`CodeWatcher::stop()`] (or drop) cancels the timer

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::cache::CodeCache;
use crate::config::CodewatchConfig;
use crate::error::{Error, Result};
use crate::propagator::{ChangePropagator, CodeUpdate, Outcome};
use crate::registry::SourceRegistry;
use crate::scheduler::{PollScheduler, SchedulerState};
use crate::traits::{ClipboardSink, CodeRecord, KeystrokeSink, SourceAdapter};

/// Verification code watcher
///
/// ## Threading
///
/// Every operation takes `&self` and may be called from any task; share the
/// watcher behind an `Arc`. Operations that fetch return immediately with a
/// handle to the spawned observation, so a slow host never blocks the caller.
pub struct CodeWatcher {
    registry: Arc<SourceRegistry>,
    propagator: Arc<ChangePropagator>,
    scheduler: PollScheduler,
    initial_source: String,
}

impl CodeWatcher {
    /// Create a watcher
    ///
    /// # Parameters
    ///
    /// - `config`: Sources and engine settings
    /// - `adapter`: Fetches codes from the configured hosts
    /// - `clipboard`: Receives every new code
    /// - `keystrokes`: Receives timer-driven new codes
    ///
    /// # Returns
    ///
    /// - `Ok(CodeWatcher)`: Idle watcher, ready to `start()`
    /// - `Err(Error::ConfigInvalid)`: Every configuration violation found
    pub fn new(
        config: CodewatchConfig,
        adapter: Arc<dyn SourceAdapter>,
        clipboard: Arc<dyn ClipboardSink>,
        keystrokes: Arc<dyn KeystrokeSink>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = SourceRegistry::from_settings(&config.sources)?;
        let unsupported: Vec<String> = registry
            .iter()
            .filter(|source| !adapter.supports_host(source.host))
            .map(|source| {
                format!(
                    "{}: adapter '{}' does not support host {}",
                    source.id,
                    adapter.adapter_name(),
                    source.host
                )
            })
            .collect();
        if !unsupported.is_empty() {
            return Err(Error::config_invalid(unsupported));
        }

        let initial_source = config
            .initial_source()
            .map(str::to_string)
            .ok_or_else(|| Error::config_invalid(vec!["No sources configured".to_string()]))?;

        let registry = Arc::new(registry);
        let propagator = Arc::new(ChangePropagator::new(
            CodeCache::new(),
            clipboard,
            keystrokes,
            &config.engine,
        ));
        let scheduler = PollScheduler::new(
            registry.clone(),
            adapter,
            propagator.clone(),
            config.engine.request_timeout(),
        );

        debug!(
            "Watcher created with {} source(s), initial source {}",
            registry.len(),
            initial_source
        );

        Ok(Self {
            registry,
            propagator,
            scheduler,
            initial_source,
        })
    }

    /// Select the configured initial source and start polling it
    pub fn start(&self) -> Result<JoinHandle<Outcome>> {
        info!("Starting with source {}", self.initial_source);
        self.scheduler.start(&self.initial_source)
    }

    /// Switch to another configured source
    ///
    /// Resets the cache, re-arms the timer at the new source's interval and
    /// fetches once in passive mode. Switching to the active source restarts
    /// it the same way.
    ///
    /// # Returns
    ///
    /// - `Ok(JoinHandle<Outcome>)`: Handle to the immediate passive fetch
    /// - `Err(Error::ConfigNotFound)`: Unknown identifier; nothing changed
    pub fn switch_source(&self, source_id: &str) -> Result<JoinHandle<Outcome>> {
        info!("Switching to source {}", source_id);
        self.scheduler.start(source_id)
    }

    /// Fetch the active source now
    ///
    /// Passive: a new code is displayed and copied but never typed.
    pub fn manual_fetch(&self) -> JoinHandle<Outcome> {
        self.scheduler.manual_fetch()
    }

    /// Copy the cached code to the clipboard again
    pub async fn copy_last_code(&self) -> Result<Option<CodeRecord>> {
        self.propagator.copy_current().await
    }

    /// Subscribe to updates
    pub fn subscribe(&self) -> broadcast::Receiver<CodeUpdate> {
        self.propagator.subscribe()
    }

    /// Updates as a stream
    ///
    /// A subscriber that falls behind skips the updates it missed.
    pub fn updates(&self) -> impl Stream<Item = CodeUpdate> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|update| match update {
            Ok(update) => Some(update),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                warn!("Update subscriber lagged, {} update(s) dropped", missed);
                None
            }
        })
    }

    /// Invoke `callback` for every update, on a dedicated task
    ///
    /// The task ends when the watcher is dropped. Updates are delivered in the
    /// order they were produced.
    pub fn on_update<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(CodeUpdate) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(update) => callback(update),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Update callback lagged, {} update(s) dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Update callback task exited");
        })
    }

    /// The cached code, if any
    pub fn current_code(&self) -> Option<CodeRecord> {
        self.propagator.cache().peek()
    }

    /// Identifier of the active source
    pub fn active_source(&self) -> Option<String> {
        self.scheduler.active_source()
    }

    /// Scheduler state
    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Number of armed timers (0 or 1)
    pub fn armed_timers(&self) -> usize {
        self.scheduler.armed_timers()
    }

    /// Configured source identifiers
    pub fn sources(&self) -> Vec<String> {
        self.registry.ids()
    }

    /// Enable or disable typing of timer-driven changes
    pub fn set_auto_type(&self, enabled: bool) {
        self.propagator.set_auto_type(enabled);
    }

    /// Whether timer-driven changes are typed
    pub fn auto_type(&self) -> bool {
        self.propagator.auto_type()
    }

    /// Change the polling interval of the active source
    ///
    /// The cache is kept. Fails with `InvalidInput` for a zero interval or
    /// when no source is active.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        self.scheduler.set_interval(interval)
    }

    /// Stop polling
    pub fn stop(&self) {
        self.scheduler.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HostKind, SourceSettings};
    use crate::traits::FetchResult;
    use async_trait::async_trait;

    struct GithubOnly;

    #[async_trait]
    impl SourceAdapter for GithubOnly {
        async fn fetch(&self, _source: &crate::config::SourceConfig) -> FetchResult {
            FetchResult::Success(CodeRecord::new("123456", "t1"))
        }

        fn supports_host(&self, host: HostKind) -> bool {
            host == HostKind::Github
        }

        fn adapter_name(&self) -> &'static str {
            "github-only"
        }
    }

    struct NullSink;

    #[async_trait]
    impl ClipboardSink for NullSink {
        async fn set_clipboard_text(&self, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl KeystrokeSink for NullSink {
        async fn inject_text(&self, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn watcher(config: CodewatchConfig) -> Result<CodeWatcher> {
        CodeWatcher::new(config, Arc::new(GithubOnly), Arc::new(NullSink), Arc::new(NullSink))
    }

    #[test]
    fn unsupported_host_is_rejected() {
        let config = CodewatchConfig::new()
            .with_source("github", SourceSettings::new("acme/codes", "a"))
            .with_source("gitee", SourceSettings::new("acme/codes", "b"));

        let err = watcher(config).err().unwrap();
        assert_eq!(
            err.violations().to_vec(),
            vec!["gitee: adapter 'github-only' does not support host gitee".to_string()]
        );
    }

    #[test]
    fn new_watcher_is_idle() {
        let config = CodewatchConfig::new()
            .with_source("github", SourceSettings::new("acme/codes", "a"));
        let watcher = watcher(config).unwrap();

        assert_eq!(watcher.scheduler_state(), SchedulerState::Idle);
        assert_eq!(watcher.armed_timers(), 0);
        assert!(watcher.current_code().is_none());
        assert_eq!(watcher.sources(), vec!["github".to_string()]);
    }
}
