//! Change propagator
//!
//! Turns one [`FetchResult`] into at most one round of side effects:
//!
//! ```text
//! FetchResult ──► CodeCache::try_accept_for ──► Changed ──► clipboard (always)
//!                        │                          └──────► keystrokes (Active, auto-type on,
//!                        │                                              debounce window elapsed)
//!                        ├──► Unchanged ──► nothing
//!                        └──► stale generation ──► discarded
//! ```
//!
//! Failures never touch the cache; they become an [`ErrorNotification`] for
//! subscribers and a log line. Nothing here stops polling.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::cache::{Acceptance, CodeCache};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::traits::{ClipboardSink, CodeRecord, FetchFailure, FetchResult, KeystrokeSink};

/// How an observation was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveMode {
    /// Timer tick: a change may be typed into the focused input
    Active,
    /// Manual fetch or source switch: display and clipboard only
    Passive,
}

/// Identifies the source and cache generation a fetch was dispatched under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchStamp {
    /// Source identifier at dispatch time
    pub source_id: String,
    /// Cache generation at dispatch time
    pub generation: u64,
}

/// Category of a runtime failure shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Network, server or decode failure; retried on the next tick
    Transient,
    /// The host rejected the request; needs a configuration fix
    Config,
    /// The requested source is not configured, or no source is active
    NotFound,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotificationKind::Transient => "transient",
            NotificationKind::Config => "config",
            NotificationKind::NotFound => "not-found",
        })
    }
}

/// Recoverable runtime failure, surfaced for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotification {
    /// Source the failure belongs to, if any
    pub source_id: Option<String>,
    /// Failure category
    pub kind: NotificationKind,
    /// Display message
    pub message: String,
}

impl ErrorNotification {
    fn from_failure(source_id: &str, kind: NotificationKind, failure: &FetchFailure) -> Self {
        Self {
            source_id: Some(source_id.to_string()),
            kind,
            message: failure.to_string(),
        }
    }

    /// A "source not configured" notification
    pub fn not_found(source_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            source_id: source_id.map(str::to_string),
            kind: NotificationKind::NotFound,
            message: message.into(),
        }
    }

    /// Whether the failure will not go away by itself
    ///
    /// Presentation layers should surface these more prominently.
    pub fn is_prominent(&self) -> bool {
        !matches!(self.kind, NotificationKind::Transient)
    }
}

impl fmt::Display for ErrorNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_id {
            Some(source_id) => write!(f, "error[{}] {}: {}", self.kind, source_id, self.message),
            None => write!(f, "error[{}]: {}", self.kind, self.message),
        }
    }
}

/// Update delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeUpdate {
    /// A new code was accepted
    Code {
        /// Source the code came from
        source_id: String,
        /// The accepted record
        record: CodeRecord,
    },
    /// A fetch failed or could not be attempted
    Error(ErrorNotification),
}

impl fmt::Display for CodeUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeUpdate::Code { record, .. } => record.fmt(f),
            CodeUpdate::Error(notification) => notification.fmt(f),
        }
    }
}

/// Result of one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// New code accepted and copied; `typed` tells whether it was also typed
    Changed {
        /// The accepted record
        record: CodeRecord,
        /// Whether the keystroke sink was invoked
        typed: bool,
    },
    /// Same value as the cached code; no side effects
    Unchanged,
    /// Fetch failed or could not be attempted
    Failed(ErrorNotification),
    /// The fetch was dispatched under a source that is no longer active
    Discarded,
}

/// Drives the clipboard and keystroke sinks from fetch results
pub struct ChangePropagator {
    cache: CodeCache,
    clipboard: Arc<dyn ClipboardSink>,
    keystrokes: Arc<dyn KeystrokeSink>,
    debounce: Duration,
    auto_type: AtomicBool,
    update_tx: broadcast::Sender<CodeUpdate>,
}

impl ChangePropagator {
    /// Create a propagator over `cache`
    pub fn new(
        cache: CodeCache,
        clipboard: Arc<dyn ClipboardSink>,
        keystrokes: Arc<dyn KeystrokeSink>,
        engine: &EngineConfig,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(engine.event_channel_capacity.max(1));
        Self {
            cache,
            clipboard,
            keystrokes,
            debounce: engine.debounce(),
            auto_type: AtomicBool::new(engine.auto_type),
            update_tx,
        }
    }

    /// The cache this propagator decides against
    pub fn cache(&self) -> &CodeCache {
        &self.cache
    }

    /// Subscribe to updates
    pub fn subscribe(&self) -> broadcast::Receiver<CodeUpdate> {
        self.update_tx.subscribe()
    }

    /// Reset the cache for a newly selected source
    ///
    /// Fetches must carry the returned stamp; results stamped before the
    /// reset are discarded.
    pub fn begin_source(&self, source_id: &str) -> FetchStamp {
        let generation = self.cache.reset();
        debug!("Cache reset for source {} (generation {})", source_id, generation);
        FetchStamp {
            source_id: source_id.to_string(),
            generation,
        }
    }

    /// Enable or disable typing of timer-driven changes
    pub fn set_auto_type(&self, enabled: bool) {
        self.auto_type.store(enabled, Ordering::SeqCst);
        info!("Auto-type {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Whether timer-driven changes are typed
    pub fn auto_type(&self) -> bool {
        self.auto_type.load(Ordering::SeqCst)
    }

    /// Observe one fetch result
    ///
    /// # Parameters
    ///
    /// - `stamp`: Source and generation the fetch was dispatched under
    /// - `result`: The adapter's outcome
    /// - `mode`: Whether a change may be typed
    pub async fn observe(
        &self,
        stamp: &FetchStamp,
        result: FetchResult,
        mode: ObserveMode,
    ) -> Outcome {
        match result {
            FetchResult::Success(record) => self.observe_record(stamp, record, mode).await,
            FetchResult::TransientFailure(failure) => {
                self.observe_failure(stamp, NotificationKind::Transient, &failure)
            }
            FetchResult::ConfigError(failure) => {
                self.observe_failure(stamp, NotificationKind::Config, &failure)
            }
        }
    }

    fn observe_failure(
        &self,
        stamp: &FetchStamp,
        kind: NotificationKind,
        failure: &FetchFailure,
    ) -> Outcome {
        let notification = ErrorNotification::from_failure(&stamp.source_id, kind, failure);

        // Checked and published under the cache lock so a switch cannot interleave
        let published = self.cache.if_current(stamp.generation, || {
            match kind {
                NotificationKind::Config => error!(
                    "Source {} rejected the request, check its repository, path and token: {}",
                    stamp.source_id, failure
                ),
                _ => warn!(
                    "Fetch from {} failed (will retry on next tick): {}",
                    stamp.source_id, failure
                ),
            }
            self.notify(notification.clone());
        });

        match published {
            Some(()) => Outcome::Failed(notification),
            None => {
                debug!("Discarding stale failure from {}: {}", stamp.source_id, failure);
                Outcome::Discarded
            }
        }
    }

    async fn observe_record(
        &self,
        stamp: &FetchStamp,
        record: CodeRecord,
        mode: ObserveMode,
    ) -> Outcome {
        let accepted = self.cache.try_accept_then(stamp.generation, record, |record| {
            self.emit(CodeUpdate::Code {
                source_id: stamp.source_id.clone(),
                record: record.clone(),
            });
        });

        let record = match accepted {
            None => {
                debug!("Discarding stale code from {} (source switched)", stamp.source_id);
                return Outcome::Discarded;
            }
            Some(Acceptance::Unchanged) => {
                debug!("Code from {} unchanged", stamp.source_id);
                return Outcome::Unchanged;
            }
            Some(Acceptance::Changed(record)) => record,
        };

        info!(
            "New code accepted from {} (date: {}, mode: {:?})",
            stamp.source_id, record.origin_timestamp, mode
        );

        if let Err(e) = self.clipboard.set_clipboard_text(&record.value).await {
            warn!("Failed to copy code to clipboard: {}", e);
        }

        let typed = mode == ObserveMode::Active
            && self.auto_type()
            && self.claim_injection(stamp);

        if typed && let Err(e) = self.keystrokes.inject_text(&record.value).await {
            warn!("Failed to type code: {}", e);
        }

        Outcome::Changed { record, typed }
    }

    fn claim_injection(&self, stamp: &FetchStamp) -> bool {
        let claimed = self.cache.claim_injection(stamp.generation, self.debounce);
        if !claimed {
            debug!(
                "Skipping keystroke injection for {}: within {:?} debounce window",
                stamp.source_id, self.debounce
            );
        }
        claimed
    }

    /// Publish a notification that did not come from a fetch
    pub fn notify(&self, notification: ErrorNotification) {
        self.emit(CodeUpdate::Error(notification));
    }

    /// Copy the cached code to the clipboard again
    ///
    /// Never types and never changes the cache.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: The cached code was copied
    /// - `Ok(None)`: Nothing cached yet
    /// - `Err(Error)`: The clipboard sink failed
    pub async fn copy_current(&self) -> Result<Option<CodeRecord>> {
        let Some(record) = self.cache.peek() else {
            debug!("No code cached, nothing to copy");
            return Ok(None);
        };

        self.clipboard
            .set_clipboard_text(&record.value)
            .await
            .inspect_err(|e| warn!("Failed to copy code to clipboard: {}", e))?;
        Ok(Some(record))
    }

    fn emit(&self, update: CodeUpdate) {
        // Only fails when nobody is subscribed
        if self.update_tx.send(update).is_err() {
            debug!("No update subscribers");
        }
    }
}
