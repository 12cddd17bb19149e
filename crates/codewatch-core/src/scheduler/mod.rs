//! Poll scheduler
//!
//! Owns the single recurring timer of the process and the identity of the
//! active source.
//!
//! ## State Machine
//!
//! ```text
//!            start(a)                 start(b) / switch
//!   Idle ───────────────► Armed(a) ──────────────────────► Armed(b)
//!    ▲                       │  ▲                             │
//!    │        stop()         │  └── set_interval() re-arms ───┘
//!    └───────────────────────┴────────────────────────────────┘
//! ```
//!
//! ## Invariants
//!
//! - The previous timer is stopped before a new one is armed.
//! - `start()` resets the cache and performs one passive fetch immediately.
//! - Every timer tick performs one active fetch; a manual fetch is passive and
//!   leaves the timer alone.
//! - Fetches run on spawned tasks, are bounded by the request timeout, and
//!   carry the stamp of the source they were dispatched under.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{MAX_INTERVAL, SourceConfig};
use crate::error::{Error, Result};
use crate::propagator::{ChangePropagator, ErrorNotification, FetchStamp, ObserveMode, Outcome};
use crate::registry::SourceRegistry;
use crate::traits::{FetchResult, SourceAdapter};

/// Observable scheduler state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    /// No active source, no timer
    Idle,
    /// A timer is running for one source
    Armed {
        /// Active source identifier
        source_id: String,
        /// Current timer interval
        interval: Duration,
    },
}

/// Everything a fetch task needs, detached from the scheduler
#[derive(Clone)]
struct Dispatcher {
    adapter: Arc<dyn SourceAdapter>,
    propagator: Arc<ChangePropagator>,
    request_timeout: Duration,
}

impl Dispatcher {
    /// Spawn one fetch and its observation
    fn dispatch(
        &self,
        config: Arc<SourceConfig>,
        stamp: FetchStamp,
        mode: ObserveMode,
    ) -> JoinHandle<Outcome> {
        let this = self.clone();
        tokio::spawn(async move {
            debug!("Fetching code from {} ({:?})", stamp.source_id, mode);
            let fetch = this.adapter.fetch(&config);
            let result = match tokio::time::timeout(this.request_timeout, fetch).await {
                Ok(result) => result,
                Err(_) => FetchResult::transient(format!(
                    "request timed out after {:?}",
                    this.request_timeout
                )),
            };
            this.propagator.observe(&stamp, result, mode).await
        })
    }
}

/// Stop signal of a running timer task
struct TimerHandle {
    stop_tx: oneshot::Sender<()>,
}

struct ActiveSource {
    config: Arc<SourceConfig>,
    stamp: FetchStamp,
    interval: Duration,
    timer: TimerHandle,
}

/// Poll scheduler
///
/// ## Threading
///
/// All methods take `&self`; the active source is behind a mutex that is
/// never held across an await. Methods that arm timers or dispatch fetches
/// must be called from within a tokio runtime.
pub struct PollScheduler {
    registry: Arc<SourceRegistry>,
    dispatcher: Dispatcher,
    active: Mutex<Option<ActiveSource>>,
    armed_timers: AtomicUsize,
}

impl PollScheduler {
    /// Create an idle scheduler
    pub fn new(
        registry: Arc<SourceRegistry>,
        adapter: Arc<dyn SourceAdapter>,
        propagator: Arc<ChangePropagator>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            dispatcher: Dispatcher {
                adapter,
                propagator,
                request_timeout,
            },
            active: Mutex::new(None),
            armed_timers: AtomicUsize::new(0),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSource>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `source_id` the active source
    ///
    /// Stops any running timer, resets the cache, arms a timer at the
    /// source's interval and dispatches one passive fetch right away.
    ///
    /// # Returns
    ///
    /// - `Ok(JoinHandle<Outcome>)`: Handle to the immediate passive fetch
    /// - `Err(Error::ConfigNotFound)`: Unknown identifier; the current source keeps running
    pub fn start(&self, source_id: &str) -> Result<JoinHandle<Outcome>> {
        let config = match self.registry.resolve(source_id) {
            Ok(config) => config,
            Err(e) => {
                warn!("Cannot switch to source {}: not configured", source_id);
                let notification =
                    ErrorNotification::not_found(Some(source_id), "source is not configured");
                self.dispatcher.propagator.notify(notification);
                return Err(e);
            }
        };

        let stamp = {
            let mut active = self.lock_active();
            if let Some(previous) = active.take() {
                self.cancel(previous.timer);
                debug!("Stopped timer for {}", previous.stamp.source_id);
            }

            let stamp = self.dispatcher.propagator.begin_source(&config.id);
            let timer = self.arm(config.clone(), stamp.clone(), config.interval);
            *active = Some(ActiveSource {
                config: config.clone(),
                stamp: stamp.clone(),
                interval: config.interval,
                timer,
            });
            stamp
        };

        info!("Polling {} every {:?}", config.id, config.interval);
        Ok(self.dispatcher.dispatch(config, stamp, ObserveMode::Passive))
    }

    /// Fetch the active source now, in passive mode
    ///
    /// Does not reset or re-arm the timer. With no active source the returned
    /// outcome is a not-found failure and nothing is fetched.
    pub fn manual_fetch(&self) -> JoinHandle<Outcome> {
        let current = self
            .lock_active()
            .as_ref()
            .map(|active| (active.config.clone(), active.stamp.clone()));

        match current {
            Some((config, stamp)) => self.dispatcher.dispatch(config, stamp, ObserveMode::Passive),
            None => {
                warn!("Manual fetch requested with no active source");
                let notification = ErrorNotification::not_found(None, "no active source");
                self.dispatcher.propagator.notify(notification.clone());
                tokio::spawn(async move { Outcome::Failed(notification) })
            }
        }
    }

    /// Re-arm the timer of the active source at a new interval
    ///
    /// The cache is kept; the first tick comes one full `interval` from now.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::invalid_input("polling interval must be > 0"));
        }
        if interval > MAX_INTERVAL {
            return Err(Error::invalid_input(format!(
                "polling interval must be at most {:?}",
                MAX_INTERVAL
            )));
        }

        let mut active = self.lock_active();
        let Some(previous) = active.take() else {
            return Err(Error::invalid_input("no active source to re-arm"));
        };

        self.cancel(previous.timer);
        let timer = self.arm(previous.config.clone(), previous.stamp.clone(), interval);
        info!("Polling {} every {:?}", previous.stamp.source_id, interval);

        *active = Some(ActiveSource {
            config: previous.config,
            stamp: previous.stamp,
            interval,
            timer,
        });
        Ok(())
    }

    /// Stop the timer and go idle
    pub fn stop(&self) {
        if let Some(previous) = self.lock_active().take() {
            self.cancel(previous.timer);
            info!("Stopped polling {}", previous.stamp.source_id);
        }
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        match self.lock_active().as_ref() {
            Some(active) => SchedulerState::Armed {
                source_id: active.stamp.source_id.clone(),
                interval: active.interval,
            },
            None => SchedulerState::Idle,
        }
    }

    /// Identifier of the active source
    pub fn active_source(&self) -> Option<String> {
        self.lock_active()
            .as_ref()
            .map(|active| active.stamp.source_id.clone())
    }

    /// Number of timers currently armed (0 or 1)
    pub fn armed_timers(&self) -> usize {
        self.armed_timers.load(Ordering::SeqCst)
    }

    fn arm(&self, config: Arc<SourceConfig>, stamp: FetchStamp, interval: Duration) -> TimerHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    // Fires on stop() and when the scheduler is dropped
                    _ = &mut stop_rx => break,

                    _ = ticker.tick() => {
                        // Not awaited; the next tick or stop() is handled meanwhile
                        dispatcher.dispatch(config.clone(), stamp.clone(), ObserveMode::Active);
                    }
                }
            }
            debug!("Timer for {} exited", stamp.source_id);
        });

        self.armed_timers.fetch_add(1, Ordering::SeqCst);
        TimerHandle { stop_tx }
    }

    fn cancel(&self, timer: TimerHandle) {
        // Err only if the task is already gone
        let _ = timer.stop_tx.send(());
        self.armed_timers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
