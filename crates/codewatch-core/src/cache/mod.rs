// # Code Cache
//
// In-memory holder of the most recently accepted code.
//
// ## Purpose
//
// The cache is the sole arbiter of "is this a new code". Every mutation goes
// through one lock, so acceptance is serialized even when a manual fetch and
// a timer tick complete at the same moment.
//
// ## Generations
//
// Each `reset()` starts a new generation. Fetches are stamped with the
// generation current at dispatch; a result carrying an older generation is
// rejected by `try_accept_for()` without touching the state. This is how a
// fetch that outlives a source switch gets discarded.
//
// ## Crash Behavior
//
// Nothing is persisted. After a restart the first fetched code is always new.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::traits::CodeRecord;

/// Result of offering a record to the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// The value differs from the stored one; the record was stored
    Changed(CodeRecord),
    /// The value equals the stored one; nothing was mutated
    Unchanged,
}

impl Acceptance {
    /// Whether the record was accepted as new
    pub fn is_changed(&self) -> bool {
        matches!(self, Acceptance::Changed(_))
    }
}

#[derive(Debug, Default)]
struct CacheState {
    /// Last accepted record; `None` is the startup/reset sentinel
    record: Option<CodeRecord>,
    /// Wall-clock time of the last accepted change
    accepted_at: Option<DateTime<Utc>>,
    generation: u64,
    last_injection: Option<Instant>,
}

/// In-memory code cache
///
/// Cloning yields another handle to the same state.
///
/// # Example
///
/// ```rust
/// use codewatch_core::cache::{Acceptance, CodeCache};
/// use codewatch_core::traits::CodeRecord;
///
/// let cache = CodeCache::new();
/// let first = cache.try_accept(CodeRecord::new("123456", "t1"));
/// assert!(first.is_changed());
///
/// let again = cache.try_accept(CodeRecord::new("123456", "t2"));
/// assert_eq!(again, Acceptance::Unchanged);
/// assert_eq!(cache.peek().unwrap().origin_timestamp, "t1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CodeCache {
    inner: Arc<Mutex<CacheState>>,
}

impl CodeCache {
    /// Create an empty cache holding the sentinel
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Critical sections never panic midway, so a poisoned state is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accept_locked(state: &mut CacheState, record: CodeRecord) -> Acceptance {
        if state
            .record
            .as_ref()
            .is_some_and(|current| current.value == record.value)
        {
            return Acceptance::Unchanged;
        }

        state.record = Some(record.clone());
        state.accepted_at = Some(Utc::now());
        Acceptance::Changed(record)
    }

    /// Offer a record
    ///
    /// Returns `Changed` iff its value differs from the stored value (the
    /// sentinel differs from everything), storing it and the acceptance time.
    pub fn try_accept(&self, record: CodeRecord) -> Acceptance {
        let mut state = self.lock();
        Self::accept_locked(&mut state, record)
    }

    /// Offer a record fetched under `generation`
    ///
    /// Returns `None` without mutating anything if the cache has been reset
    /// since that generation began.
    pub fn try_accept_for(&self, generation: u64, record: CodeRecord) -> Option<Acceptance> {
        self.try_accept_then(generation, record, |_| {})
    }

    /// Like [`try_accept_for`](Self::try_accept_for), running `on_changed`
    /// before the lock is released
    ///
    /// A concurrent `reset()` cannot slip in between accepting the record and
    /// `on_changed`. `on_changed` must not call back into the cache.
    pub fn try_accept_then(
        &self,
        generation: u64,
        record: CodeRecord,
        on_changed: impl FnOnce(&CodeRecord),
    ) -> Option<Acceptance> {
        let mut state = self.lock();
        if state.generation != generation {
            return None;
        }
        let acceptance = Self::accept_locked(&mut state, record);
        if let Acceptance::Changed(record) = &acceptance {
            on_changed(record);
        }
        Some(acceptance)
    }

    /// Run `f` under the lock if `generation` is still current
    ///
    /// Returns `None` without running `f` for a stale generation. A
    /// concurrent `reset()` waits until `f` returns. `f` must not call back
    /// into the cache.
    pub fn if_current<R>(&self, generation: u64, f: impl FnOnce() -> R) -> Option<R> {
        let state = self.lock();
        if state.generation != generation {
            return None;
        }
        let result = f();
        drop(state);
        Some(result)
    }

    /// Clear to the sentinel and start a new generation
    ///
    /// Also forgets the last keystroke injection: the debounce window applies
    /// per source.
    pub fn reset(&self) -> u64 {
        let mut state = self.lock();
        state.record = None;
        state.accepted_at = None;
        state.last_injection = None;
        state.generation += 1;
        state.generation
    }

    /// Read the stored record without side effects
    pub fn peek(&self) -> Option<CodeRecord> {
        self.lock().record.clone()
    }

    /// Wall-clock time of the last accepted change
    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        self.lock().accepted_at
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Whether `generation` is still current
    pub fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Reserve a keystroke injection
    ///
    /// Returns `true` and records the time if `generation` is current and the
    /// time elapsed since the last reserved injection exceeds `window`. An
    /// injection exactly one `window` after the previous one is refused. A
    /// zero window never refuses.
    pub fn claim_injection(&self, generation: u64, window: Duration) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }

        let now = Instant::now();
        if let Some(last) = state.last_injection
            && !window.is_zero()
            && now.duration_since(last) <= window
        {
            return false;
        }

        state.last_injection = Some(now);
        true
    }
}
