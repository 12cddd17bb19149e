//! Test doubles and common utilities for contract tests
//!
//! The doubles record every call so tests can assert on exactly which side
//! effects an observation triggered.

#![allow(dead_code)]

use async_trait::async_trait;
use codewatch_core::CodeWatcher;
use codewatch_core::config::{
    CodewatchConfig, EngineConfig, HostKind, SourceConfig, SourceSettings,
};
use codewatch_core::error::{Error, Result};
use codewatch_core::traits::{
    ClipboardSink, CodeRecord, FetchFailure, FetchResult, KeystrokeSink, SourceAdapter,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Successful fetch result
pub fn code(value: &str, date: &str) -> FetchResult {
    FetchResult::Success(CodeRecord::new(value, date))
}

/// HTTP 401 rejection
pub fn unauthorized() -> FetchResult {
    FetchResult::ConfigError(FetchFailure::with_status(401, "Bad credentials"))
}

/// HTTP 503 failure
pub fn unavailable() -> FetchResult {
    FetchResult::TransientFailure(FetchFailure::with_status(503, "Service Unavailable"))
}

#[derive(Default)]
struct Script {
    queue: VecDeque<FetchResult>,
    last: Option<FetchResult>,
    fetches: usize,
    gate: Option<Arc<Semaphore>>,
}

/// A source adapter that replays scripted results per source
///
/// Each source's queue is consumed in order; once drained, the last result
/// repeats. A gated source blocks every fetch until a permit is released.
#[derive(Clone, Default)]
pub struct ScriptedAdapter {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append results for `source_id`
    pub fn script(&self, source_id: &str, results: impl IntoIterator<Item = FetchResult>) -> &Self {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .entry(source_id.to_string())
            .or_default()
            .queue
            .extend(results);
        self
    }

    /// Make fetches for `source_id` wait for `release()`
    pub fn gate(&self, source_id: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.scripts
            .lock()
            .unwrap()
            .entry(source_id.to_string())
            .or_default()
            .gate = Some(gate.clone());
        gate
    }

    /// Number of fetches started for `source_id`
    pub fn fetch_count(&self, source_id: &str) -> usize {
        self.scripts
            .lock()
            .unwrap()
            .get(source_id)
            .map_or(0, |script| script.fetches)
    }

    fn next_result(&self, source_id: &str) -> FetchResult {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.entry(source_id.to_string()).or_default();
        match script.queue.pop_front() {
            Some(result) => {
                script.last = Some(result.clone());
                result
            }
            None => script
                .last
                .clone()
                .unwrap_or_else(|| FetchResult::transient("nothing scripted")),
        }
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    async fn fetch(&self, source: &SourceConfig) -> FetchResult {
        let gate = {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(source.id.clone()).or_default();
            script.fetches += 1;
            script.gate.clone()
        };

        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        self.next_result(&source.id)
    }

    fn supports_host(&self, _host: HostKind) -> bool {
        true
    }

    fn adapter_name(&self) -> &'static str {
        "scripted"
    }
}

/// Records every text handed to it; usable as either sink
#[derive(Clone, Default)]
pub struct RecordingSink {
    calls: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Texts received so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Make subsequent calls fail (after recording them)
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn record(&self, text: &str) -> Result<()> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::sink("sink unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ClipboardSink for RecordingSink {
    async fn set_clipboard_text(&self, text: &str) -> Result<()> {
        self.record(text)
    }
}

#[async_trait]
impl KeystrokeSink for RecordingSink {
    async fn inject_text(&self, text: &str) -> Result<()> {
        self.record(text)
    }
}

/// A source with a given interval in seconds
pub fn source(interval_secs: u64) -> SourceSettings {
    SourceSettings::new("acme/codes", "test-token")
        .with_host(HostKind::Github)
        .with_interval_secs(interval_secs)
}

/// Configuration with one source per `(id, interval_secs)` pair
///
/// The first pair is the initial source.
pub fn config(sources: &[(&str, u64)]) -> CodewatchConfig {
    let mut config = CodewatchConfig::new();
    for (id, interval_secs) in sources {
        config = config.with_source(*id, source(*interval_secs));
    }
    if let Some((first, _)) = sources.first() {
        config = config.with_active_source(*first);
    }
    config
}

/// Engine settings with the given debounce window
pub fn engine(debounce_ms: u64) -> EngineConfig {
    EngineConfig {
        debounce_ms,
        ..EngineConfig::default()
    }
}

/// A watcher wired to the given doubles
pub struct Harness {
    pub watcher: CodeWatcher,
    pub adapter: ScriptedAdapter,
    pub clipboard: RecordingSink,
    pub keystrokes: RecordingSink,
}

impl Harness {
    pub fn new(config: CodewatchConfig, adapter: ScriptedAdapter) -> Self {
        let clipboard = RecordingSink::new();
        let keystrokes = RecordingSink::new();
        let watcher = CodeWatcher::new(
            config,
            Arc::new(adapter.clone()),
            Arc::new(clipboard.clone()),
            Arc::new(keystrokes.clone()),
        )
        .expect("valid test configuration");

        Self {
            watcher,
            adapter,
            clipboard,
            keystrokes,
        }
    }
}
