//! Contract Test: Failure Handling
//!
//! Constraints verified:
//! - A host rejection is surfaced prominently and never stops the timer
//! - A transient failure is surfaced and the next tick retries
//! - Failures never touch the cache or the sinks
//! - Unknown sources are reported and leave the current source running
//! - Configuration problems are reported all at once, before anything runs

mod common;

use codewatch_core::config::{CodewatchConfig, EngineConfig, SourceSettings};
use codewatch_core::error::Error;
use codewatch_core::propagator::{CodeUpdate, NotificationKind, Outcome};
use codewatch_core::scheduler::SchedulerState;
use codewatch_core::CodeWatcher;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn rejection_is_prominent_and_polling_continues() {
    let adapter = ScriptedAdapter::new();
    adapter.script("github", [code("123456", "t1"), unauthorized()]);
    let h = Harness::new(config(&[("github", 60)]), adapter);

    h.watcher.start().unwrap().await.unwrap();
    let mut updates = h.watcher.subscribe();

    sleep(Duration::from_secs(61)).await;

    let CodeUpdate::Error(notification) = updates.recv().await.unwrap() else {
        panic!("expected an error notification");
    };
    assert_eq!(notification.kind, NotificationKind::Config);
    assert_eq!(notification.source_id.as_deref(), Some("github"));
    assert!(notification.is_prominent());
    assert!(notification.message.contains("401"));

    // No cache mutation, no sink calls
    assert_eq!(h.watcher.current_code().unwrap().value, "123456");
    assert_eq!(h.clipboard.call_count(), 1);
    assert!(h.keystrokes.calls().is_empty());

    // Still armed for the next tick
    assert!(matches!(h.watcher.scheduler_state(), SchedulerState::Armed { .. }));
    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.adapter.fetch_count("github"), 3);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers_on_next_tick() {
    let adapter = ScriptedAdapter::new();
    adapter.script("github", [unavailable(), code("123456", "t1")]);
    let h = Harness::new(config(&[("github", 30)]), adapter);

    let outcome = h.watcher.start().unwrap().await.unwrap();
    let Outcome::Failed(notification) = outcome else {
        panic!("expected a failure, got {:?}", outcome);
    };
    assert_eq!(notification.kind, NotificationKind::Transient);
    assert!(!notification.is_prominent());
    assert!(h.watcher.current_code().is_none());
    assert!(h.clipboard.calls().is_empty());

    sleep(Duration::from_secs(31)).await;

    // The recovered code arrives on a timer tick, so it is typed
    assert_eq!(h.clipboard.calls(), vec!["123456"]);
    assert_eq!(h.keystrokes.calls(), vec!["123456"]);
}

#[tokio::test(start_paused = true)]
async fn unknown_source_keeps_current_one_running() {
    let adapter = ScriptedAdapter::new();
    adapter.script("github", [code("123456", "t1")]);
    let h = Harness::new(config(&[("github", 60)]), adapter);

    h.watcher.start().unwrap().await.unwrap();
    let mut updates = h.watcher.subscribe();

    let result = h.watcher.switch_source("gitlab");
    assert!(matches!(result, Err(Error::ConfigNotFound(ref id)) if id == "gitlab"));

    let CodeUpdate::Error(notification) = updates.recv().await.unwrap() else {
        panic!("expected a not-found notification");
    };
    assert_eq!(notification.kind, NotificationKind::NotFound);
    assert!(notification.is_prominent());

    assert_eq!(h.watcher.active_source().as_deref(), Some("github"));
    assert_eq!(h.watcher.armed_timers(), 1);
    assert_eq!(h.watcher.current_code().unwrap().value, "123456");
}

#[tokio::test]
async fn manual_fetch_without_active_source_fails() {
    let h = Harness::new(config(&[("github", 60)]), ScriptedAdapter::new());

    let outcome = h.watcher.manual_fetch().await.unwrap();

    assert!(matches!(
        outcome,
        Outcome::Failed(ref n) if n.kind == NotificationKind::NotFound
    ));
    assert_eq!(h.adapter.fetch_count("github"), 0);
}

#[test]
fn configuration_violations_are_aggregated() {
    let config = CodewatchConfig::new()
        .with_source("github", SourceSettings::new("acme/codes", ""))
        .with_source("mirror", SourceSettings::new("acme/codes", "tok").with_interval_secs(0))
        .with_active_source("gitlab")
        .with_engine(EngineConfig {
            request_timeout_secs: 0,
            ..EngineConfig::default()
        });

    let adapter = ScriptedAdapter::new();
    let sink = RecordingSink::new();
    let result = CodeWatcher::new(
        config,
        Arc::new(adapter),
        Arc::new(sink.clone()),
        Arc::new(sink),
    );

    let Err(err) = result else {
        panic!("expected a configuration error");
    };
    let violations = err.violations();
    assert_eq!(violations.len(), 5, "{:?}", violations);
    assert!(violations.iter().any(|v| v == "github: token cannot be empty"));
    assert!(violations.iter().any(|v| v == "mirror: interval must be > 0"));
    assert!(violations.iter().any(|v| v.starts_with("mirror: host must be set")));
    assert!(violations.iter().any(|v| v.contains("'gitlab'")));
    assert!(violations.iter().any(|v| v.contains("request_timeout_secs")));
}

#[test]
fn empty_configuration_is_rejected() {
    let sink = RecordingSink::new();
    let result = CodeWatcher::new(
        CodewatchConfig::new(),
        Arc::new(ScriptedAdapter::new()),
        Arc::new(sink.clone()),
        Arc::new(sink),
    );

    assert!(matches!(result, Err(Error::ConfigInvalid(_))));
}
