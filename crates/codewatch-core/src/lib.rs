// # codewatch-core
//
// Core library for watching remotely published verification codes.
//
// ## Architecture Overview
//
// - **SourceAdapter**: Trait for fetching the current code from a content host
// - **ClipboardSink / KeystrokeSink**: Traits for delivering a new code
// - **SourceRegistry**: Validated, immutable map of configured sources
// - **CodeCache**: Last accepted code, the only change-detection state
// - **ChangePropagator**: Decides which side effects a fetch result triggers
// - **PollScheduler**: The single recurring timer and the active source
// - **CodeWatcher**: Controller facade used by presentation layers
//
// ## Design Principles
//
// 1. **Library-First**: No network or OS code; adapters and sinks are injected
// 2. **One Timer**: At most one polling timer exists at any time
// 3. **Value Equality**: A code is new iff its value differs from the cached one
// 4. **Failures Are Values**: Fetch failures travel as `FetchResult`, never panic
//    or stop polling

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod propagator;
pub mod registry;
pub mod scheduler;
pub mod traits;

// Re-export core types for convenience
pub use cache::{Acceptance, CodeCache};
pub use config::{CodewatchConfig, EngineConfig, HostKind, SourceConfig, SourceSettings};
pub use engine::CodeWatcher;
pub use error::{Error, Result};
pub use propagator::{
    ChangePropagator, CodeUpdate, ErrorNotification, NotificationKind, ObserveMode, Outcome,
};
pub use registry::SourceRegistry;
pub use scheduler::{PollScheduler, SchedulerState};
pub use traits::{
    ClipboardSink, CodeRecord, FetchFailure, FetchResult, KeystrokeSink, SourceAdapter,
};
