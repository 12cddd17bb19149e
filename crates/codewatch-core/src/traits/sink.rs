// # Side-Effect Sinks
//
// Interfaces for the two places a new code is delivered to: the clipboard and
// a simulated keystroke stream. OS-level implementations live outside the core;
// the daemon provides command-backed ones.
//
// Both sinks are fire-and-forget from the engine's point of view: a returned
// error is logged and never stops polling.

use async_trait::async_trait;

/// Receives each newly accepted code as clipboard text
#[async_trait]
pub trait ClipboardSink: Send + Sync {
    /// Replace the clipboard contents with `text`
    async fn set_clipboard_text(&self, text: &str) -> Result<(), crate::Error>;
}

/// Types a newly accepted code into the focused input
///
/// Never invoked for passive observations (manual fetches, source switches).
#[async_trait]
pub trait KeystrokeSink: Send + Sync {
    /// Inject `text` as keystrokes
    async fn inject_text(&self, text: &str) -> Result<(), crate::Error>;
}
