//! Command-backed sinks
//!
//! The daemon has no clipboard or input-injection code of its own. Each sink
//! pipes the code into a user-supplied shell command (`wl-copy`,
//! `xclip -selection clipboard`, `xdotool type --file -`, ...). Without a
//! command the sink only logs.

use async_trait::async_trait;
use codewatch_core::traits::{ClipboardSink, KeystrokeSink};
use codewatch_core::{Error, Result};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Longest stderr excerpt carried in a sink error
const MAX_STDERR: usize = 200;

/// Sink that hands text to a shell command on stdin
#[derive(Debug, Clone)]
pub struct CommandSink {
    label: &'static str,
    command: Option<String>,
}

impl CommandSink {
    /// Create a sink; `command` is run through `sh -c`
    pub fn new(label: &'static str, command: Option<String>) -> Self {
        Self { label, command }
    }

    /// The configured command, if any
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    async fn deliver(&self, text: &str) -> Result<()> {
        let Some(command) = &self.command else {
            info!("{}: {} (no command configured)", self.label, text);
            return Ok(());
        };

        debug!("{}: running `{}`", self.label, command);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::sink(format!("{}: failed to spawn `{}`: {}", self.label, command, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that exits without reading is judged by its exit status below
            if let Err(e) = stdin.write_all(text.as_bytes()).await
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(Error::sink(format!(
                    "{}: failed to write to `{}`: {}",
                    self.label, command, e
                )));
            }
            // Dropping stdin closes the pipe so the command sees EOF
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| {
                Error::sink(format!("{}: `{}` did not finish: {}", self.label, command, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(MAX_STDERR).collect();
            return Err(Error::sink(format!(
                "{}: `{}` exited with {}: {}",
                self.label, command, output.status, stderr
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ClipboardSink for CommandSink {
    async fn set_clipboard_text(&self, text: &str) -> Result<()> {
        self.deliver(text).await
    }
}

#[async_trait]
impl KeystrokeSink for CommandSink {
    async fn inject_text(&self, text: &str) -> Result<()> {
        self.deliver(text).await
    }
}
