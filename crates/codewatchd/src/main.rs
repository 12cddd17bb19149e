// # codewatchd - verification code watcher
//
// CRITICAL RULES:
// - This is a THIN integration layer ONLY
// - DO NOT add polling, caching or change-detection logic here
// - All watcher logic MUST be in codewatch-core
// - Configuration is via environment variables ONLY
//
// The codewatchd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the HTTP source adapter and command sinks into a `CodeWatcher`
// 4. Relaying console commands and printing updates
//
// ## Configuration
//
// ### Sources
// - `CODEWATCH_CONFIG`: JSON file with `sources`, `active_source` and `engine`
// - `CODEWATCH_SOURCES`: Comma-separated source identifiers (default: github)
// - `CODEWATCH_<ID>_REPOSITORY`: Repository, e.g. owner/name
// - `CODEWATCH_<ID>_TOKEN`: API token
// - `CODEWATCH_<ID>_PATH`: Code document path (default: code.json)
// - `CODEWATCH_<ID>_INTERVAL`: Poll interval in seconds (default: 60)
// - `CODEWATCH_<ID>_HOST`: github or gitee (default: the identifier)
// - `CODEWATCH_<ID>_API_BASE`: API base URL override
//
// ### Engine
// - `CODEWATCH_ACTIVE_SOURCE`: Source polled at startup
// - `CODEWATCH_DEBOUNCE_MS`: Minimum time between two typed codes
// - `CODEWATCH_AUTO_TYPE`: true or false
//
// ### Desktop
// - `CODEWATCH_CLIPBOARD_CMD`: Command receiving each new code on stdin
// - `CODEWATCH_TYPE_CMD`: Command typing each timer-driven new code
//
// ## Example
//
// ```bash
// export CODEWATCH_GITHUB_REPOSITORY=acme/codes
// export CODEWATCH_GITHUB_TOKEN=your_token
// export CODEWATCH_CLIPBOARD_CMD=wl-copy
// export CODEWATCH_TYPE_CMD="wtype -"
//
// codewatchd
// ```

mod config;
mod console;
mod sinks;

use anyhow::Result;
use codewatch_core::CodeWatcher;
use codewatch_core::propagator::CodeUpdate;
use codewatch_source_http::HttpSourceAdapter;
use config::Config;
use console::Command;
use sinks::CommandSink;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum CodewatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<CodewatchExitCode> for ExitCode {
    fn from(code: CodewatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return CodewatchExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return CodewatchExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CodewatchExitCode::ConfigError.into();
    }

    info!("Starting codewatchd");
    info!("Configuration loaded: {} source(s)", config.watch.sources.len());

    let watcher = match build_watcher(config) {
        Ok(watcher) => Arc::new(watcher),
        Err(e) => {
            error!("Startup error: {}", e);
            return CodewatchExitCode::ConfigError.into();
        }
    };

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CodewatchExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(watcher).await {
            error!("Daemon error: {}", e);
            CodewatchExitCode::RuntimeError
        } else {
            CodewatchExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Wire the adapter and sinks into a watcher
fn build_watcher(config: Config) -> Result<CodeWatcher> {
    let adapter = HttpSourceAdapter::with_timeout(config.watch.engine.request_timeout())?;

    let clipboard = CommandSink::new("clipboard", config.clipboard_cmd);
    let keystrokes = CommandSink::new("keystrokes", config.type_cmd);
    if clipboard.command().is_none() {
        warn!("CODEWATCH_CLIPBOARD_CMD is not set, new codes are only logged");
    }

    let watcher = CodeWatcher::new(
        config.watch,
        Arc::new(adapter),
        Arc::new(clipboard),
        Arc::new(keystrokes),
    )?;
    Ok(watcher)
}

/// Run the daemon
async fn run_daemon(watcher: Arc<CodeWatcher>) -> Result<()> {
    let printer = watcher.on_update(|update| match update {
        CodeUpdate::Code { .. } => println!("{}", console::render(&update)),
        CodeUpdate::Error(_) => eprintln!("{}", console::render(&update)),
    });

    watcher.start()?;
    info!("Watching {} (type 'help' for commands)", watcher.active_source().unwrap_or_default());

    let mut input = Some(BufReader::new(tokio::io::stdin()).lines());
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                info!("Received shutdown signal: {}", signal?);
                break;
            }

            line = next_line(&mut input) => match line {
                Ok(Some(line)) => match console::parse(&line) {
                    Ok(Some(Command::Quit)) => {
                        info!("Quit requested");
                        break;
                    }
                    Ok(Some(command)) => console::execute(&watcher, command).await,
                    Ok(None) => {}
                    Err(message) => eprintln!("{}", message),
                },
                Ok(None) => {
                    info!("Console closed, waiting for shutdown signal");
                    input = None;
                }
                Err(e) => {
                    warn!("Failed to read console input: {}", e);
                    input = None;
                }
            },
        }
    }

    info!("Shutting down");
    watcher.stop();
    printer.abort();
    Ok(())
}

/// Next console line; pending forever once the console is gone
async fn next_line(input: &mut Option<Lines<BufReader<Stdin>>>) -> std::io::Result<Option<String>> {
    match input {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    // Set up signal handlers for SIGTERM and SIGINT
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
