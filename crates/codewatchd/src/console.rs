//! Line-oriented console
//!
//! Stand-in for a graphical front end: each stdin line is one command, and
//! every command maps onto one `CodeWatcher` operation.

use codewatch_core::CodeWatcher;
use codewatch_core::propagator::{CodeUpdate, Outcome};
use codewatch_core::scheduler::SchedulerState;
use std::time::Duration;
use tracing::debug;

pub const HELP: &str = "\
commands:
  fetch            fetch the active source now
  switch <id>      select another source
  copy             copy the last code again
  auto on|off      type new codes from timer ticks
  interval <secs>  change the polling interval
  status           show the active source and code
  sources          list configured sources
  quit             stop and exit";

/// One console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Fetch,
    Switch(String),
    Copy,
    Auto(bool),
    Interval(Duration),
    Status,
    Sources,
    Help,
    Quit,
}

/// Parse one input line
///
/// Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments for '{}'", verb));
    }

    let command = match (verb.to_lowercase().as_str(), arg) {
        ("fetch", None) => Command::Fetch,
        ("switch", Some(id)) => Command::Switch(id.to_string()),
        ("switch", None) => return Err("usage: switch <id>".to_string()),
        ("copy", None) => Command::Copy,
        ("auto", Some("on")) => Command::Auto(true),
        ("auto", Some("off")) => Command::Auto(false),
        ("auto", _) => return Err("usage: auto on|off".to_string()),
        ("interval", Some(secs)) => match secs.parse::<u64>() {
            Ok(secs) if secs > 0 => Command::Interval(Duration::from_secs(secs)),
            _ => return Err(format!("invalid interval '{}': expected whole seconds > 0", secs)),
        },
        ("interval", None) => return Err("usage: interval <secs>".to_string()),
        ("status", None) => Command::Status,
        ("sources", None) => Command::Sources,
        ("help" | "?", None) => Command::Help,
        ("quit" | "exit", None) => Command::Quit,
        (verb, _) => return Err(format!("unknown command '{}' (try 'help')", verb)),
    };

    Ok(Some(command))
}

/// Render an update for the terminal
pub fn render(update: &CodeUpdate) -> String {
    update.to_string()
}

/// Run one command against the watcher
///
/// `Quit` is handled by the caller.
pub async fn execute(watcher: &CodeWatcher, command: Command) {
    match command {
        Command::Fetch => {
            let pending = watcher.manual_fetch();
            tokio::spawn(async move {
                if let Ok(Outcome::Unchanged) = pending.await {
                    println!("(unchanged)");
                }
            });
        }
        Command::Switch(id) => {
            // Unknown identifiers are reported through the update stream
            if watcher.switch_source(&id).is_ok() {
                println!("switched to {}", id);
            }
        }
        Command::Copy => match watcher.copy_last_code().await {
            Ok(Some(record)) => println!("copied {}", record.value),
            Ok(None) => println!("no code yet"),
            Err(e) => eprintln!("copy failed: {}", e),
        },
        Command::Auto(enabled) => {
            watcher.set_auto_type(enabled);
            println!("auto-type {}", if enabled { "on" } else { "off" });
        }
        Command::Interval(interval) => match watcher.set_interval(interval) {
            Ok(()) => println!("polling every {}s", interval.as_secs()),
            Err(e) => eprintln!("{}", e),
        },
        Command::Status => println!("{}", status_line(watcher)),
        Command::Sources => {
            let active = watcher.active_source();
            for id in watcher.sources() {
                let marker = if active.as_deref() == Some(id.as_str()) { "*" } else { " " };
                println!("{} {}", marker, id);
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => debug!("quit is handled by the caller"),
    }
}

fn status_line(watcher: &CodeWatcher) -> String {
    let state = match watcher.scheduler_state() {
        SchedulerState::Idle => "idle".to_string(),
        SchedulerState::Armed { source_id, interval } => {
            format!("{} every {}s", source_id, interval.as_secs())
        }
    };
    let code = watcher
        .current_code()
        .map_or_else(|| "-".to_string(), |record| record.to_string());
    let auto = if watcher.auto_type() { "on" } else { "off" };

    format!("polling: {} | code: {} | auto-type: {}", state, code, auto)
}
