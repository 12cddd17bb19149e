//! Core traits for the codewatch engine
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`SourceAdapter`]: Retrieve the current code from a remote host
//! - [`ClipboardSink`]: Deliver a new code to the clipboard
//! - [`KeystrokeSink`]: Type a new code into the focused input

pub mod sink;
pub mod source_adapter;

pub use sink::{ClipboardSink, KeystrokeSink};
pub use source_adapter::{CodeRecord, FetchFailure, FetchResult, SourceAdapter};
