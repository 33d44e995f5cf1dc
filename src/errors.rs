//! Error types for the tool boundaries
//!
//! The trackers themselves never fail: an allocation they cannot follow
//! yields "no result". Errors only arise where the tool touches the outside
//! world (files, Valgrind, GDB), and each boundary has its own enum so callers
//! can decide whether to fall back or give up.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures while running an external program.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started because it is not installed.
    #[error("'{program}' is not installed or not on PATH")]
    NotFound { program: String },

    /// The program ran longer than its budget and was killed.
    #[error("'{program}' exceeded its {}s timeout", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("failed to run '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Failures while obtaining a leak report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Executable '{}' does not exist", .0.display())]
    ExecutableMissing(PathBuf),

    #[error("'{}' is not a file", .0.display())]
    NotAFile(PathBuf),

    #[error(
        "'{}' does not have execution permissions (try: chmod +x {})",
        .0.display(),
        .0.display()
    )]
    NotExecutable(PathBuf),

    #[error("Valgrind produced no output; the program may have crashed before analysis")]
    EmptyOutput,

    #[error("could not read report '{}': {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Failures while locating source code for a frame.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("source file '{file}' not found")]
    SourceNotFound { file: String },

    #[error("could not read '{}': {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line} of '{file}' is not inside a function body")]
    NoEnclosingFunction { file: String, line: usize },
}

/// Structured failure of a dynamic trace.
///
/// Every variant means "fall back to static analysis"; none is fatal.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("gdb is not available")]
    GdbUnavailable,

    #[error("gdb timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("trace markers missing from gdb output")]
    MarkersMissing,

    #[error("malformed trace payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("trace script failed: {0}")]
    ScriptFailed(String),

    #[error("trace contains no steps")]
    EmptyTrace,

    #[error("could not prepare trace script: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Process(ProcessError),
}

impl From<ProcessError> for TraceError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::NotFound { .. } => TraceError::GdbUnavailable,
            ProcessError::Timeout { timeout, .. } => TraceError::Timeout(timeout),
            other => TraceError::Process(other),
        }
    }
}
