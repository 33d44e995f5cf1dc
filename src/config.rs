//! Analysis configuration
//!
//! [`AnalysisConfig::default`] is built from [`crate::constants`]; the CLI
//! overrides individual fields from its flags.

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_GDB, DEFAULT_VALGRIND, GDB_TIMEOUT, MAX_TRACE_STEPS, PROBE_TIMEOUT,
    SOURCE_SEARCH_DEPTH, VALGRIND_TIMEOUT,
};

/// Knobs for one analysis session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub gdb: PathBuf,
    pub valgrind: PathBuf,
    pub gdb_timeout: Duration,
    pub valgrind_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_trace_steps: usize,
    /// Root searched when a recorded source path no longer exists.
    pub source_root: PathBuf,
    pub source_search_depth: usize,
    /// Try the debugger before falling back to static scanning.
    pub dynamic_tracing: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            gdb: PathBuf::from(DEFAULT_GDB),
            valgrind: PathBuf::from(DEFAULT_VALGRIND),
            gdb_timeout: GDB_TIMEOUT,
            valgrind_timeout: VALGRIND_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
            max_trace_steps: MAX_TRACE_STEPS,
            source_root: PathBuf::from("."),
            source_search_depth: SOURCE_SEARCH_DEPTH,
            dynamic_tracing: true,
        }
    }
}

impl AnalysisConfig {
    /// Static scanning only; the debugger is never started.
    pub fn static_only() -> Self {
        Self {
            dynamic_tracing: false,
            ..Self::default()
        }
    }
}
