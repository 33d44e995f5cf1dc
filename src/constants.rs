// Defaults for external tools and the trace budget

use std::time::Duration;

/// Debugger binary looked up on PATH
pub const DEFAULT_GDB: &str = "gdb";

/// Leak checker binary looked up on PATH
pub const DEFAULT_VALGRIND: &str = "valgrind";

/// Budget for one debugger batch run
pub const GDB_TIMEOUT: Duration = Duration::from_secs(60);

/// Budget for one memcheck run
pub const VALGRIND_TIMEOUT: Duration = Duration::from_secs(30);

/// Budget for `--version` availability probes
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on debugger single-steps per trace
/// Guarantees termination when the target loops forever
pub const MAX_TRACE_STEPS: usize = 50_000;

/// How deep below the search root a stale source path is looked up
pub const SOURCE_SEARCH_DEPTH: usize = 5;

/// Sentinels delimiting the JSON payload in debugger output
pub const TRACE_BEGIN_MARKER: &str = "LEAKROOT_TRACE_BEGIN";
pub const TRACE_END_MARKER: &str = "LEAKROOT_TRACE_END";
