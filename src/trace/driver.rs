//! Runs the target under GDB and collects its execution trace

use std::io::Write;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info, warn};

use super::script;
use super::{Trace, TracePayload, TraceRequest, TraceStep};
use crate::config::AnalysisConfig;
use crate::constants::{TRACE_BEGIN_MARKER, TRACE_END_MARKER};
use crate::errors::TraceError;
use crate::process;
use crate::source::SourceFiles;

/// Drives GDB in batch mode with the generated tracer script.
pub struct DynamicTraceDriver<'c> {
    config: &'c AnalysisConfig,
}

impl<'c> DynamicTraceDriver<'c> {
    pub fn new(config: &'c AnalysisConfig) -> Self {
        Self { config }
    }

    /// True when `gdb --version` succeeds within the probe timeout.
    pub fn is_available(&self) -> bool {
        process::probe(&self.config.gdb.to_string_lossy(), self.config.probe_timeout)
    }

    /// Traces the allocation described by `request` through a real run.
    ///
    /// Steps whose source text the debugger could not list are filled in
    /// from `files`.
    pub fn trace(
        &self,
        executable: &Path,
        request: &TraceRequest,
        files: &mut SourceFiles,
    ) -> Result<Trace, TraceError> {
        let script = script::generate(request, self.config.max_trace_steps)
            .map_err(|e| TraceError::ScriptFailed(e.to_string()))?;

        // Removed when dropped.
        let mut script_file = tempfile::Builder::new()
            .prefix("leakroot_gdb_")
            .suffix(".py")
            .tempfile()?;
        script_file.write_all(script.as_bytes())?;
        script_file.flush()?;

        let mut command = Command::new(&self.config.gdb);
        command
            .arg("--batch")
            .arg("--quiet")
            .arg("-x")
            .arg(script_file.path());
        if request.args.is_empty() {
            command.arg(executable);
        } else {
            command.arg("--args").arg(executable).args(&request.args);
        }

        info!(
            file = %request.alloc_file,
            line = request.alloc_line,
            var = %request.alloc_var,
            "tracing allocation with gdb"
        );
        let output = process::run_with_timeout(&mut command, self.config.gdb_timeout)?;

        let payload = parse_output(&output.combined())?;
        if !payload.success {
            warn!(error = %payload.error, "tracer script reported failure");
            return Err(TraceError::ScriptFailed(payload.error));
        }
        if payload.trace.is_empty() {
            return Err(TraceError::EmptyTrace);
        }

        let mut steps = payload.trace;
        resolve_code(&mut steps, files);
        debug!(
            steps = steps.len(),
            frees = payload.free_events.len(),
            address = %payload.tracked_address,
            "trace collected"
        );

        Ok(Trace {
            steps,
            free_events: payload.free_events,
            tracked_address: payload.tracked_address,
        })
    }
}

/// Extracts the JSON payload printed between the trace markers.
///
/// Missing fields take their empty defaults.
pub fn parse_output(raw: &str) -> Result<TracePayload, TraceError> {
    let begin = raw.find(TRACE_BEGIN_MARKER).ok_or(TraceError::MarkersMissing)?;
    let body_start = begin + TRACE_BEGIN_MARKER.len();
    let end = raw[body_start..]
        .find(TRACE_END_MARKER)
        .map(|offset| body_start + offset)
        .ok_or(TraceError::MarkersMissing)?;

    let payload = serde_json::from_str(raw[body_start..end].trim())?;
    Ok(payload)
}

/// Fills empty `code` fields from the source files.
pub fn resolve_code(steps: &mut [TraceStep], files: &mut SourceFiles) {
    for step in steps.iter_mut().filter(|s| s.code.trim().is_empty()) {
        step.code = files.line(&step.file, step.line);
    }
}
