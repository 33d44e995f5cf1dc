//! Per-leak analysis pipeline
//!
//! extract functions → trace under GDB and reconcile → otherwise scan the
//! source statically. Leaks are analysed one at a time; nothing is shared
//! between two analyses except the source line cache.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::report::{LeakRecord, ParsedReport};
use crate::source::{ExtractedFunction, SourceContextExtractor, SourceFiles};
use crate::trace::{DynamicTraceDriver, TraceRequest};
use crate::tracking::statement::statements;
use crate::tracking::{RootCauseInfo, StaticOwnershipTracker, TraceOwnershipReconciler};

/// Which tracker produced a diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Dynamic,
    Static,
}

/// Everything learned about one leak.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub leak: LeakRecord,
    /// Extracted functions, outermost frame first.
    pub functions: Vec<ExtractedFunction>,
    pub root_cause: Option<RootCauseInfo>,
    pub strategy: Option<Strategy>,
    /// Why dynamic tracing was skipped or failed, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_failure: Option<String>,
}

/// Runs the analysis for each leak of a report.
pub struct LeakAnalyzer {
    config: AnalysisConfig,
    extractor: SourceContextExtractor,
    gdb_available: Option<bool>,
}

impl LeakAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        let files = SourceFiles::new(config.source_root.clone(), config.source_search_depth);
        Self {
            extractor: SourceContextExtractor::new(files),
            config,
            gdb_available: None,
        }
    }

    /// Analyses every leak in `report`, in report order.
    pub fn analyze_report(
        &mut self,
        report: &ParsedReport,
        executable: Option<&Path>,
        args: &[String],
    ) -> Vec<Analysis> {
        report
            .leaks
            .iter()
            .map(|leak| self.analyze(leak, executable, args))
            .collect()
    }

    /// Diagnoses one leak.
    ///
    /// Dynamic tracing runs when enabled, an executable is given and GDB
    /// answers; any failure, or a trace that yields no diagnosis, falls back
    /// to the static tracker.
    pub fn analyze(
        &mut self,
        leak: &LeakRecord,
        executable: Option<&Path>,
        args: &[String],
    ) -> Analysis {
        let functions = self.extractor.extract_call_stack(&leak.backtrace);
        let mut analysis = Analysis {
            leak: leak.clone(),
            functions,
            root_cause: None,
            strategy: None,
            trace_failure: None,
        };

        let Some(alloc_var) = allocation_variable(&analysis.functions, leak) else {
            warn!(file = %leak.file, line = leak.line, "no allocation statement at reported line");
            return analysis;
        };
        debug!(var = %alloc_var, function = %leak.function, "allocation variable");

        match self.trace_dynamically(leak, &alloc_var, executable, args) {
            Ok(Some(info)) => {
                analysis.root_cause = Some(info);
                analysis.strategy = Some(Strategy::Dynamic);
                return analysis;
            }
            Ok(None) => {
                debug!("trace gave no diagnosis, falling back to static analysis");
            }
            Err(reason) => {
                warn!(%reason, "dynamic tracing unavailable, using static analysis");
                analysis.trace_failure = Some(reason);
            }
        }

        // The static tracker starts at the allocating function.
        let innermost_first: Vec<ExtractedFunction> =
            analysis.functions.iter().rev().cloned().collect();
        analysis.root_cause = StaticOwnershipTracker::analyze(&innermost_first);
        if analysis.root_cause.is_some() {
            analysis.strategy = Some(Strategy::Static);
        }
        analysis
    }

    fn trace_dynamically(
        &mut self,
        leak: &LeakRecord,
        alloc_var: &str,
        executable: Option<&Path>,
        args: &[String],
    ) -> Result<Option<RootCauseInfo>, String> {
        if !self.config.dynamic_tracing {
            return Err("dynamic tracing disabled".to_string());
        }
        let Some(executable) = executable else {
            return Err("no executable to trace".to_string());
        };

        let driver = DynamicTraceDriver::new(&self.config);
        let available = *self
            .gdb_available
            .get_or_insert_with(|| driver.is_available());
        if !available {
            return Err(format!("'{}' not available", self.config.gdb.display()));
        }

        let request = TraceRequest {
            alloc_file: leak.file.clone(),
            alloc_line: leak.line,
            alloc_var: alloc_var.to_string(),
            relevant_functions: leak
                .backtrace
                .iter()
                .rev()
                .map(|frame| frame.function.clone())
                .collect(),
            caller: leak
                .caller_frame()
                .map(|frame| (frame.file.clone(), frame.line)),
            args: args.to_vec(),
        };

        let trace = driver
            .trace(executable, &request, self.extractor.files_mut())
            .map_err(|e| e.to_string())?;
        info!(steps = trace.steps.len(), "reconciling execution trace");

        Ok(
            TraceOwnershipReconciler::reconcile(&trace.steps, &trace.free_events).map(|mut info| {
                info.gdb_trace = Some(trace.steps.clone());
                info
            }),
        )
    }
}

/// Variable receiving the allocation on the reported line.
fn allocation_variable(functions: &[ExtractedFunction], leak: &LeakRecord) -> Option<String> {
    let site = functions
        .iter()
        .rev()
        .find(|f| f.function == leak.function && f.line == leak.line)?;
    let (_, text) = site.lines_from_reported().into_iter().next()?;

    statements(&text)
        .iter()
        .filter(|stmt| stmt.is_allocation())
        .find_map(|stmt| stmt.assignment().map(|a| a.target))
}
