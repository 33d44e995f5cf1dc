//! Dynamic execution traces
//!
//! [`DynamicTraceDriver`] runs the target under GDB with a generated Python
//! script that single-steps user code and watches `free()` for the tracked
//! address. The types here are the JSON contract between that script and
//! the reconciler.

pub mod driver;
pub mod script;

use serde::{Deserialize, Serialize};

pub use driver::DynamicTraceDriver;

/// One executed user-code line, in real run order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub code: String,
    /// Whether the tracked address was unchanged after the line ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr_intact: Option<bool>,
    /// Callee parameters holding the tracked address on entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_mapping: Option<Vec<String>>,
}

impl TraceStep {
    pub fn new(
        file: impl Into<String>,
        line: usize,
        function: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
            code: code.into(),
            addr_intact: None,
            param_mapping: None,
        }
    }

    pub fn intact(mut self, intact: bool) -> Self {
        self.addr_intact = Some(intact);
        self
    }

    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.param_mapping = Some(params.into_iter().map(Into::into).collect());
        self
    }
}

/// Call site of a `free()` whose argument was the tracked address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeEvent {
    #[serde(default)]
    pub caller_file: String,
    #[serde(default)]
    pub caller_line: usize,
    #[serde(default)]
    pub caller_function: String,
}

impl FreeEvent {
    pub fn new(file: impl Into<String>, line: usize, function: impl Into<String>) -> Self {
        Self {
            caller_file: file.into(),
            caller_line: line,
            caller_function: function.into(),
        }
    }
}

/// The JSON object printed between the trace markers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracePayload {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub trace: Vec<TraceStep>,
    #[serde(default)]
    pub tracked_address: String,
    #[serde(default)]
    pub free_events: Vec<FreeEvent>,
    #[serde(default)]
    pub error: String,
}

/// Where to start tracing and what to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRequest {
    pub alloc_file: String,
    pub alloc_line: usize,
    /// Variable receiving the allocation, as written (`arr[i]`, `n->data`).
    pub alloc_var: String,
    /// Functions of the leak's backtrace.
    pub relevant_functions: Vec<String>,
    /// Call site used to disambiguate a function called from several places.
    pub caller: Option<(String, usize)>,
    pub args: Vec<String>,
}

/// A successful trace: executed steps plus observed frees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    pub steps: Vec<TraceStep>,
    pub free_events: Vec<FreeEvent>,
    pub tracked_address: String,
}
