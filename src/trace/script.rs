// GDB automation script generation

use serde::Serialize;

use super::TraceRequest;
use crate::constants::{TRACE_BEGIN_MARKER, TRACE_END_MARKER};

const TEMPLATE: &str = include_str!("tracer.py");

/// JSON text of `value`; JSON strings, numbers and arrays are Python literals.
fn literal<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(value)
}

/// Renders the tracer script for `request`.
pub fn generate(request: &TraceRequest, max_steps: usize) -> Result<String, serde_json::Error> {
    let (caller_file, caller_line) = match &request.caller {
        Some((file, line)) => (file.as_str(), *line),
        None => ("", 0),
    };

    let substitutions = [
        ("@ALLOC_FILE@", literal(&request.alloc_file)?),
        ("@ALLOC_LINE@", literal(&request.alloc_line)?),
        ("@ALLOC_VAR@", literal(&request.alloc_var)?),
        ("@RELEVANT_FUNCTIONS@", literal(&request.relevant_functions)?),
        ("@CALLER_FILE@", literal(caller_file)?),
        ("@CALLER_LINE@", literal(&caller_line)?),
        ("@MAX_STEPS@", literal(&max_steps)?),
        ("@BEGIN_MARKER@", literal(TRACE_BEGIN_MARKER)?),
        ("@END_MARKER@", literal(TRACE_END_MARKER)?),
    ];

    let mut script = TEMPLATE.to_string();
    for (placeholder, value) in &substitutions {
        script = script.replace(placeholder, value);
    }
    Ok(script)
}
