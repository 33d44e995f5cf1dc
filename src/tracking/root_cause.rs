// Output contract of both trackers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::trace::TraceStep;

const CLOSING_BRACE: &str = "}";
const END_OF_PROGRAM: &str = "end of program";

/// Why the allocation was never released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakCategory {
    /// Type 1: a path to the memory survived to the end, nothing freed it.
    NeverFreed,
    /// Type 2: the last path was overwritten or went out of scope.
    PointerLost,
    /// Type 3: the structure holding the pointer was freed first.
    ContainerFreedFirst,
}

impl LeakCategory {
    pub fn code(self) -> u8 {
        match self {
            LeakCategory::NeverFreed => 1,
            LeakCategory::PointerLost => 2,
            LeakCategory::ContainerFreedFirst => 3,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            LeakCategory::NeverFreed => "memory never freed",
            LeakCategory::PointerLost => "last pointer lost",
            LeakCategory::ContainerFreedFirst => "container freed before its contents",
        }
    }
}

impl fmt::Display for LeakCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type {} ({})", self.code(), self.describe())
    }
}

/// The line blamed for a leak.
///
/// Serialized as plain text: the code itself, `"}"` or `"end of program"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResponsibleLine {
    Code(String),
    ClosingBrace,
    EndOfProgram,
}

impl From<String> for ResponsibleLine {
    fn from(text: String) -> Self {
        match text.as_str() {
            CLOSING_BRACE => ResponsibleLine::ClosingBrace,
            END_OF_PROGRAM => ResponsibleLine::EndOfProgram,
            _ => ResponsibleLine::Code(text),
        }
    }
}

impl From<ResponsibleLine> for String {
    fn from(line: ResponsibleLine) -> Self {
        line.to_string()
    }
}

impl fmt::Display for ResponsibleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponsibleLine::Code(text) => write!(f, "{}", text),
            ResponsibleLine::ClosingBrace => write!(f, "{}", CLOSING_BRACE),
            ResponsibleLine::EndOfProgram => write!(f, "{}", END_OF_PROGRAM),
        }
    }
}

/// Diagnosis for one leak, produced by whichever tracker ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCauseInfo {
    pub leak_kind: LeakCategory,
    pub line: ResponsibleLine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
    pub function: String,
    pub file: String,
    /// Ownership transitions in the order they happened.
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gdb_trace: Option<Vec<TraceStep>>,
}

impl RootCauseInfo {
    pub fn new(
        leak_kind: LeakCategory,
        line: ResponsibleLine,
        function: impl Into<String>,
        file: impl Into<String>,
        steps: Vec<String>,
    ) -> Self {
        Self {
            leak_kind,
            line,
            line_number: None,
            function: function.into(),
            file: file.into(),
            steps,
            gdb_trace: None,
        }
    }

    pub fn at_line(mut self, line_number: usize) -> Self {
        self.line_number = Some(line_number);
        self
    }
}
