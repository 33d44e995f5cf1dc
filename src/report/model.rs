// Data model for parsed leak-checker reports

use std::fmt;

use serde::{Deserialize, Serialize};

/// How Valgrind classified the lost block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    Definitely,
    Indirectly,
    Possibly,
}

impl LossKind {
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "definitely" => Some(LossKind::Definitely),
            "indirectly" => Some(LossKind::Indirectly),
            "possibly" => Some(LossKind::Possibly),
            _ => None,
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossKind::Definitely => write!(f, "definitely lost"),
            LossKind::Indirectly => write!(f, "indirectly lost"),
            LossKind::Possibly => write!(f, "possibly lost"),
        }
    }
}

/// One level of a call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: String,
    pub function: String,
    pub line: usize,
}

impl StackFrame {
    pub fn new(file: impl Into<String>, function: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            function: function.into(),
            line,
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.function, self.file, self.line)
    }
}

/// A single leaked allocation site as reported by the leak checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakRecord {
    pub kind: LossKind,
    pub byte_count: u64,
    pub block_count: u64,
    /// Allocation site: the innermost user frame.
    pub file: String,
    pub line: usize,
    pub function: String,
    /// User frames, outermost (`main`) first, allocation site last.
    pub backtrace: Vec<StackFrame>,
    /// Raw text of the allocator frame (`malloc (vg_replace_malloc.c:381)`).
    pub allocator_frame: Option<String>,
}

impl LeakRecord {
    /// Innermost frame, where the allocator was called.
    pub fn allocation_frame(&self) -> Option<&StackFrame> {
        self.backtrace.last()
    }

    /// The frame that called the allocating function.
    pub fn caller_frame(&self) -> Option<&StackFrame> {
        let n = self.backtrace.len();
        if n >= 2 {
            self.backtrace.get(n - 2)
        } else {
            None
        }
    }
}

/// Byte totals from the `LEAK SUMMARY` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakSummary {
    pub definitely_lost: u64,
    pub indirectly_lost: u64,
    pub possibly_lost: u64,
    pub still_reachable: u64,
}

impl LeakSummary {
    pub fn total_leaked(&self) -> u64 {
        self.definitely_lost + self.indirectly_lost
    }
}

/// Everything extracted from one leak-checker run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReport {
    pub has_leaks: bool,
    pub summary: LeakSummary,
    pub leaks: Vec<LeakRecord>,
}
