//! Function extraction for call-stack frames
//!
//! For every user frame of a leak backtrace the enclosing C function is cut
//! out of its file by brace balancing. Braces are counted on lexer tokens, so
//! braces inside strings, character literals and comments do not disturb the
//! balance.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::files::SourceFiles;
use super::lexer::{blank_comments, Lexer, TokenKind};
use crate::errors::ExtractError;
use crate::report::StackFrame;

/// Path fragments identifying system and libc sources.
const SYSTEM_PATHS: &[&str] = &["/usr/include/", "/usr/lib/", "libc", "libpthread"];

/// How far above an opening brace a function signature may start.
const MAX_SIGNATURE_LINES: usize = 6;

/// One function pulled out of a source file for a stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFunction {
    pub file: String,
    pub function: String,
    /// Line reported by the leak checker for this frame.
    pub line: usize,
    /// First line of the function (its signature).
    pub start_line: usize,
    pub source_text: String,
}

impl ExtractedFunction {
    /// Builds a function from text whose first line is `start_line`.
    pub fn new(
        file: impl Into<String>,
        function: impl Into<String>,
        line: usize,
        start_line: usize,
        source_text: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            function: function.into(),
            line,
            start_line,
            source_text: source_text.into(),
        }
    }

    /// Every line of the function with its 1-based file line number.
    ///
    /// Comment text is blanked first, so the lines of a multi-line block
    /// comment come back empty.
    pub fn code_lines(&self) -> Vec<(usize, String)> {
        blank_comments(&self.source_text)
            .lines()
            .enumerate()
            .map(|(i, text)| (self.start_line + i, text.to_string()))
            .collect()
    }

    /// Code lines from the reported line to the end of the function.
    pub fn lines_from_reported(&self) -> Vec<(usize, String)> {
        let mut lines = self.code_lines();
        lines.retain(|(number, _)| *number >= self.line);
        lines
    }

    /// Line number of the last line (normally the closing brace).
    pub fn end_line(&self) -> usize {
        self.start_line + self.source_text.lines().count().saturating_sub(1)
    }
}

/// Returns true for frames that live in system headers or libc.
pub fn is_system_file(path: &str) -> bool {
    SYSTEM_PATHS.iter().any(|p| path.contains(p))
}

/// Finds the 1-based `(start, end)` lines of the function containing `line`.
///
/// `start` includes the signature lines directly above the opening brace.
pub fn function_bounds(lines: &[String], line: usize) -> Option<(usize, usize)> {
    if line == 0 || line > lines.len() {
        return None;
    }

    let braces = brace_events(lines);
    let mut depth = 0usize;
    let mut open_line = 0usize;

    for (brace_line, is_open) in braces {
        if is_open {
            if depth == 0 {
                open_line = brace_line;
            }
            depth += 1;
        } else if depth > 0 {
            depth -= 1;
            if depth == 0 && open_line <= line && line <= brace_line {
                return Some((signature_start(lines, open_line), brace_line));
            }
        }
    }

    None
}

/// `(line, is_open)` for every brace token in the file.
fn brace_events(lines: &[String]) -> Vec<(usize, bool)> {
    let text = lines.join("\n");
    match Lexer::new(&text).tokenize() {
        Ok(tokens) => tokens
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::LBrace => Some((t.location.line, true)),
                TokenKind::RBrace => Some((t.location.line, false)),
                _ => None,
            })
            .collect(),
        Err(e) => {
            // Unlexable file: count raw characters instead.
            debug!(error = %e, "falling back to raw brace counting");
            lines
                .iter()
                .enumerate()
                .flat_map(|(i, l)| {
                    l.chars().filter_map(move |c| match c {
                        '{' => Some((i + 1, true)),
                        '}' => Some((i + 1, false)),
                        _ => None,
                    })
                })
                .collect()
        }
    }
}

/// Walks up from the opening-brace line over the function signature.
fn signature_start(lines: &[String], open_line: usize) -> usize {
    let brace_only = lines[open_line - 1].trim() == "{";
    if !brace_only {
        return open_line;
    }

    let mut start = open_line;
    while start > 1 && open_line - start < MAX_SIGNATURE_LINES {
        let prev = lines[start - 2].trim();
        if prev.is_empty()
            || prev.ends_with(';')
            || prev.ends_with('}')
            || prev.ends_with("*/")
            || prev.starts_with('#')
            || prev.starts_with("//")
        {
            break;
        }
        start -= 1;
    }
    start
}

/// Pulls complete function bodies for the frames of a leak backtrace.
#[derive(Debug)]
pub struct SourceContextExtractor {
    files: SourceFiles,
}

impl SourceContextExtractor {
    pub fn new(files: SourceFiles) -> Self {
        Self { files }
    }

    /// Shared access to the underlying line cache.
    pub fn files_mut(&mut self) -> &mut SourceFiles {
        &mut self.files
    }

    /// Extracts the function enclosing `line` of `file`.
    pub fn extract_function(
        &mut self,
        file: &str,
        function: &str,
        line: usize,
    ) -> Result<ExtractedFunction, ExtractError> {
        let lines = self.files.lines(file)?;
        let (start, end) =
            function_bounds(&lines, line).ok_or_else(|| ExtractError::NoEnclosingFunction {
                file: file.to_string(),
                line,
            })?;

        let source_text = lines[start - 1..end].join("\n");
        Ok(ExtractedFunction::new(file, function, line, start, source_text))
    }

    /// Extracts one function per user frame, preserving frame order.
    ///
    /// Frames whose source cannot be located are skipped with a warning.
    pub fn extract_call_stack(&mut self, frames: &[StackFrame]) -> Vec<ExtractedFunction> {
        frames
            .iter()
            .filter(|frame| !frame.file.is_empty() && !is_system_file(&frame.file))
            .filter_map(|frame| {
                match self.extract_function(&frame.file, &frame.function, frame.line) {
                    Ok(extracted) => Some(extracted),
                    Err(e) => {
                        warn!(function = %frame.function, error = %e, "skipping frame");
                        None
                    }
                }
            })
            .collect()
    }
}
