//! Leak-checker reports
//!
//! - [`model`]: [`LeakRecord`] and friends, the structured form of a report
//! - [`parser`]: memcheck text → [`ParsedReport`]
//! - [`runner`]: runs Valgrind with a timeout and returns its raw report
//!
//! Backtraces are stored outermost first and never contain allocator or
//! system frames, so the last frame is always the allocation site in user
//! code.

pub mod model;
pub mod parser;
pub mod runner;

pub use model::{LeakRecord, LeakSummary, LossKind, ParsedReport, StackFrame};
pub use parser::parse_report;
