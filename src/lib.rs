//! # Introduction
//!
//! leakroot explains *why* a memory leak reported by Valgrind happened in a
//! C program: which line lost the last pointer, whether the memory was
//! simply never freed, or whether the structure holding it was freed first.
//!
//! ## Analysis pipeline
//!
//! ```text
//! Valgrind report → LeakRecords → extracted functions → GDB trace ─┬→ RootCauseInfo
//!                                                   └→ static scan ─┘
//! ```
//!
//! 1. [`report`]: runs Valgrind and parses its report into
//!    [`report::LeakRecord`]s with filtered backtraces.
//! 2. [`source`]: tolerant C lexer, source file cache, and the
//!    [`source::SourceContextExtractor`] that cuts out each frame's function.
//! 3. [`trace`]: drives GDB over the real binary and returns the executed
//!    lines plus the `free()` calls that hit the tracked address.
//! 4. [`tracking`]: the ownership trackers. [`tracking::TraceOwnershipReconciler`]
//!    replays a trace; [`tracking::StaticOwnershipTracker`] scans the text
//!    when no trace is available.
//! 5. [`pipeline`]: [`pipeline::LeakAnalyzer`], dynamic first with static
//!    fallback.
//!
//! ## Leak categories
//!
//! - Type 1, never freed: a path to the memory survives to the end.
//! - Type 2, pointer lost: the last path is overwritten or goes out of scope.
//! - Type 3, container freed first: `free(obj)` while `obj->buf` is live.

pub mod config;
pub mod constants;
pub mod errors;
pub mod pipeline;
pub mod process;
pub mod render;
pub mod report;
pub mod source;
pub mod trace;
pub mod tracking;
