//! Valgrind leak report parser
//!
//! Turns memcheck output into [`ParsedReport`]s. Only the pieces the root-cause
//! engine needs are read: the per-leak headers with their call stacks, and the
//! `LEAK SUMMARY` byte totals.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::model::{LeakRecord, LeakSummary, LossKind, ParsedReport, StackFrame};

/// Allocator and libc helpers filtered out of backtraces.
const ALLOCATOR_FUNCTIONS: &[&str] = &[
    "malloc", "calloc", "realloc", "free", "strdup", "memcpy", "memmove", "memset",
];

const NO_LEAKS_MARKER: &str = "All heap blocks were freed -- no leaks are possible";

static LEAK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"==\d+==\s+([\d,]+)(?:\s+\([^)]*\))?\s+bytes in\s+([\d,]+)\s+blocks?\s+(?:is|are)\s+(definitely|indirectly|possibly)\s+lost",
    )
    .expect("leak header pattern")
});

static FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:at|by)\s+0x[0-9A-Fa-f]+:\s+(\w+)\s+\(([^:)]+):(\d+)\)").expect("frame pattern")
});

static FRAME_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:at|by)\s+0x[0-9A-Fa-f]+:").expect("frame start pattern"));

static BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^==\d+==\s*$").expect("blank pattern"));

static SUMMARY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"==\d+==\s+(definitely lost|indirectly lost|possibly lost|still reachable):\s+([\d,]+)\s+bytes")
        .expect("summary pattern")
});

/// Parses a complete memcheck report.
pub fn parse_report(report: &str) -> ParsedReport {
    let mut result = ParsedReport::default();

    if report.contains(NO_LEAKS_MARKER) {
        return result;
    }

    if let Some(summary) = parse_summary(report) {
        result.has_leaks = summary.total_leaked() > 0;
        result.summary = summary;
    }

    result.leaks = parse_leaks(report);
    debug!(leaks = result.leaks.len(), "parsed leak report");
    result
}

/// Reads the `LEAK SUMMARY` block, if the report has one.
pub fn parse_summary(report: &str) -> Option<LeakSummary> {
    if !report.contains("LEAK SUMMARY:") {
        return None;
    }

    let mut summary = LeakSummary::default();
    for caps in SUMMARY_LINE.captures_iter(report) {
        let bytes = parse_count(&caps[2]);
        match &caps[1] {
            "definitely lost" => summary.definitely_lost = bytes,
            "indirectly lost" => summary.indirectly_lost = bytes,
            "possibly lost" => summary.possibly_lost = bytes,
            "still reachable" => summary.still_reachable = bytes,
            _ => {}
        }
    }
    Some(summary)
}

/// Extracts one [`LeakRecord`] per loss-record header.
pub fn parse_leaks(report: &str) -> Vec<LeakRecord> {
    LEAK_HEADER
        .captures_iter(report)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let kind = LossKind::from_word(&caps[3])?;
            let (backtrace, allocator_frame) = parse_stack(&report[whole.end()..]);

            let (file, line, function) = match backtrace.last() {
                Some(site) => (site.file.clone(), site.line, site.function.clone()),
                None => ("unknown".to_string(), 0, "unknown".to_string()),
            };

            Some(LeakRecord {
                kind,
                byte_count: parse_count(&caps[1]),
                block_count: parse_count(&caps[2]),
                file,
                line,
                function,
                backtrace,
                allocator_frame,
            })
        })
        .collect()
}

/// Reads the frame lines following a header, up to the next blank line.
///
/// Returns user frames outermost-first plus the first allocator frame text.
fn parse_stack(rest: &str) -> (Vec<StackFrame>, Option<String>) {
    let mut frames = Vec::new();
    let mut allocator_frame = None;
    let mut started = false;

    for line in rest.lines().skip(1) {
        if FRAME_START.is_match(line) {
            started = true;
        } else if started && (line.trim().is_empty() || BLANK_LINE.is_match(line)) {
            break;
        } else if !started {
            continue;
        }

        let Some(caps) = FRAME.captures(line) else {
            continue;
        };
        let function = &caps[1];
        let file = &caps[2];

        if ALLOCATOR_FUNCTIONS.contains(&function) {
            if allocator_frame.is_none() {
                allocator_frame = caps.get(0).map(|m| m.as_str().to_string());
            }
            continue;
        }
        if file.starts_with("/usr/") || file.starts_with("vg_") {
            continue;
        }

        frames.push(StackFrame::new(file, function, caps[3].parse().unwrap_or(0)));
    }

    frames.reverse();
    (frames, allocator_frame)
}

/// Valgrind groups digits with commas (`1,024`).
fn parse_count(text: &str) -> u64 {
    text.replace(',', "").parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
==28== Memcheck, a memory error detector
==28== HEAP SUMMARY:
==28==     in use at exit: 1,098 bytes in 3 blocks
==28==
==28== 24 bytes in 1 blocks are definitely lost in loss record 1 of 3
==28==    at 0x4846828: malloc (vg_replace_malloc.c:442)
==28==    by 0x109196: create_node (list.c:12)
==28==    by 0x1091F0: build (list.c:30)
==28==    by 0x109270: main (list.c:41)
==28==
==28== 1,050 (1,024 direct, 26 indirect) bytes in 1 blocks are definitely lost in loss record 3 of 3
==28==    at 0x4846828: calloc (vg_replace_malloc.c:442)
==28==    by 0x1092A0: main (list.c:45)
==28==
==28== 10 bytes in 2 blocks are possibly lost in loss record 2 of 3
==28==    at 0x4846828: strdup (strdup.c:42)
==28==    by 0x4A1B2C3: helper (/usr/lib/libfoo.c:7)
==28==    by 0x1092C0: main (list.c:50)
==28==
==28== LEAK SUMMARY:
==28==    definitely lost: 1,074 bytes in 2 blocks
==28==    indirectly lost: 26 bytes in 1 blocks
==28==      possibly lost: 10 bytes in 2 blocks
==28==    still reachable: 0 bytes in 0 blocks
";

    #[test]
    fn test_parses_headers_and_backtraces() {
        let report = parse_report(REPORT);
        assert!(report.has_leaks);
        assert_eq!(report.leaks.len(), 3);

        let first = &report.leaks[0];
        assert_eq!(first.kind, LossKind::Definitely);
        assert_eq!(first.byte_count, 24);
        assert_eq!(first.block_count, 1);
        assert_eq!(first.function, "create_node");
        assert_eq!(first.line, 12);
        assert_eq!(
            first
                .backtrace
                .iter()
                .map(|f| f.function.as_str())
                .collect::<Vec<_>>(),
            vec!["main", "build", "create_node"]
        );
        assert_eq!(
            first.allocator_frame.as_deref(),
            Some("at 0x4846828: malloc (vg_replace_malloc.c:442)")
        );
        assert_eq!(first.caller_frame().unwrap().function, "build");
    }

    #[test]
    fn test_direct_indirect_header_and_comma_counts() {
        let report = parse_report(REPORT);
        let second = &report.leaks[1];
        assert_eq!(second.byte_count, 1050);
        assert_eq!(second.function, "main");
        assert!(second.caller_frame().is_none());
    }

    #[test]
    fn test_system_frames_are_filtered() {
        let report = parse_report(REPORT);
        let third = &report.leaks[2];
        assert_eq!(third.kind, LossKind::Possibly);
        assert_eq!(third.block_count, 2);
        assert_eq!(third.backtrace.len(), 1);
        assert_eq!(third.function, "main");
    }

    #[test]
    fn test_summary_totals() {
        let summary = parse_summary(REPORT).unwrap();
        assert_eq!(summary.definitely_lost, 1074);
        assert_eq!(summary.indirectly_lost, 26);
        assert_eq!(summary.possibly_lost, 10);
        assert_eq!(summary.total_leaked(), 1100);
    }

    #[test]
    fn test_clean_run() {
        let report = parse_report(
            "==1== All heap blocks were freed -- no leaks are possible\n",
        );
        assert!(!report.has_leaks);
        assert!(report.leaks.is_empty());
    }

    #[test]
    fn test_header_without_user_frames() {
        let leaks = parse_leaks(
            "==9== 8 bytes in 1 blocks are indirectly lost in loss record 1 of 1\n\
             ==9==    at 0x4846828: malloc (vg_replace_malloc.c:442)\n\
             ==9==\n",
        );
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].kind, LossKind::Indirectly);
        assert_eq!(leaks[0].file, "unknown");
        assert_eq!(leaks[0].line, 0);
    }
}
