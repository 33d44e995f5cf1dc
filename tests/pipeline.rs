// Report parsing through diagnosis, without a debugger

use leakroot::config::AnalysisConfig;
use leakroot::pipeline::{LeakAnalyzer, Strategy};
use leakroot::render::{Renderer, DEFAULT_THEME};
use leakroot::report::{parse_report, LossKind};
use leakroot::tracking::LeakCategory;

const DEMOS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos");

// Paths as a build in another directory would have recorded them.
const PAIR_REPORT: &str = "\
==4242== Memcheck, a memory error detector
==4242== Command: ./pair
==4242==
==4242== HEAP SUMMARY:
==4242==     in use at exit: 5 bytes in 1 blocks
==4242==   total heap usage: 3 allocs, 2 frees, 26 bytes allocated
==4242==
==4242== 5 bytes in 1 blocks are definitely lost in loss record 1 of 1
==4242==    at 0x4846828: malloc (vg_replace_malloc.c:442)
==4242==    by 0x1091E5: pair_new (/build/leakroot/demos/pair.c:19)
==4242==    by 0x109234: main (/build/leakroot/demos/pair.c:28)
==4242==
==4242== LEAK SUMMARY:
==4242==    definitely lost: 5 bytes in 1 blocks
==4242==    indirectly lost: 0 bytes in 0 blocks
==4242==      possibly lost: 0 bytes in 0 blocks
==4242==    still reachable: 0 bytes in 0 blocks
==4242==         suppressed: 0 bytes in 0 blocks
";

const TWO_LEAKS: &str = "\
==77== 128 bytes in 1 blocks are definitely lost in loss record 1 of 2
==77==    at 0x4846828: malloc (vg_replace_malloc.c:442)
==77==    by 0x109161: fill_scratch (scope.c:10)
==77==    by 0x10918A: main (scope.c:16)
==77==
==77== 10 bytes in 1 blocks are definitely lost in loss record 2 of 2
==77==    at 0x4846828: malloc (vg_replace_malloc.c:442)
==77==    by 0x10915E: main (overwrite.c:7)
==77==
==77== LEAK SUMMARY:
==77==    definitely lost: 138 bytes in 2 blocks
==77==    indirectly lost: 0 bytes in 0 blocks
==77==      possibly lost: 0 bytes in 0 blocks
==77==    still reachable: 0 bytes in 0 blocks
";

fn analyzer() -> LeakAnalyzer {
    LeakAnalyzer::new(AnalysisConfig {
        source_root: DEMOS.into(),
        ..AnalysisConfig::static_only()
    })
}

#[test]
fn test_stale_paths_resolved_and_diagnosed() {
    let report = parse_report(PAIR_REPORT);
    assert!(report.has_leaks);
    assert_eq!(report.leaks.len(), 1);
    assert_eq!(report.leaks[0].kind, LossKind::Definitely);

    let analyses = analyzer().analyze_report(&report, None, &[]);
    assert_eq!(analyses.len(), 1);

    let analysis = &analyses[0];
    assert_eq!(analysis.strategy, Some(Strategy::Static));
    assert_eq!(analysis.trace_failure.as_deref(), Some("dynamic tracing disabled"));
    assert_eq!(
        analysis
            .functions
            .iter()
            .map(|f| f.function.as_str())
            .collect::<Vec<_>>(),
        vec!["main", "pair_new"]
    );

    let info = analysis.root_cause.as_ref().unwrap();
    assert_eq!(info.leak_kind, LeakCategory::ContainerFreedFirst);
    assert_eq!(info.line_number, Some(30));
}

#[test]
fn test_leaks_analysed_independently_in_report_order() {
    let report = parse_report(TWO_LEAKS);
    let analyses = analyzer().analyze_report(&report, None, &[]);
    assert_eq!(analyses.len(), 2);

    let first = analyses[0].root_cause.as_ref().unwrap();
    assert_eq!(first.function, "fill_scratch");
    assert_eq!(first.leak_kind, LeakCategory::PointerLost);

    let second = analyses[1].root_cause.as_ref().unwrap();
    assert_eq!(second.function, "main");
    assert_eq!(second.line_number, Some(8));
    // Nothing from the first leak carries over.
    assert_eq!(second.steps[0], "ALLOC: p in main()");
}

#[test]
fn test_json_shape() {
    let report = parse_report(PAIR_REPORT);
    let analyses = analyzer().analyze_report(&report, None, &[]);
    let json = serde_json::to_value(&analyses).unwrap();

    let root_cause = &json[0]["root_cause"];
    assert_eq!(root_cause["leak_kind"], "container_freed_first");
    assert_eq!(root_cause["line"], "free(entry);");
    assert_eq!(root_cause["line_number"], 30);
    assert_eq!(root_cause["function"], "main");
    assert!(root_cause["steps"].is_array());
    assert!(root_cause.get("gdb_trace").is_none());

    assert_eq!(json[0]["strategy"], "static");
    assert_eq!(json[0]["leak"]["kind"], "definitely");
    assert_eq!(json[0]["leak"]["backtrace"][0]["function"], "main");
}

#[test]
fn test_plain_rendering() {
    let report = parse_report(TWO_LEAKS);
    let analyses = analyzer().analyze_report(&report, None, &[]);
    let renderer = Renderer::new(&DEFAULT_THEME, false);

    let mut out = Vec::new();
    renderer.summary(&mut out, &report).unwrap();
    for (i, analysis) in analyses.iter().enumerate() {
        renderer.analysis(&mut out, i + 1, analysis).unwrap();
    }
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("2 leak(s): 138 bytes definitely lost"));
    assert!(text.contains("Leak #1: 128 bytes in 1 block(s) definitely lost"));
    assert!(text.contains("call chain  main() → fill_scratch()"));
    assert!(text.contains("Type 2"));
    assert!(text.contains("overwrite.c:8  p = malloc(20);"));
    assert!(text.contains("ownership (static scan)"));
}

#[test]
fn test_clean_report_has_nothing_to_analyse() {
    let report = parse_report(
        "==5== HEAP SUMMARY:\n==5== All heap blocks were freed -- no leaks are possible\n",
    );
    assert!(!report.has_leaks);
    assert!(analyzer().analyze_report(&report, None, &[]).is_empty());
}
