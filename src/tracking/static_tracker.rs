//! Static ownership tracking over extracted source
//!
//! Replays an allocation's lifetime by reading source lines in file order,
//! starting at the reported allocation line and following returns outward
//! through the callers. Branches and loops are not modelled: a `free()`
//! that is present in the text but never executed can still end the scan.

use tracing::debug;

use super::ops::{detect, Operation};
use super::path::suffix;
use super::root_cause::{LeakCategory, ResponsibleLine, RootCauseInfo};
use super::state::{Release, Step, TrackingEntry, TrackingSet};
use super::statement::{statements, Consumption};
use crate::source::ExtractedFunction;

/// Where scanning resumes inside a function.
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    line: usize,
    /// Statements of `line` already consumed.
    skip: usize,
}

/// Outcome of scanning one function.
enum Scan {
    Classified(RootCauseInfo),
    Returned { segment: String, root: String },
    /// Freed through an alias with nothing else tracked.
    Released,
    Exhausted,
}

/// Outcome of handing a returned value to the callers.
enum Handoff {
    Resume { function: usize, cursor: Cursor },
    Done(Option<RootCauseInfo>),
}

/// Scanner state for one leak: the tracking set and the step log.
pub struct StaticOwnershipTracker<'a> {
    functions: &'a [ExtractedFunction],
    tracking: TrackingSet,
    steps: Vec<String>,
}

impl<'a> StaticOwnershipTracker<'a> {
    /// Classifies the leak whose allocation is the first reported line of
    /// `functions[0]`.
    ///
    /// `functions` runs from the allocating function out to `main`. Returns
    /// `None` when the allocation statement cannot be found or the tracked
    /// value leaves the scanned code.
    pub fn analyze(functions: &'a [ExtractedFunction]) -> Option<RootCauseInfo> {
        let mut tracker = Self {
            functions,
            tracking: TrackingSet::new(),
            steps: Vec::new(),
        };
        let cursor = tracker.initialize()?;
        tracker.run(cursor)
    }

    fn initialize(&mut self) -> Option<Cursor> {
        let functions = self.functions;
        let first = functions.first()?;
        let lines = first.lines_from_reported();
        let (_, text) = lines.first()?;

        let stmts = statements(text);
        let (index, target) = stmts.iter().enumerate().find_map(|(i, stmt)| {
            if !stmt.is_allocation() {
                return None;
            }
            stmt.assignment().map(|a| (i, a.target))
        })?;

        let entry = self.tracking.insert(TrackingEntry::new(target, None));
        let step = Step::Alloc {
            target: &entry.target,
            function: &first.function,
        }
        .to_string();
        self.steps.push(step);

        Some(Cursor {
            line: 0,
            skip: index + 1,
        })
    }

    fn run(&mut self, mut cursor: Cursor) -> Option<RootCauseInfo> {
        let functions = self.functions;
        let mut index = 0;

        loop {
            let func = &functions[index];
            match self.scan(func, cursor) {
                Scan::Classified(info) => return Some(info),
                Scan::Returned { segment, root } => {
                    match self.hand_off(index, &segment, &root) {
                        Handoff::Resume {
                            function,
                            cursor: next,
                        } => {
                            index = function;
                            cursor = next;
                        }
                        Handoff::Done(result) => return result,
                    }
                }
                Scan::Released => {
                    debug!(function = %func.function, "released through an alias");
                    return None;
                }
                Scan::Exhausted => return self.exhausted(index),
            }
        }
    }

    fn scan(&mut self, func: &ExtractedFunction, cursor: Cursor) -> Scan {
        let lines = func.lines_from_reported();

        for (i, (number, text)) in lines.iter().enumerate().skip(cursor.line) {
            let skip = if i == cursor.line { cursor.skip } else { 0 };

            for stmt in statements(text).iter().skip(skip) {
                let Some(op) = detect(stmt, &self.tracking) else {
                    continue;
                };
                debug!(line = number, stmt = %stmt.text(), ?op, function = %func.function, "static operation");

                let function = func.function.as_str();
                let code = || ResponsibleLine::Code(text.trim().to_string());

                match op {
                    Operation::Free { segment, root } => {
                        self.log(Step::Free {
                            segment: &segment,
                            function,
                        });
                        let kind = match self.tracking.release(&root, &segment) {
                            Release::ContainerFirst => LeakCategory::ContainerFreedFirst,
                            Release::Emptied => LeakCategory::NeverFreed,
                            Release::Remaining => continue,
                            Release::Released if self.tracking.is_empty() => {
                                return Scan::Released;
                            }
                            Release::Released => continue,
                        };
                        return Scan::Classified(self.conclude(kind, code(), func).at_line(*number));
                    }
                    Operation::Return { segment, root } => {
                        return Scan::Returned { segment, root };
                    }
                    Operation::Reassign { segment, root, .. } => {
                        self.log(Step::Reassign {
                            segment: &segment,
                            function,
                        });
                        self.tracking.remove(&root);
                        if self.tracking.is_empty() {
                            let info = self.conclude(LeakCategory::PointerLost, code(), func);
                            return Scan::Classified(info.at_line(*number));
                        }
                    }
                    Operation::Alias {
                        segment,
                        root,
                        name,
                    } => {
                        self.log(Step::Alias {
                            name: &name,
                            segment: &segment,
                            function,
                        });
                        self.tracking.alias(&name, &segment, &root);
                    }
                }
            }
        }

        Scan::Exhausted
    }

    /// Moves a returned path into the caller that receives it.
    fn hand_off(&mut self, from: usize, segment: &str, root: &str) -> Handoff {
        let Some(entry) = self.tracking.remove(root) else {
            return Handoff::Done(None);
        };
        let rest = suffix(&entry.target, segment).unwrap_or("").to_string();
        let old_target = entry.target;
        let functions = self.functions;
        let mut callee = from;

        loop {
            let index = callee + 1;
            let callee_name = functions[callee].function.as_str();

            let Some(caller) = functions.get(index) else {
                // Returned out of the outermost frame we have.
                self.log(Step::ProgramEnd);
                let info = self.conclude(
                    LeakCategory::NeverFreed,
                    ResponsibleLine::EndOfProgram,
                    &functions[callee],
                );
                return Handoff::Done(Some(info));
            };

            let lines = caller.lines_from_reported();
            let Some((number, text)) = lines.first().map(|(n, t)| (*n, t.as_str())) else {
                return Handoff::Done(None);
            };

            let stmts = statements(text);
            let found = stmts
                .iter()
                .enumerate()
                .find_map(|(i, stmt)| stmt.consumption_of(callee_name).map(|c| (i, c)));

            // A call split over several lines: fall back to the first
            // assignment on the reported line.
            let found = found.or_else(|| {
                stmts.iter().enumerate().find_map(|(i, stmt)| {
                    stmt.assignment().map(|a| (i, Consumption::Stored(a.target)))
                })
            });

            match found {
                Some((i, Consumption::Stored(receiver))) => {
                    let new_target = format!("{}{}", receiver, rest);
                    self.log(Step::Return {
                        from: &old_target,
                        to: &new_target,
                        caller: &caller.function,
                    });
                    self.tracking.insert(TrackingEntry::new(new_target, None));
                    return Handoff::Resume {
                        function: index,
                        cursor: Cursor { line: 0, skip: i + 1 },
                    };
                }
                Some((_, Consumption::Forwarded)) => {
                    self.log(Step::ReturnForwarded {
                        target: &old_target,
                        caller: &caller.function,
                    });
                    callee = index;
                }
                Some((i, Consumption::Discarded)) => {
                    self.log(Step::ReturnDiscarded {
                        callee: callee_name,
                        caller: &caller.function,
                    });
                    if self.tracking.is_empty() {
                        let line = ResponsibleLine::Code(text.trim().to_string());
                        let info = self.conclude(LeakCategory::PointerLost, line, caller);
                        return Handoff::Done(Some(info.at_line(number)));
                    }
                    return Handoff::Resume {
                        function: index,
                        cursor: Cursor { line: 0, skip: i + 1 },
                    };
                }
                Some((i, Consumption::Escaped)) => {
                    self.log(Step::ReturnEscaped {
                        target: &old_target,
                        caller: &caller.function,
                    });
                    if self.tracking.is_empty() {
                        return Handoff::Done(None);
                    }
                    return Handoff::Resume {
                        function: index,
                        cursor: Cursor { line: 0, skip: i + 1 },
                    };
                }
                None => {
                    self.log(Step::ReturnEscaped {
                        target: &old_target,
                        caller: &caller.function,
                    });
                    if self.tracking.is_empty() {
                        return Handoff::Done(None);
                    }
                    return Handoff::Resume {
                        function: index,
                        cursor: Cursor { line: 1, skip: 0 },
                    };
                }
            }
        }
    }

    /// A function ran out of lines with memory still tracked.
    fn exhausted(&mut self, index: usize) -> Option<RootCauseInfo> {
        if self.tracking.is_empty() {
            return None;
        }
        let functions = self.functions;
        let func = &functions[index];

        if index + 1 >= functions.len() {
            self.log(Step::ProgramEnd);
            return Some(self.conclude(
                LeakCategory::NeverFreed,
                ResponsibleLine::EndOfProgram,
                func,
            ));
        }

        self.log(Step::FunctionEnd {
            function: &func.function,
        });
        let info = self.conclude(
            LeakCategory::PointerLost,
            ResponsibleLine::ClosingBrace,
            func,
        );
        Some(info.at_line(func.end_line()))
    }

    fn log(&mut self, step: Step<'_>) {
        self.steps.push(step.to_string());
    }

    fn conclude(
        &self,
        kind: LeakCategory,
        line: ResponsibleLine,
        func: &ExtractedFunction,
    ) -> RootCauseInfo {
        debug!(%kind, function = %func.function, "static classification");
        RootCauseInfo::new(kind, line, &func.function, &func.file, self.steps.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A function whose reported line is the first line of `body`.
    fn function(name: &str, start: usize, body: &str) -> ExtractedFunction {
        ExtractedFunction::new("prog.c", name, start, start, body)
    }

    #[test]
    fn test_never_freed_at_end_of_program() {
        let main = function(
            "main",
            3,
            "    p = malloc(40);\n    printf(\"%p\\n\", p);\n    return 0;\n}",
        );
        let info = StaticOwnershipTracker::analyze(&[main]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::NeverFreed);
        assert_eq!(info.line, ResponsibleLine::EndOfProgram);
        assert_eq!(info.function, "main");
        assert_eq!(info.file, "prog.c");
        assert_eq!(info.steps[0], "ALLOC: p in main()");
        assert_eq!(info.steps.last().unwrap(), "END: program finishes with unreleased memory");
    }

    #[test]
    fn test_pointer_lost_on_reassignment() {
        let main = function(
            "main",
            2,
            "    char *p = malloc(10);\n    p = malloc(20);\n    free(p);\n    return 0;\n}",
        );
        let info = StaticOwnershipTracker::analyze(&[main]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::PointerLost);
        assert_eq!(info.line, ResponsibleLine::Code("p = malloc(20);".to_string()));
        assert_eq!(info.line_number, Some(3));
        assert_eq!(info.steps, vec!["ALLOC: p in main()", "REASSIGN: p in main()"]);
    }

    #[test]
    fn test_container_freed_first() {
        let main = function(
            "main",
            5,
            "    obj->buf = malloc(64);\n    free(obj);\n    return 0;\n}",
        );
        let info = StaticOwnershipTracker::analyze(&[main]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::ContainerFreedFirst);
        assert_eq!(info.line, ResponsibleLine::Code("free(obj);".to_string()));
        assert_eq!(info.line_number, Some(6));
    }

    #[test]
    fn test_free_inside_block_comment_is_ignored() {
        let main = function(
            "main",
            2,
            "    obj->buf = malloc(64);\n    /*\n     * free(obj) here would orphan buf\n     */\n    return 0;\n}",
        );
        let info = StaticOwnershipTracker::analyze(&[main]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::NeverFreed);
        assert_eq!(info.line, ResponsibleLine::EndOfProgram);
    }

    #[test]
    fn test_direct_free_emptying_the_set_is_never_freed() {
        // Documented quirk: a textual free of the only path still yields a
        // classification, since the leak report proves it never executed.
        let main = function(
            "main",
            1,
            "    char *p = malloc(8);\n    if (rare) free(p);\n    return 0;\n}",
        );
        let info = StaticOwnershipTracker::analyze(&[main]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::NeverFreed);
        assert_eq!(info.line, ResponsibleLine::Code("if (rare) free(p);".to_string()));
    }

    #[test]
    fn test_free_through_alias_releases_the_block() {
        let main = function(
            "main",
            1,
            "    a = malloc(8);\n    b = a;\n    free(b);\n    return 0;\n}",
        );
        assert!(StaticOwnershipTracker::analyze(&[main]).is_none());
    }

    #[test]
    fn test_free_of_member_alias_releases_the_block() {
        let main = function(
            "main",
            1,
            "    obj->buf = malloc(8);\n    b = obj->buf;\n    free(b);\n    free(obj);\n}",
        );
        // `b` and `obj` form one alias group; `free(b)` drops both.
        assert!(StaticOwnershipTracker::analyze(&[main]).is_none());
    }

    #[test]
    fn test_return_substitution_into_caller() {
        let create = function(
            "create",
            2,
            "    Node *n = malloc(sizeof(Node));\n    return n;\n}",
        );
        let caller = function(
            "caller",
            10,
            "    head->next = create();\n    free(head);\n}",
        );
        let info = StaticOwnershipTracker::analyze(&[create, caller]).unwrap();
        assert!(info
            .steps
            .contains(&"RETURN: n -> head->next in caller()".to_string()));
        assert_eq!(info.leak_kind, LeakCategory::ContainerFreedFirst);
        assert_eq!(info.function, "caller");
        assert_eq!(info.line_number, Some(11));
    }

    #[test]
    fn test_return_keeps_member_suffix() {
        let make = function(
            "make",
            1,
            "    n->data = malloc(8);\n    return n;\n}",
        );
        let main = function("main", 20, "    list = make();\n    return 0;\n}");
        let info = StaticOwnershipTracker::analyze(&[make, main]).unwrap();
        assert_eq!(info.steps[1], "RETURN: n->data -> list->data in main()");
        assert_eq!(info.leak_kind, LeakCategory::NeverFreed);
    }

    #[test]
    fn test_discarded_return_value_is_lost_at_call() {
        let make = function("make", 1, "    char *s = strdup(x);\n    return s;\n}");
        let main = function("main", 9, "    make();\n    return 0;\n}");
        let info = StaticOwnershipTracker::analyze(&[make, main]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::PointerLost);
        assert_eq!(info.line, ResponsibleLine::Code("make();".to_string()));
        assert_eq!(info.line_number, Some(9));
    }

    #[test]
    fn test_forwarded_return_reaches_outer_caller() {
        let inner = function("inner", 1, "    p = malloc(4);\n    return p;\n}");
        let outer = function("outer", 5, "    return inner();\n}");
        let main = function("main", 9, "    q = outer();\n    free(q);\n}");
        let info = StaticOwnershipTracker::analyze(&[inner, outer, main]).unwrap();
        assert_eq!(info.function, "main");
        assert_eq!(info.line, ResponsibleLine::Code("free(q);".to_string()));
        assert!(info
            .steps
            .contains(&"RETURN: p returned again by outer()".to_string()));
    }

    #[test]
    fn test_local_lost_at_closing_brace() {
        let helper = function(
            "helper",
            3,
            "    char *tmp = malloc(16);\n    use(tmp);\n}",
        );
        let main = function("main", 12, "    helper();\n    return 0;\n}");
        let info = StaticOwnershipTracker::analyze(&[helper, main]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::PointerLost);
        assert_eq!(info.line, ResponsibleLine::ClosingBrace);
        assert_eq!(info.line_number, Some(5));
        assert_eq!(info.function, "helper");
        assert_eq!(info.steps.last().unwrap(), "END: helper() exits with unreleased memory");
    }

    #[test]
    fn test_statements_after_allocation_on_same_line() {
        let main = function("main", 1, "    p = malloc(1); p = NULL;\n}");
        let info = StaticOwnershipTracker::analyze(&[main]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::PointerLost);
        assert_eq!(info.line_number, Some(1));
    }

    #[test]
    fn test_missing_allocation_yields_none() {
        let main = function("main", 1, "    int x = 3;\n}");
        assert!(StaticOwnershipTracker::analyze(&[main]).is_none());
        assert!(StaticOwnershipTracker::analyze(&[]).is_none());
    }

    #[test]
    fn test_deterministic() {
        let funcs = [function(
            "main",
            1,
            "    a = malloc(8);\n    b = a;\n    a = NULL;\n    b = NULL;\n}",
        )];
        let first = StaticOwnershipTracker::analyze(&funcs);
        let second = StaticOwnershipTracker::analyze(&funcs);
        assert_eq!(first, second);
        assert_eq!(first.unwrap().line, ResponsibleLine::Code("b = NULL;".to_string()));
    }
}
