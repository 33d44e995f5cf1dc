//! Ownership tracking over a recorded execution trace
//!
//! Same four operations as the static tracker, applied to the lines that
//! actually ran. The trace also answers questions the text cannot: which
//! parameters received the pointer, whether a `free()` in some helper hit
//! the tracked address, and whether an assignment really overwrote it.

use rustc_hash::FxHashMap;
use tracing::debug;

use super::ops::{detect, Operation};
use super::path::{root_of, suffix};
use super::root_cause::{LeakCategory, ResponsibleLine, RootCauseInfo};
use super::state::{Release, Step, TrackingEntry, TrackingSet};
use super::statement::{statements, Consumption, Statement};
use crate::trace::{FreeEvent, TraceStep};

/// Walks a trace once, keeping the tracking set and the step log.
pub struct TraceOwnershipReconciler<'a> {
    trace: &'a [TraceStep],
    free_events: &'a [FreeEvent],
    tracking: TrackingSet,
    steps: Vec<String>,
    initialized: bool,
    /// Next free event to match; events are consumed in order.
    next_free: usize,
    /// A `x = x->next` walk moved past the tracked node.
    traversal_cleared: bool,
    prev_function: Option<&'a str>,
    /// Path named by a `return` whose caller has not been reached yet.
    pending_return: Option<String>,
    /// Function each root was last assigned in.
    root_function: FxHashMap<String, String>,
}

impl<'a> TraceOwnershipReconciler<'a> {
    /// Classifies the leak from `trace`, or `None` when the memory was
    /// released (or never allocated) within it.
    pub fn reconcile(trace: &'a [TraceStep], free_events: &'a [FreeEvent]) -> Option<RootCauseInfo> {
        let mut reconciler = Self {
            trace,
            free_events,
            tracking: TrackingSet::new(),
            steps: Vec::new(),
            initialized: false,
            next_free: 0,
            traversal_cleared: false,
            prev_function: None,
            pending_return: None,
            root_function: FxHashMap::default(),
        };
        reconciler.run()
    }

    fn run(&mut self) -> Option<RootCauseInfo> {
        let trace = self.trace;
        let last = trace.last()?;

        for (i, step) in trace.iter().enumerate() {
            if let Some(info) = self.visit(i, step) {
                return Some(info);
            }
            self.prev_function = Some(step.function.as_str());
        }

        if self.tracking.is_empty() && !self.traversal_cleared {
            return None;
        }
        self.log(Step::ProgramEnd);
        debug!(function = %last.function, "trace ended with memory still tracked");
        Some(RootCauseInfo::new(
            LeakCategory::NeverFreed,
            ResponsibleLine::EndOfProgram,
            &last.function,
            &last.file,
            self.steps.clone(),
        ))
    }

    fn visit(&mut self, i: usize, step: &'a TraceStep) -> Option<RootCauseInfo> {
        let func = step.function.as_str();
        let changed = self.prev_function.is_some_and(|prev| prev != func);

        // Back in the caller after `return x;`: this line receives the value.
        if changed {
            if let Some(returned) = self.pending_return.take() {
                self.map_return(&returned, step);
                return None;
            }
        }

        if changed && i > 0 {
            let trace = self.trace;
            if let Some(info) = self.scope_exit(&trace[i - 1]) {
                return Some(info);
            }
        }

        let stmts = statements(&step.code);

        if !self.initialized {
            self.initialize(&stmts, func);
            return None;
        }

        if let Some(params) = &step.param_mapping {
            self.map_params(params, func);
        }

        if self.matches_free_event(step) {
            self.next_free += 1;
            self.log(Step::IndirectFree { function: func });
            self.tracking.clear();
            return None;
        }

        for stmt in &stmts {
            let Some(op) = detect(stmt, &self.tracking) else {
                continue;
            };
            debug!(line = step.line, stmt = %stmt.text(), ?op, function = %func, "trace operation");

            match op {
                Operation::Return { segment, .. } => {
                    self.pending_return = Some(segment);
                    return None;
                }
                Operation::Free { segment, root } => {
                    if let Some(info) = self.free(&segment, &root, step) {
                        return Some(info);
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
                        function: func,
                    });
                    if let Some(target) = self.tracking.alias(&name, &segment, &root) {
                        self.root_function
                            .insert(root_of(&target).to_string(), func.to_string());
                    }
                }
                Operation::Reassign {
                    segment,
                    root,
                    value,
                } => {
                    if let Some(info) = self.reassign(&segment, &root, &value, step) {
                        return Some(info);
                    }
                }
            }
        }
        None
    }

    /// Seeds tracking from the first allocation in the trace. Runs once.
    fn initialize(&mut self, stmts: &[Statement], func: &str) {
        let Some(target) = stmts
            .iter()
            .filter(|stmt| stmt.is_allocation())
            .find_map(|stmt| stmt.assignment().map(|a| a.target))
        else {
            return;
        };

        self.initialized = true;
        let entry = self.tracking.insert(TrackingEntry::new(target, None));
        let root = entry.root().to_string();
        let step = Step::Alloc {
            target: &entry.target,
            function: func,
        }
        .to_string();
        self.steps.push(step);
        self.root_function.insert(root, func.to_string());
    }

    /// Rewrites the returned path to the receiver on the caller's line.
    fn map_return(&mut self, returned: &str, step: &TraceStep) {
        let callee = self.prev_function.unwrap_or_default();
        let caller = step.function.as_str();
        let old_root = root_of(returned).to_string();

        let Some(entry) = self.tracking.get(&old_root) else {
            return;
        };

        let stmts = statements(&step.code);
        let receiver = stmts
            .iter()
            .find_map(|stmt| match stmt.consumption_of(callee) {
                Some(Consumption::Stored(receiver)) => Some(receiver),
                _ => None,
            })
            .or_else(|| stmts.iter().find_map(|stmt| stmt.assignment().map(|a| a.target)));
        let Some(receiver) = receiver else {
            return;
        };

        let old_target = entry.target.clone();
        let rest = suffix(&old_target, returned).unwrap_or("");
        let new_target = format!("{}{}", receiver, rest);

        self.tracking.remove(&old_root);
        self.tracking.insert(TrackingEntry::new(new_target.clone(), None));
        self.log(Step::ReturnStored {
            callee,
            from: &old_target,
            to: &new_target,
            caller,
        });

        for root in self.tracking.roots() {
            let owner = self.root_function.get(root);
            if owner.is_none() || owner.map(String::as_str) == Some(callee) {
                self.root_function.insert(root.to_string(), caller.to_string());
            }
        }
    }

    /// A function exited through its closing brace without returning the
    /// tracked value: roots assigned inside it are gone.
    fn scope_exit(&mut self, previous: &TraceStep) -> Option<RootCauseInfo> {
        if self.tracking.is_empty() || previous.code.trim() != "}" {
            return None;
        }
        let exited = self.prev_function?;

        let lost = self
            .tracking
            .roots()
            .find(|root| self.root_function.get(*root).map(String::as_str) == Some(exited))?
            .to_string();

        self.log(Step::ScopeExit {
            root: &lost,
            function: exited,
        });
        debug!(root = %lost, function = %exited, "scope exit");
        let info = RootCauseInfo::new(
            LeakCategory::PointerLost,
            ResponsibleLine::ClosingBrace,
            exited,
            &previous.file,
            self.steps.clone(),
        );
        Some(info.at_line(previous.line))
    }

    /// Aliases each parameter that received the tracked address.
    fn map_params(&mut self, params: &[String], func: &str) {
        for param in params {
            if self.tracking.contains_root(param) {
                continue;
            }
            let Some(source) = self.tracking.first() else {
                return;
            };
            let from = source.target.clone();
            let rest = &from[source.root().len()..];
            let target = format!("{}{}", param, rest);

            self.tracking
                .insert(TrackingEntry::new(target.clone(), Some(from.clone())));
            self.root_function.insert(param.clone(), func.to_string());
            self.log(Step::Param {
                from: &from,
                to: &target,
                function: func,
            });
        }
    }

    fn matches_free_event(&self, step: &TraceStep) -> bool {
        self.free_events
            .get(self.next_free)
            .is_some_and(|event| event.caller_function == step.function && event.caller_line == step.line)
    }

    fn free(&mut self, segment: &str, root: &str, step: &TraceStep) -> Option<RootCauseInfo> {
        let exact_index = self
            .tracking
            .get(root)
            .is_some_and(|entry| segment.contains('[') && entry.target == segment);
        // Which iteration freed which slot is unknown; keep tracking so a
        // later container free is still caught.
        if exact_index {
            return None;
        }

        self.log(Step::Free {
            segment,
            function: &step.function,
        });
        let kind = match self.tracking.release(root, segment) {
            Release::ContainerFirst => LeakCategory::ContainerFreedFirst,
            Release::Emptied => LeakCategory::NeverFreed,
            Release::Remaining | Release::Released => return None,
        };
        Some(self.classify_at(kind, step))
    }

    fn reassign(
        &mut self,
        segment: &str,
        root: &str,
        value: &str,
        step: &TraceStep,
    ) -> Option<RootCauseInfo> {
        let func = step.function.as_str();

        // `x = x->next`: the cursor moved along the structure.
        if value.starts_with(&format!("{}->", segment)) {
            let target = self.tracking.get(root)?.target.clone();
            match suffix(&target, value) {
                Some(rest) => {
                    let moved = format!("{}{}", segment, rest);
                    self.tracking.retarget(root, &moved);
                    self.log(Step::Traverse {
                        from: &target,
                        to: &moved,
                        function: func,
                    });
                }
                None => {
                    self.log(Step::TraversePast { function: func });
                    self.tracking.remove(root);
                    self.traversal_cleared = true;
                }
            }
            return None;
        }

        // The tracked address survived this line (another loop slot).
        if step.addr_intact == Some(true) {
            return None;
        }

        self.log(Step::Reassign {
            segment,
            function: func,
        });
        self.tracking.remove(root);
        if self.tracking.is_empty() {
            return Some(self.classify_at(LeakCategory::PointerLost, step));
        }
        None
    }

    fn classify_at(&self, kind: LeakCategory, step: &TraceStep) -> RootCauseInfo {
        debug!(%kind, function = %step.function, line = step.line, "trace classification");
        RootCauseInfo::new(
            kind,
            ResponsibleLine::Code(step.code.trim().to_string()),
            &step.function,
            &step.file,
            self.steps.clone(),
        )
        .at_line(step.line)
    }

    fn log(&mut self, step: Step<'_>) {
        self.steps.push(step.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(line: usize, function: &str, code: &str) -> TraceStep {
        TraceStep::new("prog.c", line, function, code)
    }

    #[test]
    fn test_alias_round_trip_is_released() {
        let trace = [
            step(3, "main", "a = malloc(8);"),
            step(4, "main", "b = a;"),
            step(5, "main", "free(b);"),
            step(6, "main", "return 0;"),
            step(7, "main", "}"),
        ];
        let frees = [FreeEvent::new("prog.c", 5, "main")];
        assert!(TraceOwnershipReconciler::reconcile(&trace, &frees).is_none());
    }

    #[test]
    fn test_never_freed_at_end_of_trace() {
        let trace = [
            step(3, "main", "p = malloc(40);"),
            step(4, "main", "printf(\"%p\\n\", p);"),
            step(5, "main", "return 0;"),
            step(6, "main", "}"),
        ];
        let info = TraceOwnershipReconciler::reconcile(&trace, &[]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::NeverFreed);
        assert_eq!(info.line, ResponsibleLine::EndOfProgram);
        assert_eq!(info.function, "main");
        assert_eq!(info.steps.last().unwrap(), "END: program finishes with unreleased memory");
    }

    #[test]
    fn test_loop_assignment_suppressed_by_intact_address() {
        let alloc = "for (i = 0; i < n; i++) arr[i] = malloc(8);";
        let trace = [
            step(5, "main", alloc),
            step(5, "main", alloc).intact(true),
            step(5, "main", alloc).intact(true),
            step(6, "main", "free(arr[2]);"),
            step(7, "main", "return 0;"),
        ];
        let frees = [FreeEvent::new("prog.c", 6, "main")];
        assert!(TraceOwnershipReconciler::reconcile(&trace, &frees).is_none());
    }

    #[test]
    fn test_reassignment_without_intact_flag_loses_pointer() {
        let trace = [
            step(2, "main", "char *p = malloc(10);"),
            step(3, "main", "p = malloc(20);").intact(false),
            step(4, "main", "free(p);"),
        ];
        let info = TraceOwnershipReconciler::reconcile(&trace, &[]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::PointerLost);
        assert_eq!(info.line, ResponsibleLine::Code("p = malloc(20);".to_string()));
        assert_eq!(info.line_number, Some(3));
    }

    #[test]
    fn test_indexed_free_is_not_trusted_container_free_is() {
        let trace = [
            step(5, "fill", "arr[i] = malloc(8);"),
            step(6, "fill", "free(arr[i]);"),
            step(7, "fill", "free(arr);"),
        ];
        let info = TraceOwnershipReconciler::reconcile(&trace, &[]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::ContainerFreedFirst);
        assert_eq!(info.line_number, Some(7));
    }

    #[test]
    fn test_return_maps_to_receiver() {
        let trace = [
            step(2, "create", "Node *n = malloc(sizeof(Node));"),
            step(3, "create", "return n;"),
            step(10, "caller", "head->next = create();"),
            step(11, "caller", "free(head);"),
        ];
        let info = TraceOwnershipReconciler::reconcile(&trace, &[]).unwrap();
        assert!(info
            .steps
            .contains(&"RETURN: create() returns n, stored in head->next in caller()".to_string()));
        assert_eq!(info.leak_kind, LeakCategory::ContainerFreedFirst);
        assert_eq!(info.function, "caller");
    }

    #[test]
    fn test_scope_exit_loses_local() {
        let trace = [
            step(11, "main", "helper();"),
            step(3, "helper", "char *tmp = malloc(16);"),
            step(4, "helper", "use(tmp);"),
            step(5, "helper", "}"),
            step(12, "main", "return 0;"),
        ];
        let info = TraceOwnershipReconciler::reconcile(&trace, &[]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::PointerLost);
        assert_eq!(info.line, ResponsibleLine::ClosingBrace);
        assert_eq!(info.line_number, Some(5));
        assert_eq!(info.function, "helper");
        assert_eq!(info.steps.last().unwrap(), "SCOPE_EXIT: tmp lost at end of helper()");
    }

    #[test]
    fn test_param_mapping_follows_argument() {
        let trace = [
            step(10, "main", "char *buf = malloc(32);"),
            step(11, "main", "release(buf);"),
            step(3, "release", "free(ptr);").with_params(["ptr"]),
            step(4, "release", "}"),
            step(12, "main", "return 0;"),
        ];
        // `ptr` is an alias of `buf`: freeing it releases both.
        assert!(TraceOwnershipReconciler::reconcile(&trace, &[]).is_none());
    }

    #[test]
    fn test_param_alias_lost_at_callee_exit() {
        let trace = [
            step(10, "main", "char *buf = malloc(32);"),
            step(11, "main", "show(buf);"),
            step(3, "show", "puts(ptr);").with_params(["ptr"]),
            step(4, "show", "}"),
            step(12, "main", "return 0;"),
        ];
        let info = TraceOwnershipReconciler::reconcile(&trace, &[]).unwrap();
        assert!(info
            .steps
            .contains(&"PARAM: buf passed as ptr to show()".to_string()));
        assert_eq!(info.leak_kind, LeakCategory::PointerLost);
        assert_eq!(info.line, ResponsibleLine::ClosingBrace);
        assert_eq!(info.function, "show");
    }

    #[test]
    fn test_indirect_free_through_helper() {
        let trace = [
            step(10, "main", "char *buf = malloc(32);"),
            step(11, "main", "cleanup(buf);"),
            step(20, "cleanup", "destroy(x);"),
            step(21, "cleanup", "}"),
            step(12, "main", "return 0;"),
        ];
        let frees = [FreeEvent::new("prog.c", 11, "main")];
        assert!(TraceOwnershipReconciler::reconcile(&trace, &frees).is_none());
    }

    #[test]
    fn test_traversal_compresses_path() {
        let trace = [
            step(4, "main", "head->next->data = malloc(4);"),
            step(5, "main", "Node *cur = head;"),
            step(6, "main", "cur = cur->next;"),
            step(7, "main", "free(cur);"),
        ];
        let info = TraceOwnershipReconciler::reconcile(&trace, &[]).unwrap();
        assert!(info
            .steps
            .contains(&"TRAVERSE: cur->next->data -> cur->data in main()".to_string()));
        assert_eq!(info.leak_kind, LeakCategory::ContainerFreedFirst);
    }

    #[test]
    fn test_traversal_past_node_ends_as_never_freed() {
        // Open behaviour kept as is: once the cursor walks past the tracked
        // node the trace only ends in a classification at its end.
        let trace = [
            step(4, "main", "cur->data = malloc(4);"),
            step(5, "main", "cur = cur->next;"),
            step(6, "main", "return 0;"),
            step(7, "main", "}"),
        ];
        let info = TraceOwnershipReconciler::reconcile(&trace, &[]).unwrap();
        assert_eq!(info.leak_kind, LeakCategory::NeverFreed);
        assert_eq!(info.line, ResponsibleLine::EndOfProgram);
        assert!(info
            .steps
            .contains(&"TRAVERSE: iterator moved past tracked memory in main()".to_string()));
    }

    #[test]
    fn test_initializes_only_once() {
        let trace = [
            step(3, "main", "p = malloc(1);"),
            step(4, "main", "work(p);"),
            step(5, "main", "q = malloc(2);"),
            step(6, "main", "return 0;"),
        ];
        let frees = [FreeEvent::new("prog.c", 4, "main")];
        assert!(TraceOwnershipReconciler::reconcile(&trace, &frees).is_none());
    }

    #[test]
    fn test_empty_trace() {
        assert!(TraceOwnershipReconciler::reconcile(&[], &[]).is_none());
    }
}
