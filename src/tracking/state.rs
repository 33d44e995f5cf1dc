//! Ownership-tracking state shared by both trackers

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::path::{build_segments, extends_past, root_of, suffix};

/// One live path to the tracked allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub target: String,
    /// Structural prefixes of `target`, shortest first.
    pub segments: Vec<String>,
    /// Path this entry was aliased from, if any.
    pub origin: Option<String>,
}

impl TrackingEntry {
    pub fn new(target: impl Into<String>, origin: Option<String>) -> Self {
        let target = target.into();
        Self {
            segments: build_segments(&target),
            target,
            origin,
        }
    }

    pub fn root(&self) -> &str {
        root_of(&self.target)
    }
}

/// Result of applying a `free()` to one tracked entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The freed pointer holds the tracked path (`free(obj)` tracking `obj->buf`).
    ContainerFirst,
    /// The entry was dropped and no other path remains.
    Emptied,
    /// The entry was dropped; other aliases are still live.
    Remaining,
    /// Freed through one of several aliases: the whole alias group was
    /// dropped.
    Released,
}

/// Root variable → entry, in insertion order.
///
/// A segment index maps every segment of every entry back to its root, so
/// a sub-expression can be tested against all live paths with one lookup.
/// When two entries share a segment, the one inserted last wins.
#[derive(Debug, Default, Clone)]
pub struct TrackingSet {
    entries: FxHashMap<String, TrackingEntry>,
    order: Vec<String>,
    index: FxHashMap<String, String>,
}

impl TrackingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_root(&self, root: &str) -> bool {
        self.entries.contains_key(root)
    }

    pub fn get(&self, root: &str) -> Option<&TrackingEntry> {
        self.entries.get(root)
    }

    /// Roots in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn first(&self) -> Option<&TrackingEntry> {
        self.order.first().and_then(|root| self.entries.get(root))
    }

    /// Root owning `segment`, if the segment is tracked.
    pub fn lookup(&self, segment: &str) -> Option<(&str, &TrackingEntry)> {
        let root = self.index.get(segment)?;
        let entry = self.entries.get(root)?;
        Some((root.as_str(), entry))
    }

    /// Adds or replaces the entry keyed by its root.
    ///
    /// A replaced root keeps its original position.
    pub fn insert(&mut self, entry: TrackingEntry) -> &TrackingEntry {
        let root = entry.root().to_string();
        if !self.entries.contains_key(&root) {
            self.order.push(root.clone());
        }
        self.entries.insert(root.clone(), entry);
        self.reindex();
        &self.entries[&root]
    }

    pub fn remove(&mut self, root: &str) -> Option<TrackingEntry> {
        let entry = self.entries.remove(root)?;
        self.order.retain(|r| r != root);
        self.reindex();
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.index.clear();
    }

    /// Points an existing root at a new path (structure traversal).
    pub fn retarget(&mut self, root: &str, target: &str) {
        if let Some(entry) = self.entries.get_mut(root) {
            entry.target = target.to_string();
            entry.segments = build_segments(target);
            self.reindex();
        }
    }

    /// Applies `free(segment)` to the entry rooted at `root`.
    pub fn release(&mut self, root: &str, segment: &str) -> Release {
        let container = self
            .entries
            .get(root)
            .is_some_and(|entry| extends_past(&entry.target, segment));
        if container {
            return Release::ContainerFirst;
        }

        let group = self.alias_group(root);
        if group.len() > 1 {
            for member in &group {
                self.remove(member);
            }
            return Release::Released;
        }

        self.remove(root);
        if self.is_empty() {
            Release::Emptied
        } else {
            Release::Remaining
        }
    }

    /// `root` plus every root linked to it through alias origins.
    fn alias_group(&self, root: &str) -> Vec<String> {
        let mut group = vec![root.to_string()];
        let mut i = 0;
        while i < group.len() {
            let origin_root = self
                .entries
                .get(&group[i])
                .and_then(|entry| entry.origin.as_deref())
                .map(root_of)
                .map(str::to_string);
            for other in &self.order {
                if group.contains(other) {
                    continue;
                }
                let from_current = self
                    .entries
                    .get(other)
                    .and_then(|entry| entry.origin.as_deref())
                    .is_some_and(|origin| root_of(origin) == group[i]);
                if from_current || origin_root.as_deref() == Some(other.as_str()) {
                    group.push(other.clone());
                }
            }
            i += 1;
        }
        group
    }

    /// Adds `new_name` as another path to the memory reached via `segment`.
    ///
    /// The new target keeps whatever the source entry's target adds past
    /// `segment`: aliasing `second = head->next` while tracking
    /// `head->next->data` yields `second->data`.
    pub fn alias(&mut self, new_name: &str, segment: &str, root: &str) -> Option<String> {
        let source = self.entries.get(root)?;
        let rest = suffix(&source.target, segment).unwrap_or("");
        let target = format!("{}{}", new_name, rest);
        self.insert(TrackingEntry::new(target.clone(), Some(segment.to_string())));
        Some(target)
    }

    fn reindex(&mut self) {
        self.index.clear();
        for root in &self.order {
            if let Some(entry) = self.entries.get(root) {
                for segment in &entry.segments {
                    self.index.insert(segment.clone(), root.clone());
                }
            }
        }
    }
}

/// One ownership transition, rendered into the step log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<'a> {
    Alloc { target: &'a str, function: &'a str },
    Free { segment: &'a str, function: &'a str },
    IndirectFree { function: &'a str },
    Alias { name: &'a str, segment: &'a str, function: &'a str },
    Reassign { segment: &'a str, function: &'a str },
    Return { from: &'a str, to: &'a str, caller: &'a str },
    ReturnStored { callee: &'a str, from: &'a str, to: &'a str, caller: &'a str },
    ReturnForwarded { target: &'a str, caller: &'a str },
    ReturnDiscarded { callee: &'a str, caller: &'a str },
    ReturnEscaped { target: &'a str, caller: &'a str },
    Param { from: &'a str, to: &'a str, function: &'a str },
    Traverse { from: &'a str, to: &'a str, function: &'a str },
    TraversePast { function: &'a str },
    ScopeExit { root: &'a str, function: &'a str },
    FunctionEnd { function: &'a str },
    ProgramEnd,
}

impl fmt::Display for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Alloc { target, function } => write!(f, "ALLOC: {} in {}()", target, function),
            Step::Free { segment, function } => write!(f, "FREE: {} in {}()", segment, function),
            Step::IndirectFree { function } => write!(f, "FREE (indirect): in {}()", function),
            Step::Alias {
                name,
                segment,
                function,
            } => write!(f, "ALIAS: {} = {} in {}()", name, segment, function),
            Step::Reassign { segment, function } => {
                write!(f, "REASSIGN: {} in {}()", segment, function)
            }
            Step::Return { from, to, caller } => {
                write!(f, "RETURN: {} -> {} in {}()", from, to, caller)
            }
            Step::ReturnStored {
                callee,
                from,
                to,
                caller,
            } => write!(
                f,
                "RETURN: {}() returns {}, stored in {} in {}()",
                callee, from, to, caller
            ),
            Step::ReturnForwarded { target, caller } => {
                write!(f, "RETURN: {} returned again by {}()", target, caller)
            }
            Step::ReturnDiscarded { callee, caller } => {
                write!(f, "RETURN: {}() result discarded in {}()", callee, caller)
            }
            Step::ReturnEscaped { target, caller } => {
                write!(f, "RETURN: {} passed on untracked in {}()", target, caller)
            }
            Step::Param { from, to, function } => {
                write!(f, "PARAM: {} passed as {} to {}()", from, to, function)
            }
            Step::Traverse { from, to, function } => {
                write!(f, "TRAVERSE: {} -> {} in {}()", from, to, function)
            }
            Step::TraversePast { function } => write!(
                f,
                "TRAVERSE: iterator moved past tracked memory in {}()",
                function
            ),
            Step::ScopeExit { root, function } => {
                write!(f, "SCOPE_EXIT: {} lost at end of {}()", root, function)
            }
            Step::FunctionEnd { function } => {
                write!(f, "END: {}() exits with unreleased memory", function)
            }
            Step::ProgramEnd => write!(f, "END: program finishes with unreleased memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_segments_and_root() {
        let entry = TrackingEntry::new("head->next->data", None);
        assert_eq!(entry.root(), "head");
        assert_eq!(entry.segments, build_segments("head->next->data"));
    }

    #[test]
    fn test_lookup_by_any_segment() {
        let mut set = TrackingSet::new();
        set.insert(TrackingEntry::new("head->next", None));
        let (root, entry) = set.lookup("head").unwrap();
        assert_eq!(root, "head");
        assert_eq!(entry.target, "head->next");
        assert!(set.lookup("head->next").is_some());
        assert!(set.lookup("head->prev").is_none());
    }

    #[test]
    fn test_alias_keeps_suffix_and_origin() {
        let mut set = TrackingSet::new();
        set.insert(TrackingEntry::new("head->next->data", None));
        let target = set.alias("second", "head->next", "head").unwrap();
        assert_eq!(target, "second->data");
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.get("second").unwrap().origin.as_deref(),
            Some("head->next")
        );
        assert_eq!(set.roots().collect::<Vec<_>>(), vec!["head", "second"]);
    }

    #[test]
    fn test_release_container_and_emptying() {
        let mut set = TrackingSet::new();
        set.insert(TrackingEntry::new("obj->buf", None));
        assert_eq!(set.release("obj", "obj"), Release::ContainerFirst);
        assert_eq!(set.len(), 1);

        set.insert(TrackingEntry::new("b", Some("a".to_string())));
        assert_eq!(set.release("b", "b"), Release::Remaining);
        assert_eq!(set.release("obj", "obj->buf"), Release::Emptied);
        assert!(set.is_empty());
    }

    #[test]
    fn test_free_through_alias_drops_the_group() {
        let mut set = TrackingSet::new();
        set.insert(TrackingEntry::new("a", None));
        set.alias("b", "a", "a");
        set.alias("c", "b", "b");
        set.insert(TrackingEntry::new("other->buf", None));

        assert_eq!(set.release("c", "c"), Release::Released);
        assert_eq!(set.roots().collect::<Vec<_>>(), vec!["other"]);
    }

    #[test]
    fn test_remove_and_retarget_update_index() {
        let mut set = TrackingSet::new();
        set.insert(TrackingEntry::new("cur->next->data", None));
        set.retarget("cur", "cur->data");
        assert!(set.lookup("cur->data").is_some());
        assert!(set.lookup("cur->next").is_none());

        set.remove("cur");
        assert!(set.lookup("cur").is_none());
        assert!(set.first().is_none());
    }

    #[test]
    fn test_step_rendering() {
        assert_eq!(
            Step::Alloc {
                target: "ptr",
                function: "main"
            }
            .to_string(),
            "ALLOC: ptr in main()"
        );
        assert_eq!(
            Step::Return {
                from: "n",
                to: "head->next",
                caller: "caller"
            }
            .to_string(),
            "RETURN: n -> head->next in caller()"
        );
    }
}
