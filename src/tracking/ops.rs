// Detection of the four ownership operations on a statement

use super::state::TrackingSet;
use super::statement::Statement;

/// An operation a statement performs on a tracked segment.
///
/// Each case carries the matched segment and the root of the entry owning it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Free {
        segment: String,
        root: String,
    },
    Return {
        segment: String,
        root: String,
    },
    Reassign {
        segment: String,
        root: String,
        value: String,
    },
    Alias {
        segment: String,
        root: String,
        name: String,
    },
}

/// Finds what `stmt` does to the tracked memory, if anything.
///
/// Checked in order free, return, reassign, alias; the first match wins. A
/// `free` or `return` of something untracked ends detection for the
/// statement.
pub fn detect(stmt: &Statement, tracking: &TrackingSet) -> Option<Operation> {
    let owner = |segment: &str| tracking.lookup(segment).map(|(root, _)| root.to_string());

    if stmt.is_free() {
        let segment = stmt.free_argument()?;
        let root = owner(&segment)?;
        return Some(Operation::Free { segment, root });
    }

    if stmt.is_return() {
        let segment = stmt.returned_value()?;
        let root = owner(&segment)?;
        return Some(Operation::Return { segment, root });
    }

    let assignment = stmt.assignment()?;
    if let Some(root) = owner(&assignment.target) {
        return Some(Operation::Reassign {
            segment: assignment.target,
            root,
            value: assignment.value,
        });
    }
    if !assignment.is_null() {
        if let Some(root) = owner(&assignment.value) {
            return Some(Operation::Alias {
                segment: assignment.value,
                root,
                name: assignment.target,
            });
        }
    }
    None
}
