//! Root-cause analysis engine
//!
//! Both trackers follow one allocation through code, keeping a set of live
//! access paths to it (a [`TrackingSet`]) and classifying the leak when the
//! last path is lost or the code runs out:
//!
//! - [`StaticOwnershipTracker`] reads extracted source text in file order
//! - [`TraceOwnershipReconciler`] replays a recorded execution trace
//!
//! Both produce a [`RootCauseInfo`]. Neither does any I/O.

pub mod ops;
pub mod path;
pub mod reconciler;
pub mod root_cause;
pub mod state;
pub mod statement;
pub mod static_tracker;

pub use reconciler::TraceOwnershipReconciler;
pub use root_cause::{LeakCategory, ResponsibleLine, RootCauseInfo};
pub use state::{TrackingEntry, TrackingSet};
pub use static_tracker::StaticOwnershipTracker;
