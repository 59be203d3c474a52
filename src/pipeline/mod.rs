//! Pipeline entry points for watcher operations.
//!
//! - `fingerprint`: identity of one observation
//! - `detect`: change detection against stored history
//! - `compact`: pruning of redundant history
//! - `dispatch`: rate-limited archive queue
//! - `cycle`: one pass over every target

pub mod compact;
pub mod cycle;
pub mod detect;
pub mod dispatch;
pub mod fingerprint;

pub use compact::ResultCompactor;
pub use cycle::{ChangedTarget, CycleReport, TargetFailure, run_cycle};
pub use detect::{ArchiveQueue, ChangeDetector, Detection, DetectionState};
pub use dispatch::{
    ArchiveDispatcher, AttemptOutcome, Clock, DispatchEvent, DispatchSummary, DispatcherConfig,
    TokioClock,
};
pub use fingerprint::Fingerprint;
