//! Dual-tree engine for TandemDB.
//!
//! Incoming tuples are partitioned at insertion time between two sibling
//! B+ tree indexes: a *sorted* index absorbing the monotonic tail of the
//! stream through descent-free tail-leaf appends, and an *unsorted* index
//! taking everything else. Three small components steer the split:
//!
//! - a bounded min-heap staging buffer that smooths short reorderings,
//! - an outlier detector with adaptive tolerance deciding whether a new
//!   key continues the sorted run,
//! - an MRU predictor choosing which index to probe first on point
//!   queries.

mod detector;
mod dual;
mod predictor;
mod staging;

pub use detector::OutlierDetector;
pub use dual::DualTree;
pub use predictor::{ProbePredictor, ProbeSide};
pub use staging::StagingHeap;
