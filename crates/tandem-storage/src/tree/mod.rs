//! B+ tree index over the block manager.
//!
//! The tree is the building block of the dual-tree engine: a keyed index
//! with a leaf chain for range scans, a tail-leaf fast path for appends,
//! and a configurable leaf split fraction. A sorted, append-heavy index is
//! configured with a high split fraction (the packed left leaf is rarely
//! revisited), while an index taking arbitrary inserts uses 0.5 for the
//! classic balanced behavior. Internal nodes always split at the median.

mod index;
mod meta;
mod node;
mod scan;

pub use index::TreeIndex;
pub use meta::TreeMeta;
pub use node::{InternalNode, LeafNode};
pub use scan::RangeScan;
