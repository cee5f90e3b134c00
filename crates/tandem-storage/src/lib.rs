//! Storage layer for TandemDB.
//!
//! This crate provides:
//! - Disk manager for page-level block file I/O
//! - Block manager combining the disk manager with the page cache
//! - B+ tree index with a tail-leaf fast path and configurable split
//!   fraction, built on the block manager

mod block;
mod disk;
mod tree;

pub use block::BlockManager;
pub use disk::{DiskManager, DiskManagerConfig};
pub use tree::{InternalNode, LeafNode, RangeScan, TreeIndex, TreeMeta};
