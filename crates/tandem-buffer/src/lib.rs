//! Block cache management for TandemDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable block count
//! - LRU eviction of unpinned blocks
//! - Pin counting for safe shared access
//! - Dirty page tracking for write-back

mod frame;
mod page_table;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use pool::{BufferPool, BufferPoolConfig, EvictedPage, PageReadGuard, PageWriteGuard};
pub use replacer::{LruReplacer, Replacer};
