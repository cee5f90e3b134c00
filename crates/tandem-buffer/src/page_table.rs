//! Page table mapping resident page IDs to buffer frames.

use crate::frame::FrameId;
use parking_lot::RwLock;
use std::collections::HashMap;
use tandem_common::page::PageId;

/// Maps `PageId` to the frame currently holding it.
///
/// Keys are stored in packed u64 form. The engine is single-writer, so a
/// read-write locked hash map is sufficient here; readers only contend on
/// the lock for the duration of a lookup.
pub struct PageTable {
    entries: RwLock<HashMap<u64, FrameId>>,
}

impl PageTable {
    /// Creates a new page table sized for the given number of frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Looks up a page ID and returns its frame ID if resident.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        self.entries.read().get(&page_id.as_u64()).copied()
    }

    /// Returns true if the page is resident.
    #[inline]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.entries.read().contains_key(&page_id.as_u64())
    }

    /// Inserts a page ID to frame ID mapping.
    #[inline]
    pub fn insert(&self, page_id: PageId, frame_id: FrameId) {
        self.entries.write().insert(page_id.as_u64(), frame_id);
    }

    /// Removes a mapping, returning the frame it pointed at.
    #[inline]
    pub fn remove(&self, page_id: PageId) -> Option<FrameId> {
        self.entries.write().remove(&page_id.as_u64())
    }

    /// Returns the number of resident pages.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no pages are resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Visits every resident (page, frame) pair.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(PageId, FrameId),
    {
        for (&packed, &frame_id) in self.entries.read().iter() {
            visit(PageId::from_u64(packed), frame_id);
        }
    }
}
