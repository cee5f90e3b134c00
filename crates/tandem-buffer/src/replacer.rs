//! Page replacement policy for the buffer pool.

use crate::frame::FrameId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stamp value for frames that hold no page.
const NOT_RESIDENT: u64 = u64::MAX;

/// Trait for page replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId);

    /// Selects a victim frame for eviction among frames for which
    /// `is_victim` returns true (typically: pin count is zero).
    ///
    /// Returns None if no frame qualifies.
    fn evict(&self, is_victim: &dyn Fn(FrameId) -> bool) -> Option<FrameId>;

    /// Removes a frame from consideration (its page was dropped).
    fn remove(&self, frame_id: FrameId);
}

/// LRU replacement.
///
/// Every access stamps the frame with a monotonically increasing counter;
/// eviction scans for the unpinned frame with the oldest stamp. Access
/// recording is a single atomic store, eviction is O(frames) and only runs
/// on a cache miss with no free frame left.
pub struct LruReplacer {
    /// Access stamps per frame (NOT_RESIDENT = frame holds no page).
    stamps: Vec<AtomicU64>,
    /// Monotonic access clock.
    clock: AtomicU64,
}

impl LruReplacer {
    /// Creates a new LRU replacer for the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        let stamps = (0..num_frames)
            .map(|_| AtomicU64::new(NOT_RESIDENT))
            .collect();

        Self {
            stamps,
            clock: AtomicU64::new(0),
        }
    }

    /// Returns the total capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.stamps.len()
    }
}

impl Replacer for LruReplacer {
    #[inline]
    fn record_access(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.stamps.len() {
            let now = self.clock.fetch_add(1, Ordering::Relaxed);
            self.stamps[idx].store(now, Ordering::Relaxed);
        }
    }

    fn evict(&self, is_victim: &dyn Fn(FrameId) -> bool) -> Option<FrameId> {
        let mut victim: Option<(FrameId, u64)> = None;

        for (idx, stamp) in self.stamps.iter().enumerate() {
            let stamp = stamp.load(Ordering::Relaxed);
            if stamp == NOT_RESIDENT {
                continue;
            }
            let frame_id = FrameId(idx as u32);
            if !is_victim(frame_id) {
                continue;
            }
            match victim {
                Some((_, oldest)) if stamp >= oldest => {}
                _ => victim = Some((frame_id, stamp)),
            }
        }

        if let Some((frame_id, _)) = victim {
            self.stamps[frame_id.0 as usize].store(NOT_RESIDENT, Ordering::Relaxed);
            return Some(frame_id);
        }
        None
    }

    fn remove(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.stamps.len() {
            self.stamps[idx].store(NOT_RESIDENT, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_new() {
        let replacer = LruReplacer::new(10);
        assert_eq!(replacer.capacity(), 10);
    }

    #[test]
    fn test_evict_empty() {
        let replacer = LruReplacer::new(10);
        assert!(replacer.evict(&|_| true).is_none());
    }

    #[test]
    fn test_evict_oldest_first() {
        let replacer = LruReplacer::new(10);

        replacer.record_access(FrameId(3));
        replacer.record_access(FrameId(7));
        replacer.record_access(FrameId(1));

        assert_eq!(replacer.evict(&|_| true), Some(FrameId(3)));
        assert_eq!(replacer.evict(&|_| true), Some(FrameId(7)));
        assert_eq!(replacer.evict(&|_| true), Some(FrameId(1)));
        assert!(replacer.evict(&|_| true).is_none());
    }

    #[test]
    fn test_access_refreshes_recency() {
        let replacer = LruReplacer::new(10);

        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));
        // Touch frame 0 again, making frame 1 the oldest
        replacer.record_access(FrameId(0));

        assert_eq!(replacer.evict(&|_| true), Some(FrameId(1)));
        assert_eq!(replacer.evict(&|_| true), Some(FrameId(0)));
    }

    #[test]
    fn test_evict_respects_predicate() {
        let replacer = LruReplacer::new(10);

        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));

        // Frame 0 is "pinned": skip it even though it is oldest
        let victim = replacer.evict(&|fid| fid != FrameId(0));
        assert_eq!(victim, Some(FrameId(1)));
    }

    #[test]
    fn test_evict_all_pinned() {
        let replacer = LruReplacer::new(4);

        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));

        assert!(replacer.evict(&|_| false).is_none());
    }

    #[test]
    fn test_remove() {
        let replacer = LruReplacer::new(10);

        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));
        replacer.remove(FrameId(0));

        assert_eq!(replacer.evict(&|_| true), Some(FrameId(1)));
        assert!(replacer.evict(&|_| true).is_none());
    }

    #[test]
    fn test_out_of_bounds_is_ignored() {
        let replacer = LruReplacer::new(5);

        replacer.record_access(FrameId(100));
        replacer.remove(FrameId(100));

        assert!(replacer.evict(&|_| true).is_none());
    }
}
