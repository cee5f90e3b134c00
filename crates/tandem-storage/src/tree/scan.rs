//! Lazy range scan over the leaf chain.

use crate::block::BlockManager;
use crate::tree::node::LeafNode;
use std::sync::Arc;
use tandem_common::page::PageId;
use tandem_common::{Key, Result, Value};

/// Iterator over all entries with keys in `[lo, hi]`, walking the leaf
/// chain from the leaf covering `lo`.
///
/// Each step pins one leaf only for the duration of decoding it, so no
/// page pin outlives a call to `next`.
pub struct RangeScan<K: Key, V: Value> {
    store: Arc<BlockManager>,
    /// The next leaf to load, if any.
    next_leaf: Option<PageId>,
    /// Decoded entries of the current leaf.
    entries: Vec<(K, V)>,
    /// Cursor into `entries`.
    pos: usize,
    lo: K,
    hi: K,
    done: bool,
}

impl<K: Key, V: Value> RangeScan<K, V> {
    /// Creates a scan starting at the given leaf.
    pub(crate) fn new(store: Arc<BlockManager>, start_leaf: PageId, lo: K, hi: K) -> Self {
        Self {
            store,
            next_leaf: Some(start_leaf),
            entries: Vec::new(),
            pos: 0,
            lo,
            hi,
            done: false,
        }
    }

    /// Creates an exhausted scan.
    pub(crate) fn empty(store: Arc<BlockManager>, lo: K, hi: K) -> Self {
        Self {
            store,
            next_leaf: None,
            entries: Vec::new(),
            pos: 0,
            lo,
            hi,
            done: true,
        }
    }

    /// Loads the next leaf into the entry buffer.
    fn load_next_leaf(&mut self) -> Result<bool> {
        let leaf_id = match self.next_leaf {
            Some(id) => id,
            None => return Ok(false),
        };

        let guard = self.store.fetch(leaf_id)?;
        let data = guard.data();
        self.entries = LeafNode::<K, V>::entries_in_slice(&data[..]);
        self.next_leaf = LeafNode::<K, V>::next_leaf_in_slice(&data[..]);
        self.pos = 0;
        Ok(true)
    }
}

impl<K: Key, V: Value> Iterator for RangeScan<K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if self.pos < self.entries.len() {
                let (key, value) = self.entries[self.pos];
                self.pos += 1;

                if key < self.lo {
                    continue;
                }
                if key > self.hi {
                    self.done = true;
                    return None;
                }
                return Some(Ok((key, value)));
            }

            match self.load_next_leaf() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
