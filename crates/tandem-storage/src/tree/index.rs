//! Page-based B+ tree index with a tail-leaf fast path and a configurable
//! leaf split fraction.
//!
//! Ordinary inserts descend from the root and split overflowing leaves at
//! `ceil(split_frac * capacity)` entries (the left leaf keeps that many).
//! Internal nodes always split at the median so lookup depth stays
//! balanced. The rightmost (tail) leaf is reachable through a cached
//! root-to-tail path, giving appends a descent-free fast path.

use crate::block::BlockManager;
use crate::tree::meta::TreeMeta;
use crate::tree::node::{kind_of, InternalNode, LeafNode};
use crate::tree::scan::RangeScan;
use std::marker::PhantomData;
use std::sync::Arc;
use tandem_common::page::{PageId, PageKind};
use tandem_common::{Key, Result, TandemError, Value};

/// A disk-backed B+ tree index over fixed-width keys and values.
pub struct TreeIndex<K: Key, V: Value> {
    /// Shared block manager backing this index.
    store: Arc<BlockManager>,
    /// Block file this index lives in.
    file_id: u32,
    /// Root page.
    root: PageId,
    /// Tree height (1 = the root is a leaf).
    height: u32,
    /// Cached path from the root down to the tail leaf (inclusive).
    tail_path: Vec<PageId>,
    /// Number of stored entries.
    num_keys: u64,
    /// Smallest stored key.
    min_key: Option<K>,
    /// Largest stored key.
    max_key: Option<K>,
    /// Max key of the leaf immediately before the tail leaf.
    second_tail_max: Option<K>,
    /// Share of entries the left leaf keeps on overflow split.
    split_frac: f64,
    _marker: PhantomData<fn() -> V>,
}

impl<K: Key, V: Value> TreeIndex<K, V> {
    /// Creates a new empty index in the given block file.
    ///
    /// The file must not contain any pages yet; page 0 becomes the header
    /// and page 1 the root leaf.
    pub fn create(store: Arc<BlockManager>, file_id: u32, split_frac: f64) -> Result<Self> {
        if !(split_frac > 0.0 && split_frac <= 1.0) {
            return Err(TandemError::InvalidParameter {
                name: "split_frac".to_string(),
                value: split_frac.to_string(),
            });
        }
        if store.num_pages(file_id)? != 0 {
            return Err(TandemError::InvalidArgument(format!(
                "block file {} is not empty",
                file_id
            )));
        }

        // Page 0 becomes the header, page 1 the root leaf
        let header = store.allocate(file_id)?;
        let root = store.allocate(file_id)?;
        debug_assert_eq!((header.page_num, root.page_num), (0, 1));

        {
            let guard = store.fetch_mut(root)?;
            let leaf = LeafNode::<K, V>::new(root);
            guard.data_mut().copy_from_slice(leaf.as_bytes());
        }

        let index = Self {
            store,
            file_id,
            root,
            height: 1,
            tail_path: vec![root],
            num_keys: 0,
            min_key: None,
            max_key: None,
            second_tail_max: None,
            split_frac,
            _marker: PhantomData,
        };
        index.write_meta()?;
        Ok(index)
    }

    /// Opens an existing index from its header page.
    pub fn open(store: Arc<BlockManager>, file_id: u32) -> Result<Self> {
        let header_id = PageId::new(file_id, 0);
        if store.num_pages(file_id)? < 2 {
            return Err(TandemError::PageCorrupted {
                page_id: header_id,
                reason: "index file is missing its header or root page".to_string(),
            });
        }

        let meta = {
            let guard = store.fetch(header_id)?;
            let data = guard.data();
            TreeMeta::<K>::decode(header_id, &data[..])?
        };

        let mut index = Self {
            store,
            file_id,
            root: meta.root,
            height: meta.height,
            tail_path: Vec::new(),
            num_keys: meta.num_keys,
            min_key: meta.min_key,
            max_key: meta.max_key,
            second_tail_max: meta.second_tail_max,
            split_frac: meta.split_frac,
            _marker: PhantomData,
        };
        index.rebuild_tail_path()?;
        Ok(index)
    }

    /// Persists the header page and flushes the store.
    pub fn flush(&self) -> Result<()> {
        self.write_meta()?;
        self.store.flush()
    }

    /// Writes the header page (without flushing).
    pub fn write_meta(&self) -> Result<()> {
        let meta = TreeMeta {
            height: self.height,
            root: self.root,
            tail: self.tail_leaf_id(),
            num_keys: self.num_keys,
            split_frac: self.split_frac,
            min_key: self.min_key,
            max_key: self.max_key,
            second_tail_max: self.second_tail_max,
        };
        let guard = self.store.fetch_mut(PageId::new(self.file_id, 0))?;
        meta.encode(&mut guard.data_mut()[..]);
        Ok(())
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Returns the smallest stored key.
    pub fn min_key(&self) -> Option<K> {
        self.min_key
    }

    /// Returns the largest stored key.
    pub fn max_key(&self) -> Option<K> {
        self.max_key
    }

    /// Returns the number of stored entries.
    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    /// Returns true while the root is the only (leaf) node.
    pub fn is_single_leaf(&self) -> bool {
        self.height == 1
    }

    /// Returns the tree height (1 = the root is a leaf).
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns how many entries fit in one leaf page.
    pub fn leaf_capacity(&self) -> usize {
        LeafNode::<K, V>::CAPACITY
    }

    /// Returns the smallest key of the tail leaf.
    pub fn tail_leaf_min_key(&self) -> Result<Option<K>> {
        let guard = self.store.fetch(self.tail_leaf_id())?;
        let data = guard.data();
        let count = LeafNode::<K, V>::count_in_slice(&data[..]);
        if count == 0 {
            Ok(None)
        } else {
            Ok(Some(LeafNode::<K, V>::key_in_slice(&data[..], 0)))
        }
    }

    /// Returns the largest key of the leaf immediately before the tail.
    pub fn second_tail_leaf_max_key(&self) -> Option<K> {
        self.second_tail_max
    }

    fn tail_leaf_id(&self) -> PageId {
        // tail_path always ends at the tail leaf
        self.tail_path.last().copied().unwrap_or(self.root)
    }

    // =========================================================================
    // Point lookup
    // =========================================================================

    /// Returns true if an entry with the given key exists.
    pub fn query(&self, key: &K) -> Result<bool> {
        if self.num_keys == 0 {
            return Ok(false);
        }

        let mut page_id = self.root;
        for _ in 0..=self.height {
            let child = {
                let guard = self.store.fetch(page_id)?;
                let data = guard.data();
                match kind_of(&data[..]) {
                    Some(PageKind::Leaf) => {
                        return Ok(LeafNode::<K, V>::contains_in_slice(&data[..], key));
                    }
                    Some(PageKind::Internal) => {
                        InternalNode::<K>::find_child_in_slice(&data[..], key)
                    }
                    _ => {
                        return Err(TandemError::PageCorrupted {
                            page_id,
                            reason: "expected a tree node during descent".to_string(),
                        });
                    }
                }
            };
            page_id = PageId::from_u64(child);
        }

        Err(TandemError::TreeCorrupted(
            "descent exceeded tree height".to_string(),
        ))
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Inserts an entry, descending from the root.
    ///
    /// Duplicate keys are stored as additional entries.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        let path = self.find_path(&key)?;
        let leaf_id = *path.last().ok_or_else(|| {
            TandemError::TreeCorrupted("descent produced an empty path".to_string())
        })?;

        let overflow = {
            let guard = self.store.fetch_mut(leaf_id)?;
            let mut data = guard.data_mut();
            match LeafNode::<K, V>::insert_in_slice(&mut data[..], &key, &value) {
                Ok(()) => false,
                Err(TandemError::NodeFull) => true,
                Err(e) => return Err(e),
            }
        };

        if overflow {
            self.split_leaf_insert(&path, key, value)?;
        }
        self.note_inserted(&key);
        Ok(())
    }

    /// Inserts an entry through the tail-leaf fast path, without descent.
    ///
    /// With `append == true` the caller asserts `key >= max_key`; violating
    /// that is an `InvalidArgument` error. With `append == false` the key
    /// is placed at its sorted position inside the tail leaf; if it lies
    /// below the tail leaf's minimum, the tail-path pivots are lowered so
    /// descent keeps finding it.
    pub fn insert_to_tail_leaf(&mut self, key: K, value: V, append: bool) -> Result<()> {
        if append {
            if let Some(max) = self.max_key {
                if key < max {
                    return Err(TandemError::InvalidArgument(format!(
                        "tail append key {:?} is below max key {:?}",
                        key, max
                    )));
                }
            }
        } else if let Some(tail_min) = self.tail_leaf_min_key()? {
            if key < tail_min {
                self.lower_tail_pivots(&key)?;
            }
        }

        let leaf_id = self.tail_leaf_id();
        let overflow = {
            let guard = self.store.fetch_mut(leaf_id)?;
            let mut data = guard.data_mut();
            let outcome = if append {
                LeafNode::<K, V>::push_in_slice(&mut data[..], &key, &value)
            } else {
                LeafNode::<K, V>::insert_in_slice(&mut data[..], &key, &value)
            };
            match outcome {
                Ok(()) => false,
                Err(TandemError::NodeFull) => true,
                Err(e) => return Err(e),
            }
        };

        if overflow {
            let path = self.tail_path.clone();
            self.split_leaf_insert(&path, key, value)?;
        }
        self.note_inserted(&key);
        Ok(())
    }

    /// Lazy sequence of entries with keys in `[lo, hi]`, in key order.
    pub fn range(&self, lo: K, hi: K) -> Result<RangeScan<K, V>> {
        if self.num_keys == 0 || lo > hi {
            return Ok(RangeScan::empty(self.store.clone(), lo, hi));
        }
        let leaf_id = self.find_leaf(&lo)?;
        Ok(RangeScan::new(self.store.clone(), leaf_id, lo, hi))
    }

    // =========================================================================
    // Descent and split plumbing
    // =========================================================================

    /// Records the min/max/count bookkeeping for a newly stored key.
    fn note_inserted(&mut self, key: &K) {
        self.num_keys += 1;
        match self.min_key {
            Some(min) if min <= *key => {}
            _ => self.min_key = Some(*key),
        }
        match self.max_key {
            Some(max) if max >= *key => {}
            _ => self.max_key = Some(*key),
        }
    }

    /// Descends from the root, returning the page path ending at the leaf
    /// covering `key`.
    fn find_path(&self, key: &K) -> Result<Vec<PageId>> {
        let mut path = Vec::with_capacity(self.height as usize);
        let mut page_id = self.root;

        for _ in 0..=self.height {
            path.push(page_id);
            let child = {
                let guard = self.store.fetch(page_id)?;
                let data = guard.data();
                match kind_of(&data[..]) {
                    Some(PageKind::Leaf) => return Ok(path),
                    Some(PageKind::Internal) => {
                        InternalNode::<K>::find_child_in_slice(&data[..], key)
                    }
                    _ => {
                        return Err(TandemError::PageCorrupted {
                            page_id,
                            reason: "expected a tree node during descent".to_string(),
                        });
                    }
                }
            };
            page_id = PageId::from_u64(child);
        }

        Err(TandemError::TreeCorrupted(
            "descent exceeded tree height".to_string(),
        ))
    }

    /// Descends to the leaf covering `key`.
    fn find_leaf(&self, key: &K) -> Result<PageId> {
        let path = self.find_path(key)?;
        path.last().copied().ok_or_else(|| {
            TandemError::TreeCorrupted("descent produced an empty path".to_string())
        })
    }

    /// Splits the overflowing leaf at the end of `path` while inserting
    /// `key`, then propagates the new pivot upward.
    fn split_leaf_insert(&mut self, path: &[PageId], key: K, value: V) -> Result<()> {
        let leaf_id = *path.last().ok_or_else(|| {
            TandemError::TreeCorrupted("split of an empty path".to_string())
        })?;

        let (mut entries, old_next) = {
            let guard = self.store.fetch(leaf_id)?;
            let data = guard.data();
            (
                LeafNode::<K, V>::entries_in_slice(&data[..]),
                LeafNode::<K, V>::next_leaf_in_slice(&data[..]),
            )
        };

        let pos = entries.partition_point(|(k, _)| *k <= key);
        entries.insert(pos, (key, value));

        let left_count = Self::split_point(self.split_frac, entries.len());
        let pivot = entries[left_count].0;
        let right_id = self.store.allocate(self.file_id)?;

        // A tail-leaf split makes the old tail the new second-tail leaf.
        if Some(&leaf_id) == self.tail_path.last() {
            self.second_tail_max = Some(entries[left_count - 1].0);
        }

        let mut left = LeafNode::<K, V>::new(leaf_id);
        left.set_entries(&entries[..left_count]);
        left.set_next_leaf(Some(right_id));

        let mut right = LeafNode::<K, V>::new(right_id);
        right.set_entries(&entries[left_count..]);
        right.set_next_leaf(old_next);

        {
            let guard = self.store.fetch_mut(leaf_id)?;
            guard.data_mut().copy_from_slice(left.as_bytes());
        }
        {
            let guard = self.store.fetch_mut(right_id)?;
            guard.data_mut().copy_from_slice(right.as_bytes());
        }

        self.insert_pivot_above(&path[..path.len() - 1], pivot, right_id)?;
        self.rebuild_tail_path()
    }

    /// Number of entries the left leaf keeps on an overflow split.
    fn split_point(split_frac: f64, len: usize) -> usize {
        let keep = (split_frac * LeafNode::<K, V>::CAPACITY as f64).ceil() as usize;
        keep.clamp(1, len - 1)
    }

    /// Inserts `(pivot, right_child)` into the lowest ancestor on `above`,
    /// splitting internal nodes at the median as needed. Grows a new root
    /// if the split reaches the top.
    fn insert_pivot_above(
        &mut self,
        above: &[PageId],
        pivot: K,
        right_child: PageId,
    ) -> Result<()> {
        let mut pivot = pivot;
        let mut child = right_child;

        for depth in (0..above.len()).rev() {
            let node_id = above[depth];

            let overflow = {
                let guard = self.store.fetch_mut(node_id)?;
                let mut data = guard.data_mut();
                match InternalNode::<K>::insert_pivot_in_slice(
                    &mut data[..],
                    &pivot,
                    child.as_u64(),
                ) {
                    Ok(()) => false,
                    Err(TandemError::NodeFull) => true,
                    Err(e) => return Err(e),
                }
            };
            if !overflow {
                return Ok(());
            }

            // Median split of the internal node.
            let (leftmost, mut entries) = {
                let guard = self.store.fetch(node_id)?;
                let data = guard.data();
                let node = InternalNode::<K>::from_bytes(node_id, &data)?;
                (node.leftmost_child(), node.entries())
            };

            let pos = entries.partition_point(|(k, _)| *k <= pivot);
            entries.insert(pos, (pivot, child));

            let mid = entries.len() / 2;
            let promoted = entries[mid].0;
            let right_leftmost = entries[mid].1;
            let right_id = self.store.allocate(self.file_id)?;

            let mut left = InternalNode::<K>::new(node_id);
            left.set_contents(leftmost, &entries[..mid]);

            let mut right = InternalNode::<K>::new(right_id);
            right.set_contents(right_leftmost, &entries[mid + 1..]);

            {
                let guard = self.store.fetch_mut(node_id)?;
                guard.data_mut().copy_from_slice(left.as_bytes());
            }
            {
                let guard = self.store.fetch_mut(right_id)?;
                guard.data_mut().copy_from_slice(right.as_bytes());
            }

            pivot = promoted;
            child = right_id;
        }

        self.grow_root(pivot, child)
    }

    /// Allocates a new root above the current one.
    fn grow_root(&mut self, pivot: K, right_child: PageId) -> Result<()> {
        let new_root = self.store.allocate(self.file_id)?;

        let mut node = InternalNode::<K>::new(new_root);
        node.set_contents(self.root, &[(pivot, right_child)]);

        {
            let guard = self.store.fetch_mut(new_root)?;
            guard.data_mut().copy_from_slice(node.as_bytes());
        }

        self.root = new_root;
        self.height += 1;
        Ok(())
    }

    /// Lowers every tail-path pivot above `key` down to `key`.
    ///
    /// Left siblings only hold keys at or below the old insertion bound,
    /// so pivot order within each node is preserved.
    fn lower_tail_pivots(&self, key: &K) -> Result<()> {
        for node_id in &self.tail_path[..self.tail_path.len().saturating_sub(1)] {
            let guard = self.store.fetch_mut(*node_id)?;
            let mut data = guard.data_mut();
            InternalNode::<K>::lower_last_pivot_in_slice(&mut data[..], key);
        }
        Ok(())
    }

    /// Recomputes the cached root-to-tail path by rightmost descent.
    fn rebuild_tail_path(&mut self) -> Result<()> {
        let mut path = Vec::with_capacity(self.height as usize);
        let mut page_id = self.root;

        for _ in 0..=self.height {
            path.push(page_id);
            let next = {
                let guard = self.store.fetch(page_id)?;
                let data = guard.data();
                match kind_of(&data[..]) {
                    Some(PageKind::Leaf) => {
                        self.tail_path = path;
                        return Ok(());
                    }
                    Some(PageKind::Internal) => {
                        let node = InternalNode::<K>::from_bytes(page_id, &data)?;
                        node.rightmost_child()
                    }
                    _ => {
                        return Err(TandemError::PageCorrupted {
                            page_id,
                            reason: "expected a tree node on the tail path".to_string(),
                        });
                    }
                }
            };
            page_id = next;
        }

        Err(TandemError::TreeCorrupted(
            "tail path exceeded tree height".to_string(),
        ))
    }
}
