//! The dual-tree router: insert partitioning and query fan-out.

use crate::detector::OutlierDetector;
use crate::predictor::{ProbePredictor, ProbeSide};
use crate::staging::StagingHeap;
use std::sync::Arc;
use tandem_common::config::DualTreeConfig;
use tandem_common::{Key, Result, TandemError, Value};
use tandem_storage::{BlockManager, TreeIndex};

/// Block file holding the sorted index.
const SORTED_FILE_ID: u32 = 0;
/// Block file holding the unsorted index.
const UNSORTED_FILE_ID: u32 = 1;

/// A dual-tree key–value store.
///
/// Tuples stream through an optional staging heap and are then routed to
/// exactly one of two sibling indexes: the *sorted* index takes keys that
/// extend (or land just inside) the tail of the monotonically increasing
/// run, through descent-free tail-leaf inserts; the *unsorted* index takes
/// keys below the insertion-range lower bound and keys the outlier
/// detector rejects. Point queries probe both indexes and the staging
/// heap.
pub struct DualTree<K: Key, V: Value> {
    store: Arc<BlockManager>,
    sorted: TreeIndex<K, V>,
    unsorted: TreeIndex<K, V>,
    sorted_size: u64,
    unsorted_size: u64,
    detector: OutlierDetector<K>,
    staging: StagingHeap<K, V>,
    predictor: ProbePredictor,
    allow_sorted_tree_insertion: bool,
}

impl<K: Key, V: Value> DualTree<K, V> {
    /// Creates a new dual tree over an empty data directory.
    pub fn create(store: Arc<BlockManager>, config: &DualTreeConfig) -> Result<Self> {
        config.validate()?;
        let sorted =
            TreeIndex::create(store.clone(), SORTED_FILE_ID, config.sorted_split_frac)?;
        let unsorted =
            TreeIndex::create(store.clone(), UNSORTED_FILE_ID, config.unsorted_split_frac)?;
        Ok(Self::assemble(store, config, sorted, unsorted))
    }

    /// Opens a dual tree from previously flushed index files.
    ///
    /// The staging heap, outlier detector, and probe predictor restart
    /// fresh; they only steer routing of future inserts.
    pub fn open(store: Arc<BlockManager>, config: &DualTreeConfig) -> Result<Self> {
        config.validate()?;
        let sorted = TreeIndex::open(store.clone(), SORTED_FILE_ID)?;
        let unsorted = TreeIndex::open(store.clone(), UNSORTED_FILE_ID)?;
        Ok(Self::assemble(store, config, sorted, unsorted))
    }

    fn assemble(
        store: Arc<BlockManager>,
        config: &DualTreeConfig,
        sorted: TreeIndex<K, V>,
        unsorted: TreeIndex<K, V>,
    ) -> Self {
        let sorted_size = sorted.num_keys();
        let unsorted_size = unsorted.num_keys();
        Self {
            store,
            sorted,
            unsorted,
            sorted_size,
            unsorted_size,
            detector: OutlierDetector::new(
                config.init_tolerance_factor,
                config.min_tolerance_factor,
                config.expected_avg_distance,
            ),
            staging: StagingHeap::new(config.heap_size),
            predictor: ProbePredictor::new(config.query_buffer_size),
            allow_sorted_tree_insertion: config.allow_sorted_tree_insertion,
        }
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Number of tuples in the sorted index.
    pub fn sorted_tree_size(&self) -> u64 {
        self.sorted_size
    }

    /// Number of tuples in the unsorted index.
    pub fn unsorted_tree_size(&self) -> u64 {
        self.unsorted_size
    }

    /// Number of tuples held in the staging heap.
    pub fn staged_size(&self) -> u64 {
        self.staging.len() as u64
    }

    /// Total number of stored tuples, staged ones included.
    pub fn len(&self) -> u64 {
        self.sorted_size + self.unsorted_size + self.staged_size()
    }

    /// Returns true if nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sorted index.
    pub fn sorted_tree(&self) -> &TreeIndex<K, V> {
        &self.sorted
    }

    /// The unsorted index.
    pub fn unsorted_tree(&self) -> &TreeIndex<K, V> {
        &self.unsorted
    }

    /// The MRU probe predictor.
    pub fn predictor(&self) -> &ProbePredictor {
        &self.predictor
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Inserts a tuple.
    ///
    /// The tuple may be held in the staging heap; once the heap is full,
    /// each insert releases the heap minimum (or the new tuple itself if
    /// it is smaller) into one of the two indexes.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        match self.staging.offer(key, value) {
            None => Ok(()),
            Some((key, value)) => self.route(key, value),
        }
    }

    /// Routes an admitted tuple to exactly one index.
    fn route(&mut self, key: K, value: V) -> Result<()> {
        if self.sorted_size == 0 {
            self.sorted.insert_to_tail_leaf(key, value, true)?;
            self.detector.is_outlier(&key, 0);
            self.sorted_size += 1;
            return Ok(());
        }

        let max = self.sorted.max_key().ok_or_else(|| {
            TandemError::Internal("non-empty sorted index without max key".to_string())
        })?;

        // Keys below the insertion-range lower bound can no longer join
        // the sorted run.
        let lower_bound = if !self.allow_sorted_tree_insertion {
            Some(max)
        } else if self.sorted.is_single_leaf() {
            self.sorted.tail_leaf_min_key()?
        } else {
            self.sorted.second_tail_leaf_max_key()
        };

        if let Some(bound) = lower_bound {
            if key < bound {
                self.unsorted.insert(key, value)?;
                self.unsorted_size += 1;
                return Ok(());
            }
        }

        if key > max && self.detector.is_outlier(&key, self.sorted_size) {
            self.unsorted.insert(key, value)?;
            self.unsorted_size += 1;
            return Ok(());
        }

        let append = key >= max;
        self.sorted.insert_to_tail_leaf(key, value, append)?;
        self.sorted_size += 1;
        if !append {
            self.detector.update_avg_distance(self.sorted_size);
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Point query: probes the larger index first, then its sibling, then
    /// scans the staging heap.
    pub fn query(&self, key: &K) -> Result<bool> {
        let (first, second) = if self.sorted_size >= self.unsorted_size {
            (&self.sorted, &self.unsorted)
        } else {
            (&self.unsorted, &self.sorted)
        };

        if first.query(key)? || second.query(key)? {
            return Ok(true);
        }
        Ok(self.staging.contains(key))
    }

    /// Point query steered by the MRU predictor.
    ///
    /// While the predictor is unprimed the larger index is probed first.
    /// The predictor is updated from the first probe's outcome: a hit
    /// votes for the probed side, a miss votes for the sibling (where the
    /// answer would have been).
    pub fn mru_query(&mut self, key: &K) -> Result<bool> {
        let first = if self.predictor.is_primed() {
            self.predictor.predict()
        } else if self.unsorted_size > self.sorted_size {
            ProbeSide::Unsorted
        } else {
            ProbeSide::Sorted
        };

        let (first_tree, second_tree) = match first {
            ProbeSide::Sorted => (&self.sorted, &self.unsorted),
            ProbeSide::Unsorted => (&self.unsorted, &self.sorted),
        };

        let first_hit = first_tree.query(key)?;
        let second_hit = if first_hit {
            false
        } else {
            second_tree.query(key)?
        };

        let vote = if first_hit { first } else { first.other() };
        self.predictor.update(vote);

        if first_hit || second_hit {
            return Ok(true);
        }
        Ok(self.staging.contains(key))
    }

    /// Experimental point query probing both indexes from two threads.
    ///
    /// Offers no stronger guarantees than the sequential query; it exists
    /// to overlap the two descents on cold caches.
    pub fn parallel_query(&self, key: &K) -> Result<bool> {
        let (sorted_hit, unsorted_hit) = std::thread::scope(|scope| {
            let sorted = scope.spawn(|| self.sorted.query(key));
            let unsorted = scope.spawn(|| self.unsorted.query(key));
            (sorted.join(), unsorted.join())
        });

        let sorted_hit = sorted_hit
            .map_err(|_| TandemError::Internal("sorted probe thread panicked".to_string()))??;
        let unsorted_hit = unsorted_hit
            .map_err(|_| TandemError::Internal("unsorted probe thread panicked".to_string()))??;

        if sorted_hit || unsorted_hit {
            return Ok(true);
        }
        Ok(self.staging.contains(key))
    }

    /// Range query: the union of both indexes plus matching staged
    /// tuples, returned in key order.
    pub fn range(&self, lo: &K, hi: &K) -> Result<Vec<(K, V)>> {
        let mut out = Vec::new();
        for entry in self.sorted.range(*lo, *hi)? {
            out.push(entry?);
        }
        for entry in self.unsorted.range(*lo, *hi)? {
            out.push(entry?);
        }
        self.staging.collect_range(lo, hi, &mut out);
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Drains the staging heap into the indexes and persists everything.
    ///
    /// After a flush, a reopened engine answers every query.
    pub fn flush(&mut self) -> Result<()> {
        while let Some((key, value)) = self.staging.pop_min() {
            self.route(key, value)?;
        }
        self.sorted.write_meta()?;
        self.unsorted.write_meta()?;
        self.store.flush()
    }
}

impl<K: Key, V: Value> Drop for DualTree<K, V> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_common::config::StoreConfig;
    use tempfile::tempdir;

    fn test_store(dir: &std::path::Path) -> Arc<BlockManager> {
        let config = StoreConfig {
            data_dir: dir.to_path_buf(),
            blocks_in_memory: 1000,
            fsync_enabled: false,
        };
        Arc::new(BlockManager::new(&config).unwrap())
    }

    #[test]
    fn test_empty_tree() {
        let dir = tempdir().unwrap();
        let tree =
            DualTree::<i32, i32>::create(test_store(dir.path()), &DualTreeConfig::default())
                .unwrap();

        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert!(!tree.query(&1).unwrap());
    }

    #[test]
    fn test_single_insert_goes_sorted() {
        let dir = tempdir().unwrap();
        let mut tree =
            DualTree::<i32, i32>::create(test_store(dir.path()), &DualTreeConfig::default())
                .unwrap();

        tree.insert(42, 1).unwrap();
        assert_eq!(tree.sorted_tree_size(), 1);
        assert_eq!(tree.unsorted_tree_size(), 0);
        assert!(tree.query(&42).unwrap());
    }

    #[test]
    fn test_duplicate_key_stored_twice() {
        let dir = tempdir().unwrap();
        let mut tree =
            DualTree::<i32, i32>::create(test_store(dir.path()), &DualTreeConfig::default())
                .unwrap();

        tree.insert(7, 1).unwrap();
        tree.insert(7, 2).unwrap();

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.range(&7, &7).unwrap().len(), 2);
    }

    #[test]
    fn test_disallow_sorted_insertion_forces_unsorted() {
        let dir = tempdir().unwrap();
        let config = DualTreeConfig {
            allow_sorted_tree_insertion: false,
            ..Default::default()
        };
        let mut tree = DualTree::<i32, i32>::create(test_store(dir.path()), &config).unwrap();

        tree.insert(100, 0).unwrap();
        tree.insert(50, 0).unwrap();
        tree.insert(150, 0).unwrap();

        assert_eq!(tree.sorted_tree_size(), 2); // 100, 150
        assert_eq!(tree.unsorted_tree_size(), 1); // 50
        for key in [50, 100, 150] {
            assert!(tree.query(&key).unwrap());
        }
    }

    #[test]
    fn test_mru_query_finds_keys_in_both_trees() {
        let dir = tempdir().unwrap();
        let config = DualTreeConfig {
            query_buffer_size: 4,
            ..Default::default()
        };
        let mut tree = DualTree::<i32, i32>::create(test_store(dir.path()), &config).unwrap();

        for key in 1..=100 {
            tree.insert(key, key).unwrap();
        }
        // Below the sorted run: routed to the unsorted index
        tree.insert(-10, 0).unwrap();

        for key in [1, 50, 100, -10] {
            assert!(tree.mru_query(&key).unwrap());
        }
        assert!(!tree.mru_query(&999).unwrap());
    }

    #[test]
    fn test_parallel_query_matches_sequential() {
        let dir = tempdir().unwrap();
        let mut tree =
            DualTree::<i32, i32>::create(test_store(dir.path()), &DualTreeConfig::default())
                .unwrap();

        for key in 1..=500 {
            tree.insert(key, key).unwrap();
        }
        tree.insert(-5, 0).unwrap();

        for key in [-5, 1, 250, 500, 501, -99] {
            assert_eq!(
                tree.parallel_query(&key).unwrap(),
                tree.query(&key).unwrap(),
                "disagreement on key {}",
                key
            );
        }
    }

    #[test]
    fn test_range_union_in_key_order() {
        let dir = tempdir().unwrap();
        let config = DualTreeConfig {
            heap_size: 4,
            ..Default::default()
        };
        let mut tree = DualTree::<i32, i32>::create(test_store(dir.path()), &config).unwrap();

        for key in [10, 5, 20, 15, 25, 1, 30, 2] {
            tree.insert(key, key).unwrap();
        }

        let all: Vec<i32> = tree
            .range(&i32::MIN, &i32::MAX)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();

        let mut expected = vec![10, 5, 20, 15, 25, 1, 30, 2];
        expected.sort_unstable();
        assert_eq!(all, expected);
    }
}
