//! Configuration structures for TandemDB.

use crate::error::{Result, TandemError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the block layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory for block files.
    pub data_dir: PathBuf,
    /// Page cache capacity in blocks.
    pub blocks_in_memory: usize,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            blocks_in_memory: 10_000,
            fsync_enabled: true,
        }
    }
}

impl StoreConfig {
    /// Returns the total cache size in bytes.
    pub fn cache_size_bytes(&self) -> usize {
        self.blocks_in_memory * crate::page::BLOCK_SIZE
    }
}

/// Tuning knobs for the dual-tree router and its two indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualTreeConfig {
    /// Split fraction for sorted-index leaves. High values pack the left
    /// leaf tight because appends rarely revisit it.
    pub sorted_split_frac: f64,
    /// Split fraction for unsorted-index leaves (0.5 = balanced).
    pub unsorted_split_frac: f64,
    /// Staging heap capacity in tuples (0 disables staging).
    pub heap_size: usize,
    /// Initial tolerance factor for the outlier detector.
    pub init_tolerance_factor: f64,
    /// Floor for the tolerance factor.
    pub min_tolerance_factor: f64,
    /// Expected average gap between consecutive sorted keys.
    pub expected_avg_distance: f64,
    /// Allow inserts into the interior of the sorted index's tail leaf.
    pub allow_sorted_tree_insertion: bool,
    /// Window length for the MRU query predictor (0 disables it).
    pub query_buffer_size: usize,
}

impl Default for DualTreeConfig {
    fn default() -> Self {
        Self {
            sorted_split_frac: 0.9,
            unsorted_split_frac: 0.5,
            heap_size: 0,
            init_tolerance_factor: 100.0,
            min_tolerance_factor: 20.0,
            expected_avg_distance: 2.5,
            allow_sorted_tree_insertion: true,
            query_buffer_size: 10,
        }
    }
}

impl DualTreeConfig {
    /// Validates the configuration, rejecting out-of-range knobs.
    pub fn validate(&self) -> Result<()> {
        if !(self.sorted_split_frac > 0.0 && self.sorted_split_frac <= 1.0) {
            return Err(TandemError::InvalidParameter {
                name: "sorted_split_frac".to_string(),
                value: self.sorted_split_frac.to_string(),
            });
        }
        if !(self.unsorted_split_frac > 0.0 && self.unsorted_split_frac <= 1.0) {
            return Err(TandemError::InvalidParameter {
                name: "unsorted_split_frac".to_string(),
                value: self.unsorted_split_frac.to_string(),
            });
        }
        if self.min_tolerance_factor < 0.0 {
            return Err(TandemError::InvalidParameter {
                name: "min_tolerance_factor".to_string(),
                value: self.min_tolerance_factor.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.blocks_in_memory, 10_000);
        assert!(config.fsync_enabled);
    }

    #[test]
    fn test_cache_size_bytes() {
        let config = StoreConfig::default();
        // 10,000 blocks * 4096 bytes ~= 40 MB
        assert_eq!(config.cache_size_bytes(), 10_000 * 4096);
    }

    #[test]
    fn test_store_config_serde_roundtrip() {
        let original = StoreConfig::default();
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: StoreConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.data_dir, deserialized.data_dir);
        assert_eq!(original.blocks_in_memory, deserialized.blocks_in_memory);
        assert_eq!(original.fsync_enabled, deserialized.fsync_enabled);
    }

    #[test]
    fn test_dual_tree_config_defaults() {
        let config = DualTreeConfig::default();
        assert_eq!(config.sorted_split_frac, 0.9);
        assert_eq!(config.unsorted_split_frac, 0.5);
        assert_eq!(config.heap_size, 0);
        assert_eq!(config.init_tolerance_factor, 100.0);
        assert_eq!(config.min_tolerance_factor, 20.0);
        assert_eq!(config.expected_avg_distance, 2.5);
        assert!(config.allow_sorted_tree_insertion);
        assert_eq!(config.query_buffer_size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_split_frac() {
        let mut config = DualTreeConfig::default();
        config.sorted_split_frac = 1.5;
        assert!(config.validate().is_err());

        config.sorted_split_frac = 0.0;
        assert!(config.validate().is_err());

        let mut config = DualTreeConfig::default();
        config.unsorted_split_frac = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_tolerance_floor() {
        let mut config = DualTreeConfig::default();
        config.min_tolerance_factor = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dual_tree_config_serde_roundtrip() {
        let original = DualTreeConfig {
            heap_size: 16,
            query_buffer_size: 4,
            ..Default::default()
        };
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: DualTreeConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.heap_size, deserialized.heap_size);
        assert_eq!(original.query_buffer_size, deserialized.query_buffer_size);
        assert_eq!(original.sorted_split_frac, deserialized.sorted_split_frac);
    }
}
