//! Adaptive outlier detection for the sorted-run boundary.
//!
//! The detector keeps a running mean of the gaps between consecutive keys
//! admitted to the sorted index. A new key whose gap from the previous one
//! reaches `avg_gap * tolerance` is classified as an outlier and kept out
//! of the sorted run. The tolerance factor itself adapts: while the
//! observed mean gap stays near the expected gap the tolerance resets to
//! its initial value, and once the mean drifts above it the tolerance
//! decays proportionally, clamped to a floor.

use tandem_common::Key;

/// Sentinel for "fewer than two keys seen".
const AVG_GAP_UNSET: f64 = -1.0;

/// Slack added to the expected gap before the tolerance starts decaying.
const GAP_SLACK: f64 = 0.5;

/// Per-key outlier predicate with adaptive tolerance.
#[derive(Debug, Clone)]
pub struct OutlierDetector<K> {
    /// Last key admitted to the sorted run.
    prev_key: Option<K>,
    /// Running mean gap between admitted keys (AVG_GAP_UNSET until two
    /// keys have been seen).
    avg_gap: f64,
    /// Current tolerance factor.
    tolerance: f64,
    /// Initial tolerance factor (also the reset target).
    init_tolerance: f64,
    /// Floor for the tolerance factor.
    min_tolerance: f64,
    /// Expected average gap for this workload.
    expected_gap: f64,
}

impl<K: Key> OutlierDetector<K> {
    /// Creates a detector. A non-positive `init_tolerance` disables it:
    /// no key is ever classified as an outlier.
    pub fn new(init_tolerance: f64, min_tolerance: f64, expected_gap: f64) -> Self {
        Self {
            prev_key: None,
            avg_gap: AVG_GAP_UNSET,
            tolerance: init_tolerance,
            init_tolerance,
            min_tolerance,
            expected_gap,
        }
    }

    /// Returns the current tolerance factor.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Returns the running mean gap, if at least two keys were seen.
    pub fn avg_gap(&self) -> Option<f64> {
        if self.avg_gap < 0.0 {
            None
        } else {
            Some(self.avg_gap)
        }
    }

    /// Classifies `key` against the sorted run of current size `n`.
    ///
    /// A `true` verdict leaves the detector state untouched; a `false`
    /// verdict admits the key into the gap statistics.
    pub fn is_outlier(&mut self, key: &K, n: u64) -> bool {
        if self.tolerance <= 0.0 {
            return false;
        }

        let prev = match self.prev_key {
            None => {
                self.prev_key = Some(*key);
                return false;
            }
            Some(prev) => prev,
        };

        if self.avg_gap < 0.0 {
            // Second key: the first gap becomes the mean
            self.avg_gap = key.gap_from(&prev);
            self.prev_key = Some(*key);
            return false;
        }

        let gap = key.gap_from(&prev);
        if gap >= self.avg_gap * self.tolerance {
            return true;
        }

        let samples = n.max(1) as f64;
        self.avg_gap = (self.avg_gap * (samples - 1.0) + gap) / samples;
        self.prev_key = Some(*key);
        self.adjust_tolerance();
        false
    }

    /// Folds an interior tail-leaf insert into the gap statistics.
    ///
    /// Such inserts land inside the tail leaf's key range, so they pull
    /// the observed mean toward a gap of 1.
    pub fn update_avg_distance(&mut self, n: u64) {
        if self.avg_gap < 0.0 {
            return;
        }
        let samples = n.max(1) as f64;
        self.avg_gap = (self.avg_gap * (samples - 1.0) + 1.0) / samples;
        self.adjust_tolerance();
    }

    /// Ratio-based tolerance adjustment: reset while the mean gap is near
    /// the expected gap, decay proportionally once it drifts above.
    fn adjust_tolerance(&mut self) {
        if self.expected_gap > 1.0 {
            if self.avg_gap < self.expected_gap + GAP_SLACK {
                self.tolerance = self.init_tolerance;
            } else {
                self.tolerance *= self.expected_gap / self.avg_gap;
            }
        }
        if self.tolerance < self.min_tolerance {
            self.tolerance = self.min_tolerance;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_two_keys_never_outliers() {
        let mut detector = OutlierDetector::<i32>::new(100.0, 20.0, 2.5);

        assert!(!detector.is_outlier(&10, 0));
        assert!(detector.avg_gap().is_none());

        assert!(!detector.is_outlier(&13, 1));
        assert_eq!(detector.avg_gap(), Some(3.0));
    }

    #[test]
    fn test_dense_run_admits_everything() {
        let mut detector = OutlierDetector::<i32>::new(100.0, 20.0, 1.0);

        for (n, key) in (1..=1000).enumerate() {
            assert!(
                !detector.is_outlier(&key, n as u64),
                "key {} misclassified",
                key
            );
        }
        let avg = detector.avg_gap().unwrap();
        assert!((avg - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_large_jump_is_outlier_and_leaves_state() {
        // expected_gap = 1 keeps the tolerance pinned at its initial value
        let mut detector = OutlierDetector::<i32>::new(100.0, 20.0, 1.0);
        for (n, key) in (1..=1000).enumerate() {
            detector.is_outlier(&key, n as u64);
        }

        let avg_before = detector.avg_gap().unwrap();
        assert!(detector.is_outlier(&200_000, 1000));
        // Outlier verdicts must not disturb the statistics
        assert_eq!(detector.avg_gap(), Some(avg_before));

        // The run continues from the last admitted key
        assert!(!detector.is_outlier(&1001, 1000));
    }

    #[test]
    fn test_disabled_detector_admits_outliers() {
        let mut detector = OutlierDetector::<i32>::new(0.0, 0.0, 2.5);

        assert!(!detector.is_outlier(&1, 0));
        assert!(!detector.is_outlier(&2, 1));
        assert!(!detector.is_outlier(&1_000_000, 2));
    }

    #[test]
    fn test_tolerance_resets_near_expected_gap() {
        let mut detector = OutlierDetector::<i32>::new(100.0, 20.0, 2.0);

        // Gaps of 2 keep avg_gap below expected + slack: tolerance resets
        let mut n = 0u64;
        for key in (2..200).step_by(2) {
            assert!(!detector.is_outlier(&key, n));
            n += 1;
        }
        assert_eq!(detector.tolerance(), 100.0);
    }

    #[test]
    fn test_tolerance_decays_above_expected_gap() {
        let mut detector = OutlierDetector::<i32>::new(100.0, 20.0, 2.0);

        // Constant gaps of 10 push avg_gap to ~10, well above 2 + 0.5
        let mut n = 0u64;
        for key in (10..2000).step_by(10) {
            detector.is_outlier(&key, n);
            n += 1;
        }
        assert!(detector.tolerance() < 100.0);
        assert!(detector.tolerance() >= 20.0);
    }

    #[test]
    fn test_tolerance_clamped_to_floor() {
        let mut detector = OutlierDetector::<i32>::new(100.0, 90.0, 2.0);

        let mut n = 0u64;
        for key in (100..100_000).step_by(100) {
            detector.is_outlier(&key, n);
            n += 1;
        }
        assert_eq!(detector.tolerance(), 90.0);
    }

    #[test]
    fn test_update_avg_distance_pulls_toward_one() {
        let mut detector = OutlierDetector::<i32>::new(100.0, 20.0, 1.0);

        detector.is_outlier(&10, 0);
        detector.is_outlier(&20, 1); // avg_gap = 10
        let before = detector.avg_gap().unwrap();

        detector.update_avg_distance(3);
        let after = detector.avg_gap().unwrap();
        assert!(after < before);
    }

    #[test]
    fn test_update_avg_distance_before_priming_is_noop() {
        let mut detector = OutlierDetector::<i32>::new(100.0, 20.0, 2.5);
        detector.update_avg_distance(1);
        assert!(detector.avg_gap().is_none());
    }
}
