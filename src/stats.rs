//! Rolling-window statistics engine
//!
//! `Stats` keeps a fixed-size ring of [`Bucket`]s. Outcomes always land in
//! the newest bucket; a recurring rotation (driven by the owning breaker)
//! pushes a fresh bucket and drops the oldest so the window slides over
//! time. Two aggregation paths exist:
//!
//! - the **cheap path**, run inline after every recorded outcome, sums the
//!   per-bucket counters and carries the previously computed latency mean
//!   and percentiles forward untouched;
//! - the **snapshot path**, run on the snapshot timer, additionally gathers
//!   every latency sample across the live buckets and recomputes the mean
//!   and the configured percentile levels.
//!
//! Latency figures read between snapshots are therefore intentionally
//! stale; callers that need fresh percentiles take a snapshot.

use crate::bucket::{Bucket, CumulativeCounters};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Aggregate totals across all live buckets of one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub failed: u64,
    pub timed_out: u64,
    pub total: u64,
    pub short_circuited: u64,
    pub successful: u64,
    /// Mean latency in milliseconds, rounded. Refreshed on snapshots only.
    pub latency_mean: u64,
    /// `(level, latency_ms)` pairs for the configured percentile levels.
    /// Refreshed on snapshots only.
    pub percentiles: Vec<(f64, u64)>,
    pub cumulative: CumulativeCounters,
}

/// The rolling window itself. All mutation is funneled through the owning
/// breaker's lock, so no internal synchronization is needed.
#[derive(Debug)]
pub struct Stats {
    bucket_num: usize,
    percentile_levels: Vec<f64>,
    buckets: VecDeque<Bucket>,
    cumulative: CumulativeCounters,
    totals: Totals,
}

impl Stats {
    /// Create a window of `bucket_num` empty buckets.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_num` is 0.
    pub fn new(bucket_num: usize, percentile_levels: Vec<f64>) -> Self {
        assert!(bucket_num > 0, "window needs at least one bucket");

        let mut buckets = VecDeque::with_capacity(bucket_num);
        for _ in 0..bucket_num {
            buckets.push_back(Bucket::new());
        }

        let mut stats = Self {
            bucket_num,
            percentile_levels,
            buckets,
            cumulative: CumulativeCounters::default(),
            totals: Totals::default(),
        };
        stats.generate(true);
        stats
    }

    /// Last computed aggregate.
    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn cumulative(&self) -> &CumulativeCounters {
        &self.cumulative
    }

    /// Slide the window: append a fresh active bucket, discard the oldest.
    /// The ring length stays at `bucket_num`. Totals are not recomputed
    /// here; the next record or snapshot picks up the change.
    pub fn rotate(&mut self) {
        self.buckets.push_back(Bucket::new());
        self.buckets.pop_front();
        debug_assert_eq!(self.buckets.len(), self.bucket_num);
    }

    /// Replace every bucket with a fresh one, keeping the cumulative
    /// counters. Runs the cheap recompute, so latency figures stay stale
    /// until the next snapshot.
    pub fn reset(&mut self) -> &Totals {
        for slot in self.buckets.iter_mut() {
            *slot = Bucket::new();
        }
        self.generate(false);
        &self.totals
    }

    /// Record a success into the active bucket and refresh the counts.
    pub fn success(&mut self, latency_ms: u64) -> &Totals {
        let bucket = self.buckets.back_mut().expect("ring is never empty");
        bucket.record_success(latency_ms, &mut self.cumulative);
        self.generate(false);
        &self.totals
    }

    /// Record a failure into the active bucket and refresh the counts.
    pub fn failure(&mut self, latency_ms: u64) -> &Totals {
        let bucket = self.buckets.back_mut().expect("ring is never empty");
        bucket.record_failure(latency_ms, &mut self.cumulative);
        self.generate(false);
        &self.totals
    }

    /// Record a timeout into the active bucket and refresh the counts.
    pub fn timeout(&mut self, latency_ms: u64) -> &Totals {
        let bucket = self.buckets.back_mut().expect("ring is never empty");
        bucket.record_timeout(latency_ms, &mut self.cumulative);
        self.generate(false);
        &self.totals
    }

    /// Record a short-circuited call and refresh the counts.
    pub fn short_circuit(&mut self) -> &Totals {
        let bucket = self.buckets.back_mut().expect("ring is never empty");
        bucket.record_short_circuit(&mut self.cumulative);
        self.generate(false);
        &self.totals
    }

    /// Full recompute including latency aggregation, then zero the
    /// derivative counters. The returned totals still carry the derivative
    /// values accumulated since the previous snapshot.
    pub fn snapshot(&mut self) -> Totals {
        self.generate(true);
        let totals = self.totals.clone();
        self.cumulative.reset_derivatives();
        totals
    }

    fn generate(&mut self, include_latency: bool) {
        let mut next = Totals::default();

        for bucket in &self.buckets {
            next.total += bucket.total;
            next.failed += bucket.failed;
            next.timed_out += bucket.timed_out;
            next.successful += bucket.successful;
            next.short_circuited += bucket.short_circuited;
        }

        if include_latency {
            let mut samples: Vec<u64> = self
                .buckets
                .iter()
                .flat_map(|bucket| bucket.request_times.iter().copied())
                .collect();
            samples.sort_unstable();

            next.latency_mean = mean(&samples);
            next.percentiles = self
                .percentile_levels
                .iter()
                .map(|&level| (level, percentile(level, &samples)))
                .collect();
        } else {
            // Carry the last snapshot's latency figures forward.
            next.latency_mean = self.totals.latency_mean;
            next.percentiles = std::mem::take(&mut self.totals.percentiles);
        }

        next.cumulative = self.cumulative;
        self.totals = next;
    }

    #[cfg(test)]
    pub(crate) fn bucket_num(&self) -> usize {
        self.bucket_num
    }
}

/// Percentile by rank over an ascending sample list: level 0 is the
/// minimum, any other level takes the sample at rank `ceil(level * n) - 1`.
/// No interpolation. Empty input yields 0.
fn percentile(level: f64, sorted: &[u64]) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    if level <= 0.0 {
        return sorted[0];
    }
    let rank = (level * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Rounded mean, 0 when there are no samples.
fn mean(samples: &[u64]) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let sum: u64 = samples.iter().sum();
    (sum as f64 / samples.len() as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(bucket_num: usize) -> Stats {
        Stats::new(bucket_num, vec![0.0, 0.5, 0.9, 1.0])
    }

    #[test]
    fn test_new_window_is_empty() {
        let stats = window(3);

        assert_eq!(stats.bucket_num(), 3);
        assert_eq!(stats.totals().total, 0);
        assert_eq!(stats.totals().latency_mean, 0);
        assert_eq!(stats.totals().percentiles, vec![(0.0, 0), (0.5, 0), (0.9, 0), (1.0, 0)]);
    }

    #[test]
    fn test_cheap_path_preserves_latency_figures() {
        let mut stats = window(4);

        stats.success(100);
        stats.success(200);

        // No snapshot yet: counts move, latency figures stay at their
        // initial zeros.
        assert_eq!(stats.totals().total, 2);
        assert_eq!(stats.totals().latency_mean, 0);
        assert!(stats.totals().percentiles.iter().all(|&(_, v)| v == 0));

        let snap = stats.snapshot();
        assert_eq!(snap.latency_mean, 150);

        // Further records keep the snapshot's figures until the next one.
        stats.success(900);
        assert_eq!(stats.totals().total, 3);
        assert_eq!(stats.totals().latency_mean, 150);
    }

    #[test]
    fn test_percentile_ranks() {
        let mut stats = window(2);
        for latency in [40, 20, 10, 30] {
            stats.success(latency);
        }

        let snap = stats.snapshot();
        let lookup = |level: f64| {
            snap.percentiles
                .iter()
                .find(|&&(l, _)| l == level)
                .map(|&(_, v)| v)
                .unwrap()
        };

        // rank ceil(0.5 * 4) - 1 = 1 in ascending order
        assert_eq!(lookup(0.5), 20);
        // level 0 is the minimum
        assert_eq!(lookup(0.0), 10);
        assert_eq!(lookup(0.9), 40);
        assert_eq!(lookup(1.0), 40);
    }

    #[test]
    fn test_mean_is_rounded() {
        let mut stats = window(2);
        stats.success(1);
        stats.success(2);

        assert_eq!(stats.snapshot().latency_mean, 2);
    }

    #[test]
    fn test_rotation_ages_out_window_but_not_cumulative() {
        let mut stats = window(3);

        stats.success(10);
        stats.failure(20);
        stats.timeout(30);
        assert_eq!(stats.totals().total, 3);

        for _ in 0..3 {
            stats.rotate();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.total, 0);
        assert_eq!(snap.failed, 0);
        assert_eq!(snap.timed_out, 0);
        assert_eq!(snap.successful, 0);
        assert_eq!(stats.cumulative().count_total, 3);
        assert_eq!(stats.cumulative().count_success, 1);
        assert_eq!(stats.cumulative().count_failure, 1);
        assert_eq!(stats.cumulative().count_timeout, 1);
    }

    #[test]
    fn test_outcomes_spread_across_rotations_accumulate() {
        let mut stats = window(3);

        stats.success(10);
        stats.rotate();
        stats.failure(20);
        stats.rotate();
        stats.success(30);

        assert_eq!(stats.totals().total, 3);
        assert_eq!(stats.totals().successful, 2);
        assert_eq!(stats.totals().failed, 1);

        // One more rotation drops the oldest bucket and its success.
        stats.rotate();
        let snap = stats.snapshot();
        assert_eq!(snap.total, 2);
        assert_eq!(snap.successful, 1);
    }

    #[test]
    fn test_cumulative_matches_recorded_outcomes() {
        let mut stats = window(4);
        let mut expected = 0u64;

        for round in 0..10 {
            stats.success(round);
            stats.failure(round);
            expected += 2;
            if round % 3 == 0 {
                stats.rotate();
            }
            assert_eq!(stats.cumulative().count_total, expected);
        }
    }

    #[test]
    fn test_reset_clears_window_keeps_cumulative_and_percentiles() {
        let mut stats = window(3);
        stats.success(50);
        stats.success(70);
        let snap = stats.snapshot();
        assert_eq!(snap.latency_mean, 60);

        stats.reset();

        assert_eq!(stats.totals().total, 0);
        assert_eq!(stats.cumulative().count_success, 2);
        // reset runs the cheap path only; latency figures survive
        assert_eq!(stats.totals().latency_mean, 60);
    }

    #[test]
    fn test_snapshot_resets_derivatives_after_reporting() {
        let mut stats = window(2);
        stats.success(5);
        stats.failure(5);

        let snap = stats.snapshot();
        assert_eq!(snap.cumulative.count_total_deriv, 2);
        assert_eq!(snap.cumulative.count_success_deriv, 1);

        stats.success(5);
        let snap = stats.snapshot();
        assert_eq!(snap.cumulative.count_total_deriv, 1);
        assert_eq!(snap.cumulative.count_total, 3);
    }

    #[test]
    fn test_short_circuits_tracked_separately() {
        let mut stats = window(2);
        stats.short_circuit();
        stats.short_circuit();
        stats.success(10);

        assert_eq!(stats.totals().short_circuited, 2);
        assert_eq!(stats.totals().total, 1);
        assert_eq!(stats.cumulative().count_short_circuited, 2);
    }
}
