//! Time-slice counters for the rolling statistics window
//!
//! A `Bucket` covers one fixed span of the window. Every recorded outcome
//! lands in exactly one bucket (whichever is active at that instant) and
//! simultaneously bumps the window-wide cumulative counters.

use crate::errors::InvalidBucketField;
use serde::{Deserialize, Serialize};

/// Process-lifetime counters shared by every bucket of one window.
///
/// The `*_deriv` fields count outcomes since the last snapshot emission and
/// are zeroed after each snapshot, so consumers that only accept increasing
/// counters can diff against them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeCounters {
    pub count_total: u64,
    pub count_success: u64,
    pub count_failure: u64,
    pub count_timeout: u64,
    pub count_short_circuited: u64,
    pub count_total_deriv: u64,
    pub count_success_deriv: u64,
    pub count_failure_deriv: u64,
    pub count_timeout_deriv: u64,
    pub count_short_circuited_deriv: u64,
}

impl CumulativeCounters {
    /// Zero the since-last-snapshot counters. Called after every snapshot
    /// emission; the monotonic counts are never reset.
    pub fn reset_derivatives(&mut self) {
        self.count_total_deriv = 0;
        self.count_success_deriv = 0;
        self.count_failure_deriv = 0;
        self.count_timeout_deriv = 0;
        self.count_short_circuited_deriv = 0;
    }
}

/// A single time slice of the rolling window.
///
/// Mutated only by the owning window while it is the active (newest) slot;
/// once rotated out it is read-only until it ages off the ring. Latencies
/// are recorded in milliseconds.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    pub failed: u64,
    pub successful: u64,
    pub total: u64,
    pub short_circuited: u64,
    pub timed_out: u64,
    pub request_times: Vec<u64>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a successful call.
    pub fn record_success(&mut self, latency_ms: u64, cumulative: &mut CumulativeCounters) {
        self.total += 1;
        self.successful += 1;
        self.request_times.push(latency_ms);
        cumulative.count_total += 1;
        cumulative.count_total_deriv += 1;
        cumulative.count_success += 1;
        cumulative.count_success_deriv += 1;
    }

    /// Register a failed call.
    pub fn record_failure(&mut self, latency_ms: u64, cumulative: &mut CumulativeCounters) {
        self.total += 1;
        self.failed += 1;
        self.request_times.push(latency_ms);
        cumulative.count_total += 1;
        cumulative.count_total_deriv += 1;
        cumulative.count_failure += 1;
        cumulative.count_failure_deriv += 1;
    }

    /// Register a timed-out call.
    pub fn record_timeout(&mut self, latency_ms: u64, cumulative: &mut CumulativeCounters) {
        self.total += 1;
        self.timed_out += 1;
        self.request_times.push(latency_ms);
        cumulative.count_total += 1;
        cumulative.count_total_deriv += 1;
        cumulative.count_timeout += 1;
        cumulative.count_timeout_deriv += 1;
    }

    /// Register a call rejected because the circuit was open.
    ///
    /// Short circuits carry no latency sample and do not count toward
    /// `total`; they only drive the dedicated counters.
    pub fn record_short_circuit(&mut self, cumulative: &mut CumulativeCounters) {
        self.short_circuited += 1;
        cumulative.count_short_circuited += 1;
        cumulative.count_short_circuited_deriv += 1;
    }

    /// Fraction of `total` held by the named counter, in `[0, 1]`.
    ///
    /// Returns 0 for every field while the bucket is empty. Unknown field
    /// names are an error.
    pub fn percent(&self, field: &str) -> Result<f64, InvalidBucketField> {
        let value = match field {
            "failed" => self.failed,
            "successful" => self.successful,
            "total" => self.total,
            "short_circuited" => self.short_circuited,
            "timed_out" => self.timed_out,
            _ => return Err(InvalidBucketField::new(field)),
        };

        if self.total == 0 {
            return Ok(0.0);
        }

        Ok(value as f64 / self.total as f64)
    }
}
