//! Ringbreaker - Async circuit breaker with rolling-window statistics
//!
//! This crate wraps fallible async operations in a circuit breaker:
//! - Rolling time-bucketed statistics window with latency percentiles
//! - Closed/Open state machine with rate-based tripping
//! - Per-call timeouts, fallbacks and short-circuit rejection
//! - Recovery via cooldown timer or an optional health check probe
//! - Periodic snapshots publishable to a monitoring registry
//!
//! # Example
//!
//! ```rust,no_run
//! use ringbreaker::Brakes;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let brake: Brakes<u64, String, String> = Brakes::builder("fetch_user")
//!         .threshold(0.5)
//!         .wait_threshold(10)
//!         .timeout(Duration::from_secs(2))
//!         .main_future(|user_id: u64| async move {
//!             // Your service call here
//!             Ok::<_, String>(format!("user {user_id}"))
//!         })
//!         .on_open(|name| println!("Circuit {} opened!", name))
//!         .build();
//!
//!     match brake.execute(42).await {
//!         Ok(user) => println!("got {user}"),
//!         Err(e) => println!("call failed: {e}"),
//!     }
//! }
//! ```

pub mod adapter;
pub mod bucket;
pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod classifier;
pub mod errors;
pub mod registry;
pub mod stats;

pub use adapter::{CallAdapter, Completion};
pub use bucket::{Bucket, CumulativeCounters};
pub use builder::BrakesBuilder;
pub use callbacks::Callbacks;
pub use circuit::{Brakes, CircuitOptions, Config, SubCircuit};
pub use classifier::{DefaultClassifier, FailureClassifier, FailureContext, PredicateClassifier};
pub use errors::{BreakerError, InvalidBucketField};
pub use registry::{MemoryRegistry, NullRegistry, StatsRegistry};
pub use stats::{Stats, Totals};

use serde::{Deserialize, Serialize};

/// One periodic statistics report for a breaker, emitted on the snapshot
/// interval and pushed to listeners and the configured registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Breaker name.
    pub name: String,
    /// Breaker group, for registry-side aggregation.
    pub group: String,
    /// Emission time as milliseconds since the Unix epoch.
    pub time: u64,
    /// Whether the circuit was open at emission time.
    pub open: bool,
    /// Configured cooldown before an open circuit re-closes.
    pub circuit_duration_ms: u64,
    /// Configured success-rate threshold.
    pub threshold: f64,
    /// Configured minimum request volume before tripping.
    pub wait_threshold: u64,
    /// Window aggregate at emission time, with freshly computed latency
    /// mean and percentiles.
    pub stats: Totals,
}
