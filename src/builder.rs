//! Builder API for ergonomic breaker configuration

use crate::{
    Snapshot,
    adapter::{CallAdapter, Completion},
    callbacks::Callbacks,
    circuit::{Brakes, BreakerParts, Config},
    classifier::FailureClassifier,
    registry::StatsRegistry,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating breakers with a fluent API.
///
/// `A` is the argument type of the wrapped operation, `T` its success type
/// and `E` its error type. [`build`](Self::build) starts the window timers,
/// so it must run inside a Tokio runtime.
pub struct BrakesBuilder<A, T, E> {
    name: String,
    group: String,
    config: Config,
    main: Option<CallAdapter<A, T, E>>,
    fallback: Option<CallAdapter<A, T, E>>,
    health_check: Option<CallAdapter<(), (), E>>,
    classifier: Option<Arc<dyn FailureClassifier<E>>>,
    registry: Option<Arc<dyn StatsRegistry>>,
    callbacks: Callbacks<E>,
}

impl<A, T, E> Default for BrakesBuilder<A, T, E> {
    fn default() -> Self {
        Self::new("defaultBrake")
    }
}

impl<A, T, E> BrakesBuilder<A, T, E> {
    /// Create a new builder for a breaker with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: "defaultBrakeGroup".to_string(),
            config: Config::default(),
            main: None,
            fallback: None,
            health_check: None,
            classifier: None,
            registry: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Set the breaker group, used by registries for aggregation
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the width of one statistics bucket
    pub fn bucket_span(mut self, span: Duration) -> Self {
        self.config.bucket_span = span;
        self
    }

    /// Set the number of buckets in the rolling window
    pub fn bucket_num(mut self, num: usize) -> Self {
        self.config.bucket_num = num;
        self
    }

    /// Set the percentile levels (0.0-1.0) computed on snapshots
    pub fn percentiles(mut self, levels: Vec<f64>) -> Self {
        self.config.percentiles = levels;
        self
    }

    /// Set the interval between snapshot emissions
    pub fn stat_interval(mut self, interval: Duration) -> Self {
        self.config.stat_interval = interval;
        self
    }

    /// Set the cooldown before an open circuit re-closes
    pub fn circuit_duration(mut self, duration: Duration) -> Self {
        self.config.circuit_duration = duration;
        self
    }

    /// Set the minimum call volume before the threshold is evaluated
    pub fn wait_threshold(mut self, volume: u64) -> Self {
        self.config.wait_threshold = volume;
        self
    }

    /// Set the success-rate threshold (0.0-1.0)
    /// Circuit opens when (successful / total) drops below this value
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.config.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the per-call timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the health check polling interval
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.config.health_check_interval = interval;
        self
    }

    /// Set the jitter factor for the cooldown (0.0 = no jitter)
    /// Uses chrono-machines formula: duration * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Control whether propagated errors are prefixed with the breaker name
    pub fn modify_error(mut self, modify: bool) -> Self {
        self.config.modify_error = modify;
        self
    }

    /// Set the main operation from a prebuilt adapter
    pub fn main(mut self, operation: CallAdapter<A, T, E>) -> Self {
        self.main = Some(operation);
        self
    }

    /// Set the fallback from a prebuilt adapter. The fallback runs when the
    /// main operation fails, times out or is short-circuited; its outcomes
    /// never enter the statistics window.
    pub fn fallback(mut self, fallback: CallAdapter<A, T, E>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Set the health check from a prebuilt adapter. When set, an open
    /// circuit recovers by polling this probe instead of waiting out the
    /// cooldown.
    pub fn health_check(mut self, check: CallAdapter<(), (), E>) -> Self {
        self.health_check = Some(check);
        self
    }

    /// Set a classifier deciding which errors count against the window
    pub fn classifier(mut self, classifier: Arc<dyn FailureClassifier<E>>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Set the registry this breaker registers with and publishes
    /// snapshots to
    pub fn registry(mut self, registry: Arc<dyn StatsRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set callback for every execution attempt
    pub fn on_exec<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_exec = Some(Arc::new(f));
        self
    }

    /// Set callback for successful calls, with the latency in milliseconds
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u64) + Send + Sync + 'static,
    {
        self.callbacks.on_success = Some(Arc::new(f));
        self
    }

    /// Set callback for timed-out calls
    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u64, u64) + Send + Sync + 'static,
    {
        self.callbacks.on_timeout = Some(Arc::new(f));
        self
    }

    /// Set callback for failed calls
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u64, &E, u64) + Send + Sync + 'static,
    {
        self.callbacks.on_failure = Some(Arc::new(f));
        self
    }

    /// Set callback for when the circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when the circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for failed health check probes
    pub fn on_health_check_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &E) + Send + Sync + 'static,
    {
        self.callbacks.on_health_check_failed = Some(Arc::new(f));
        self
    }

    /// Set callback for every emitted snapshot
    pub fn on_snapshot<F>(mut self, f: F) -> Self
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.callbacks.on_snapshot = Some(Arc::new(f));
        self
    }
}

impl<A, T, E> BrakesBuilder<A, T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Set the main operation from a future-returning function
    pub fn main_future<F, Fut>(self, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.main(CallAdapter::future(f))
    }

    /// Set the main operation from a callback-style function
    pub fn main_callback<F>(self, f: F) -> Self
    where
        F: Fn(A, Completion<T, E>) + Send + Sync + 'static,
    {
        self.main(CallAdapter::callback(f))
    }

    /// Set the fallback from a future-returning function
    pub fn fallback_future<F, Fut>(self, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.fallback(CallAdapter::future(f))
    }

    /// Set the health check from a future-returning function
    pub fn health_check_future<F, Fut>(self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.health_check(CallAdapter::future(move |(): ()| f()))
    }

    /// Build the breaker and start its window timers.
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> Brakes<A, T, E>
    where
        A: Clone + Send + 'static,
    {
        Brakes::with_parts(BreakerParts {
            name: self.name,
            group: self.group,
            config: self.config,
            main: self.main,
            fallback: self.fallback,
            health_check: self.health_check,
            classifier: self.classifier,
            registry: self.registry,
            callbacks: self.callbacks,
        })
    }
}
