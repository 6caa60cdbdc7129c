//! Observer hooks for breaker notifications
//!
//! Replaces the event-emitter surface of typical breaker implementations
//! with an explicit listener set. Delivery is synchronous and in-line at
//! the point of emission; listeners must not block.

use crate::Snapshot;
use std::sync::Arc;

/// Listener slots for every notification the breaker emits. Latencies are
/// in milliseconds; `generation` identifies the circuit generation the call
/// started under.
pub struct Callbacks<E> {
    pub on_exec: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_success: Option<Arc<dyn Fn(&str, u64) + Send + Sync>>,
    pub on_timeout: Option<Arc<dyn Fn(&str, u64, u64) + Send + Sync>>,
    pub on_failure: Option<Arc<dyn Fn(&str, u64, &E, u64) + Send + Sync>>,
    pub on_open: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_close: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_health_check_failed: Option<Arc<dyn Fn(&str, &E) + Send + Sync>>,
    pub on_snapshot: Option<Arc<dyn Fn(&Snapshot) + Send + Sync>>,
}

impl<E> Callbacks<E> {
    pub fn new() -> Self {
        Self {
            on_exec: None,
            on_success: None,
            on_timeout: None,
            on_failure: None,
            on_open: None,
            on_close: None,
            on_health_check_failed: None,
            on_snapshot: None,
        }
    }

    pub fn trigger_exec(&self, circuit: &str) {
        if let Some(ref callback) = self.on_exec {
            callback(circuit);
        }
    }

    pub fn trigger_success(&self, circuit: &str, latency_ms: u64) {
        if let Some(ref callback) = self.on_success {
            callback(circuit, latency_ms);
        }
    }

    pub fn trigger_timeout(&self, circuit: &str, latency_ms: u64, generation: u64) {
        if let Some(ref callback) = self.on_timeout {
            callback(circuit, latency_ms, generation);
        }
    }

    pub fn trigger_failure(&self, circuit: &str, latency_ms: u64, error: &E, generation: u64) {
        if let Some(ref callback) = self.on_failure {
            callback(circuit, latency_ms, error, generation);
        }
    }

    pub fn trigger_open(&self, circuit: &str) {
        if let Some(ref callback) = self.on_open {
            callback(circuit);
        }
    }

    pub fn trigger_close(&self, circuit: &str) {
        if let Some(ref callback) = self.on_close {
            callback(circuit);
        }
    }

    pub fn trigger_health_check_failed(&self, circuit: &str, error: &E) {
        if let Some(ref callback) = self.on_health_check_failed {
            callback(circuit, error);
        }
    }

    pub fn trigger_snapshot(&self, snapshot: &Snapshot) {
        if let Some(ref callback) = self.on_snapshot {
            callback(snapshot);
        }
    }
}

impl<E> Default for Callbacks<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Callbacks<E> {
    fn clone(&self) -> Self {
        Self {
            on_exec: self.on_exec.clone(),
            on_success: self.on_success.clone(),
            on_timeout: self.on_timeout.clone(),
            on_failure: self.on_failure.clone(),
            on_open: self.on_open.clone(),
            on_close: self.on_close.clone(),
            on_health_check_failed: self.on_health_check_failed.clone(),
            on_snapshot: self.on_snapshot.clone(),
        }
    }
}

impl<E> std::fmt::Debug for Callbacks<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_exec", &self.on_exec.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_timeout", &self.on_timeout.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_health_check_failed", &self.on_health_check_failed.is_some())
            .field("on_snapshot", &self.on_snapshot.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_unset_slots_are_noops() {
        let callbacks: Callbacks<String> = Callbacks::new();
        callbacks.trigger_exec("test");
        callbacks.trigger_success("test", 1);
        callbacks.trigger_failure("test", 1, &"err".to_string(), 1);
    }

    #[test]
    fn test_triggers_forward_arguments() {
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = Arc::clone(&seen);

        let mut callbacks: Callbacks<String> = Callbacks::new();
        callbacks.on_timeout = Some(Arc::new(move |circuit, latency, generation| {
            assert_eq!(circuit, "svc");
            assert_eq!(latency, 7);
            assert_eq!(generation, 2);
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }));

        callbacks.trigger_timeout("svc", 7, 2);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
