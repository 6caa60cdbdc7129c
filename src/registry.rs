//! Monitoring registry boundary
//!
//! A breaker can publish its periodic snapshots to a registry so that many
//! breakers feed one monitoring stream. Aggregation, multiplexing and any
//! dashboard wire schema live outside this crate; the breaker only needs
//! the contract below. The registry is injected at build time; there is
//! no ambient process-wide singleton.

use crate::Snapshot;
use std::sync::Mutex;

/// Consumer of breaker lifecycle and snapshot events.
pub trait StatsRegistry: Send + Sync {
    /// A breaker came up under `name`/`group`.
    fn register(&self, name: &str, group: &str);

    /// The breaker named `name` was torn down.
    fn deregister(&self, name: &str);

    /// A periodic snapshot was emitted.
    fn publish(&self, snapshot: &Snapshot);
}

/// No-op registry for breakers that opt out of monitoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRegistry;

impl NullRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl StatsRegistry for NullRegistry {
    fn register(&self, _name: &str, _group: &str) {}

    fn deregister(&self, _name: &str) {}

    fn publish(&self, _snapshot: &Snapshot) {}
}

/// In-memory registry that keeps registered instances and captured
/// snapshots. Suitable for small composition roots and for tests.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    instances: Mutex<Vec<(String, String)>>,
    snapshots: Mutex<Vec<Snapshot>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently registered breakers.
    pub fn instance_count(&self) -> usize {
        self.instances.lock().unwrap().len()
    }

    /// All snapshots published so far.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().unwrap().clone()
    }
}

impl StatsRegistry for MemoryRegistry {
    fn register(&self, name: &str, group: &str) {
        self.instances
            .lock()
            .unwrap()
            .push((name.to_string(), group.to_string()));
    }

    fn deregister(&self, name: &str) {
        self.instances
            .lock()
            .unwrap()
            .retain(|(registered, _)| registered != name);
    }

    fn publish(&self, snapshot: &Snapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Totals;

    fn snapshot(name: &str) -> Snapshot {
        Snapshot {
            name: name.to_string(),
            group: "group".to_string(),
            time: 0,
            open: false,
            circuit_duration_ms: 30_000,
            threshold: 0.5,
            wait_threshold: 100,
            stats: Totals::default(),
        }
    }

    #[test]
    fn test_memory_registry_tracks_instances() {
        let registry = MemoryRegistry::new();

        registry.register("a", "g1");
        registry.register("b", "g2");
        assert_eq!(registry.instance_count(), 2);

        registry.deregister("a");
        assert_eq!(registry.instance_count(), 1);

        // deregistering an unknown name is a no-op
        registry.deregister("a");
        assert_eq!(registry.instance_count(), 1);
    }

    #[test]
    fn test_memory_registry_captures_snapshots() {
        let registry = MemoryRegistry::new();

        registry.publish(&snapshot("a"));
        registry.publish(&snapshot("b"));

        let captured = registry.snapshots();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].name, "a");
        assert_eq!(captured[1].name, "b");
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let serialized = serde_json::to_string(&snapshot("json")).unwrap();
        assert!(serialized.contains("\"name\":\"json\""));
        assert!(serialized.contains("\"count_total\":0"));
    }

    #[test]
    fn test_null_registry_discards_everything() {
        let registry = NullRegistry::new();
        registry.register("a", "g");
        registry.publish(&snapshot("a"));
        registry.deregister("a");
    }
}
