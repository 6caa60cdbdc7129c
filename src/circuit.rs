//! Circuit breaker implementation using state machines
//!
//! The breaker wraps async operations and tracks their outcomes in a
//! rolling statistics window. A state machine with guarded transitions
//! decides when the circuit trips open and when it may close again;
//! recovery runs either on a cooldown timer or, when a health check is
//! configured, by polling the probe until it passes.

use crate::{
    Snapshot,
    adapter::CallAdapter,
    bucket::CumulativeCounters,
    builder::BrakesBuilder,
    callbacks::Callbacks,
    classifier::{FailureClassifier, FailureContext},
    errors::BreakerError,
    registry::StatsRegistry,
    stats::{Stats, Totals},
};
use state_machines::state_machine;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Width of one statistics bucket; the window slides by this step
    pub bucket_span: Duration,

    /// Number of buckets kept in the rolling window
    pub bucket_num: usize,

    /// Percentile levels (0.0-1.0) computed on each snapshot
    pub percentiles: Vec<f64>,

    /// Interval between snapshot emissions
    pub stat_interval: Duration,

    /// Cooldown before an open circuit re-closes (when no health check is set)
    pub circuit_duration: Duration,

    /// Minimum number of completed calls in the window before the
    /// success-rate threshold is evaluated
    pub wait_threshold: u64,

    /// Success-rate threshold (0.0-1.0); the circuit opens when the
    /// fraction of successful calls drops below this value
    pub threshold: f64,

    /// Per-call timeout for the wrapped operation
    pub timeout: Duration,

    /// Polling interval for the health check probe while the circuit is open
    pub health_check_interval: Duration,

    /// Jitter factor for the cooldown (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: duration * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,

    /// Prefix propagated operation and timeout errors with the breaker name
    pub modify_error: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket_span: Duration::from_millis(1000),
            bucket_num: 60,
            percentiles: vec![0.0, 0.25, 0.5, 0.75, 0.9, 0.95, 0.99, 0.995, 1.0],
            stat_interval: Duration::from_millis(1200),
            circuit_duration: Duration::from_secs(30),
            wait_threshold: 100,
            threshold: 0.5,
            timeout: Duration::from_secs(15),
            health_check_interval: Duration::from_secs(5),
            jitter_factor: 0.0,
            modify_error: true,
        }
    }
}

/// Circuit breaker context - shared data across all states
#[derive(Debug, Clone)]
pub struct CircuitContext {
    pub name: String,
    pub threshold: f64,
    pub wait_threshold: u64,
    pub stats: Arc<Mutex<Stats>>,
}

impl Default for CircuitContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            threshold: 0.5,
            wait_threshold: 100,
            stats: Arc::new(Mutex::new(Stats::new(60, Vec::new()))),
        }
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    /// Seconds since breaker start, on the breaker's monotonic clock
    pub opened_at: f64,
}

// Define the circuit breaker state machine with dynamic mode
state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,  // Enable dynamic mode for runtime state transitions

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: Closed, to: Open }
        }
        reset {
            guards: [may_reset],
            transition: { from: Open, to: Closed }
        }
    }
}

// Guards for dynamic mode - implemented on typestate machines
impl Circuit<Closed> {
    /// Check if the window has enough volume and a bad enough success rate
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        let stats = ctx.stats.lock().unwrap();
        let totals = stats.totals();

        // Below the volume threshold the ratio is not meaningful yet
        if totals.total == 0 || totals.total <= ctx.wait_threshold {
            return false;
        }

        (totals.successful as f64 / totals.total as f64) < ctx.threshold
    }
}

impl Circuit<Open> {
    /// Closing is timer/health-check driven, never guarded on stats
    fn may_reset(&self, _ctx: &CircuitContext) -> bool {
        true
    }
}

/// Handles for the background tasks a breaker runs.
#[derive(Debug, Default)]
struct TimerHandles {
    rotation: Option<JoinHandle<()>>,
    snapshot: Option<JoinHandle<()>>,
    health: Option<JoinHandle<()>>,
    cooldown: Option<JoinHandle<()>>,
}

/// Shared state behind one breaker and all of its sub-circuits.
///
/// Background tasks hold a `Weak` to the core, so dropping every `Brakes`
/// and `SubCircuit` handle stops them on their next tick.
pub(crate) struct BreakerCore<E> {
    name: String,
    group: String,
    config: Config,
    stats: Arc<Mutex<Stats>>,
    machine: Mutex<DynamicCircuit>,
    /// Bumped on every open; in-flight calls that started under an older
    /// generation have their late failures and timeouts discarded.
    generation: AtomicU64,
    callbacks: Callbacks<E>,
    health_check: Option<CallAdapter<(), (), E>>,
    registry: Option<Arc<dyn StatsRegistry>>,
    timers: Mutex<TimerHandles>,
    started: Instant,
    destroyed: AtomicBool,
    weak: Weak<BreakerCore<E>>,
}

impl<E: Send + 'static> BreakerCore<E> {
    fn is_open(&self) -> bool {
        self.machine.lock().unwrap().current_state() == "Open"
    }

    fn state_name(&self) -> &'static str {
        self.machine.lock().unwrap().current_state()
    }

    /// Breaker name for error rendering, honoring `modify_error`.
    fn error_label(&self) -> Option<String> {
        if self.config.modify_error && !self.name.is_empty() {
            Some(self.name.clone())
        } else {
            None
        }
    }

    /// Try to trip the circuit against the current window. Lock order is
    /// machine before stats; the trip guard takes the stats lock itself.
    fn evaluate(&self) {
        let opened = {
            let mut machine = self.machine.lock().unwrap();
            if machine.current_state() == "Open" {
                return;
            }
            if machine.handle(CircuitEvent::Trip).is_ok() {
                if let Some(data) = machine.open_data_mut() {
                    data.opened_at = self.started.elapsed().as_secs_f64();
                }
                true
            } else {
                false
            }
        };

        if opened {
            self.after_open();
        }
    }

    /// Open-state bookkeeping: notify, advance the generation and start
    /// the recovery path.
    fn after_open(&self) {
        self.callbacks.trigger_open(&self.name);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(circuit = %self.name, generation, "circuit opened");

        let mut timers = self.timers.lock().unwrap();
        if let Some(check) = &self.health_check {
            let running = timers.health.as_ref().is_some_and(|task| !task.is_finished());
            if !running {
                timers.health = Some(self.spawn_health_task(check.clone()));
            }
        } else {
            timers.cooldown = Some(self.spawn_cooldown_task());
        }
    }

    fn close_circuit(&self) {
        let closed = self.machine.lock().unwrap().handle(CircuitEvent::Reset).is_ok();
        if closed {
            self.callbacks.trigger_close(&self.name);
            tracing::debug!(circuit = %self.name, "circuit closed");
        }
    }

    /// Cooldown duration, jittered via chrono-machines when
    /// `jitter_factor` > 0.
    fn cooldown_delay(&self) -> Duration {
        if self.config.jitter_factor > 0.0 {
            let base_ms = self.config.circuit_duration.as_millis() as u64;
            let policy = chrono_machines::Policy {
                max_attempts: 1,
                base_delay_ms: base_ms,
                multiplier: 1.0,
                max_delay_ms: base_ms,
            };
            Duration::from_millis(policy.calculate_delay(1, self.config.jitter_factor))
        } else {
            self.config.circuit_duration
        }
    }

    fn spawn_cooldown_task(&self) -> JoinHandle<()> {
        let weak = self.weak.clone();
        let delay = self.cooldown_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(core) = weak.upgrade() {
                core.stats.lock().unwrap().reset();
                core.close_circuit();
            }
        })
    }

    /// Poll the health check until it passes, then reset and close. Probes
    /// run serialized; a slow probe delays the next tick rather than
    /// stacking up.
    fn spawn_health_task(&self, check: CallAdapter<(), (), E>) -> JoinHandle<()> {
        let weak = self.weak.clone();
        let period = self.config.health_check_interval;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                let Some(core) = weak.upgrade() else { break };
                if !core.is_open() {
                    break;
                }
                match check.invoke(()).await {
                    Ok(()) => {
                        core.stats.lock().unwrap().reset();
                        core.close_circuit();
                        break;
                    }
                    Err(err) => {
                        core.callbacks.trigger_health_check_failed(&core.name, &err);
                        tracing::debug!(circuit = %core.name, "health check failed");
                    }
                }
            }
        })
    }

    /// Start the window rotation and snapshot timers. Called once at build.
    fn spawn_window_timers(&self) {
        let mut timers = self.timers.lock().unwrap();

        let weak = self.weak.clone();
        let span = self.config.bucket_span;
        timers.rotation = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + span;
            let mut ticker = tokio::time::interval_at(start, span);
            loop {
                ticker.tick().await;
                let Some(core) = weak.upgrade() else { break };
                core.stats.lock().unwrap().rotate();
            }
        }));

        let weak = self.weak.clone();
        let period = self.config.stat_interval;
        timers.snapshot = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                let Some(core) = weak.upgrade() else { break };
                core.emit_snapshot();
            }
        }));
    }

    fn emit_snapshot(&self) {
        let stats = self.stats.lock().unwrap().snapshot();
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let snapshot = Snapshot {
            name: self.name.clone(),
            group: self.group.clone(),
            time,
            open: self.is_open(),
            circuit_duration_ms: self.config.circuit_duration.as_millis() as u64,
            threshold: self.config.threshold,
            wait_threshold: self.config.wait_threshold,
            stats,
        };

        self.callbacks.trigger_snapshot(&snapshot);
        if let Some(registry) = &self.registry {
            registry.publish(&snapshot);
        }
    }

    /// Deregister and stop every background task. Idempotent.
    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = &self.registry {
            registry.deregister(&self.name);
        }
        let mut timers = self.timers.lock().unwrap();
        for handle in [
            timers.rotation.take(),
            timers.snapshot.take(),
            timers.health.take(),
            timers.cooldown.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
        tracing::debug!(circuit = %self.name, "breaker destroyed");
    }

    /// Run one protected call against this core.
    async fn exec_unit<A, T>(
        &self,
        unit: &CircuitUnit<A, T, E>,
        args: A,
    ) -> Result<T, BreakerError<E>>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
    {
        self.callbacks.trigger_exec(&self.name);

        if self.is_open() {
            // Rejected calls count only against the short-circuit counters
            self.stats.lock().unwrap().short_circuit();
            if let Some(fallback) = &unit.fallback {
                return fallback
                    .invoke(args)
                    .await
                    .map_err(|source| BreakerError::Execution { circuit: None, source });
            }
            let totals = self.stats.lock().unwrap().totals().clone();
            return Err(BreakerError::CircuitBroken {
                circuit: self.name.clone(),
                totals,
                threshold: self.config.threshold,
            });
        }

        let exec_generation = self.generation.load(Ordering::SeqCst);
        let timeout = unit.timeout.unwrap_or(self.config.timeout);
        let start = Instant::now();

        // The operation runs on its own task so a timeout abandons it
        // without cancelling it.
        let mut handle = tokio::spawn(unit.operation.invoke(args.clone()));
        let outcome = tokio::select! {
            joined = &mut handle => Some(match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => panic!("operation task failed: {e}"),
            }),
            _ = tokio::time::sleep(timeout) => None,
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Some(Ok(value)) => {
                self.callbacks.trigger_success(&self.name, latency_ms);
                self.stats.lock().unwrap().success(latency_ms);
                self.evaluate();
                Ok(value)
            }
            None => {
                self.callbacks
                    .trigger_timeout(&self.name, latency_ms, exec_generation);
                if exec_generation == self.generation.load(Ordering::SeqCst) {
                    self.stats.lock().unwrap().timeout(latency_ms);
                    self.evaluate();
                }
                if let Some(fallback) = &unit.fallback {
                    return fallback
                        .invoke(args)
                        .await
                        .map_err(|source| BreakerError::Execution { circuit: None, source });
                }
                Err(BreakerError::Timeout {
                    circuit: self.error_label(),
                })
            }
            Some(Err(error)) => {
                let counts = match &unit.classifier {
                    Some(classifier) => classifier.is_failure(&FailureContext {
                        circuit_name: &self.name,
                        error: &error,
                        latency_ms,
                    }),
                    None => true,
                };
                if counts {
                    self.callbacks
                        .trigger_failure(&self.name, latency_ms, &error, exec_generation);
                    if exec_generation == self.generation.load(Ordering::SeqCst) {
                        self.stats.lock().unwrap().failure(latency_ms);
                        self.evaluate();
                    }
                }
                if let Some(fallback) = &unit.fallback {
                    return fallback
                        .invoke(args)
                        .await
                        .map_err(|source| BreakerError::Execution { circuit: None, source });
                }
                Err(BreakerError::Execution {
                    circuit: self.error_label(),
                    source: error,
                })
            }
        }
    }
}

/// One protected operation bound to a breaker core: the call itself plus
/// its optional fallback, timeout override and classifier.
pub(crate) struct CircuitUnit<A, T, E> {
    pub(crate) operation: CallAdapter<A, T, E>,
    pub(crate) fallback: Option<CallAdapter<A, T, E>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) classifier: Option<Arc<dyn FailureClassifier<E>>>,
}

/// Options for sub-circuits registered on an existing breaker.
pub struct CircuitOptions<A, T, E> {
    /// Optional fallback invoked on rejection, failure or timeout
    pub fallback: Option<CallAdapter<A, T, E>>,
    /// Per-call timeout override; the breaker default applies when unset
    pub timeout: Option<Duration>,
    /// Classifier deciding which errors count against the shared window
    pub classifier: Option<Arc<dyn FailureClassifier<E>>>,
}

impl<A, T, E> Default for CircuitOptions<A, T, E> {
    fn default() -> Self {
        Self {
            fallback: None,
            timeout: None,
            classifier: None,
        }
    }
}

impl<A, T, E> CircuitOptions<A, T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: CallAdapter<A, T, E>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier<E>>) -> Self {
        self.classifier = Some(classifier);
        self
    }
}

/// Everything the builder assembles for `Brakes::with_parts`.
pub(crate) struct BreakerParts<A, T, E> {
    pub(crate) name: String,
    pub(crate) group: String,
    pub(crate) config: Config,
    pub(crate) main: Option<CallAdapter<A, T, E>>,
    pub(crate) fallback: Option<CallAdapter<A, T, E>>,
    pub(crate) health_check: Option<CallAdapter<(), (), E>>,
    pub(crate) classifier: Option<Arc<dyn FailureClassifier<E>>>,
    pub(crate) registry: Option<Arc<dyn StatsRegistry>>,
    pub(crate) callbacks: Callbacks<E>,
}

/// Circuit breaker public API.
///
/// Cheap to clone; clones share the circuit state, statistics window and
/// background timers.
pub struct Brakes<A, T, E> {
    core: Arc<BreakerCore<E>>,
    main: Option<Arc<CircuitUnit<A, T, E>>>,
}

impl<A, T, E> Clone for Brakes<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            main: self.main.clone(),
        }
    }
}

impl<A, T, E> Brakes<A, T, E>
where
    A: Clone + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create a new breaker builder
    pub fn builder(name: impl Into<String>) -> BrakesBuilder<A, T, E> {
        BrakesBuilder::new(name)
    }

    /// Assemble a breaker from builder parts and start its window timers.
    /// Must run inside a Tokio runtime.
    pub(crate) fn with_parts(parts: BreakerParts<A, T, E>) -> Self {
        let stats = Arc::new(Mutex::new(Stats::new(
            parts.config.bucket_num,
            parts.config.percentiles.clone(),
        )));

        let context = CircuitContext {
            name: parts.name.clone(),
            threshold: parts.config.threshold,
            wait_threshold: parts.config.wait_threshold,
            stats: Arc::clone(&stats),
        };
        let machine = DynamicCircuit::new(context);

        let core = Arc::new_cyclic(|weak| BreakerCore {
            name: parts.name,
            group: parts.group,
            config: parts.config,
            stats,
            machine: Mutex::new(machine),
            generation: AtomicU64::new(1),
            callbacks: parts.callbacks,
            health_check: parts.health_check,
            registry: parts.registry,
            timers: Mutex::new(TimerHandles::default()),
            started: Instant::now(),
            destroyed: AtomicBool::new(false),
            weak: weak.clone(),
        });

        if let Some(registry) = &core.registry {
            registry.register(&core.name, &core.group);
        }
        core.spawn_window_timers();

        let main = parts.main.map(|operation| {
            Arc::new(CircuitUnit {
                operation,
                fallback: parts.fallback,
                timeout: None,
                classifier: parts.classifier,
            })
        });

        Self { core, main }
    }

    /// Execute the main operation with circuit breaker protection.
    pub async fn execute(&self, args: A) -> Result<T, BreakerError<E>> {
        match &self.main {
            Some(unit) => self.core.exec_unit(unit, args).await,
            None => Err(BreakerError::MissingOperation),
        }
    }

    /// Register an additional operation on this breaker. Sub-circuits share
    /// the statistics window and circuit state with the main operation; any
    /// of them can trip the circuit for all.
    pub fn sub_circuit<A2, T2>(
        &self,
        operation: CallAdapter<A2, T2, E>,
        options: CircuitOptions<A2, T2, E>,
    ) -> SubCircuit<A2, T2, E>
    where
        A2: Clone + Send + 'static,
        T2: Send + 'static,
    {
        SubCircuit {
            core: Arc::clone(&self.core),
            unit: Arc::new(CircuitUnit {
                operation,
                fallback: options.fallback,
                timeout: options.timeout,
                classifier: options.classifier,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn group(&self) -> &str {
        &self.core.group
    }

    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Check if circuit is open
    pub fn is_open(&self) -> bool {
        self.core.is_open()
    }

    /// Check if circuit is closed
    pub fn is_closed(&self) -> bool {
        !self.core.is_open()
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.core.state_name()
    }

    /// Current window aggregate. Latency figures refresh on snapshots only.
    pub fn totals(&self) -> Totals {
        self.core.stats.lock().unwrap().totals().clone()
    }

    /// Process-lifetime counters.
    pub fn cumulative(&self) -> CumulativeCounters {
        *self.core.stats.lock().unwrap().cumulative()
    }

    /// Current circuit generation. Starts at 1 and advances on every open.
    pub fn generation(&self) -> u64 {
        self.core.generation.load(Ordering::SeqCst)
    }

    /// Deregister from the monitoring registry and stop every background
    /// task. Further calls still execute but the window no longer rotates.
    pub fn destroy(&self) {
        self.core.destroy();
    }
}

/// An additional operation sharing a breaker's circuit state and window.
pub struct SubCircuit<A, T, E> {
    core: Arc<BreakerCore<E>>,
    unit: Arc<CircuitUnit<A, T, E>>,
}

impl<A, T, E> Clone for SubCircuit<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            unit: Arc::clone(&self.unit),
        }
    }
}

impl<A, T, E> SubCircuit<A, T, E>
where
    A: Clone + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Execute this sub-circuit's operation with breaker protection.
    pub async fn execute(&self, args: A) -> Result<T, BreakerError<E>> {
        self.core.exec_unit(&self.unit, args).await
    }

    pub fn is_open(&self) -> bool {
        self.core.is_open()
    }
}
