//! Metrics engine — the accumulator plus its publish lifecycle.
//!
//! Record calls lock one `std::sync::Mutex` for a few map operations and
//! return; they never suspend and never fail outward. The publish cycle
//! takes a snapshot under the same lock, publishes without holding it,
//! then locks again to reset. An increment that lands between those two
//! steps is dropped with the window.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::debug;

use tally_core::{EngineConfig, MetricsError, MetricsResult, NodeIdentity, Snapshot};

use crate::accumulator::{Accumulator, Counter, Observable};
use crate::logger::{MetricsLogger, Reporter};
use crate::publisher::{Destination, Publisher};
use crate::scheduler::{
    in_publish_cycle, CycleFuture, PublishCycle, PublishScheduler, SchedulerState,
};

/// Everything `start()` needs.
#[derive(Default)]
pub struct StartOptions {
    pub config: EngineConfig,
    /// Where snapshots go. `None` puts the engine in no-op mode.
    pub destination: Option<Destination>,
    pub logger: Option<Arc<dyn MetricsLogger>>,
}

impl fmt::Debug for StartOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartOptions")
            .field("config", &self.config)
            .field("destination", &self.destination)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl StartOptions {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Builder method: publish through a ready publisher.
    pub fn with_publisher(self, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            destination: Some(Destination::Publisher(publisher)),
            ..self
        }
    }

    /// Builder method: set the destination.
    pub fn with_destination(self, destination: Destination) -> Self {
        Self {
            destination: Some(destination),
            ..self
        }
    }

    /// Builder method: set the logger.
    pub fn with_logger(self, logger: Arc<dyn MetricsLogger>) -> Self {
        Self {
            logger: Some(logger),
            ..self
        }
    }
}

/// How record calls are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// `start()` not called yet: only observations are kept.
    Unstarted,
    /// Started without a usable destination: every call is ignored.
    Disabled,
    /// Recording and publishing.
    Active,
}

#[derive(Debug)]
struct EngineState {
    mode: EngineMode,
    accumulator: Accumulator,
    reporter: Reporter,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<EngineState>,
}

impl Shared {
    /// Poisoning only means a record call panicked mid-update; the maps
    /// are still usable, so recover the guard.
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accumulates metrics and publishes them on an interval.
///
/// Construct one per process and share it by `Arc`; see [`crate::global`]
/// for a process-wide accessor.
pub struct MetricsEngine {
    shared: Arc<Shared>,
    scheduler: tokio::sync::Mutex<PublishScheduler>,
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState {
                    mode: EngineMode::Unstarted,
                    accumulator: Accumulator::default(),
                    reporter: Reporter::default(),
                }),
            }),
            scheduler: tokio::sync::Mutex::new(PublishScheduler::new()),
        }
    }

    /// Configure the engine and start publishing.
    ///
    /// Calling again reconfigures and restarts the timer. Configuration
    /// problems are reported through the logger and leave the engine in
    /// no-op mode; this never fails outward. Must be called from within a
    /// Tokio runtime.
    pub async fn start(&self, options: StartOptions) {
        let StartOptions {
            config,
            destination,
            logger,
        } = options;
        let reporter = Reporter::new(logger);

        let (identity, truncations) = NodeIdentity::from_config(&config);
        for truncation in &truncations {
            reporter.warn(&truncation.to_string());
        }

        let publisher = match resolve_publisher(destination, &config) {
            Ok(Some(publisher)) => Some(publisher),
            Ok(None) => {
                reporter.info("no metrics destination configured, metrics are disabled");
                None
            }
            Err(e) => {
                reporter.error(&format!("Unable to start publishing metrics: {e}"));
                None
            }
        };

        let interval = match config.publish_interval() {
            Ok(interval) => Some(interval),
            Err(e) => {
                if publisher.is_some() {
                    reporter.error(&format!("Unable to start publishing metrics: {e}"));
                }
                None
            }
        };

        let mut scheduler = if in_publish_cycle() {
            // A flush from outside may hold the scheduler while it waits on this cycle.
            match self.scheduler.try_lock() {
                Ok(scheduler) => scheduler,
                Err(_) => {
                    reporter.warn(
                        "start requested from inside a publish cycle during stop, ignoring",
                    );
                    return;
                }
            }
        } else {
            self.scheduler.lock().await
        };

        {
            let mut state = self.shared.lock();
            state.accumulator.set_identity(identity);
            state
                .accumulator
                .set_lookback_window_ms(interval.map(|i| i.as_millis() as u64));
            state
                .accumulator
                .configure_sampler(config.error_sample_size, config.error_max_length);
            state.reporter = reporter.clone();
            state.mode = if publisher.is_some() && interval.is_some() {
                EngineMode::Active
            } else {
                EngineMode::Disabled
            };
        }

        let (Some(publisher), Some(interval)) = (publisher, interval) else {
            // Unconfigured: make sure no timer from an earlier start keeps running.
            scheduler.stop(false).await;
            return;
        };

        if scheduler.state() == SchedulerState::Stopped {
            let in_flight = scheduler.in_flight();
            *scheduler = PublishScheduler::with_in_flight(in_flight);
        }

        let cycle = publish_cycle(self.shared.clone(), publisher);
        if let Err(e) = scheduler.start(interval, cycle) {
            reporter.error(&format!("Unable to start publishing metrics: {e}"));
            self.shared.lock().mode = EngineMode::Disabled;
        }
    }

    /// Cancel the timer; with `flush`, publish and reset once more first.
    ///
    /// A no-op unless publishing is running. Safe to call from inside a
    /// publisher, where a requested flush is skipped.
    pub async fn stop(&self, flush: bool) {
        if in_publish_cycle() {
            // A final flush may hold the scheduler; it has already cancelled the timer.
            if let Ok(mut scheduler) = self.scheduler.try_lock() {
                scheduler.stop(false).await;
            }
            return;
        }
        let mut scheduler = self.scheduler.lock().await;
        scheduler.stop(flush).await;
    }

    /// Add `delta` to a counter. Ignored unless the engine is active.
    pub fn count(&self, counter: Counter, delta: i64) {
        let mut state = self.shared.lock();
        if state.mode == EngineMode::Active {
            state.accumulator.count(counter, delta);
        }
    }

    /// Add `delta` to a caller-defined counter.
    pub fn count_named(&self, name: &str, delta: i64) {
        let mut state = self.shared.lock();
        if state.mode == EngineMode::Active {
            state.accumulator.count_named(name, delta);
        }
    }

    /// Overwrite an observable.
    ///
    /// Unlike counts, observations made before `start()` are kept, since
    /// some values are only observed once at start-up.
    pub fn observe(&self, observable: Observable, value: i64) {
        let mut state = self.shared.lock();
        if state.mode != EngineMode::Disabled {
            state.accumulator.observe(observable, value);
        }
    }

    /// Overwrite a caller-defined observable.
    pub fn observe_named(&self, name: &str, value: i64) {
        let mut state = self.shared.lock();
        if state.mode != EngineMode::Disabled {
            state.accumulator.observe_named(name, value);
        }
    }

    /// Count an error and keep a truncated sample of its message.
    pub fn record_error(&self, message: &str) {
        let mut state = self.shared.lock();
        if state.mode == EngineMode::Active {
            state.accumulator.record_error(message);
        }
    }

    /// Record the age of an anchor request from its epoch-millisecond timestamp.
    ///
    /// A missing timestamp is reported and otherwise ignored.
    pub fn record_age(&self, reference_ms: Option<i64>) {
        let now_ms = Utc::now().timestamp_millis();
        let result = {
            let mut state = self.shared.lock();
            if state.mode != EngineMode::Active {
                return;
            }
            state
                .accumulator
                .record_age(reference_ms, now_ms)
                .map_err(|e| (e, state.reporter.clone()))
        };
        if let Err((e, reporter)) = result {
            reporter.warn(&format!("Call to record_age rejected: {e}"));
        }
    }

    /// Add one sample to a caller-named aggregate. Ignored unless active.
    pub fn record_named(&self, name: &str, value: f64) {
        let mut state = self.shared.lock();
        if state.mode == EngineMode::Active {
            state.accumulator.record_named(name, value);
        }
    }

    /// Record the mean of `values` as one sample. Empty input is ignored.
    pub fn record_average(&self, name: &str, values: &[f64]) {
        if values.is_empty() {
            return;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        self.record_named(name, mean);
    }

    /// Record `numer / denom` as one sample.
    ///
    /// A zero denominator is reported as a warning and the sample dropped.
    pub fn record_ratio(&self, name: &str, numer: f64, denom: f64) {
        if denom == 0.0 {
            self.warn(&format!("Attempt to record ratio with zero denominator: {name}"));
            return;
        }
        self.record_named(name, numer / denom);
    }

    /// Record every numeric field of a JSON object as `<prefix>_<field>`.
    ///
    /// Non-numeric fields are skipped; a value that is not an object is
    /// reported and ignored.
    pub fn record_fields(&self, prefix: &str, fields: &serde_json::Value) {
        let Some(fields) = fields.as_object() else {
            self.warn(&format!("record_fields for {prefix} expects an object"));
            return;
        };
        for (key, value) in fields {
            if let Some(value) = value.as_f64() {
                self.record_named(&format!("{prefix}_{key}"), value);
            }
        }
    }

    /// Report an input warning through the configured logger.
    pub fn warn(&self, message: &str) {
        let reporter = self.shared.lock().reporter.clone();
        reporter.warn(message);
    }

    /// Snapshot the current window without resetting it.
    pub fn snapshot(&self) -> Snapshot {
        self.shared.lock().accumulator.snapshot()
    }

    /// Start a new window by hand. Observables are kept.
    pub fn reset(&self) {
        self.shared.lock().accumulator.reset();
    }

    pub fn mode(&self) -> EngineMode {
        self.shared.lock().mode
    }

    pub async fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.lock().await.state()
    }
}

fn resolve_publisher(
    destination: Option<Destination>,
    config: &EngineConfig,
) -> MetricsResult<Option<Arc<dyn Publisher>>> {
    destination
        .map(|d| d.resolve(config.network.as_deref()))
        .transpose()
}

/// Build the snapshot → publish → reset cycle handed to the scheduler.
fn publish_cycle(shared: Arc<Shared>, publisher: Arc<dyn Publisher>) -> PublishCycle {
    Arc::new(move || -> CycleFuture {
        let shared = shared.clone();
        let publisher = publisher.clone();
        Box::pin(async move {
            let (snapshot, reporter) = {
                let state = shared.lock();
                (state.accumulator.snapshot(), state.reporter.clone())
            };

            match publisher.publish(snapshot).await {
                Ok(id) => debug!(%id, "metrics published"),
                Err(e) => {
                    let e = MetricsError::from(e);
                    reporter.error(&format!("Error in publishing metrics: {e}"));
                }
            }

            // Reset on failure too.
            shared.lock().accumulator.reset();
        })
    })
}

impl fmt::Debug for MetricsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsEngine")
            .field("mode", &self.mode())
            .finish()
    }
}
