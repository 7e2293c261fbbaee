//! Timed metrics — elapsed time since a field of a record.
//!
//! A [`TimedMetric`] aggregates how long ago each recorded task was
//! created, updated, or stamped, and periodically folds that window into
//! the engine as `<name>_total`, `<name>_mean` and `<name>_max`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use tally_core::{MetricsError, MetricsResult};

use crate::aggregate::RunningAggregate;
use crate::engine::MetricsEngine;

/// Which timestamp of a record the elapsed time is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinceField {
    CreatedAt,
    UpdatedAt,
    Timestamp,
}

/// A record carrying the timestamps a [`TimedMetric`] can measure from.
pub trait Timeable {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Plain bag of optional timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTimes {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Timeable for TaskTimes {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

#[derive(Debug)]
pub struct TimedMetric {
    name: String,
    since: SinceField,
    window: Mutex<RunningAggregate>,
}

impl TimedMetric {
    pub fn new(name: impl Into<String>, since: SinceField) -> Self {
        Self {
            name: name.into(),
            since,
            window: Mutex::new(RunningAggregate::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record the elapsed time for one task as of now.
    ///
    /// A task missing the measured field is reported through the
    /// engine's logger and skipped.
    pub fn record<T: Timeable + ?Sized>(&self, engine: &MetricsEngine, task: &T) {
        if let Err(e) = self.record_at(task, Utc::now()) {
            self.report_skip(engine, &e);
        }
    }

    pub fn record_all<'a, T, I>(&self, engine: &MetricsEngine, tasks: I)
    where
        T: Timeable + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let now = Utc::now();
        for task in tasks {
            if let Err(e) = self.record_at(task, now) {
                self.report_skip(engine, &e);
            }
        }
    }

    fn report_skip(&self, engine: &MetricsEngine, error: &MetricsError) {
        engine.warn(&format!("Timed metric {} record skipped: {error}", self.name));
    }

    /// Record elapsed milliseconds between the task's field and `now`.
    pub fn record_at<T: Timeable + ?Sized>(
        &self,
        task: &T,
        now: DateTime<Utc>,
    ) -> MetricsResult<i64> {
        let since = match self.since {
            SinceField::CreatedAt => task.created_at(),
            SinceField::UpdatedAt => task.updated_at(),
            SinceField::Timestamp => task.timestamp(),
        }
        .ok_or_else(|| {
            MetricsError::InvalidInput(format!("task has no {:?} to measure from", self.since))
        })?;

        let elapsed = (now - since).num_milliseconds();
        self.lock().record(elapsed);
        Ok(elapsed)
    }

    /// Current window, without clearing it.
    pub fn window(&self) -> RunningAggregate {
        *self.lock()
    }

    /// Fold the window into the engine and start a new one.
    pub fn publish_stats(&self, engine: &MetricsEngine) {
        let window = std::mem::take(&mut *self.lock());
        engine.count_named(&format!("{}_total", self.name), window.count() as i64);
        engine.observe_named(&format!("{}_mean", self.name), window.mean());
        engine.observe_named(&format!("{}_max", self.name), window.max());
        debug!(metric = %self.name, count = window.count(), "timed metric stats published");
    }

    /// Run [`publish_stats`](Self::publish_stats) every `interval` until
    /// the returned handle is stopped. Must be called within a Tokio runtime.
    pub fn spawn_publishing(
        self: &Arc<Self>,
        engine: Arc<MetricsEngine>,
        interval: Duration,
    ) -> MetricsResult<StatsPublisher> {
        if self.name.is_empty() || interval.is_zero() {
            return Err(MetricsError::Configuration(
                "timed metrics need a name and a non-zero interval".to_string(),
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let metric = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => metric.publish_stats(&engine),
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        Ok(StatsPublisher {
            handle,
            shutdown_tx,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunningAggregate> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a background [`TimedMetric`] publishing loop.
#[derive(Debug)]
pub struct StatsPublisher {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl StatsPublisher {
    pub fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
