//! Metric accumulator — window state for one engine.
//!
//! Counters add within a window and clear on reset. Observables keep the
//! last written value and survive reset, since most are observed once at
//! start-up and rarely touched again. The error sampler and the anchor
//! request age aggregate clear on reset, as do caller-named aggregates.
//!
//! The accumulator does no locking and no I/O; the engine wraps it in a
//! mutex shared by record paths and the publish cycle.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};

use tally_core::{
    MetricsError, MetricsResult, NodeIdentity, Snapshot, DEFAULT_ERROR_MAX_LENGTH,
    DEFAULT_ERROR_SAMPLE_SIZE,
};

use crate::aggregate::{RunningAggregate, SampleAggregate};
use crate::sampler::ErrorSampler;

/// Additive metrics, cleared every window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Counter {
    RecentCompletedRequests,
    RecentErrors,
}

impl Counter {
    pub const ALL: [Counter; 2] = [Counter::RecentCompletedRequests, Counter::RecentErrors];

    /// Field name in the published snapshot.
    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::RecentCompletedRequests => "recentCompletedRequests",
            Counter::RecentErrors => "recentErrors",
        }
    }

    /// Snake-case name for text exposition.
    pub fn metric_name(&self) -> &'static str {
        match self {
            Counter::RecentCompletedRequests => "recent_completed_requests",
            Counter::RecentErrors => "recent_errors",
        }
    }
}

/// Gauge-like metrics where only the latest value matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Observable {
    TotalPinnedStreams,
    TotalIndexedModels,
    CurrentPendingRequests,
}

impl Observable {
    pub const ALL: [Observable; 3] = [
        Observable::TotalPinnedStreams,
        Observable::TotalIndexedModels,
        Observable::CurrentPendingRequests,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Observable::TotalPinnedStreams => "totalPinnedStreams",
            Observable::TotalIndexedModels => "totalIndexedModels",
            Observable::CurrentPendingRequests => "currentPendingRequests",
        }
    }

    pub fn metric_name(&self) -> &'static str {
        match self {
            Observable::TotalPinnedStreams => "total_pinned_streams",
            Observable::TotalIndexedModels => "total_indexed_models",
            Observable::CurrentPendingRequests => "current_pending_requests",
        }
    }
}

/// All mutable state of one observation window.
#[derive(Debug, Clone)]
pub struct Accumulator {
    identity: NodeIdentity,
    lookback_window_ms: Option<u64>,
    counters: HashMap<Counter, i64>,
    observables: HashMap<Observable, i64>,
    custom_counters: BTreeMap<String, i64>,
    custom_observables: BTreeMap<String, i64>,
    custom_aggregates: BTreeMap<String, SampleAggregate>,
    errors: ErrorSampler,
    anchor_ages: RunningAggregate,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new(NodeIdentity::default())
    }
}

impl Accumulator {
    pub fn new(identity: NodeIdentity) -> Self {
        Self {
            identity,
            lookback_window_ms: None,
            counters: HashMap::new(),
            observables: HashMap::new(),
            custom_counters: BTreeMap::new(),
            custom_observables: BTreeMap::new(),
            custom_aggregates: BTreeMap::new(),
            errors: ErrorSampler::new(DEFAULT_ERROR_SAMPLE_SIZE, DEFAULT_ERROR_MAX_LENGTH),
            anchor_ages: RunningAggregate::new(),
        }
    }

    pub fn set_identity(&mut self, identity: NodeIdentity) {
        self.identity = identity;
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn set_lookback_window_ms(&mut self, window_ms: Option<u64>) {
        self.lookback_window_ms = window_ms;
    }

    /// Change the sampler bounds, carrying over samples that still fit.
    pub fn configure_sampler(&mut self, capacity: usize, max_length: usize) {
        let mut errors = ErrorSampler::new(capacity, max_length);
        for message in self.errors.samples() {
            errors.add(message);
        }
        self.errors = errors;
    }

    pub fn count(&mut self, counter: Counter, delta: i64) {
        *self.counters.entry(counter).or_insert(0) += delta;
    }

    pub fn count_named(&mut self, name: &str, delta: i64) {
        *self.custom_counters.entry(name.to_string()).or_insert(0) += delta;
    }

    pub fn observe(&mut self, observable: Observable, value: i64) {
        self.observables.insert(observable, value);
    }

    pub fn observe_named(&mut self, name: &str, value: i64) {
        self.custom_observables.insert(name.to_string(), value);
    }

    /// Add one sample to a caller-named aggregate.
    pub fn record_named(&mut self, name: &str, value: f64) {
        self.custom_aggregates
            .entry(name.to_string())
            .or_default()
            .record(value);
    }

    /// Count an error and sample its message if the sample has room.
    pub fn record_error(&mut self, message: &str) {
        self.count(Counter::RecentErrors, 1);
        self.errors.add(message);
    }

    /// Record the age of an anchor request relative to `now_ms`.
    ///
    /// Both timestamps are Unix epoch milliseconds. Returns the recorded age.
    pub fn record_age(&mut self, reference_ms: Option<i64>, now_ms: i64) -> MetricsResult<i64> {
        let reference = reference_ms.ok_or_else(|| {
            MetricsError::InvalidInput("age recorded without a reference timestamp".to_string())
        })?;
        let age = now_ms - reference;
        self.anchor_ages.record(age);
        Ok(age)
    }

    pub fn counter(&self, counter: Counter) -> i64 {
        self.counters.get(&counter).copied().unwrap_or(0)
    }

    pub fn named_counter(&self, name: &str) -> i64 {
        self.custom_counters.get(name).copied().unwrap_or(0)
    }

    pub fn observable(&self, observable: Observable) -> i64 {
        self.observables.get(&observable).copied().unwrap_or(0)
    }

    pub fn named_observable(&self, name: &str) -> Option<i64> {
        self.custom_observables.get(name).copied()
    }

    pub fn named_aggregate(&self, name: &str) -> Option<&SampleAggregate> {
        self.custom_aggregates.get(name)
    }

    pub fn errors(&self) -> &ErrorSampler {
        &self.errors
    }

    pub fn anchor_ages(&self) -> &RunningAggregate {
        &self.anchor_ages
    }

    /// Snapshot the window as of now.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_at(Utc::now())
    }

    /// Snapshot the window, stamping it with `ts`.
    pub fn snapshot_at(&self, ts: DateTime<Utc>) -> Snapshot {
        Snapshot {
            ts: ts.to_rfc3339_opts(SecondsFormat::Millis, true),
            node_identity: self.identity.clone(),
            lookback_window_ms: self.lookback_window_ms,
            total_pinned_streams: self.observable(Observable::TotalPinnedStreams),
            total_indexed_models: self.observable(Observable::TotalIndexedModels),
            current_pending_requests: self.observable(Observable::CurrentPendingRequests),
            mean_anchor_request_age_ms: self.anchor_ages.mean(),
            max_anchor_request_age_ms: self.anchor_ages.max(),
            recent_completed_requests: self.counter(Counter::RecentCompletedRequests),
            recent_errors: self.counter(Counter::RecentErrors),
            sample_recent_errors: self.errors.samples().to_vec(),
            custom_counters: self.custom_counters.clone(),
            custom_observables: self.custom_observables.clone(),
            custom_aggregates: self
                .custom_aggregates
                .iter()
                .map(|(name, agg)| (name.clone(), agg.summary()))
                .collect(),
        }
    }

    /// Start a new window. Observables are kept.
    pub fn reset(&mut self) {
        self.counters.clear();
        self.custom_counters.clear();
        self.custom_aggregates.clear();
        self.errors.clear();
        self.anchor_ages.reset();
    }
}
