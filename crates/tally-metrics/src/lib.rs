//! tally-metrics — periodic node metrics for a stream-indexing node.
//!
//! Callers record counters, observables, errors and anchor-request ages
//! into one shared engine. On every interval the engine freezes the
//! window into a [`Snapshot`](tally_core::Snapshot), hands it to a
//! publisher and starts a fresh window.
//!
//! # Architecture
//!
//! ```text
//! MetricsEngine
//!   ├── count() / observe() / record_error() / record_age() ← host code
//!   ├── Accumulator → snapshot() → Snapshot
//!   │     ├── ErrorSampler (bounded error text samples)
//!   │     ├── RunningAggregate (anchor ages)
//!   │     └── SampleAggregate (record_named / ratio / average / fields)
//!   ├── PublishScheduler → timer task → publish cycle
//!   │     └── Publisher::publish(Snapshot)
//!   │           └── ModelPublisher → DocumentStore::create(model, doc)
//!   └── Reporter → MetricsLogger (host) or tracing
//!
//! TimedMetric → publish_stats() → <name>_total / _mean / _max
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for a /metrics endpoint
//! ```

pub mod accumulator;
pub mod aggregate;
pub mod engine;
pub mod global;
pub mod logger;
pub mod prometheus;
pub mod publisher;
pub mod sampler;
pub mod scheduler;
pub mod timed;

pub use accumulator::{Accumulator, Counter, Observable};
pub use aggregate::{RunningAggregate, SampleAggregate};
pub use engine::{EngineMode, MetricsEngine, StartOptions};
pub use logger::{MetricsLogger, Reporter, TracingLogger};
pub use prometheus::{render_prometheus, ExpositionOptions};
pub use publisher::{Destination, DocumentStore, ModelPublisher, Network, PublishFuture, Publisher};
pub use sampler::ErrorSampler;
pub use scheduler::{in_publish_cycle, PublishScheduler, SchedulerState};
pub use timed::{SinceField, StatsPublisher, TaskTimes, Timeable, TimedMetric};

pub use tally_core::{
    AggregateSummary, EngineConfig, MetricsError, MetricsResult, NodeIdentity, Snapshot,
};
