//! End-to-end tests for the engine lifecycle through the public API.
//!
//! Each test drives a real engine on Tokio's paused clock:
//! 1. TOML configuration → document store → one document per interval
//! 2. A slow publisher never overlaps with the next tick
//! 3. `stop(true)` flushes the open window exactly once
//! 4. The published window renders to Prometheus text

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use tally_metrics::{
    render_prometheus, Counter, Destination, DocumentStore, EngineConfig, EngineMode,
    ExpositionOptions, MetricsEngine, Network, Observable, PublishFuture, Publisher, Snapshot,
    StartOptions,
};

// ── Tracing setup ────────────────────────────────────────────────

static TRACING_INIT: Once = Once::new();

/// Controlled by `RUST_LOG` (e.g. `RUST_LOG=tally=debug`).
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// ── Test doubles ─────────────────────────────────────────────────

#[derive(Default)]
struct MemoryStore {
    documents: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MemoryStore {
    fn documents(&self) -> Vec<(String, serde_json::Value)> {
        self.documents.lock().unwrap().clone()
    }
}

impl DocumentStore for MemoryStore {
    fn create<'a>(&'a self, model_id: &'a str, document: serde_json::Value) -> PublishFuture<'a> {
        Box::pin(async move {
            let mut documents = self.documents.lock().unwrap();
            documents.push((model_id.to_string(), document));
            Ok(format!("kjz-doc-{}", documents.len()))
        })
    }
}

struct SlowPublisher {
    delay: Duration,
    started: Mutex<u32>,
    published: Mutex<Vec<Snapshot>>,
}

impl SlowPublisher {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: Mutex::new(0),
            published: Mutex::new(Vec::new()),
        }
    }

    fn started(&self) -> u32 {
        *self.started.lock().unwrap()
    }

    fn published(&self) -> Vec<Snapshot> {
        self.published.lock().unwrap().clone()
    }
}

impl Publisher for SlowPublisher {
    fn publish(&self, snapshot: Snapshot) -> PublishFuture<'_> {
        *self.started.lock().unwrap() += 1;
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.published.lock().unwrap().push(snapshot);
            Ok("done".to_string())
        })
    }
}

const NODE_TOML: &str = r#"
interval_ms = 1000
network = "dev-unstable"
node_id = "node-7"
node_name = "indexer-a"
ceramic_version = "3.0.0"
"#;

// ── Tests ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn document_store_receives_one_document_per_window() {
    init_tracing();

    let config = EngineConfig::from_toml_str(NODE_TOML).unwrap();
    let store = Arc::new(MemoryStore::default());
    let engine = MetricsEngine::new();
    engine
        .start(
            StartOptions::new(config)
                .with_destination(Destination::DocumentStore(store.clone())),
        )
        .await;
    assert_eq!(engine.mode(), EngineMode::Active);

    engine.count(Counter::RecentCompletedRequests, 1);
    tokio::time::sleep(Duration::from_millis(1100)).await;

    engine.count(Counter::RecentCompletedRequests, 2);
    engine.observe(Observable::TotalPinnedStreams, 40);
    tokio::time::sleep(Duration::from_millis(1000)).await;

    engine.count(Counter::RecentCompletedRequests, 3);
    engine.record_error("anchor service unreachable");
    tokio::time::sleep(Duration::from_millis(1000)).await;

    engine.stop(false).await;

    let documents = store.documents();
    assert_eq!(documents.len(), 3);

    let model = Network::DevUnstable.model_id().unwrap();
    assert!(documents.iter().all(|(m, _)| m == model));

    let completed: Vec<i64> = documents
        .iter()
        .map(|(_, doc)| doc["recentCompletedRequests"].as_i64().unwrap())
        .collect();
    assert_eq!(completed, vec![1, 2, 3]);

    // Observables survive the reset between windows.
    assert_eq!(documents[1].1["totalPinnedStreams"], 40);
    assert_eq!(documents[2].1["totalPinnedStreams"], 40);

    assert_eq!(documents[2].1["recentErrors"], 1);
    assert_eq!(documents[2].1["sampleRecentErrors"][0], "anchor service unreachable");
    assert_eq!(documents[0].1["nodeIdentity"]["id"], "node-7");
    assert_eq!(documents[0].1["nodeIdentity"]["ceramicVersion"], "3.0.0");
    assert_eq!(documents[0].1["lookbackWindowMS"], 1000);
}

#[tokio::test(start_paused = true)]
async fn slow_publish_skips_overlapping_ticks() {
    init_tracing();

    let publisher = Arc::new(SlowPublisher::new(Duration::from_millis(2500)));
    let engine = MetricsEngine::new();
    engine
        .start(
            StartOptions::new(EngineConfig::default().with_interval_ms(1000))
                .with_publisher(publisher.clone()),
        )
        .await;

    // Tick at 1000 starts a publish that runs until 3500; 2000 and 3000 are skipped.
    tokio::time::sleep(Duration::from_millis(3400)).await;
    assert_eq!(publisher.started(), 1);
    assert!(publisher.published().is_empty());

    // Tick at 4000 is the next one to find the slot free.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(publisher.started(), 2);
    assert_eq!(publisher.published().len(), 1);

    engine.stop(false).await;
}

#[tokio::test(start_paused = true)]
async fn stop_with_flush_publishes_open_window_once() {
    init_tracing();

    let publisher = Arc::new(SlowPublisher::new(Duration::from_millis(10)));
    let engine = MetricsEngine::new();
    engine
        .start(
            StartOptions::new(EngineConfig::default().with_interval_ms(60_000))
                .with_publisher(publisher.clone()),
        )
        .await;

    engine.count(Counter::RecentErrors, 4);
    engine.stop(true).await;

    let published = publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].recent_errors, 4);
    assert_eq!(engine.snapshot().recent_errors, 0);

    // Stopped: no further ticks, and stopping again does nothing.
    tokio::time::sleep(Duration::from_secs(180)).await;
    engine.stop(true).await;
    assert_eq!(publisher.published().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn published_window_renders_as_prometheus_text() {
    init_tracing();

    let publisher = Arc::new(SlowPublisher::new(Duration::ZERO));
    let engine = MetricsEngine::new();
    let config = EngineConfig::default()
        .with_interval_ms(1000)
        .with_node_id("node-7");
    engine
        .start(StartOptions::new(config).with_publisher(publisher.clone()))
        .await;

    engine.count(Counter::RecentCompletedRequests, 5);
    engine.observe(Observable::CurrentPendingRequests, 2);
    engine.count_named("pins_added", 3);
    engine.record_ratio("hit_ratio", 1.0, 2.0);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    engine.stop(false).await;

    let published = publisher.published();
    assert_eq!(published.len(), 1);

    let text = render_prometheus(&published[0], &ExpositionOptions::default());
    assert!(text.contains("tally_recent_completed_requests_total{node=\"node-7\"} 5"));
    assert!(text.contains("tally_current_pending_requests{node=\"node-7\"} 2"));
    assert!(text.contains("tally_pins_added_total{node=\"node-7\"} 3"));
    assert!(text.contains("tally_hit_ratio_mean{node=\"node-7\"} 0.5"));
}
