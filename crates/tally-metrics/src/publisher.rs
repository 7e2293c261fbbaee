//! Publisher seam — where snapshots leave the engine.
//!
//! The engine only knows [`Publisher`]: an async operation taking a
//! snapshot and returning the id of whatever the transport created.
//! [`ModelPublisher`] adapts a document store by resolving the metrics
//! model for a network.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use tally_core::{MetricsError, MetricsResult, Snapshot};

/// Future returned by publishers and document stores.
pub type PublishFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;

/// Ships one snapshot to its destination.
///
/// Timeouts and retries, if any, belong to the implementation; the
/// engine awaits the future to completion.
pub trait Publisher: Send + Sync {
    fn publish(&self, snapshot: Snapshot) -> PublishFuture<'_>;
}

/// A document store able to create a document under a model.
pub trait DocumentStore: Send + Sync {
    /// Create a document and return its id.
    fn create<'a>(&'a self, model_id: &'a str, document: serde_json::Value) -> PublishFuture<'a>;
}

/// Where `start()` sends snapshots.
#[derive(Clone)]
pub enum Destination {
    /// A document store; the metrics model is resolved from the configured network.
    DocumentStore(Arc<dyn DocumentStore>),
    /// A ready publisher (collector exporter, test double, ...).
    Publisher(Arc<dyn Publisher>),
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::DocumentStore(_) => f.write_str("Destination::DocumentStore"),
            Destination::Publisher(_) => f.write_str("Destination::Publisher"),
        }
    }
}

impl Destination {
    /// Resolve into a publisher, using `network` for document stores.
    pub fn resolve(self, network: Option<&str>) -> MetricsResult<Arc<dyn Publisher>> {
        match self {
            Destination::Publisher(publisher) => Ok(publisher),
            Destination::DocumentStore(store) => {
                let network = network.ok_or_else(|| {
                    MetricsError::Configuration(
                        "a network is required to publish to a document store".to_string(),
                    )
                })?;
                let network: Network = network.parse()?;
                Ok(Arc::new(ModelPublisher::for_network(store, network)?))
            }
        }
    }
}

/// Metrics model shared by every network that publishes metrics.
const PERIODIC_METRIC_MODEL: &str =
    "kjzl6hvfrbw6cb9pd0bl7zmm28h3qszh56ccpn50vsmrl7clroy4fvln00z7q6q";

/// Networks a node can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    TestnetClay,
    DevUnstable,
    Local,
    InMemory,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::TestnetClay => "testnet-clay",
            Network::DevUnstable => "dev-unstable",
            Network::Local => "local",
            Network::InMemory => "inmemory",
        }
    }

    /// Stream id of the metrics model, if this network has one.
    pub fn model_id(&self) -> Option<&'static str> {
        match self {
            Network::Mainnet | Network::TestnetClay | Network::DevUnstable => {
                Some(PERIODIC_METRIC_MODEL)
            }
            Network::Local | Network::InMemory => None,
        }
    }
}

impl FromStr for Network {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "testnet-clay" => Ok(Network::TestnetClay),
            "dev-unstable" => Ok(Network::DevUnstable),
            "local" => Ok(Network::Local),
            "inmemory" => Ok(Network::InMemory),
            other => Err(MetricsError::Configuration(format!("unknown network: {other}"))),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publishes snapshots as documents of the network's metrics model.
pub struct ModelPublisher {
    store: Arc<dyn DocumentStore>,
    model_id: String,
}

impl ModelPublisher {
    /// Fails if the network has no metrics model.
    pub fn for_network(store: Arc<dyn DocumentStore>, network: Network) -> MetricsResult<Self> {
        let model_id = network.model_id().ok_or_else(|| {
            MetricsError::Configuration(format!("no metric model available for network {network}"))
        })?;
        debug!(%network, %model_id, "resolved metrics model");
        Ok(Self {
            store,
            model_id: model_id.to_string(),
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

impl Publisher for ModelPublisher {
    fn publish(&self, snapshot: Snapshot) -> PublishFuture<'_> {
        self.store.create(&self.model_id, snapshot.to_json())
    }
}
