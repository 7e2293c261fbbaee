//! Engine configuration, loadable from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, MetricsResult};

/// Default publish interval: one minute.
pub const DEFAULT_PUBLISH_INTERVAL_MS: u64 = 60_000;

/// Default number of error messages sampled per window.
pub const DEFAULT_ERROR_SAMPLE_SIZE: usize = 8;

/// Default maximum length (in characters) of a sampled error message.
pub const DEFAULT_ERROR_MAX_LENGTH: usize = 512;

/// Static configuration for an engine start.
///
/// Every field is optional in the TOML form; absent node identity fields
/// become empty strings and an absent interval falls back to
/// [`DEFAULT_PUBLISH_INTERVAL_MS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Publish interval in milliseconds. Zero is rejected at start.
    pub interval_ms: Option<u64>,
    /// Network name used to resolve the metrics model for document-store
    /// destinations (e.g. "mainnet", "dev-unstable").
    pub network: Option<String>,
    pub node_id: String,
    pub node_name: String,
    pub node_auth_did: String,
    pub node_ip_addr: String,
    pub node_peer_id: String,
    pub ceramic_version: String,
    pub ipfs_version: String,
    /// Error messages retained per window.
    pub error_sample_size: usize,
    /// Characters kept from each sampled error message.
    pub error_max_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_ms: Some(DEFAULT_PUBLISH_INTERVAL_MS),
            network: None,
            node_id: String::new(),
            node_name: String::new(),
            node_auth_did: String::new(),
            node_ip_addr: String::new(),
            node_peer_id: String::new(),
            ceramic_version: String::new(),
            ipfs_version: String::new(),
            error_sample_size: DEFAULT_ERROR_SAMPLE_SIZE,
            error_max_length: DEFAULT_ERROR_MAX_LENGTH,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> MetricsResult<Self> {
        toml::from_str(content).map_err(|e| MetricsError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> MetricsResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| MetricsError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> MetricsResult<String> {
        toml::to_string_pretty(self).map_err(|e| MetricsError::Config(e.to_string()))
    }

    /// The validated publish interval.
    ///
    /// Returns a configuration error if the interval is missing or zero.
    pub fn publish_interval(&self) -> MetricsResult<Duration> {
        match self.interval_ms {
            Some(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
            _ => Err(MetricsError::Configuration(
                "publish interval must be a non-zero number of milliseconds".to_string(),
            )),
        }
    }

    /// Builder method: set the publish interval.
    pub fn with_interval_ms(self, interval_ms: u64) -> Self {
        Self {
            interval_ms: Some(interval_ms),
            ..self
        }
    }

    /// Builder method: set the network.
    pub fn with_network(self, network: impl Into<String>) -> Self {
        Self {
            network: Some(network.into()),
            ..self
        }
    }

    /// Builder method: set the node id.
    pub fn with_node_id(self, node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.interval_ms, Some(60_000));
        assert_eq!(config.error_sample_size, 8);
        assert_eq!(config.error_max_length, 512);
        assert!(config.network.is_none());
    }

    #[test]
    fn parse_minimal() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn parse_full() {
        let toml_str = r#"
interval_ms = 1000
network = "dev-unstable"
node_id = "123"
node_name = "fred"
node_auth_did = "did:key:456"
node_ip_addr = "10.0.0.1"
node_peer_id = "pMqqqqqqqqq"
ceramic_version = "v1.0"
ipfs_version = "v1.0.1"
error_sample_size = 1024
"#;
        let config = EngineConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.interval_ms, Some(1000));
        assert_eq!(config.network.as_deref(), Some("dev-unstable"));
        assert_eq!(config.node_name, "fred");
        assert_eq!(config.error_sample_size, 1024);
        // Unset fields keep their defaults.
        assert_eq!(config.error_max_length, 512);
    }

    #[test]
    fn non_numeric_interval_is_a_config_error() {
        let err = EngineConfig::from_toml_str("interval_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, MetricsError::Config(_)));
    }

    #[test]
    fn publish_interval_rejects_zero() {
        let config = EngineConfig::default().with_interval_ms(0);
        assert!(matches!(
            config.publish_interval(),
            Err(MetricsError::Configuration(_))
        ));

        let config = EngineConfig {
            interval_ms: None,
            ..EngineConfig::default()
        };
        assert!(config.publish_interval().is_err());

        let config = EngineConfig::default().with_interval_ms(250);
        assert_eq!(config.publish_interval().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn toml_round_trip_keeps_identity() {
        let config = EngineConfig::default()
            .with_network("mainnet")
            .with_node_id("node-7");
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("node-7"));
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }
}
