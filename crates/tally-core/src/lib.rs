//! tally-core — shared types for the tally metrics engine.
//!
//! Holds everything that crosses the boundary between the engine and its
//! collaborators: start-up configuration, the node identity, the published
//! snapshot, and the error taxonomy.
//!
//! # Architecture
//!
//! ```text
//! EngineConfig (TOML)
//!   └── NodeIdentity::from_config() → identity + truncation warnings
//!
//! Snapshot
//!   ├── NodeIdentity
//!   └── to_json() → document handed to publishers
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod snapshot;

pub use config::{
    EngineConfig, DEFAULT_ERROR_MAX_LENGTH, DEFAULT_ERROR_SAMPLE_SIZE,
    DEFAULT_PUBLISH_INTERVAL_MS,
};
pub use error::{MetricsError, MetricsResult};
pub use identity::{truncate_chars, FieldTruncation, NodeIdentity};
pub use snapshot::{AggregateSummary, Snapshot};
