//! Error types for the tally metrics engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors that can occur while configuring or driving the engine.
///
/// None of these ever reach a record/observe call site; they surface
/// through the injected logger and the engine degrades instead.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("publish failed: {0}")]
    Publish(#[from] anyhow::Error),

    #[error("failed to load config: {0}")]
    Config(String),

    #[error("scheduler already stopped")]
    SchedulerStopped,
}
