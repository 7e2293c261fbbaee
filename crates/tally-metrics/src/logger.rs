//! Logging capability injected by the host application.
//!
//! Operator-facing reports (configuration problems, publish failures,
//! input warnings) go through [`Reporter`], which forwards to the injected
//! [`MetricsLogger`] or, when none was given, to `tracing`.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

/// Host-provided log sink.
///
/// Implementations must not panic; the engine calls them from timer tasks
/// and record paths alike.
pub trait MetricsLogger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// A [`MetricsLogger`] that emits `tracing` events under the `tally` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl MetricsLogger for TracingLogger {
    fn info(&self, message: &str) {
        info!(target: "tally", "{message}");
    }

    fn warn(&self, message: &str) {
        warn!(target: "tally", "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: "tally", "{message}");
    }
}

/// Routes reports to the injected logger, falling back to `tracing`.
#[derive(Clone, Default)]
pub struct Reporter {
    logger: Option<Arc<dyn MetricsLogger>>,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("injected", &self.logger.is_some())
            .finish()
    }
}

impl Reporter {
    pub fn new(logger: Option<Arc<dyn MetricsLogger>>) -> Self {
        Self { logger }
    }

    pub fn info(&self, message: &str) {
        match &self.logger {
            Some(logger) => logger.info(message),
            None => TracingLogger.info(message),
        }
    }

    pub fn warn(&self, message: &str) {
        match &self.logger {
            Some(logger) => logger.warn(message),
            None => TracingLogger.warn(message),
        }
    }

    pub fn error(&self, message: &str) {
        match &self.logger {
            Some(logger) => logger.error(message),
            None => TracingLogger.error(message),
        }
    }
}
