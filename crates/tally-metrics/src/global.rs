//! Process-wide engine instance.
//!
//! Most hosts run one engine per process. Code that cannot thread a
//! handle through reaches it here; everything else should hold an
//! `Arc<MetricsEngine>` directly.

use std::sync::{Arc, OnceLock};

use tally_core::{MetricsError, MetricsResult};

use crate::engine::MetricsEngine;

static ENGINE: OnceLock<Arc<MetricsEngine>> = OnceLock::new();

/// Install `engine` as the process-wide instance.
///
/// Fails if an instance was already installed or lazily created by
/// [`engine`].
pub fn install(engine: Arc<MetricsEngine>) -> MetricsResult<&'static Arc<MetricsEngine>> {
    ENGINE
        .set(engine)
        .map_err(|_| MetricsError::Configuration("metrics engine already installed".to_string()))?;
    Ok(engine_or_default())
}

/// The process-wide instance, creating an unstarted one on first use.
pub fn engine() -> &'static Arc<MetricsEngine> {
    engine_or_default()
}

/// The process-wide instance, if one exists yet.
pub fn try_engine() -> Option<&'static Arc<MetricsEngine>> {
    ENGINE.get()
}

fn engine_or_default() -> &'static Arc<MetricsEngine> {
    ENGINE.get_or_init(|| Arc::new(MetricsEngine::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineMode;

    // One test: the instance is shared by the whole test binary.
    #[test]
    fn install_once_then_reuse() {
        let installed = Arc::new(MetricsEngine::new());
        let got = install(installed.clone()).unwrap();
        assert!(Arc::ptr_eq(got, &installed));
        assert!(Arc::ptr_eq(engine(), &installed));
        assert!(Arc::ptr_eq(try_engine().unwrap(), &installed));
        assert_eq!(engine().mode(), EngineMode::Unstarted);

        let err = install(Arc::new(MetricsEngine::new())).unwrap_err();
        assert!(matches!(err, MetricsError::Configuration(_)));
        assert!(Arc::ptr_eq(engine(), &installed));
    }
}
