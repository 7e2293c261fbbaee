//! Publish scheduler — one repeating timer driving publish cycles.
//!
//! Each tick tries to take the single in-flight slot. If a cycle from an
//! earlier tick still holds it, the tick is skipped outright; nothing is
//! queued. A cycle runs as its own task so cancelling the timer never
//! aborts a publish that is already under way.
//!
//! ```text
//!          start()            stop()
//!   Idle ──────────▶ Running ────────▶ Stopped
//!     │                 ▲ │
//!     │                 └─┘ start() restarts the timer
//!     └──────────── stop() is a no-op ──────────
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use tally_core::{MetricsError, MetricsResult};

/// One snapshot → publish → reset cycle, supplied by the owner.
pub type PublishCycle = Arc<dyn Fn() -> CycleFuture + Send + Sync>;

/// Future driving one publish cycle.
pub type CycleFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

tokio::task_local! {
    /// Set while a publish cycle runs on the current task.
    static IN_CYCLE: ();
}

/// Whether the current task is running a publish cycle.
pub fn in_publish_cycle() -> bool {
    IN_CYCLE.try_with(|_| ()).is_ok()
}

/// Lifecycle of a [`PublishScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Handle to the background timer task.
struct TimerSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl TimerSlot {
    fn cancel(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

pub struct PublishScheduler {
    state: SchedulerState,
    timer: Option<TimerSlot>,
    cycle: Option<PublishCycle>,
    interval: Option<Duration>,
    /// Single slot held for the whole of a publish cycle.
    in_flight: Arc<Mutex<()>>,
}

impl Default for PublishScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishScheduler {
    pub fn new() -> Self {
        Self::with_in_flight(Arc::new(Mutex::new(())))
    }

    /// A fresh scheduler sharing an existing in-flight slot.
    ///
    /// A replacement for a stopped scheduler must use the old slot, or a
    /// cycle still running from before the stop could overlap the new
    /// timer's first cycle.
    pub fn with_in_flight(in_flight: Arc<Mutex<()>>) -> Self {
        Self {
            state: SchedulerState::Idle,
            timer: None,
            cycle: None,
            interval: None,
            in_flight,
        }
    }

    /// The single slot held for the whole of a publish cycle.
    pub fn in_flight(&self) -> Arc<Mutex<()>> {
        self.in_flight.clone()
    }

    /// Start (or restart) the periodic trigger.
    ///
    /// Must be called from within a Tokio runtime. A zero interval leaves
    /// the scheduler in its current state and returns a configuration
    /// error; a stopped scheduler cannot be started again.
    pub fn start(&mut self, interval: Duration, cycle: PublishCycle) -> MetricsResult<()> {
        if self.state == SchedulerState::Stopped {
            return Err(MetricsError::SchedulerStopped);
        }
        if interval.is_zero() {
            return Err(MetricsError::Configuration(
                "please set a non-zero interval for publishing metrics".to_string(),
            ));
        }

        if let Some(old) = self.timer.take() {
            old.cancel();
            debug!("previous publish timer cancelled");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_timer(
            interval,
            cycle.clone(),
            self.in_flight.clone(),
            shutdown_rx,
        ));

        self.timer = Some(TimerSlot {
            handle,
            shutdown_tx,
        });
        self.cycle = Some(cycle);
        self.interval = Some(interval);
        self.state = SchedulerState::Running;

        info!(
            interval_ms = interval.as_millis() as u64,
            "metrics publishing started"
        );
        Ok(())
    }

    /// Cancel the timer, optionally running one final cycle.
    ///
    /// With `flush`, waits for any in-flight cycle and then runs exactly
    /// one more. A publish already under way is never aborted. When called
    /// from inside a publish cycle the flush is skipped, since it would
    /// wait on the cycle that is calling it.
    pub async fn stop(&mut self, flush: bool) {
        if self.state != SchedulerState::Running {
            return;
        }

        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.state = SchedulerState::Stopped;
        let cycle = self.cycle.take();

        if !flush {
            info!("metrics publishing stopped");
            return;
        }

        if in_publish_cycle() {
            warn!("flush requested from inside a publish cycle, skipping final publish");
            return;
        }

        if let Some(cycle) = cycle {
            let _slot = self.in_flight.lock().await;
            IN_CYCLE.scope((), cycle()).await;
        }
        info!("metrics publishing stopped after final flush");
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Whether a publish cycle currently holds the in-flight slot.
    pub fn is_publishing(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }
}

impl Drop for PublishScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

/// The timer loop: one tick per interval until shutdown.
async fn run_timer(
    period: Duration,
    cycle: PublishCycle,
    in_flight: Arc<Mutex<()>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let slot = match in_flight.clone().try_lock_owned() {
                    Ok(slot) => slot,
                    Err(_) => {
                        debug!("previous publish still in flight, skipping tick");
                        continue;
                    }
                };
                let cycle = cycle.clone();
                tokio::spawn(async move {
                    // Released when the cycle finishes, whatever its outcome.
                    let _slot = slot;
                    IN_CYCLE.scope((), cycle()).await;
                });
            }
            _ = shutdown.changed() => {
                debug!("publish timer shutting down");
                break;
            }
        }
    }
}
