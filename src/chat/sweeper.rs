//! Background eviction worker for idle chat sessions.
//!
//! The reference behavior kept sessions forever; bounding their lifetime is
//! a deliberate addition, configured through `SessionConfig`.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::chat::store::SessionStore;

/// Statistics from one eviction sweep.
#[derive(Clone, Debug, Default)]
pub struct SweepStats {
    /// Number of sessions evicted for idleness.
    pub evicted: usize,
    /// Number of sessions still live after the sweep.
    pub remaining: usize,
    /// Sweep duration in milliseconds.
    pub duration_ms: u64,
}

/// Periodic eviction worker over a session store.
pub struct SessionSweeper {
    store: Arc<SessionStore>,
    shutdown: Arc<Notify>,
}

impl SessionSweeper {
    /// Create a sweeper for the given store.
    #[must_use]
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a shutdown notifier to stop the worker.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the worker as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the sweep loop until shutdown is signaled.
    async fn run(&self) {
        let interval = self.store.config().sweep_interval;
        info!(?interval, "Starting session eviction sweeper");

        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    let stats = self.run_sweep();
                    if stats.evicted > 0 {
                        info!(
                            evicted = stats.evicted,
                            remaining = stats.remaining,
                            duration_ms = stats.duration_ms,
                            "Session sweep completed"
                        );
                    } else {
                        debug!("Session sweep completed with nothing to evict");
                    }
                }
                () = self.shutdown.notified() => {
                    info!("Session eviction sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Run a single eviction cycle.
    pub fn run_sweep(&self) -> SweepStats {
        let start = Instant::now();
        let evicted = self.store.evict_idle();

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;

        SweepStats {
            evicted,
            remaining: self.store.count(),
            duration_ms,
        }
    }
}
