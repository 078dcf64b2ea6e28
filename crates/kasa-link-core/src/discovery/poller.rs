//! Poller task: periodic discovery and staleness sweeps.

use std::sync::Arc;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::Engine;

/// Tick until cancelled. The first tick fires one period after start;
/// the startup burst covers time zero.
pub async fn run(engine: Arc<Engine>, cancel: CancellationToken) {
    let period = engine.config().poll_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                // a sweep can wait on slow probes; shutdown must not
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    _ = tick(&engine) => {}
                }
            }
        }
    }
    debug!("poller cancelled");
}

/// One poll cycle.
pub async fn tick(engine: &Arc<Engine>) {
    engine.refresh_broadcasts().await;

    if let Err(e) = engine.discover().await {
        warn!(error = %e, "discovery broadcast failed");
    }

    let changes = engine.sweep_stale().await;
    if !changes.is_empty() {
        debug!(count = changes.len(), "liveness changed during sweep");
    }
}
