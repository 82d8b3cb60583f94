use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;

use super::RunnerRegistry;

/// Probe every registered runner once per `period` until shutdown.
///
/// Probes on distinct handles run concurrently, each bounded by half the
/// period. A handle that keeps failing stays registered and dead until an
/// explicit remove; the next successful probe restores it.
pub async fn heartbeat_loop(
    registry: Arc<RunnerRegistry>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("Heartbeat loop exiting");
                return;
            }
            _ = ticker.tick() => probe(&registry, period / 2).await,
        }
    }
}

/// One probe round over a snapshot of the registry. The snapshot is taken
/// under the registry lock; the RPCs are issued outside it.
pub async fn probe(registry: &RunnerRegistry, probe_timeout: Duration) {
    let snapshot = registry.snapshot();
    let probes = snapshot.iter().map(|handle| {
        let channel = handle.channel();
        let addr = handle.addr().to_string();
        async move {
            let alive = match timeout(probe_timeout, channel.heart_beat()).await {
                Ok(Ok(alive)) => alive,
                Ok(Err(e)) => {
                    tracing::debug!(runner = %addr, error = %e, "Heartbeat failed");
                    false
                }
                Err(_) => {
                    tracing::debug!(runner = %addr, "Heartbeat timed out");
                    false
                }
            };
            (addr, alive)
        }
    });
    for (addr, alive) in join_all(probes).await {
        registry.set_alive(&addr, alive);
    }
}
