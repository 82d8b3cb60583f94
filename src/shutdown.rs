use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Token cancelled on the first termination signal. The binaries fan it
/// out to the dispatch pool, heartbeat loop, and servers, which drain
/// within the configured grace period.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();

    tokio::spawn({
        let token = token.clone();
        async move {
            match wait_for_signal().await {
                Ok(name) => tracing::info!(signal = name, "Shutting down"),
                Err(e) => tracing::error!(error = %e, "Signal handler failed, shutting down"),
            }
            token.cancel();
        }
    });

    token
}

async fn wait_for_signal() -> std::io::Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
