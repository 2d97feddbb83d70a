//! Subcommand implementations.

pub mod ingest;
pub mod migrate;
pub mod queue;
pub mod rules;
pub mod serve;
pub mod sweep;
pub mod worker;

use tokio::sync::watch;

/// Watch channel that flips to `true` on Ctrl-C.
pub(crate) fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown requested");
        let _ = tx.send(true);
    });
    rx
}

/// Resolves once the channel reports shutdown or its sender is gone.
pub(crate) async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}
