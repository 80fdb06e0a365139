//! Ctrl+C / SIGTERM handling.

use contracts::Shutdown;
use tracing::warn;

/// Trigger `shutdown` on the first Ctrl+C or SIGTERM
pub fn install_signal_handlers(shutdown: Shutdown) {
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("Received shutdown signal, finishing the current cycle");
        shutdown.trigger();
    });
}

/// Resolves on Ctrl+C or SIGTERM; a listener that cannot be installed never fires
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
