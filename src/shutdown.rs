use log::{error, info};
use tokio::signal;
use tokio::sync::watch;

/// Wait for Ctrl + C (or SIGTERM on unix) and flip `tx` to `true`.
///
/// If a handler cannot be installed that signal is ignored rather than treated as a
/// shutdown request.
pub async fn forward_signal(tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl + C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown requested, finishing the current cycle");
    // Receivers may already be gone when polling ended on its own.
    let _ = tx.send(true);
}
