//! Signal handling for graceful shutdown

use anyhow::Result;
use book_cache::BookMirrorService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Setup signal handlers; the receiver completes on Ctrl+C or SIGTERM
pub fn setup_signal_handlers() -> Result<oneshot::Receiver<()>> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;
        use std::sync::atomic::{AtomicBool, Ordering};

        let sigterm = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, sigterm.clone())?;

        tokio::spawn(async move {
            let mut poll = tokio::time::interval(Duration::from_millis(100));
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => info!("Ctrl+C signal received"),
                    Err(e) => error!("Failed to listen for Ctrl+C signal: {}", e),
                },
                _ = async {
                    loop {
                        poll.tick().await;
                        if sigterm.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                } => info!("SIGTERM signal received"),
            }
            let _ = shutdown_tx.send(());
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C signal: {}", e);
            return;
        }
        info!("Ctrl+C signal received");
        let _ = shutdown_tx.send(());
    });

    Ok(shutdown_rx)
}

/// Stop the service workers and the health monitor within `shutdown_timeout`
pub async fn graceful_shutdown(
    service: Arc<BookMirrorService>,
    health_handle: tokio::task::JoinHandle<()>,
    shutdown_timeout: Duration,
) -> Result<()> {
    info!("Starting graceful shutdown...");

    health_handle.abort();

    match timeout(shutdown_timeout, service.shutdown()).await {
        Ok(Ok(())) => info!("Book mirror workers stopped"),
        Ok(Err(e)) => error!("Book mirror shutdown failed: {}", e),
        Err(_) => warn!("Book mirror did not stop within {:?}, forcing shutdown", shutdown_timeout),
    }

    info!("Graceful shutdown complete");
    Ok(())
}
