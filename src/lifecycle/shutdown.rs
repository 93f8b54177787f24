//! Signal handling for graceful shutdown

use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error};

/// Handles shutdown signals (SIGTERM, SIGINT)
#[derive(Debug, Default)]
pub struct ShutdownSignal;

impl ShutdownSignal {
    pub fn new() -> Self {
        Self
    }

    /// Wait for a shutdown signal. If the handlers cannot be installed the
    /// daemon keeps running and only stops with its other tasks.
    pub async fn wait(&self) {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!(?e, "failed to register signal handlers");
                    return std::future::pending().await;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                debug!("received SIGTERM");
            }
            _ = sigint.recv() => {
                debug!("received SIGINT");
            }
        }
    }
}
