//! Signal handling for graceful shutdown.
//!
//! Resolves when the process receives SIGINT or SIGTERM (Ctrl+C on Windows).

use crate::error::DemoError;
use tokio::signal;
use tracing::info;

/// Waits for a termination signal and logs it.
pub async fn setup_signal_handlers() -> Result<(), DemoError> {
    wait_for_signal().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    Ok(())
}

async fn wait_for_signal() -> Result<(), DemoError> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint =
            signal(SignalKind::interrupt()).map_err(|e| DemoError::Signal(e.to_string()))?;
        let mut sigterm =
            signal(SignalKind::terminate()).map_err(|e| DemoError::Signal(e.to_string()))?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c()
        .await
        .map_err(|e| DemoError::Signal(e.to_string()))?;

    Ok(())
}
