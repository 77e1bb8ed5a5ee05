//! Signal handling.
//!
//! - `SIGTERM` → close the transport and exit
//! - `SIGINT` (Ctrl-C) → same

use tracing::info;

/// Which signal asked us to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM from a supervisor.
    Terminate,
    /// SIGINT from the terminal.
    Interrupt,
}

/// Wait for SIGTERM or SIGINT.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let received = tokio::select! {
        _ = sigterm.recv() => ShutdownSignal::Terminate,
        _ = sigint.recv() => ShutdownSignal::Interrupt,
    };
    info!(signal = ?received, "Received shutdown signal");
    Ok(received)
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C");
    Ok(ShutdownSignal::Interrupt)
}
