//! OS signals that end the egress.
//!
//! **Unix platforms:** `SIGINT`, `SIGTERM` (sent by process managers) and `SIGQUIT`.
//!
//! **Other platforms:** `Ctrl-C` via [`tokio::signal::ctrl_c`].

/// Completes when the process receives a termination signal.
///
/// Returns `Err` if the signal handlers cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
