//! # Termination signals.
//!
//! - Unix: `SIGINT`, `SIGTERM`, `SIGQUIT`
//! - elsewhere: Ctrl-C

/// Completes on the first termination signal.
///
/// Fails only if a listener cannot be registered.
#[cfg(unix)]
pub(crate) async fn terminated() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut int = signal(SignalKind::interrupt())?;
    let mut term = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let which = tokio::select! {
        _ = int.recv() => "SIGINT",
        _ = term.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    tracing::info!(signal = which, "termination signal received");
    Ok(())
}

/// Completes on the first termination signal.
///
/// Fails only if a listener cannot be registered.
#[cfg(not(unix))]
pub(crate) async fn terminated() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl-c", "termination signal received");
    Ok(())
}
