use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancels a token on the first SIGTERM or SIGINT.
///
/// The gateway hands the token to `axum::serve` so in-flight paid requests
/// finish before the process exits.
pub struct SigDown {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl SigDown {
    /// Registers the signal listeners. Fails if the runtime cannot install them.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let trigger = token.clone();
        tracker.spawn(async move {
            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            tracing::info!(signal = name, "Shutting down");
            trigger.cancel();
        });
        tracker.close();
        Ok(Self { tracker, token })
    }

    /// Resolves once a signal arrived and the listener task has finished.
    pub async fn recv(&self) {
        self.token.cancelled().await;
        self.tracker.wait().await;
    }
}
