//! Hub shutdown: one root token, signal handling, and the session drain.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::hub::Hub;

/// How long sessions get to send their going-away close after shutdown.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Owns the root shutdown token of a hub.
///
/// The hub hands a child of this token to every subscriber, so cancelling
/// it closes all sessions with 1001 and stops the listener.
pub struct ShutdownCoordinator {
    root: CancellationToken,
}

impl ShutdownCoordinator {
    /// Fresh coordinator; nothing is cancelled yet.
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    /// The root token. Pass it to [`Hub::new`] and to the listener.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Cancel the root token.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    /// Whether the root token has been cancelled.
    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancel, then wait for the serve task to stop and for every session
    /// to leave `hub`'s registry. Gives up once `grace` has passed.
    pub async fn graceful_shutdown(&self, hub: &Hub, server: JoinHandle<()>, grace: Duration) {
        self.shutdown();
        info!(
            sessions = hub.registry().len(),
            grace_secs = grace.as_secs(),
            "closing sessions"
        );

        let drained = async {
            if let Err(e) = server.await {
                warn!(error = %e, "serve task failed");
            }
            while !hub.registry().is_empty() {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        };
        if tokio::time::timeout(grace, drained).await.is_err() {
            warn!(
                remaining = hub.registry().len(),
                "grace period over with sessions still open"
            );
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                let _ = signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}
