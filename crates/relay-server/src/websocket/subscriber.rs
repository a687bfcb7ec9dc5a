//! Per-connection subscriber state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::close_code;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use crate::errors::HubError;

/// Session lifecycle. Transitions only move forward; `Closed` is absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, upgrade not yet complete.
    Accepting,
    /// Read and write loops running.
    Active,
    /// Close requested; loops winding down.
    Draining,
    /// Torn down.
    Closed,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the connection (or it went away).
    PeerClosed,
    /// The session outlived its lifetime cap.
    Expired,
    /// The outbound queue overflowed.
    SlowConsumer,
    /// The hub is shutting down.
    Shutdown,
    /// A loop failed with a transport or protocol error.
    Failed,
}

impl CloseReason {
    /// Close code sent to the peer.
    pub fn close_code(self) -> u16 {
        match self {
            Self::PeerClosed | Self::Expired => close_code::NORMAL,
            Self::SlowConsumer => close_code::POLICY,
            Self::Shutdown => close_code::AWAY,
            Self::Failed => close_code::ERROR,
        }
    }

    /// Close reason text sent to the peer.
    pub fn description(self) -> &'static str {
        match self {
            Self::PeerClosed => "",
            Self::Expired => "session expired",
            Self::SlowConsumer => "connection too slow to keep up with messages",
            Self::Shutdown => "server shutting down",
            Self::Failed => "internal error",
        }
    }

    /// Short label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::Expired => "expired",
            Self::SlowConsumer => "slow_consumer",
            Self::Shutdown => "shutdown",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a non-blocking enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueue {
    /// Payload queued for the write loop.
    Queued,
    /// Queue full; payload dropped.
    Full,
    /// Session draining or gone; payload skipped.
    Closed,
}

struct Lifecycle {
    state: SessionState,
    reason: Option<CloseReason>,
}

/// A connected (or connecting) client.
pub struct Subscriber {
    /// Peer address as reported by the transport.
    pub id: String,
    conn_id: Uuid,
    tx: mpsc::Sender<Bytes>,
    lifecycle: Mutex<Lifecycle>,
    cancel: CancellationToken,
    connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl Subscriber {
    /// Create a subscriber in `Accepting` with an outbound queue of
    /// `capacity` (at least one). Its token is a child of `parent`.
    pub fn new(
        id: impl Into<String>,
        capacity: usize,
        parent: &CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscriber = Arc::new(Self {
            id: id.into(),
            conn_id: Uuid::now_v7(),
            tx,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Accepting,
                reason: None,
            }),
            cancel: parent.child_token(),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        });
        (subscriber, rx)
    }

    /// Unique connection identity; the registry key.
    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    /// The first close reason recorded, if any.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lifecycle.lock().reason
    }

    /// Queue a payload without waiting.
    pub fn try_enqueue(&self, payload: Bytes) -> Enqueue {
        if matches!(
            self.state(),
            SessionState::Draining | SessionState::Closed
        ) {
            return Enqueue::Closed;
        }
        match self.tx.try_send(payload) {
            Ok(()) => Enqueue::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Enqueue::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    /// `Accepting -> Active`. Fails if the subscriber was closed (or the hub
    /// shut down) before the upgrade completed, leaving it `Closed`.
    pub fn activate(&self) -> Result<(), HubError> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            SessionState::Accepting if !self.cancel.is_cancelled() => {
                lifecycle.state = SessionState::Active;
                Ok(())
            }
            SessionState::Active => Ok(()),
            _ => {
                lifecycle.state = SessionState::Closed;
                let _ = lifecycle.reason.get_or_insert(CloseReason::Shutdown);
                Err(HubError::ClosedBeforeActive)
            }
        }
    }

    /// Request the session to end with `reason`. Idempotent: only the first
    /// call records a reason and returns `true`.
    ///
    /// `Accepting` goes straight to `Closed`; `Active` moves to `Draining`.
    /// Never blocks.
    pub fn close(&self, reason: CloseReason) -> bool {
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.state = match lifecycle.state {
                SessionState::Accepting => SessionState::Closed,
                SessionState::Active => SessionState::Draining,
                SessionState::Draining | SessionState::Closed => return false,
            };
            lifecycle.reason = Some(reason);
        }
        self.cancel.cancel();
        true
    }

    /// Final transition after teardown.
    pub fn mark_closed(&self) {
        self.lifecycle.lock().state = SessionState::Closed;
        self.cancel.cancel();
    }

    /// Resolves once the session should wind down.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Whether the session has been asked to wind down.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Clone of the session cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Messages dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Time since the subscriber was accepted. Sessions report this as
    /// the connection duration.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("conn_id", &self.conn_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
