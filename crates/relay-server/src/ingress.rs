//! The two publish paths: one-shot HTTP bodies and `WebSocket` frames.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use relay_core::MessageHandler;
use tracing::warn;

use crate::errors::HubError;
use crate::metrics::MESSAGES_PUBLISHED_TOTAL;
use crate::websocket::broadcast::{BroadcastReport, Broadcaster};

/// Where a message entered the hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishSource {
    /// `POST /publish`.
    Http,
    /// A frame read from a subscriber session.
    Connection,
}

impl PublishSource {
    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Connection => "ws",
        }
    }
}

/// Size check, then the message handler, then the broadcaster.
pub struct Ingress {
    handler: Arc<dyn MessageHandler>,
    broadcaster: Arc<Broadcaster>,
    max_payload_bytes: usize,
}

impl Ingress {
    /// Create an ingress path.
    pub fn new(
        handler: Arc<dyn MessageHandler>,
        broadcaster: Arc<Broadcaster>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            handler,
            broadcaster,
            max_payload_bytes,
        }
    }

    /// Publish `payload` from `source_id`. Handler failures are logged and
    /// do not stop the broadcast.
    pub async fn publish(
        &self,
        source: PublishSource,
        source_id: &str,
        payload: Bytes,
    ) -> Result<BroadcastReport, HubError> {
        if payload.len() > self.max_payload_bytes {
            return Err(HubError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_payload_bytes,
            });
        }
        if let Err(e) = self.handler.handle(source_id, &payload) {
            warn!(handler = self.handler.name(), source_id, error = %e, "message handler failed");
        }
        counter!(MESSAGES_PUBLISHED_TOTAL, "source" => source.as_str()).increment(1);
        self.broadcaster.broadcast(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimiter;
    use crate::websocket::registry::SubscriberRegistry;
    use crate::websocket::subscriber::Subscriber;
    use parking_lot::Mutex;
    use relay_core::HandlerError;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    impl MessageHandler for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn handle(&self, source_id: &str, payload: &[u8]) -> Result<(), HandlerError> {
            self.calls
                .lock()
                .push((source_id.to_string(), payload.to_vec()));
            if self.fail {
                return Err(HandlerError::new("recording", "refused"));
            }
            Ok(())
        }
    }

    fn make_ingress(handler: Arc<Recording>, limit: usize) -> (Ingress, Arc<SubscriberRegistry>) {
        let registry = Arc::new(SubscriberRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(
            registry.clone(),
            RateLimiter::new(Duration::from_millis(1), 8),
            CancellationToken::new(),
        ));
        (Ingress::new(handler, broadcaster, limit), registry)
    }

    #[tokio::test]
    async fn publish_runs_handler_then_broadcasts() {
        let handler = Arc::new(Recording::default());
        let (ingress, registry) = make_ingress(handler.clone(), 64);
        let (sub, mut rx) = Subscriber::new("peer", 4, &CancellationToken::new());
        registry.register(sub);

        let report = ingress
            .publish(PublishSource::Http, "10.0.0.9:1234", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"hello"));

        let calls = handler.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "10.0.0.9:1234");
        assert_eq!(calls[0].1, b"hello");
    }

    #[tokio::test]
    async fn oversized_payload_rejected_before_handler() {
        let handler = Arc::new(Recording::default());
        let (ingress, _registry) = make_ingress(handler.clone(), 4);

        let err = ingress
            .publish(PublishSource::Connection, "peer", Bytes::from_static(b"too long"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HubError::PayloadTooLarge { size: 8, limit: 4 }
        ));
        assert!(handler.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn payload_at_limit_accepted() {
        let handler = Arc::new(Recording::default());
        let (ingress, _registry) = make_ingress(handler, 4);
        let report = ingress
            .publish(PublishSource::Http, "peer", Bytes::from_static(b"four"))
            .await
            .unwrap();
        assert_eq!(report.recipients, 0);
    }

    #[tokio::test]
    async fn handler_failure_does_not_block_broadcast() {
        let handler = Arc::new(Recording {
            fail: true,
            ..Recording::default()
        });
        let (ingress, registry) = make_ingress(handler.clone(), 64);
        let (sub, mut rx) = Subscriber::new("peer", 4, &CancellationToken::new());
        registry.register(sub);

        let _ = ingress
            .publish(PublishSource::Connection, "peer", Bytes::from_static(b"7"))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"7"));
        assert_eq!(handler.calls.lock().len(), 1);
    }

    #[test]
    fn source_labels() {
        assert_eq!(PublishSource::Http.as_str(), "http");
        assert_eq!(PublishSource::Connection.as_str(), "ws");
    }
}
