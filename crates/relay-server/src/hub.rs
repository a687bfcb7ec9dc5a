//! The hub: registry, broadcaster, and ingress wired together.

use std::sync::Arc;

use bytes::Bytes;
use relay_core::MessageHandler;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::errors::HubError;
use crate::ingress::{Ingress, PublishSource};
use crate::rate_limit::RateLimiter;
use crate::websocket::broadcast::{BroadcastReport, Broadcaster};
use crate::websocket::registry::SubscriberRegistry;
use crate::websocket::subscriber::Subscriber;

/// Shared state behind every route and session.
pub struct Hub {
    config: HubConfig,
    registry: Arc<SubscriberRegistry>,
    ingress: Ingress,
    shutdown: CancellationToken,
}

impl Hub {
    /// Build a hub. Cancelling `shutdown` ends every session.
    pub fn new(
        config: HubConfig,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(
            registry.clone(),
            RateLimiter::from_config(&config.publish_limit),
            shutdown.clone(),
        ));
        let ingress = Ingress::new(handler, broadcaster, config.max_payload_bytes);
        Self {
            config,
            registry,
            ingress,
            shutdown,
        }
    }

    /// Create a subscriber for `peer` and register it right away, before
    /// its upgrade completes.
    pub fn accept(&self, peer: impl Into<String>) -> (Arc<Subscriber>, mpsc::Receiver<Bytes>) {
        let (subscriber, outbound) =
            Subscriber::new(peer, self.config.subscriber_buffer, &self.shutdown);
        self.registry.register(subscriber.clone());
        (subscriber, outbound)
    }

    /// Unregister and close. Safe to call more than once.
    pub fn release(&self, subscriber: &Subscriber) -> bool {
        let removed = self.registry.unregister(subscriber);
        subscriber.mark_closed();
        removed
    }

    /// Publish through the ingress path.
    pub async fn publish(
        &self,
        source: PublishSource,
        source_id: &str,
        payload: Bytes,
    ) -> Result<BroadcastReport, HubError> {
        self.ingress.publish(source, source_id, payload).await
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Live subscribers.
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Hub-wide shutdown token.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}
