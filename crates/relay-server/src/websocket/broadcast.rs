//! Fan-out of published payloads to every registered subscriber.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::registry::SubscriberRegistry;
use super::subscriber::{CloseReason, Enqueue, Subscriber};
use crate::errors::HubError;
use crate::metrics::{BROADCAST_DROPS_TOTAL, EVICTIONS_TOTAL};
use crate::rate_limit::RateLimiter;

/// What one broadcast did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers registered at fan-out time.
    pub recipients: usize,
    /// Subscribers the payload was queued for.
    pub delivered: usize,
    /// Subscribers force-closed because their queue was full.
    pub evicted: usize,
}

/// Publishes to every subscriber without waiting on any of them.
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    limiter: RateLimiter,
    shutdown: CancellationToken,
}

impl Broadcaster {
    /// Create a broadcaster. `shutdown` aborts limiter waits.
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        limiter: RateLimiter,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            limiter,
            shutdown,
        }
    }

    /// Wait for the global limiter, then queue `payload` for every
    /// subscriber. Full queues lose the payload and their subscriber is
    /// evicted.
    pub async fn broadcast(&self, payload: Bytes) -> Result<BroadcastReport, HubError> {
        self.limiter.acquire(&self.shutdown).await?;
        Ok(self.fan_out(&payload))
    }

    fn fan_out(&self, payload: &Bytes) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut slow: Vec<Arc<Subscriber>> = Vec::new();

        self.registry.for_each(|subscriber| {
            report.recipients += 1;
            match subscriber.try_enqueue(payload.clone()) {
                Enqueue::Queued => report.delivered += 1,
                Enqueue::Full => slow.push(Arc::clone(subscriber)),
                Enqueue::Closed => {}
            }
        });

        // Force-close outside the registry guard.
        for subscriber in slow {
            counter!(BROADCAST_DROPS_TOTAL).increment(1);
            if subscriber.close(CloseReason::SlowConsumer) {
                report.evicted += 1;
                counter!(EVICTIONS_TOTAL).increment(1);
                warn!(
                    conn_id = %subscriber.conn_id(),
                    peer = %subscriber.id,
                    dropped = subscriber.drop_count(),
                    "evicting slow subscriber"
                );
            }
        }

        debug!(
            bytes = payload.len(),
            recipients = report.recipients,
            delivered = report.delivered,
            evicted = report.evicted,
            "broadcast"
        );
        report
    }
}
