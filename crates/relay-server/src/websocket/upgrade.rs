//! `GET /subscribe`: accept, register, and hand the socket to a session.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Response;
use tracing::{debug, warn};

use super::session;
use crate::hub::Hub;

/// Remote address of the request, or `"unknown"` when the server was not
/// started with connect info.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerAddr(pub String);

impl<S: Send + Sync> FromRequestParts<S> for PeerAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.to_string());
        Ok(Self(addr))
    }
}

/// Register a subscriber for `peer` and complete the upgrade.
///
/// The subscriber is registered before the handshake finishes, so it can
/// already receive (and overflow on) broadcasts. A failed upgrade releases it.
pub fn subscribe(ws: WebSocketUpgrade, peer: String, hub: Arc<Hub>) -> Response {
    let (subscriber, outbound) = hub.accept(peer);
    debug!(conn_id = %subscriber.conn_id(), peer = %subscriber.id, "subscriber accepted");

    let max_frame = hub.config().max_frame_bytes;
    let failed_hub = hub.clone();
    let failed = subscriber.clone();
    ws.max_message_size(max_frame)
        .max_frame_size(max_frame)
        .on_failed_upgrade(move |error| {
            warn!(conn_id = %failed.conn_id(), error = %error, "websocket upgrade failed");
            let _ = failed_hub.release(&failed);
        })
        .on_upgrade(move |socket| async move {
            let _ = session::serve_socket(socket, subscriber, outbound, hub).await;
        })
}
