//! # relay-server
//!
//! Axum HTTP + `WebSocket` broadcast hub.
//!
//! - `GET /subscribe`: upgrade to a `WebSocket` session that receives every
//!   broadcast and may publish its own frames
//! - `POST /publish`: one-shot publish of a raw body
//! - Fan-out through [`websocket::broadcast::Broadcaster`] over the
//!   [`websocket::registry::SubscriberRegistry`], with slow-consumer eviction
//! - Token-bucket throttling via [`rate_limit::RateLimiter`]
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod hub;
pub mod ingress;
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{HubConfig, RateLimitConfig};
pub use errors::HubError;
pub use hub::Hub;
pub use server::HubServer;
