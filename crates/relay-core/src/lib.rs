//! # relay-core
//!
//! Foundation types shared by every relay crate.
//!
//! - [`handler::MessageHandler`]: the single capability invoked for every
//!   inbound message before it is broadcast
//! - [`handlers`]: built-in handler implementations, selected at startup
//! - [`logging::init_subscriber`]: global `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod handler;
pub mod handlers;
pub mod logging;

pub use handler::{HandlerError, HandlerKind, MessageHandler};
