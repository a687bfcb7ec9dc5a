//! Subscriber state, registry, fan-out, and connection sessions.

pub mod broadcast;
pub mod registry;
pub mod session;
pub mod subscriber;
pub mod upgrade;
