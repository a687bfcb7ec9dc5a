//! Built-in [`MessageHandler`] implementations.

pub mod hilo;
pub mod silent;

use std::sync::Arc;

use crate::handler::{HandlerKind, MessageHandler};

pub use hilo::HiLo;
pub use silent::Silent;

/// Construct the handler selected by `kind`.
pub fn build(kind: HandlerKind) -> Arc<dyn MessageHandler> {
    match kind {
        HandlerKind::Hilo => Arc::new(HiLo::new()),
        HandlerKind::Silent => Arc::new(Silent),
    }
}
