//! A handler that does nothing.

use crate::handler::{HandlerError, MessageHandler};

/// Ignores every message. The hub becomes a pure relay.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl MessageHandler for Silent {
    fn name(&self) -> &'static str {
        "silent"
    }

    fn handle(&self, _source_id: &str, _payload: &[u8]) -> Result<(), HandlerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_anything() {
        assert!(Silent.handle("127.0.0.1:1", b"\xff\x00").is_ok());
    }
}
