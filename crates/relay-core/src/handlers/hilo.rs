//! HiLo: one player picks a number, the others guess until they hit it.
//!
//! Only the observation side exists here. Every message is logged with its
//! source; a payload that parses as an integer is treated as a guess and the
//! verdict is logged. Nothing is sent back: the hub broadcasts the raw
//! message to everyone regardless.

use std::cmp::Ordering;

use tracing::{debug, info};

use crate::handler::{HandlerError, MessageHandler};

/// Default number players are trying to guess.
const DEFAULT_MAGIC_NUMBER: i64 = 10;

/// Outcome of one guess.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The answer is higher than the guess.
    Higher,
    /// The answer is lower than the guess.
    Lower,
    /// Exact hit.
    Correct,
}

/// The HiLo guessing game.
#[derive(Clone, Debug)]
pub struct HiLo {
    magic_number: i64,
}

impl HiLo {
    /// Start a game with the default magic number.
    pub fn new() -> Self {
        Self::with_magic_number(DEFAULT_MAGIC_NUMBER)
    }

    /// Start a game with a chosen magic number.
    pub fn with_magic_number(magic_number: i64) -> Self {
        Self { magic_number }
    }

    /// Judge a guess against the magic number.
    pub fn judge(&self, guess: i64) -> Verdict {
        match guess.cmp(&self.magic_number) {
            Ordering::Less => Verdict::Higher,
            Ordering::Greater => Verdict::Lower,
            Ordering::Equal => Verdict::Correct,
        }
    }

    /// Parse a payload as a guess. Surrounding whitespace is ignored.
    pub fn parse_guess(payload: &[u8]) -> Option<i64> {
        std::str::from_utf8(payload).ok()?.trim().parse().ok()
    }
}

impl Default for HiLo {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for HiLo {
    fn name(&self) -> &'static str {
        "hilo"
    }

    fn handle(&self, source_id: &str, payload: &[u8]) -> Result<(), HandlerError> {
        info!(source_id, len = payload.len(), "hilo received a message");
        if let Some(guess) = Self::parse_guess(payload) {
            let verdict = self.judge(guess);
            debug!(source_id, guess, ?verdict, "hilo guess judged");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_magic_number() {
        let game = HiLo::new();
        assert_eq!(game.judge(10), Verdict::Correct);
    }

    #[test]
    fn judge_directions() {
        let game = HiLo::with_magic_number(42);
        assert_eq!(game.judge(1), Verdict::Higher);
        assert_eq!(game.judge(100), Verdict::Lower);
        assert_eq!(game.judge(42), Verdict::Correct);
    }

    #[test]
    fn parse_guess_trims_whitespace() {
        assert_eq!(HiLo::parse_guess(b" 17\n"), Some(17));
        assert_eq!(HiLo::parse_guess(b"-3"), Some(-3));
    }

    #[test]
    fn parse_guess_rejects_non_numbers() {
        assert_eq!(HiLo::parse_guess(b"hello"), None);
        assert_eq!(HiLo::parse_guess(b"\xff\xfe"), None);
        assert_eq!(HiLo::parse_guess(b""), None);
    }

    #[test]
    fn handle_never_fails() {
        let game = HiLo::default();
        assert!(game.handle("10.0.0.1:5000", b"7").is_ok());
        assert!(game.handle("10.0.0.1:5000", b"not a guess").is_ok());
    }
}
