//! Shared building blocks for the terminal Pong netplay stack.
//!
//! This crate holds everything both binaries need: the wire protocol codec,
//! the game simulation interface and its registry, the Pong simulation, the
//! key-code mapping, terminal screen helpers and the stats file. The server
//! and client crates layer transport and session loops on top.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub mod game;
pub mod keys;
pub mod pong;
pub mod protocol;
pub mod stats;
pub mod term;

pub use game::{new_game, Game, GameType, GameView, Session, SessionMode};
pub use protocol::{Header, Message, MsgType, ProtocolError, Role};

/// Fixed width of every name field on the wire, terminator included.
pub const MAX_NAME_LEN: usize = 32;
pub const DEFAULT_PORT: u16 = 7500;
pub const MAX_SPECTATORS: usize = 8;
/// Two player seats plus the spectator pool.
pub const MAX_CLIENTS: usize = 2 + MAX_SPECTATORS;
/// How long a paused match waits before the remaining player wins.
pub const RECONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const TICK_RATE_HZ: u32 = 30;
pub const MAX_MSG_PAYLOAD: usize = 256;
pub const MSG_HEADER_SIZE: usize = 3;

/// Length of one simulation tick at the given rate.
pub fn tick_interval(rate_hz: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(rate_hz.max(1)))
}

/// Cooperative shutdown flag, set from the ctrl-c handler and checked by
/// every loop at its polling points.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_interval_matches_rate() {
        assert_eq!(tick_interval(30), Duration::from_micros(33_333));
        assert_eq!(tick_interval(60), Duration::from_micros(16_666));
        // A zero rate must not divide by zero.
        assert_eq!(tick_interval(0), Duration::from_micros(1_000_000));
    }

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());

        let clone = token.clone();
        assert!(clone.is_cancelled());
    }
}
