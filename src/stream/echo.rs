//! Echo State Tracking
//!
//! A server that offers to echo (`IAC WILL ECHO`) is about to render the
//! user's input itself, usually masked for a password. The client must then
//! stop displaying raw input until the server refuses again (`IAC WONT ECHO`).

use super::telnet::{WILL, WONT};

/// Result of observing one negotiation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoUpdate {
    /// True while local echo must be suppressed.
    pub suppressed: bool,
    /// True only if this observation flipped the state.
    pub changed: bool,
}

/// Edge-triggered tracker for the server's ECHO offer.
#[derive(Debug, Default)]
pub struct EchoStateTracker {
    suppressed: bool,
}

impl EchoStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a negotiation command.
    ///
    /// Only WILL and WONT for the echo option move the state. Requests from
    /// the server (DO/DONT) and other options leave it untouched.
    pub fn observe(&mut self, command: u8, is_echo_option: bool) -> EchoUpdate {
        let next = match (command, is_echo_option) {
            (WILL, true) => true,
            (WONT, true) => false,
            _ => self.suppressed,
        };

        let changed = next != self.suppressed;
        self.suppressed = next;
        EchoUpdate { suppressed: next, changed }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }
}
