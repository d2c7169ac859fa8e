//! Telnet Stream Demultiplexer
//!
//! Splits raw socket bytes into payload and telnet control sequences.
//! Reads are not message aligned, so a sequence cut off at the end of a
//! chunk is held back and completed by the next one.
//!
//! Sequences handled:
//! - `IAC IAC` emits a literal 0xFF
//! - `IAC WILL|WONT|DO|DONT <opt>` is consumed; ECHO updates the tracker
//! - `IAC GA` is consumed
//! - `IAC SB ... IAC SE` is consumed as a whole, `IAC IAC` inside it is not a terminator
//! - `IAC <other>` is consumed as a two byte unit

use bytes::BytesMut;
use log::debug;

use super::echo::EchoStateTracker;
use super::telnet::{command_name, is_negotiation, ECHO, GA, IAC, SB, SE};

/// Output of one demux pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Demuxed {
    /// Payload bytes with every control sequence removed.
    pub payload: Vec<u8>,
    /// Echo suppression transitions in the order they appeared.
    pub echo_changes: Vec<bool>,
}

/// Stateful control sequence stripper.
///
/// `pending` only ever holds a strict prefix of an unfinished sequence:
/// a bare IAC, IAC + negotiation command without its option, or an
/// unterminated subnegotiation from its IAC SB onward.
#[derive(Debug, Default)]
pub struct StreamDemux {
    pending: BytesMut,
}

impl StreamDemux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip control sequences from `chunk`, prefixed by any sequence left
    /// unfinished by the previous call.
    pub fn feed(&mut self, chunk: &[u8], echo: &mut EchoStateTracker) -> Demuxed {
        let mut input = self.pending.split();
        input.extend_from_slice(chunk);

        let mut out = Demuxed {
            payload: Vec::with_capacity(input.len()),
            echo_changes: Vec::new(),
        };

        let mut i = 0;
        while i < input.len() {
            let byte = input[i];
            if byte != IAC {
                out.payload.push(byte);
                i += 1;
                continue;
            }

            let Some(&command) = input.get(i + 1) else {
                break;
            };

            match command {
                IAC => {
                    out.payload.push(IAC);
                    i += 2;
                }
                command if is_negotiation(command) => {
                    let Some(&option) = input.get(i + 2) else {
                        break;
                    };
                    debug!("telnet: IAC {} {}", command_name(command), option);
                    if option == ECHO {
                        let update = echo.observe(command, true);
                        if update.changed {
                            out.echo_changes.push(update.suppressed);
                        }
                    }
                    i += 3;
                }
                GA => {
                    i += 2;
                }
                SB => match subnegotiation_len(&input[i + 2..]) {
                    Some(len) => {
                        debug!("telnet: skipped subnegotiation of {} bytes", len + 2);
                        i += 2 + len;
                    }
                    None => break,
                },
                other => {
                    debug!("telnet: ignored IAC {}", other);
                    i += 2;
                }
            }
        }

        // Anything left unscanned is an unfinished sequence starting at IAC.
        if i < input.len() {
            self.pending.extend_from_slice(&input[i..]);
        }

        out
    }

    /// Bytes held back from the previous call.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}

/// Length of a subnegotiation body including its `IAC SE` terminator, or
/// `None` if the terminator has not arrived yet.
fn subnegotiation_len(body: &[u8]) -> Option<usize> {
    let mut j = 0;
    while j < body.len() {
        if body[j] != IAC {
            j += 1;
            continue;
        }
        match body.get(j + 1) {
            None => return None,
            Some(&SE) => return Some(j + 2),
            // IAC IAC is an escaped data byte, anything else is skipped as a pair
            Some(_) => j += 2,
        }
    }
    None
}
