//! Stream Processing
//!
//! The byte pipeline that sits between a socket and line-oriented consumers:
//! - telnet: wire constants
//! - demux: control sequence stripping with boundary-spanning buffering
//! - echo: ECHO option state for password masking
//! - utf8: reassembly of characters split across reads
//!
//! [`StreamPipeline`] runs them in order and adds the line accumulation used
//! by the connection read loop.

pub mod demux;
pub mod echo;
pub mod telnet;
pub mod utf8;

pub use demux::{Demuxed, StreamDemux};
pub use echo::{EchoStateTracker, EchoUpdate};
pub use utf8::{decode_text, incomplete_tail_len, Utf8Reassembler};

use bytes::BytesMut;

/// Result of pushing a span of raw bytes through the pipeline.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Flushed {
    /// Decoded text with carriage returns stripped. `None` when nothing
    /// displayable remained.
    pub text: Option<String>,
    /// Echo suppression transitions, oldest first.
    pub echo_changes: Vec<bool>,
}

impl Flushed {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.echo_changes.is_empty()
    }
}

/// Per-connection parser state. Owned by a single read loop.
#[derive(Debug, Default)]
pub struct StreamPipeline {
    demux: StreamDemux,
    echo: EchoStateTracker,
    utf8: Utf8Reassembler,
    accumulated: BytesMut,
}

impl StreamPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one chunk through demux and reassembly.
    ///
    /// The UTF-8 tail held from the previous chunk is joined to the demuxed
    /// payload, never to raw bytes, so telnet bytes are never mistaken for
    /// character data.
    pub fn process(&mut self, chunk: &[u8]) -> Flushed {
        let demuxed = self.demux.feed(chunk, &mut self.echo);
        let mut complete = self.utf8.consume(&demuxed.payload).to_vec();
        complete.retain(|&b| b != b'\r');

        let text = if complete.is_empty() {
            None
        } else {
            Some(decode_text(complete))
        };

        Flushed {
            text,
            echo_changes: demuxed.echo_changes,
        }
    }

    /// Accumulate bytes from a read. Once the accumulated span holds a line
    /// feed the whole span is processed and returned.
    pub fn push(&mut self, bytes: &[u8]) -> Option<Flushed> {
        self.accumulated.extend_from_slice(bytes);
        if bytes.contains(&b'\n') {
            self.flush()
        } else {
            None
        }
    }

    /// Process whatever has accumulated, newline or not. This is the prompt
    /// path taken when a read times out.
    pub fn flush(&mut self) -> Option<Flushed> {
        if self.accumulated.is_empty() {
            return None;
        }
        let span = self.accumulated.split();
        let flushed = self.process(&span);
        if flushed.is_empty() {
            None
        } else {
            Some(flushed)
        }
    }

    /// True while raw bytes are waiting for a newline or a timeout.
    pub fn has_pending(&self) -> bool {
        !self.accumulated.is_empty()
    }

    /// Current echo suppression state.
    pub fn server_echo(&self) -> bool {
        self.echo.is_suppressed()
    }
}

#[cfg(test)]
mod tests {
    use super::telnet::{ECHO, GA, IAC, SB, SE, WILL, WONT};
    use super::*;

    #[test]
    fn test_hello_world_across_go_ahead() {
        let mut pipeline = StreamPipeline::new();

        let first = pipeline.process(b"Hello\xFF");
        assert_eq!(first.text.as_deref(), Some("Hello"));

        let second = pipeline.process(&[GA, b'W', b'o', b'r', b'l', b'd']);
        assert_eq!(second.text.as_deref(), Some("World"));
    }

    #[test]
    fn test_escaped_sentinel_reaches_reassembler_as_data() {
        let mut pipeline = StreamPipeline::new();
        // The literal 0xFF is not valid UTF-8 and decodes lossily
        let out = pipeline.process(&[IAC, IAC, b'A', b'B']);
        assert_eq!(out.text.as_deref(), Some("\u{FFFD}AB"));
    }

    #[test]
    fn test_carriage_returns_stripped() {
        let mut pipeline = StreamPipeline::new();
        let out = pipeline.process(b"line one\r\nline two\r\n");
        assert_eq!(out.text.as_deref(), Some("line one\nline two\n"));
    }

    #[test]
    fn test_character_split_around_control_sequence() {
        let bytes = "日本".as_bytes();
        let mut pipeline = StreamPipeline::new();

        let mut chunk = bytes[..4].to_vec();
        chunk.extend_from_slice(&[IAC, WILL]);
        let first = pipeline.process(&chunk);
        assert_eq!(first.text.as_deref(), Some("日"));

        let mut chunk = vec![ECHO];
        chunk.extend_from_slice(&bytes[4..]);
        let second = pipeline.process(&chunk);
        assert_eq!(second.text.as_deref(), Some("本"));
        assert_eq!(second.echo_changes, vec![true]);
        assert!(pipeline.server_echo());
    }

    #[test]
    fn test_push_waits_for_newline() {
        let mut pipeline = StreamPipeline::new();
        assert!(pipeline.push(b"Welcome to ").is_none());
        assert!(pipeline.has_pending());

        let flushed = pipeline.push(b"the realm\r\nWhat is your na").unwrap();
        assert_eq!(
            flushed.text.as_deref(),
            Some("Welcome to the realm\nWhat is your na")
        );
        assert!(!pipeline.has_pending());
    }

    #[test]
    fn test_prompt_flushes_exactly_once() {
        let mut pipeline = StreamPipeline::new();
        assert!(pipeline.push(b"Name: ").is_none());

        let flushed = pipeline.flush().unwrap();
        assert_eq!(flushed.text.as_deref(), Some("Name: "));
        assert!(pipeline.flush().is_none());
    }

    #[test]
    fn test_password_prompt_reports_echo_change() {
        let mut pipeline = StreamPipeline::new();
        let mut chunk = b"Password: ".to_vec();
        chunk.extend_from_slice(&[IAC, WILL, ECHO]);

        assert!(pipeline.push(&chunk).is_none());
        let flushed = pipeline.flush().unwrap();
        assert_eq!(flushed.text.as_deref(), Some("Password: "));
        assert_eq!(flushed.echo_changes, vec![true]);

        let flushed = pipeline.push(&[IAC, WONT, ECHO, b'\r', b'\n']).unwrap();
        assert_eq!(flushed.text.as_deref(), Some("\n"));
        assert_eq!(flushed.echo_changes, vec![false]);
    }

    #[test]
    fn test_control_only_flush_is_empty() {
        let mut pipeline = StreamPipeline::new();
        pipeline.push(&[IAC, SB, 70, 1, 2, IAC, SE]);
        assert!(pipeline.flush().is_none());
        assert!(!pipeline.has_pending());
    }

    #[test]
    fn test_incomplete_character_held_over_flush() {
        let bytes = "é".as_bytes();
        let mut pipeline = StreamPipeline::new();

        pipeline.push(&[b'a', bytes[0]]);
        let flushed = pipeline.flush().unwrap();
        assert_eq!(flushed.text.as_deref(), Some("a"));

        let flushed = pipeline.push(&[bytes[1], b'\n']).unwrap();
        assert_eq!(flushed.text.as_deref(), Some("é\n"));
    }
}
