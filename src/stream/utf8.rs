//! UTF-8 Reassembly
//!
//! Socket reads do not respect character boundaries. The reassembler holds
//! back a trailing partial multi-byte character until a later chunk
//! completes it, so text is never decoded from half a character.

use bytes::BytesMut;

/// Holds the incomplete tail of the previous chunk (0-3 bytes).
#[derive(Debug, Default)]
pub struct Utf8Reassembler {
    pending: BytesMut,
}

impl Utf8Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend the held tail to `bytes` and return every complete byte.
    ///
    /// Whatever looks like the start of an unfinished character at the end
    /// of the combined input is kept for the next call.
    pub fn consume(&mut self, bytes: &[u8]) -> BytesMut {
        let mut combined = self.pending.split();
        combined.extend_from_slice(bytes);

        let tail = incomplete_tail_len(&combined);
        let complete_len = combined.len() - tail;
        let complete = combined.split_to(complete_len);
        self.pending = combined;
        complete
    }

    /// Bytes currently held back.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Total byte length of a character given its leading byte, or `None` if
/// the byte cannot start a multi-byte character.
pub fn sequence_width(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC0..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF7 => Some(4),
        _ => None,
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Number of trailing bytes that form an unfinished multi-byte character.
///
/// Walks back over at most three continuation bytes to the leading byte and
/// compares the width it declares with what is actually present. Invalid
/// sequences report 0 so they are passed through and decoded lossily.
pub fn incomplete_tail_len(bytes: &[u8]) -> usize {
    let lookback = bytes.len().min(3);

    for present in 1..=lookback {
        let byte = bytes[bytes.len() - present];
        if is_continuation(byte) {
            continue;
        }
        return match sequence_width(byte) {
            Some(width) if width > present => present,
            _ => 0,
        };
    }
    0
}

/// Decode complete bytes into text. Invalid sequences become U+FFFD.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(reassembler: &mut Utf8Reassembler, chunks: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&reassembler.consume(chunk));
        }
        out
    }

    #[test]
    fn test_ascii_is_always_complete() {
        assert_eq!(incomplete_tail_len(b"hello"), 0);
        assert_eq!(incomplete_tail_len(b""), 0);
    }

    #[test]
    fn test_tail_lengths() {
        // 2-byte start, nothing after
        assert_eq!(incomplete_tail_len(&[b'a', 0xC3]), 1);
        // 3-byte start with one continuation
        assert_eq!(incomplete_tail_len(&[b'a', 0xE4, 0xB8]), 2);
        // 4-byte start with two continuations
        assert_eq!(incomplete_tail_len(&[0xF0, 0x9F, 0x8C]), 3);
        // complete 3-byte character
        assert_eq!(incomplete_tail_len("中".as_bytes()), 0);
        // complete 4-byte character
        assert_eq!(incomplete_tail_len("🌍".as_bytes()), 0);
    }

    #[test]
    fn test_stray_continuation_passes_through() {
        assert_eq!(incomplete_tail_len(&[b'a', 0x80, 0x80]), 0);
        assert_eq!(incomplete_tail_len(&[0x80, 0x80, 0x80, 0x80]), 0);
    }

    #[test]
    fn test_three_byte_split_two_then_one() {
        let bytes = "中".as_bytes();
        let mut r = Utf8Reassembler::new();

        assert!(r.consume(&bytes[..2]).is_empty());
        assert_eq!(r.pending(), &bytes[..2]);
        assert_eq!(&r.consume(&bytes[2..])[..], bytes);
        assert!(r.is_empty());
    }

    #[test]
    fn test_three_byte_split_one_then_two() {
        let bytes = "中".as_bytes();
        let mut r = Utf8Reassembler::new();

        let out = feed(&mut r, &[&bytes[..1], &bytes[1..]]);
        assert_eq!(out, bytes);
        assert!(r.is_empty());
    }

    #[test]
    fn test_four_byte_split_three_then_one() {
        let bytes = "🌍".as_bytes();
        let mut r = Utf8Reassembler::new();

        assert!(r.consume(&bytes[..3]).is_empty());
        assert_eq!(&r.consume(&bytes[3..])[..], bytes);
        assert!(r.is_empty());
    }

    #[test]
    fn test_two_byte_split_with_text_around() {
        let text = "café au lait";
        let bytes = text.as_bytes();
        let split = text.find('é').unwrap() + 1;
        let mut r = Utf8Reassembler::new();

        let first = r.consume(&bytes[..split]);
        assert_eq!(&first[..], b"caf");
        let out = feed(&mut r, &[&bytes[split..]]);
        assert_eq!(decode_text([&first[..], &out[..]].concat()), text);
    }

    #[test]
    fn test_decode_text_lossy() {
        assert_eq!(decode_text(vec![b'o', b'k', 0xFF]), "ok\u{FFFD}");
    }
}
