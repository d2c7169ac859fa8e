use proptest::prelude::*;

use mudlink::stream::telnet::{DO, DONT, ECHO, GA, IAC, SB, SE, WILL, WONT};
use mudlink::stream::{EchoStateTracker, StreamDemux, StreamPipeline, Utf8Reassembler};

// --- Stream generators ---

fn escaped(bytes: impl IntoIterator<Item = u8>) -> Vec<u8> {
    let mut out = Vec::new();
    for b in bytes {
        if b == IAC {
            out.push(IAC);
        }
        out.push(b);
    }
    out
}

fn arb_token() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        6 => "\\PC{0,10}".prop_map(String::into_bytes),
        1 => Just(b"\r\n".to_vec()),
        1 => Just(vec![IAC, IAC]),
        1 => Just(vec![IAC, GA]),
        1 => Just(vec![IAC, 241]),
        1 => prop_oneof![Just(WILL), Just(WONT)].prop_map(|cmd| vec![IAC, cmd, ECHO]),
        1 => (prop_oneof![Just(WILL), Just(WONT), Just(DO), Just(DONT)], any::<u8>())
            .prop_map(|(cmd, option)| vec![IAC, cmd, option]),
        1 => prop::collection::vec(any::<u8>(), 1..16).prop_map(|body| {
            let mut unit = vec![IAC, SB];
            unit.extend(escaped(body));
            unit.extend_from_slice(&[IAC, SE]);
            unit
        }),
    ]
}

fn arb_stream() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(arb_token(), 0..24).prop_map(|tokens| tokens.concat())
}

fn arb_chunked() -> impl Strategy<Value = (Vec<u8>, Vec<usize>)> {
    (arb_stream(), prop::collection::vec(any::<prop::sample::Index>(), 0..8)).prop_map(|(stream, picks)| {
        let mut cuts: Vec<usize> = picks.iter().map(|p| p.index(stream.len() + 1)).collect();
        cuts.sort_unstable();
        cuts.dedup();
        (stream, cuts)
    })
}

fn chunks<'a>(stream: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
    let mut out = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        out.push(&stream[start..cut]);
        start = cut;
    }
    out.push(&stream[start..]);
    out
}

fn run_pipeline(parts: &[&[u8]]) -> (String, Vec<bool>) {
    let mut pipeline = StreamPipeline::new();
    let mut text = String::new();
    let mut echo_changes = Vec::new();
    for part in parts {
        let flushed = pipeline.process(part);
        if let Some(t) = flushed.text {
            text.push_str(&t);
        }
        echo_changes.extend(flushed.echo_changes);
    }
    (text, echo_changes)
}

// --- Properties ---

proptest! {
    #[test]
    fn chunking_does_not_change_output((stream, cuts) in arb_chunked()) {
        let whole = run_pipeline(&[&stream]);
        let split = run_pipeline(&chunks(&stream, &cuts));
        prop_assert_eq!(whole, split);
    }

    #[test]
    fn complete_stream_leaves_nothing_buffered((stream, cuts) in arb_chunked()) {
        let mut demux = StreamDemux::new();
        let mut echo = EchoStateTracker::new();
        let mut utf8 = Utf8Reassembler::new();

        for part in chunks(&stream, &cuts) {
            let demuxed = demux.feed(part, &mut echo);
            utf8.consume(&demuxed.payload);
        }
        prop_assert!(demux.pending().is_empty());
        prop_assert!(utf8.pending().is_empty());
    }

    #[test]
    fn text_without_controls_survives(text in "\\PC{0,64}", picks in prop::collection::vec(any::<prop::sample::Index>(), 0..8)) {
        let bytes = text.as_bytes();
        let mut cuts: Vec<usize> = picks.iter().map(|p| p.index(bytes.len() + 1)).collect();
        cuts.sort_unstable();
        cuts.dedup();

        let (out, echo_changes) = run_pipeline(&chunks(bytes, &cuts));
        prop_assert_eq!(out, text.replace('\r', ""));
        prop_assert!(echo_changes.is_empty());
    }
}
