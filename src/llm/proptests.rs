//! Property-based tests for streaming wire formats
//!
//! These tests verify that reply text survives the trip through provider
//! stream framing:
//! - SSE payloads are recovered regardless of how bytes are chunked
//! - Text deltas are extracted verbatim from both provider formats

use super::anthropic::parse_stream_event;
use super::event_stream::drain_frames;
use super::openai::parse_stream_chunk;
use proptest::prelude::*;
use serde_json::json;

/// Single-line payload, as providers send JSON
fn arb_payload() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 {}\":,._-]{1,60}"
}

/// Reply fragment, including unicode and embedded newlines
fn arb_fragment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,!?éü中\n]{1,40}"
}

fn encode(payloads: &[String]) -> Vec<u8> {
    payloads
        .iter()
        .flat_map(|p| format!("data: {p}\n\n").into_bytes())
        .collect()
}

proptest! {
    #[test]
    fn prop_framing_is_chunking_invariant(
        payloads in proptest::collection::vec(arb_payload(), 1..10),
        cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let bytes = encode(&payloads);
        let mut points: Vec<usize> = cuts.iter().map(|c| c.index(bytes.len())).collect();
        points.push(bytes.len());
        points.sort_unstable();

        let mut buf = Vec::new();
        let mut recovered = Vec::new();
        let mut start = 0;
        for end in points {
            buf.extend_from_slice(&bytes[start..end]);
            recovered.extend(drain_frames(&mut buf));
            start = end;
        }

        prop_assert_eq!(recovered, payloads);
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn prop_openai_delta_text_preserved(text in arb_fragment()) {
        let chunk = json!({ "choices": [{ "delta": { "content": text } }] }).to_string();
        prop_assert_eq!(parse_stream_chunk(&chunk).unwrap(), Some(text));
    }

    #[test]
    fn prop_anthropic_delta_text_preserved(text in arb_fragment()) {
        let event = json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": { "type": "text_delta", "text": text }
        })
        .to_string();
        prop_assert_eq!(parse_stream_event(&event).unwrap(), Some(text));
    }

    #[test]
    fn prop_openai_error_chunk_never_yields_text(message in arb_payload()) {
        let chunk = json!({ "choices": [], "error": { "message": message } }).to_string();
        prop_assert!(parse_stream_chunk(&chunk).is_err());
    }
}
