//! Property-based tests for the frame decoder's resync and chunking guarantees.
//!
//! These generate arbitrary frame streams and arbitrary junk/chunking and check
//! the invariants from the serial protocol's testable-properties list: resync
//! past junk and chunk-boundary invariance never change the dispatched frame
//! sequence.

use bytes::Bytes;
use proptest::prelude::*;
use sensorlink_core::constants::{END_MARKER, START_MARKER};
use sensorlink_core::{FrameType, Sid};
use sensorlink_protocol::FrameDecoder;

fn encode_frame(sid: [u8; 6], frame_type: u8, seq: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&START_MARKER);
    out.extend_from_slice(&sid);
    out.push(frame_type);
    out.extend_from_slice(&seq.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&END_MARKER);
    out
}

fn sid_strategy() -> impl Strategy<Value = [u8; 6]> {
    prop::array::uniform6(any::<u8>())
}

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

fn frame_strategy() -> impl Strategy<Value = ([u8; 6], u8, u32, Vec<u8>)> {
    (sid_strategy(), prop_oneof![Just(1u8), Just(2u8), Just(3u8)], 0u32..10_000, payload_strategy())
}

/// Junk bytes that never collide with a real start marker, so inserting them
/// never accidentally produces a frame the reference stream didn't have.
fn junk_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0xAAu8..0xAF, 0..16)
}

proptest! {
    /// Property 2: chunk boundary invariance. The same byte stream, split at any
    /// set of arbitrary points and fed sequentially, yields the same frames as
    /// feeding it whole.
    #[test]
    fn chunk_boundaries_do_not_change_dispatched_frames(
        frames in prop::collection::vec(frame_strategy(), 1..6),
        split_seed in any::<u64>(),
    ) {
        let mut wire = Vec::new();
        for (sid, ty, seq, payload) in &frames {
            wire.extend(encode_frame(*sid, *ty, *seq, payload));
        }

        let mut whole_decoder = FrameDecoder::new();
        whole_decoder.feed(&wire);
        let whole = whole_decoder.drain(false, None);

        // Deterministic pseudo-random split points derived from split_seed.
        let mut state = split_seed.max(1);
        let mut chunked_decoder = FrameDecoder::new();
        let mut chunked = Vec::new();
        let mut pos = 0;
        while pos < wire.len() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let take = 1 + (state % 7) as usize;
            let end = (pos + take).min(wire.len());
            chunked_decoder.feed(&wire[pos..end]);
            chunked.extend(chunked_decoder.drain(false, None));
            pos = end;
        }

        prop_assert_eq!(whole.len(), frames.len());
        prop_assert_eq!(chunked.len(), whole.len());
        for (a, b) in whole.iter().zip(chunked.iter()) {
            prop_assert_eq!(a.source_id, b.source_id);
            prop_assert_eq!(a.frame_type, b.frame_type);
            prop_assert_eq!(a.sequence, b.sequence);
            prop_assert_eq!(&a.payload[..], &b.payload[..]);
        }
    }

    /// Property 1: resync. Inserting junk between well-formed frames never
    /// changes the dispatched frame sequence, because the decoder advances past
    /// undecodable bytes and locates the next start marker.
    #[test]
    fn junk_between_frames_does_not_change_dispatched_frames(
        frames in prop::collection::vec(frame_strategy(), 1..5),
        junks in prop::collection::vec(junk_strategy(), 0..6),
    ) {
        let mut clean = Vec::new();
        for (sid, ty, seq, payload) in &frames {
            clean.extend(encode_frame(*sid, *ty, *seq, payload));
        }

        let mut noisy = Vec::new();
        for (i, (sid, ty, seq, payload)) in frames.iter().enumerate() {
            if let Some(junk) = junks.get(i) {
                noisy.extend(junk);
            }
            noisy.extend(encode_frame(*sid, *ty, *seq, payload));
        }

        let mut clean_decoder = FrameDecoder::new();
        clean_decoder.feed(&clean);
        let clean_frames = clean_decoder.drain(false, None);

        let mut noisy_decoder = FrameDecoder::new();
        noisy_decoder.feed(&noisy);
        let noisy_frames = noisy_decoder.drain(false, None);

        prop_assert_eq!(clean_frames.len(), frames.len());
        prop_assert_eq!(noisy_frames.len(), clean_frames.len());
        for (a, b) in clean_frames.iter().zip(noisy_frames.iter()) {
            prop_assert_eq!(a.source_id, b.source_id);
            prop_assert_eq!(a.frame_type, b.frame_type);
            prop_assert_eq!(a.sequence, b.sequence);
            prop_assert_eq!(&a.payload[..], &b.payload[..]);
        }
    }

    /// Property 6: source independence. Interleaving two distinct sources'
    /// frame streams in arbitrary order yields, per source, the same
    /// dispatched sequence as decoding each stream alone.
    #[test]
    fn interleaving_two_sources_preserves_each_sources_sequence(
        a_frames in prop::collection::vec((any::<u8>(), 0u32..1000, payload_strategy()), 1..5),
        b_frames in prop::collection::vec((any::<u8>(), 0u32..1000, payload_strategy()), 1..5),
        interleave_seed in any::<u64>(),
    ) {
        let sid_a = [1, 1, 1, 1, 1, 1];
        let sid_b = [2, 2, 2, 2, 2, 2];

        let a_wire: Vec<Vec<u8>> = a_frames.iter().map(|(ty, seq, p)| encode_frame(sid_a, 2u8.max(*ty % 3 + 1), *seq, p)).collect();
        let b_wire: Vec<Vec<u8>> = b_frames.iter().map(|(ty, seq, p)| encode_frame(sid_b, 2u8.max(*ty % 3 + 1), *seq, p)).collect();

        let mut solo_a_decoder = FrameDecoder::new();
        for f in &a_wire { solo_a_decoder.feed(f); }
        let solo_a = solo_a_decoder.drain(false, None);

        let mut solo_b_decoder = FrameDecoder::new();
        for f in &b_wire { solo_b_decoder.feed(f); }
        let solo_b = solo_b_decoder.drain(false, None);

        let mut state = interleave_seed.max(1);
        let mut merged = Vec::new();
        let (mut ia, mut ib) = (0, 0);
        while ia < a_wire.len() || ib < b_wire.len() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let take_a = (state % 2 == 0 && ia < a_wire.len()) || ib >= b_wire.len();
            if take_a {
                merged.extend(&a_wire[ia]);
                ia += 1;
            } else {
                merged.extend(&b_wire[ib]);
                ib += 1;
            }
        }

        let mut merged_decoder = FrameDecoder::new();
        merged_decoder.feed(&merged);
        let merged_frames = merged_decoder.drain(false, None);

        let merged_a: Vec<_> = merged_frames.iter().filter(|f| f.source_id == Sid::new(sid_a)).collect();
        let merged_b: Vec<_> = merged_frames.iter().filter(|f| f.source_id == Sid::new(sid_b)).collect();

        prop_assert_eq!(merged_a.len(), solo_a.len());
        prop_assert_eq!(merged_b.len(), solo_b.len());
        for (m, s) in merged_a.iter().zip(solo_a.iter()) {
            prop_assert_eq!(m.sequence, s.sequence);
            prop_assert_eq!(&m.payload[..], &s.payload[..]);
        }
        for (m, s) in merged_b.iter().zip(solo_b.iter()) {
            prop_assert_eq!(m.sequence, s.sequence);
            prop_assert_eq!(&m.payload[..], &s.payload[..]);
        }
    }
}

/// Round-trip: N DATA chunks followed by EOF decode to the concatenation of
/// payloads in arrival order (property 3, decoder half — the assembler's half
/// is covered in the engine crate).
#[test]
fn data_then_eof_concatenates_payloads_in_order() {
    let sid = [9, 9, 9, 9, 9, 9];
    let chunks: Vec<Bytes> =
        vec![Bytes::from_static(b"chunk-one-"), Bytes::from_static(b"chunk-two-"), Bytes::from_static(b"chunk-three")];

    let mut wire = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        wire.extend(encode_frame(sid, FrameType::Data.to_u8(), i as u32 + 1, chunk));
    }
    wire.extend(encode_frame(sid, FrameType::Eof.to_u8(), chunks.len() as u32 + 1, b""));

    let mut decoder = FrameDecoder::new();
    decoder.feed(&wire);
    let frames = decoder.drain(true, None);

    assert_eq!(frames.len(), 4);
    let reassembled: Vec<u8> =
        frames[..3].iter().flat_map(|f| f.payload.to_vec()).collect();
    let expected: Vec<u8> = chunks.iter().flat_map(|c| c.to_vec()).collect();
    assert_eq!(reassembled, expected);
    assert_eq!(frames[3].frame_type, FrameType::Eof);
}
