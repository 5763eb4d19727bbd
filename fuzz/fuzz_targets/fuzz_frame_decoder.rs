//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences, split at arbitrary points, into the
//! streaming frame decoder and asserts that it never panics and never
//! yields an empty or oversized payload.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use aura::rpc::codec::{FrameDecoder, MAX_FRAME_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&split, data)) = data.split_first() else {
        return;
    };
    let step = usize::from(split).max(1);
    let mut decoder = FrameDecoder::new();

    for mut piece in data.chunks(step) {
        while !piece.is_empty() {
            let (used, frame) = decoder.feed(piece);
            if let Some(payload) = frame {
                assert!(payload.len() <= MAX_FRAME_SIZE, "payload exceeds MAX_FRAME_SIZE");
                assert!(!payload.is_empty(), "decoder must not yield empty payload");
            }
            assert!(used <= piece.len());
            piece = &piece[used..];
        }
    }

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    let _ = decoder.feed(data);
});
