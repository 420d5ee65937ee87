//! Decoder resilience to incremental arrival: any partition of a frame's
//! bytes into chunks must decode to the same frame as a single feed.

use bytes::BytesMut;
use osmium_stomp::codec::{StompCodec, StompItem};
use osmium_stomp::Frame;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::codec::{Decoder, Encoder};

// Feed bytes one at a time to the decoder and assert it only returns a
// frame once the entire frame (including trailing NUL when required) is
// present.
#[test]
fn byte_by_byte_content_length() {
    let mut codec = StompCodec::new();
    let raw = b"SEND\ncontent-length:5\n\nhello\0";

    let mut buf = BytesMut::new();
    for i in 0..raw.len() {
        buf.extend_from_slice(&raw[i..i + 1]);
        let res = codec.decode(&mut buf).expect("decode failed");
        if i < raw.len() - 1 {
            assert!(res.is_none(), "decoder produced item too early at byte {}", i);
        } else {
            match res.expect("expected item after final byte") {
                StompItem::Frame(f) => assert_eq!(f.body, b"hello".to_vec()),
                _ => panic!("expected frame"),
            }
        }
    }
}

#[test]
fn small_chunk_null_terminated() {
    let mut codec = StompCodec::new();
    let raw = b"SEND\n\nchunked body\0";
    let mut buf = BytesMut::new();

    let mut offset = 0usize;
    while offset < raw.len() {
        let end = (offset + 3).min(raw.len());
        buf.extend_from_slice(&raw[offset..end]);
        let res = codec.decode(&mut buf).expect("decode failed");
        if end < raw.len() {
            assert!(res.is_none(), "decoder produced item too early at offset {}", end);
        } else {
            match res.expect("expected item after final chunk") {
                StompItem::Frame(f) => assert_eq!(f.body, b"chunked body".to_vec()),
                _ => panic!("expected frame"),
            }
        }
        offset = end;
    }
}

/// Encode several frames back-to-back and feed them to a fresh decoder in
/// randomly sized chunks. The RNG is seeded so the test is deterministic.
#[test]
fn randomized_splits_multiple_frames() {
    let frames = vec![
        Frame::new("SEND")
            .header("destination", "/queue/a")
            .set_body(b"alpha".to_vec()),
        Frame::new("SEND")
            .header("weird", "x:y\nz")
            .set_body(vec![0u8, 1, 2, 3, 4]), // binary body forces content-length
        Frame::new("SEND").set_body(b"omega".to_vec()),
    ];

    let mut enc = StompCodec::new();
    let mut encoded = BytesMut::new();
    for f in frames.iter().cloned() {
        enc.encode(StompItem::Frame(f), &mut encoded).expect("encode");
    }

    let mut rng = StdRng::from_seed([0x42; 32]);
    let mut dec = StompCodec::new();
    let mut feed = BytesMut::new();
    let mut decoded: Vec<Frame> = Vec::new();
    let mut off = 0usize;
    while off < encoded.len() {
        let sz = rng.gen_range(1..8).min(encoded.len() - off);
        feed.extend_from_slice(&encoded[off..off + sz]);
        off += sz;
        loop {
            match dec.decode(&mut feed) {
                Ok(Some(StompItem::Frame(f))) => decoded.push(f),
                Ok(Some(StompItem::Heartbeat)) => panic!("no heartbeats were encoded"),
                Ok(None) => break,
                Err(e) => panic!("decoder error: {}", e),
            }
        }
    }

    assert_eq!(decoded, frames);
}

/// Same as above but in legacy mode end to end.
#[test]
fn randomized_splits_legacy_mode() {
    let frames = vec![
        Frame::new("SEND")
            .set_legacy(true)
            .header("custom", "one\ntwo")
            .set_body(b"first".to_vec()),
        Frame::new("SEND")
            .set_legacy(true)
            .set_body(b"second".to_vec()),
    ];

    let mut enc = StompCodec::legacy();
    let mut encoded = BytesMut::new();
    for f in frames.iter().cloned() {
        enc.encode(StompItem::Frame(f), &mut encoded).expect("encode");
    }

    let mut rng = StdRng::from_seed([0x07; 32]);
    let mut dec = StompCodec::legacy();
    let mut feed = BytesMut::new();
    let mut decoded: Vec<Frame> = Vec::new();
    let mut off = 0usize;
    while off < encoded.len() {
        let sz = rng.gen_range(1..5).min(encoded.len() - off);
        feed.extend_from_slice(&encoded[off..off + sz]);
        off += sz;
        while let Some(item) = dec.decode(&mut feed).expect("decode") {
            match item {
                StompItem::Frame(f) => decoded.push(f),
                StompItem::Heartbeat => panic!("no heartbeats were encoded"),
            }
        }
    }

    assert_eq!(decoded, frames);
}
