//! The `jms-map-json` body transformation: detection, decoding into a
//! typed map frame, and building transformed SEND frames.

use bytes::BytesMut;
use osmium_stomp::codec::{encode_frame, StompCodec, StompItem};
use osmium_stomp::transform::{is_map_frame, map_send_frame, JMS_MAP_JSON};
use osmium_stomp::{Frame, MapFrame, StompError};
use serde_json::json;
use tokio_util::codec::Decoder;

#[test]
fn detection_is_case_insensitive() {
    let lower = Frame::new("MESSAGE").header("transformation", "jms-map-json");
    let upper = Frame::new("MESSAGE").header("Transformation", "JMS-MAP-JSON");
    let other = Frame::new("MESSAGE").header("transformation", "jms-byte");
    let none = Frame::new("MESSAGE");

    assert!(is_map_frame(&lower));
    assert!(is_map_frame(&upper));
    assert!(!is_map_frame(&other));
    assert!(!is_map_frame(&none));
}

#[test]
fn map_frame_decodes_body_and_keeps_raw() {
    let body = br#"{"city":"Berlin","population":3600000}"#.to_vec();
    let frame = Frame::new("MESSAGE")
        .header("transformation", JMS_MAP_JSON)
        .set_body(body.clone());

    let map = MapFrame::from_frame(frame).unwrap();
    assert_eq!(map.get("city"), Some(&json!("Berlin")));
    assert_eq!(map.get("population"), Some(&json!(3600000)));
    assert_eq!(map.raw().body, body);
}

#[test]
fn non_map_json_body_is_rejected() {
    let frame = Frame::new("MESSAGE")
        .header("transformation", JMS_MAP_JSON)
        .set_body(b"[1,2,3]".to_vec());
    let err = MapFrame::from_frame(frame).unwrap_err();
    assert!(matches!(err, StompError::Protocol(_)));
}

#[test]
fn invalid_json_body_is_rejected() {
    let frame = Frame::new("MESSAGE")
        .header("transformation", JMS_MAP_JSON)
        .set_body(b"not json at all".to_vec());
    let err = MapFrame::from_frame(frame).unwrap_err();
    assert!(matches!(err, StompError::Transformation(_)));
}

#[test]
fn map_send_frame_sets_header_and_encodes_body() {
    let frame = map_send_frame(&json!({"a": 1, "b": "two"})).unwrap();
    assert!(is_map_frame(&frame));

    let decoded: serde_json::Value = serde_json::from_slice(&frame.body).unwrap();
    assert_eq!(decoded, json!({"a": 1, "b": "two"}));
}

#[test]
fn map_send_frame_rejects_non_object_values() {
    let err = map_send_frame(&json!([1, 2, 3])).unwrap_err();
    assert!(matches!(err, StompError::Protocol(_)));

    let err = map_send_frame(&json!("scalar")).unwrap_err();
    assert!(matches!(err, StompError::Protocol(_)));
}

#[test]
fn serializable_structs_are_accepted() {
    #[derive(serde::Serialize)]
    struct Reading {
        sensor: String,
        value: f64,
    }

    let frame = map_send_frame(&Reading {
        sensor: "temp".to_string(),
        value: 21.5,
    })
    .unwrap();
    let map = MapFrame::from_frame(frame).unwrap();
    assert_eq!(map.get("sensor"), Some(&json!("temp")));
}

#[test]
fn transformed_frame_roundtrips_through_the_codec() {
    let original = map_send_frame(&json!({"k": "v"})).unwrap();
    let mut buf = BytesMut::new();
    encode_frame(&original, &mut buf);

    let mut codec = StompCodec::new();
    let decoded = match codec.decode(&mut buf).expect("decode") {
        Some(StompItem::Frame(frame)) => frame,
        other => panic!("expected frame, got {:?}", other),
    };
    assert!(is_map_frame(&decoded));
    let map = MapFrame::from_frame(decoded).unwrap();
    assert_eq!(map.get("k"), Some(&json!("v")));
}
