use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, StompError};
use crate::frame::Frame;

/// Header naming the body transformation of a frame.
pub const TRANSFORMATION_HEADER: &str = "transformation";
/// The recognized JSON map transformation.
pub const JMS_MAP_JSON: &str = "jms-map-json";

/// True when the frame declares the `jms-map-json` transformation
/// (header name and value compared case-insensitively).
pub fn is_map_frame(frame: &Frame) -> bool {
    frame
        .get_header(TRANSFORMATION_HEADER)
        .map(|value| value.eq_ignore_ascii_case(JMS_MAP_JSON))
        .unwrap_or(false)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A received frame whose body was decoded from `jms-map-json`.
///
/// Exposes the decoded map alongside the untouched raw frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MapFrame {
    frame: Frame,
    map: Map<String, Value>,
}

impl MapFrame {
    /// Decode the frame body as a JSON map. The body must parse and the
    /// top-level value must be an object.
    pub fn from_frame(frame: Frame) -> Result<Self> {
        let value: Value = serde_json::from_slice(&frame.body)?;
        match value {
            Value::Object(map) => Ok(Self { frame, map }),
            other => Err(StompError::Protocol(format!(
                "transformed body is not a json map (got {})",
                json_kind(&other)
            ))),
        }
    }

    pub fn map(&self) -> &Map<String, Value> {
        &self.map
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// The raw frame, body included.
    pub fn raw(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }
}

/// Build a SEND-able frame from any value that serializes to a JSON
/// object: the body is the JSON encoding and the transformation header is
/// set to `jms-map-json`.
pub fn map_send_frame<T: Serialize>(value: &T) -> Result<Frame> {
    let value = serde_json::to_value(value)?;
    if !value.is_object() {
        return Err(StompError::Protocol(format!(
            "map transformation requires a json object (got {})",
            json_kind(&value)
        )));
    }
    let body = serde_json::to_vec(&value)?;
    Ok(Frame::new("SEND")
        .header(TRANSFORMATION_HEADER, JMS_MAP_JSON)
        .set_body(body))
}
