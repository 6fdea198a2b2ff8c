// Response body handling shared by dispatcher and upload

use bytes::Bytes;
use serde_json::{json, Value};

/// Raw successful response from the transport
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
    /// True when produced by degraded mode instead of the network
    pub synthetic: bool,
}

impl TransportResponse {
    /// Canned success returned while degraded
    pub fn synthetic() -> Self {
        Self {
            status: 200,
            body: Bytes::from(synthetic_payload().to_string()),
            synthetic: true,
        }
    }

    /// Body parsed as JSON, an empty object when it is empty or malformed
    pub fn json_or_empty(&self) -> Value {
        parse_json_or_empty(&self.body)
    }
}

/// Payload of a synthetic success
pub fn synthetic_payload() -> Value {
    json!({ "success": true, "message": "Mock API Response" })
}

/// The empty result callers receive for unparsable bodies and swallowed failures
pub fn empty_result() -> Value {
    Value::Object(serde_json::Map::new())
}

pub fn parse_json_or_empty(body: &[u8]) -> Value {
    match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            if !body.is_empty() {
                tracing::debug!(error = %e, "Response body is not JSON, using empty result");
            }
            empty_result()
        }
    }
}
