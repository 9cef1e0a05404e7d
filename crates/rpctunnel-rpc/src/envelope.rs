//! Wire envelopes.
//!
//! Every rpctunnel message carries the protocol field `"jsonrpc": "2.0"` and
//! an explicit `"kind"` discriminator:
//!
//! ```text
//! {"jsonrpc":"2.0","kind":"request","id":7,"method":"http.proxy","params":{...}}
//! {"jsonrpc":"2.0","kind":"response","id":7,"result":{...}}
//! {"jsonrpc":"2.0","kind":"response","id":7,"error":{"code":-32601,"message":"..."}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::structured::StructuredError;

/// Protocol field value carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// A decoded rpctunnel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Envelope {
    Request(RequestEnvelope),
    Response(ResponseEnvelope),
}

/// Method invocation sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub jsonrpc: String,
    /// Correlation id, unique among the sender's outstanding requests.
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Reply to a [`RequestEnvelope`], echoing its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
}

impl Envelope {
    /// Decode a channel message.
    ///
    /// Returns `None` for anything that is not an rpctunnel envelope: a foreign
    /// or missing protocol field, an unknown kind, or a malformed body.
    pub fn decode(message: &Value) -> Option<Self> {
        if message.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return None;
        }
        serde_json::from_value(message.clone()).ok()
    }

    /// Encode for sending on a channel.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl RequestEnvelope {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

impl ResponseEnvelope {
    /// Build a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn failure(id: u64, error: StructuredError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Collapse into the caller-facing outcome.
    ///
    /// `error` wins when both fields are present; a missing or `null` result is
    /// a successful `null`.
    pub fn into_outcome(self) -> std::result::Result<Value, StructuredError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

impl From<RequestEnvelope> for Envelope {
    fn from(request: RequestEnvelope) -> Self {
        Envelope::Request(request)
    }
}

impl From<ResponseEnvelope> for Envelope {
    fn from(response: ResponseEnvelope) -> Self {
        Envelope::Response(response)
    }
}
