//! Structured errors and the codec that produces them.
//!
//! Whatever a handler fails with ends up on the wire as
//! `{ code, message, data? }`. [`to_structured_error`] does the conversion;
//! [`make_error`] builds one directly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RpcError;

// ---------------------------------------------------------------------------
// Standard JSON-RPC 2.0 error codes
// ---------------------------------------------------------------------------

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Code used for failures that carry no code of their own.
pub const DEFAULT_ERROR_CODE: i64 = -32000;

/// Error type handlers return. Anything implementing `std::error::Error`
/// converts into it, so handlers can use `?` freely.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical wire error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct StructuredError {
    pub code: i64,
    pub message: String,
    /// Usually `{ "description": ..., ...extra }`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl StructuredError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach data, normalized the same way as [`make_error`].
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(normalize_data(data));
        self
    }

    /// The `data.description` field, if any.
    pub fn description(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.get("description"))
            .and_then(Value::as_str)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {detail}"))
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, format!("Internal error: {detail}"))
    }
}

/// A handler failure that is a bare JSON value rather than an error type.
///
/// An object with a string `message` keeps its own `code` and `data`; any
/// other value is stringified into the message.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrownValue(pub Value);

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&stringify(&self.0))
    }
}

impl std::error::Error for ThrownValue {}

/// Build a structured error.
///
/// `data` is normalized: a string becomes `{ "description": data }`, an
/// object passes through, and any other value becomes
/// `{ "description": <its JSON text> }`. `code` defaults to
/// [`DEFAULT_ERROR_CODE`].
pub fn make_error(
    message: impl Into<String>,
    data: Option<Value>,
    code: Option<i64>,
) -> StructuredError {
    StructuredError {
        code: code.unwrap_or(DEFAULT_ERROR_CODE),
        message: message.into(),
        data: data.map(normalize_data),
    }
}

/// Convert any handler failure into its wire form.
pub fn to_structured_error(thrown: &(dyn std::error::Error + 'static)) -> StructuredError {
    if let Some(structured) = thrown.downcast_ref::<StructuredError>() {
        return structured.clone();
    }
    if let Some(RpcError::Remote(structured)) = thrown.downcast_ref::<RpcError>() {
        return structured.clone();
    }
    if let Some(ThrownValue(value)) = thrown.downcast_ref::<ThrownValue>() {
        return from_thrown_value(value);
    }
    make_error(thrown.to_string(), None, None)
}

fn from_thrown_value(value: &Value) -> StructuredError {
    if let Some(Value::String(message)) = value.get("message") {
        let code = value.get("code").and_then(Value::as_i64);
        let data = value.get("data").filter(|data| !data.is_null()).cloned();
        return make_error(message.clone(), data, code);
    }
    make_error(stringify(value), None, None)
}

fn normalize_data(data: Value) -> Value {
    match data {
        Value::Object(_) => data,
        Value::String(description) => description_only(description),
        other => description_only(other.to_string()),
    }
}

fn description_only(description: String) -> Value {
    let mut map = Map::new();
    map.insert("description".to_string(), Value::String(description));
    Value::Object(map)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
