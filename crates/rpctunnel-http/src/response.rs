//! Strict proxy-response validation and the fetch-style response it yields.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use base64::Engine;
use bytes::Bytes;
use jsonschema::Validator;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{FetchError, Result};
use crate::types::{BodyEncoding, ProxyResponse};

static PROXY_RESPONSE_SCHEMA: LazyLock<std::result::Result<Validator, String>> =
    LazyLock::new(|| {
        let schema = json!({
            "type": "object",
            "required": ["status", "headers", "body"],
            "properties": {
                "status": { "type": "integer", "minimum": 0, "maximum": 65535 },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "body": { "type": ["string", "null"] },
                "bodyEncoding": { "enum": ["utf8", "base64"] }
            }
        });
        jsonschema::validator_for(&schema).map_err(|err| err.to_string())
    });

/// Check an RPC result against the proxy-response shape.
///
/// All failures collapse into [`FetchError::InvalidProxyResponse`]; the
/// individual schema errors are only logged.
pub fn validate_proxy_result(result: &Value) -> Result<ProxyResponse> {
    let validator = match &*PROXY_RESPONSE_SCHEMA {
        Ok(validator) => validator,
        Err(err) => {
            tracing::error!(error = %err, "proxy response schema failed to compile");
            return Err(FetchError::InvalidProxyResponse);
        }
    };

    let mut errors = validator.iter_errors(result);
    if let Some(first) = errors.next() {
        let mut message = first.to_string();
        for err in errors.take(3) {
            message.push_str("; ");
            message.push_str(&err.to_string());
        }
        tracing::debug!(reason = %message, "rejecting proxy response");
        return Err(FetchError::InvalidProxyResponse);
    }

    serde_json::from_value(result.clone()).map_err(|err| {
        tracing::debug!(error = %err, "rejecting proxy response");
        FetchError::InvalidProxyResponse
    })
}

/// Response returned by [`crate::HttpFetch::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    body: Option<Bytes>,
}

impl FetchResponse {
    /// Validate an RPC result and rebuild the response it describes.
    pub fn from_proxy_result(result: &Value) -> Result<Self> {
        let proxy = validate_proxy_result(result)?;
        Self::try_from(proxy)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is in 200..=299.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Header lookup ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `false` for bodyless responses.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Raw body bytes; empty when there is no body.
    pub fn bytes(&self) -> Bytes {
        self.body.clone().unwrap_or_default()
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        match &self.body {
            Some(body) => String::from_utf8_lossy(body).into_owned(),
            None => String::new(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let body = self.body.as_deref().unwrap_or_default();
        Ok(serde_json::from_slice(body)?)
    }
}

impl TryFrom<ProxyResponse> for FetchResponse {
    type Error = FetchError;

    fn try_from(proxy: ProxyResponse) -> Result<Self> {
        let encoding = proxy.encoding();
        let body = match proxy.body {
            None => None,
            Some(text) => Some(match encoding {
                BodyEncoding::Utf8 => Bytes::from(text),
                BodyEncoding::Base64 => base64::engine::general_purpose::STANDARD
                    .decode(text.as_bytes())
                    .map(Bytes::from)
                    .map_err(|err| {
                        tracing::debug!(error = %err, "proxy response body is not base64");
                        FetchError::InvalidProxyResponse
                    })?,
            }),
        };

        Ok(Self {
            status: proxy.status,
            headers: proxy.headers,
            body,
        })
    }
}
