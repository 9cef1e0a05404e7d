//! Wire shapes carried inside the `http.proxy` RPC call.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};

/// RPC method that carries proxied HTTP requests.
pub const PROXY_METHOD: &str = "http.proxy";

/// Origin that relative request targets are resolved against.
pub const BASE_ORIGIN: &str = "http://rpctunnel.local";

/// Methods the tunnel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Case-insensitive parse. `None` for anything outside the supported set.
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `ProxyResponse::body` is encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    #[default]
    Utf8,
    Base64,
}

/// Request params of the `http.proxy` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub method: HttpMethod,
    /// Path plus query string; never a scheme or host.
    pub path: String,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Result of the `http.proxy` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// `None` only for bodyless responses.
    pub body: Option<String>,
    #[serde(
        rename = "bodyEncoding",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub body_encoding: Option<BodyEncoding>,
}

impl ProxyResponse {
    /// Build a response from what an upstream returned.
    ///
    /// UTF-8 bodies travel as text, anything else as base64. An empty body on
    /// a status that never carries one (1xx, 204, 304) becomes `null`.
    pub fn from_backend<I, K, V>(status: u16, headers: I, body: &[u8]) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in headers {
            let value = value.into();
            merged
                .entry(name.into())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let (body, body_encoding) = if body.is_empty() && is_bodyless(status) {
            (None, None)
        } else {
            match std::str::from_utf8(body) {
                Ok(text) => (Some(text.to_string()), Some(BodyEncoding::Utf8)),
                Err(_) => (
                    Some(base64::engine::general_purpose::STANDARD.encode(body)),
                    Some(BodyEncoding::Base64),
                ),
            }
        };

        Self {
            status,
            headers: merged,
            body,
            body_encoding,
        }
    }

    /// Effective encoding; absent means UTF-8.
    pub fn encoding(&self) -> BodyEncoding {
        self.body_encoding.unwrap_or_default()
    }
}

fn is_bodyless(status: u16) -> bool {
    (100..200).contains(&status) || status == 204 || status == 304
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(HttpMethod::parse("get"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::parse("Post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse("DELETE"), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::parse("patch"), None);
        assert_eq!(HttpMethod::parse(""), None);
    }

    #[test]
    fn request_omits_absent_body() {
        let request = ProxyRequest {
            method: HttpMethod::Get,
            path: "/api/items?page=2".to_string(),
            headers: BTreeMap::new(),
            body: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"method": "GET", "path": "/api/items?page=2", "headers": {}})
        );
    }

    #[test]
    fn text_bodies_stay_utf8() {
        let response =
            ProxyResponse::from_backend(200, [("content-type", "text/plain")], b"hello");
        assert_eq!(response.body.as_deref(), Some("hello"));
        assert_eq!(response.encoding(), BodyEncoding::Utf8);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "status": 200,
                "headers": {"content-type": "text/plain"},
                "body": "hello",
                "bodyEncoding": "utf8"
            })
        );
    }

    #[test]
    fn binary_bodies_become_base64() {
        let bytes = [0xff, 0x00, 0x89, 0x50];
        let response = ProxyResponse::from_backend(200, Vec::<(String, String)>::new(), &bytes);
        assert_eq!(response.body_encoding, Some(BodyEncoding::Base64));
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(response.body.unwrap())
            .unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn bodyless_statuses_serialize_null() {
        let response = ProxyResponse::from_backend(204, Vec::<(String, String)>::new(), b"");
        assert_eq!(response.body, None);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"status": 204, "headers": {}, "body": null})
        );

        let empty_ok = ProxyResponse::from_backend(200, Vec::<(String, String)>::new(), b"");
        assert_eq!(empty_ok.body.as_deref(), Some(""));
    }

    #[test]
    fn repeated_headers_are_joined() {
        let response = ProxyResponse::from_backend(
            200,
            [("vary", "accept"), ("vary", "origin"), ("etag", "\"v1\"")],
            b"{}",
        );
        assert_eq!(response.headers["vary"], "accept, origin");
        assert_eq!(response.headers["etag"], "\"v1\"");
    }
}
