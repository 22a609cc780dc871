//! Core data types: the uniform response contract, body representation, and
//! query parameter fingerprinting.

use crate::error::ApiError;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// The uniform response contract every orchestrated call resolves to.
///
/// Exactly one of two shapes:
///
/// - success: `data` present, `success == true`, no `error`;
/// - failure: either an HTTP business failure (`success == false`,
///   `message == "Request failed"`, parsed body still in `data`) or a hard
///   failure (`success == false`, `error` present).
///
/// Callers branch on [`success`](Self::success), never on a propagated
/// error — `ApiClient::request` does not return `Err`.
///
/// Serialization covers JSON and text payloads only; a result carrying a
/// [`Body::Binary`] payload fails to serialize (see [`Body`]).
#[derive(Debug, Clone, Serialize)]
pub struct ApiResult {
    /// Parsed response payload, when a response body was received.
    pub data: Option<Body>,
    /// Whether the call succeeded (`response.ok` for completed calls).
    pub success: bool,
    /// Generic failure message for non-ok HTTP responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error details when the call failed before producing a response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ApiResult {
    /// The generic message attached to HTTP business failures.
    pub const FAILURE_MESSAGE: &'static str = "Request failed";

    /// A successful result carrying `data`.
    #[must_use]
    pub const fn ok(data: Body) -> Self {
        Self {
            data: Some(data),
            success: true,
            message: None,
            error: None,
        }
    }

    /// An HTTP business failure: a valid response with a non-ok status.
    ///
    /// Not an error in the transport sense; the parsed body is kept so
    /// callers can inspect server-provided detail.
    #[must_use]
    pub fn http_failure(data: Option<Body>) -> Self {
        Self {
            data,
            success: false,
            message: Some(Self::FAILURE_MESSAGE.to_string()),
            error: None,
        }
    }

    /// A hard failure carrying an [`ApiError`].
    #[must_use]
    pub const fn failed(error: ApiError) -> Self {
        Self {
            data: None,
            success: false,
            message: None,
            error: Some(error),
        }
    }

    /// Deserialize a JSON `data` payload into `T`.
    ///
    /// Returns `None` when there is no data, the body is not JSON, or
    /// deserialization fails.
    #[must_use]
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        match &self.data {
            Some(Body::Json(value)) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }
}

/// A parsed response body, resolved once from the `Content-Type` header.
///
/// `Json` and `Text` serialize transparently; `Binary` is excluded from
/// serialization (attempting it returns an error), since raw bytes have no
/// canonical JSON form. Binary payloads are meant to be consumed from the
/// [`Bytes`] directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Body {
    /// A JSON document. The default when no content type is present.
    Json(serde_json::Value),
    /// A plain-text body, also the fallback when JSON parsing fails.
    Text(String),
    /// An opaque binary body. Not serializable.
    #[serde(skip)]
    Binary(Bytes),
}

/// Body classification derived from the `Content-Type` header.
///
/// JSON is the named default for an absent or unrecognized content type, not
/// an incidental fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// `application/json` or no content type.
    Json,
    /// `text/*` content types.
    Text,
    /// Anything else is passed through as binary.
    Binary,
}

impl BodyKind {
    /// Resolve the body kind from a `Content-Type` header value.
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            None => Self::Json,
            Some(ct) if ct.contains("application/json") => Self::Json,
            Some(ct) if ct.starts_with("text/") => Self::Text,
            Some(_) => Self::Binary,
        }
    }

    /// Parse raw bytes according to this kind.
    ///
    /// JSON that fails to parse degrades to text rather than failing the
    /// request; invalid UTF-8 degrades to binary.
    #[must_use]
    pub fn parse(self, bytes: Bytes) -> Body {
        match self {
            Self::Json => match serde_json::from_slice(&bytes) {
                Ok(value) => Body::Json(value),
                Err(_) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Body::Text(text),
                    Err(_) => Body::Binary(bytes),
                },
            },
            Self::Text => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Body::Text(text),
                Err(_) => Body::Binary(bytes),
            },
            Self::Binary => Body::Binary(bytes),
        }
    }
}

/// Query parameters with a deterministic serialization order.
///
/// Backed by a `BTreeMap`, so two parameter sets with the same key-value
/// pairs fingerprint identically regardless of insertion order. Inserting a
/// JSON null drops the key, mirroring how absent values are excluded from
/// cache keys and query strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(BTreeMap<String, serde_json::Value>);

impl QueryParams {
    /// An empty parameter set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a parameter. Null values are dropped.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        let value = value.into();
        if !value.is_null() {
            self.0.insert(key.into(), value);
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Whether no parameters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable JSON fingerprint of the parameter set, keys in lexicographic
    /// order. Used as the cache-key suffix.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// URL-encoded query string (`key=value&...`), keys in lexicographic
    /// order. Scalar values render without JSON quoting.
    #[must_use]
    pub fn query_string(&self) -> String {
        let mut pairs = Vec::with_capacity(self.0.len());
        for (key, value) in &self.0 {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            pairs.push(format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&rendered)
            ));
        }
        pairs.join("&")
    }
}
