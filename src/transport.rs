//! Network transport boundary.
//!
//! The orchestrator never talks to an HTTP client directly; it goes through
//! the [`Transport`] trait, which takes a flat request description and a
//! cancellation token and resolves to a fully buffered [`TransportResponse`].
//! Any HTTP client satisfying this shape is substitutable — tests use a
//! scripted in-memory transport, production uses [`ReqwestTransport`].
//!
//! The trait returns explicit `Pin<Box<dyn Future>>` instead of `async fn`
//! so it stays dyn-compatible (`Arc<dyn Transport>`).

use crate::error::TransportError;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// HTTP method for an orchestrated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl Method {
    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat description of one network call, after interceptors have run.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Fully resolved URL including any query string.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Header map; keys are matched case-insensitively by implementations.
    pub headers: HashMap<String, String>,
    /// Raw request body, when the method carries one.
    pub body: Option<String>,
}

/// Fully buffered response from a transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, keys lower-cased.
    pub headers: HashMap<String, String>,
    /// Raw response body.
    pub body: Bytes,
}

impl TransportResponse {
    /// Whether the status is in the 2xx range.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Low-level network primitive the orchestrator is built on.
///
/// Implementations must resolve to [`TransportError::Aborted`] promptly when
/// the token fires, including mid-request; the retry loop treats `Aborted`
/// as final and `Network` as retryable.
pub trait Transport: Send + Sync {
    /// Issue one network call.
    fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<TransportResponse, TransportError>>;
}

/// Production transport backed by [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wrap an existing reqwest client (connection pool reuse).
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn dispatch(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<TransportResponse, TransportError>> {
        Box::pin(async move {
            tokio::select! {
                result = self.dispatch(request) => result,
                () = cancel.cancelled() => Err(TransportError::Aborted),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(Method::Get.as_str(), "GET");
        assert_eq!(Method::Patch.to_string(), "PATCH");
    }

    #[test]
    fn test_response_ok_range() {
        let resp = TransportResponse {
            status: 204,
            headers: HashMap::new(),
            body: Bytes::new(),
        };
        assert!(resp.ok());

        let resp = TransportResponse {
            status: 404,
            ..resp
        };
        assert!(!resp.ok());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let resp = TransportResponse {
            status: 200,
            headers,
            body: Bytes::new(),
        };
        assert_eq!(resp.header("Content-Type"), Some("application/json"));
    }
}
