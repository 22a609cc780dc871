//! Ordered interceptor pipeline and status-code callback registry.
//!
//! Request interceptors transform the outgoing [`TransportRequest`] after
//! header merging; response interceptors transform the raw
//! [`TransportResponse`] after retry resolution. Both run strictly in
//! registration order, each stage seeing the previous stage's output, and
//! both may be asynchronous.
//!
//! An interceptor failure aborts the call it belongs to. It is never
//! retried — interceptors run outside the retry loop's scope — and surfaces
//! on the result as `REQUEST_ERROR`.
//!
//! [`StatusHooks`] replaces the ambient "dispatch an event on 401/429/5xx"
//! side channel with an explicit callback registry injected into the client.
//! Hooks observe the final status; they never change the success/failure
//! classification of the call.

use crate::error::InterceptorError;
use crate::transport::{TransportRequest, TransportResponse};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Transforms an outgoing request. Dyn-compatible; see [`request_fn`] for
/// building one from a closure.
pub trait RequestInterceptor: Send + Sync {
    /// Transform the request, or fail the call.
    fn intercept(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportRequest, InterceptorError>>;
}

/// Transforms an incoming response. Dyn-compatible; see [`response_fn`].
pub trait ResponseInterceptor: Send + Sync {
    /// Transform the response, or fail the call.
    fn intercept(
        &self,
        response: TransportResponse,
    ) -> BoxFuture<'_, Result<TransportResponse, InterceptorError>>;
}

struct RequestFn<F>(F);

impl<F> RequestInterceptor for RequestFn<F>
where
    F: Fn(TransportRequest) -> Result<TransportRequest, InterceptorError> + Send + Sync,
{
    fn intercept(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportRequest, InterceptorError>> {
        let result = (self.0)(request);
        Box::pin(async move { result })
    }
}

struct ResponseFn<F>(F);

impl<F> ResponseInterceptor for ResponseFn<F>
where
    F: Fn(TransportResponse) -> Result<TransportResponse, InterceptorError> + Send + Sync,
{
    fn intercept(
        &self,
        response: TransportResponse,
    ) -> BoxFuture<'_, Result<TransportResponse, InterceptorError>> {
        let result = (self.0)(response);
        Box::pin(async move { result })
    }
}

/// Wrap a synchronous closure as a request interceptor.
pub fn request_fn<F>(f: F) -> Arc<dyn RequestInterceptor>
where
    F: Fn(TransportRequest) -> Result<TransportRequest, InterceptorError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(RequestFn(f))
}

/// Wrap a synchronous closure as a response interceptor.
pub fn response_fn<F>(f: F) -> Arc<dyn ResponseInterceptor>
where
    F: Fn(TransportResponse) -> Result<TransportResponse, InterceptorError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(ResponseFn(f))
}

/// Two ordered interceptor lists, applied front-to-back.
#[derive(Default, Clone)]
pub struct InterceptorPipeline {
    request: Vec<Arc<dyn RequestInterceptor>>,
    response: Vec<Arc<dyn ResponseInterceptor>>,
}

impl InterceptorPipeline {
    /// An empty pipeline.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            request: Vec::new(),
            response: Vec::new(),
        }
    }

    /// Append a request interceptor; runs after all previously added ones.
    pub fn add_request(&mut self, interceptor: Arc<dyn RequestInterceptor>) {
        self.request.push(interceptor);
    }

    /// Append a response interceptor; runs after all previously added ones.
    pub fn add_response(&mut self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.response.push(interceptor);
    }

    /// Run every request interceptor in registration order.
    ///
    /// # Errors
    ///
    /// Propagates the first interceptor failure; later stages do not run.
    pub async fn run_request(
        &self,
        mut request: TransportRequest,
    ) -> Result<TransportRequest, InterceptorError> {
        for interceptor in &self.request {
            request = interceptor.intercept(request).await?;
        }
        Ok(request)
    }

    /// Run every response interceptor in registration order.
    ///
    /// # Errors
    ///
    /// Propagates the first interceptor failure; later stages do not run.
    pub async fn run_response(
        &self,
        mut response: TransportResponse,
    ) -> Result<TransportResponse, InterceptorError> {
        for interceptor in &self.response {
            response = interceptor.intercept(response).await?;
        }
        Ok(response)
    }
}

impl std::fmt::Debug for InterceptorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorPipeline")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .finish()
    }
}

type StatusHook = Box<dyn Fn(u16) + Send + Sync>;

/// Callback registry for notable final statuses.
///
/// Invoked once per completed call, after retry resolution and response
/// interceptors. Purely observational.
#[derive(Default)]
pub struct StatusHooks {
    on_unauthorized: Option<StatusHook>,
    on_forbidden: Option<StatusHook>,
    on_rate_limited: Option<StatusHook>,
    on_server_error: Option<StatusHook>,
}

impl StatusHooks {
    /// No hooks registered.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            on_unauthorized: None,
            on_forbidden: None,
            on_rate_limited: None,
            on_server_error: None,
        }
    }

    /// Called on a final 401.
    #[must_use]
    pub fn on_unauthorized(mut self, hook: impl Fn(u16) + Send + Sync + 'static) -> Self {
        self.on_unauthorized = Some(Box::new(hook));
        self
    }

    /// Called on a final 403.
    #[must_use]
    pub fn on_forbidden(mut self, hook: impl Fn(u16) + Send + Sync + 'static) -> Self {
        self.on_forbidden = Some(Box::new(hook));
        self
    }

    /// Called on a final 429.
    #[must_use]
    pub fn on_rate_limited(mut self, hook: impl Fn(u16) + Send + Sync + 'static) -> Self {
        self.on_rate_limited = Some(Box::new(hook));
        self
    }

    /// Called on any final 5xx.
    #[must_use]
    pub fn on_server_error(mut self, hook: impl Fn(u16) + Send + Sync + 'static) -> Self {
        self.on_server_error = Some(Box::new(hook));
        self
    }

    /// Dispatch the hook matching `status`, if any.
    pub fn notify(&self, status: u16) {
        let hook = match status {
            401 => self.on_unauthorized.as_ref(),
            403 => self.on_forbidden.as_ref(),
            429 => self.on_rate_limited.as_ref(),
            500..=599 => self.on_server_error.as_ref(),
            _ => None,
        };
        if let Some(hook) = hook {
            hook(status);
        }
    }
}

impl std::fmt::Debug for StatusHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusHooks")
            .field("on_unauthorized", &self.on_unauthorized.is_some())
            .field("on_forbidden", &self.on_forbidden.is_some())
            .field("on_rate_limited", &self.on_rate_limited.is_some())
            .field("on_server_error", &self.on_server_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::transport::Method;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn request() -> TransportRequest {
        TransportRequest {
            url: "/x".to_string(),
            method: Method::Get,
            headers: HashMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_request_interceptors_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = InterceptorPipeline::new();

        let order_a = Arc::clone(&order);
        pipeline.add_request(request_fn(move |mut req| {
            order_a.lock().unwrap().push("a");
            req.headers.insert("x-a".to_string(), "1".to_string());
            Ok(req)
        }));
        let order_b = Arc::clone(&order);
        pipeline.add_request(request_fn(move |mut req| {
            order_b.lock().unwrap().push("b");
            req.headers.insert("x-b".to_string(), "2".to_string());
            Ok(req)
        }));

        let result = pipeline.run_request(request()).await.unwrap();
        assert_eq!(result.headers.get("x-a"), Some(&"1".to_string()));
        assert_eq!(result.headers.get("x-b"), Some(&"2".to_string()));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failing_interceptor_short_circuits() {
        let mut pipeline = InterceptorPipeline::new();
        pipeline.add_request(request_fn(|_| Err(InterceptorError::new("nope"))));
        let ran = Arc::new(Mutex::new(false));
        let ran_flag = Arc::clone(&ran);
        pipeline.add_request(request_fn(move |req| {
            *ran_flag.lock().unwrap() = true;
            Ok(req)
        }));

        assert!(pipeline.run_request(request()).await.is_err());
        assert!(!*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn test_response_interceptor_transforms() {
        let mut pipeline = InterceptorPipeline::new();
        pipeline.add_response(response_fn(|mut resp| {
            resp.headers
                .insert("x-seen".to_string(), "yes".to_string());
            Ok(resp)
        }));

        let resp = TransportResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::new(),
        };
        let resp = pipeline.run_response(resp).await.unwrap();
        assert_eq!(resp.header("X-Seen"), Some("yes"));
    }

    #[test]
    fn test_status_hooks_dispatch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_auth = Arc::clone(&seen);
        let seen_5xx = Arc::clone(&seen);
        let hooks = StatusHooks::new()
            .on_unauthorized(move |s| seen_auth.lock().unwrap().push(s))
            .on_server_error(move |s| seen_5xx.lock().unwrap().push(s));

        hooks.notify(401);
        hooks.notify(503);
        hooks.notify(404); // no hook registered for this
        assert_eq!(*seen.lock().unwrap(), vec![401, 503]);
    }
}
