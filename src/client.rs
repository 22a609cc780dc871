//! Request orchestrator: composes cache, retry, cancellation, and the
//! interceptor pipeline around an injected [`Transport`].
//!
//! Every call resolves to the uniform [`ApiResult`] contract — `request`
//! never returns `Err`. Callers branch on `success`.
//!
//! The client holds no global state: the cache, loading tracker, and
//! transport are injected at construction time, and single-instance
//! semantics belong to the application's composition root.

use crate::cache::ResponseCache;
use crate::error::{ApiError, TransportError};
use crate::interceptor::{
    InterceptorPipeline, RequestInterceptor, ResponseInterceptor, StatusHooks,
};
use crate::loading::LoadingTracker;
use crate::retry::{AttemptOutcome, RetryConfig, RetryDecision};
use crate::transport::{Method, ReqwestTransport, Transport, TransportRequest, TransportResponse};
use crate::types::{ApiResult, BodyKind, QueryParams};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client-wide cache defaults, overridable per call.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Whether responses are cached when the caller does not say otherwise.
    pub enabled: bool,
    /// TTL applied to cached responses without a per-call override.
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: crate::cache::DEFAULT_TTL,
        }
    }
}

/// Per-call cache behavior.
///
/// `invalidate` takes precedence over `enabled`: an invalidating call always
/// evicts the key and goes to the network, even when caching is on. The
/// fresh response is still written back when caching is enabled and the
/// response is ok.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Override the client-wide enabled flag.
    pub enabled: Option<bool>,
    /// Override the TTL for this call's cache write.
    pub ttl: Option<Duration>,
    /// Evict the key before issuing the request.
    pub invalidate: bool,
}

/// Per-call overrides layered over the client configuration.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query parameters; also part of the cache fingerprint.
    pub params: QueryParams,
    /// Headers layered on top of the client defaults.
    pub headers: HashMap<String, String>,
    /// Raw request body. The convenience verbs fill this in.
    pub body: Option<String>,
    /// Override the client timeout for this call.
    pub timeout: Option<Duration>,
    /// Override the retry policy for this call.
    pub retry: Option<RetryConfig>,
    /// Cache behavior for this call.
    pub cache: CacheOptions,
    /// External cancellation token. When present, it takes precedence and
    /// the client timeout timer is not armed.
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    /// Options with everything at its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Builder-style header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Enable caching for this call, optionally with a TTL override.
    #[must_use]
    pub fn cached(mut self, ttl: Option<Duration>) -> Self {
        self.cache.enabled = Some(true);
        self.cache.ttl = ttl;
        self
    }

    /// Evict the cache key before the request.
    #[must_use]
    pub fn invalidating(mut self) -> Self {
        self.cache.invalidate = true;
        self
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sleep for a retry delay, bailing out with `Aborted` if the token fires
/// first.
async fn wait_or_abort(
    delay: Duration,
    token: &CancellationToken,
) -> Result<(), TransportError> {
    tokio::select! {
        () = tokio::time::sleep(delay) => Ok(()),
        () = token.cancelled() => Err(TransportError::Aborted),
    }
}

/// The request orchestrator.
///
/// Construct through [`ApiClient::builder`]. The configuration surface is
/// immutable per instance; anything request-specific goes through
/// [`RequestOptions`].
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    default_headers: HashMap<String, String>,
    retry: RetryConfig,
    cache_settings: CacheSettings,
    interceptors: InterceptorPipeline,
    status_hooks: StatusHooks,
    transport: Arc<dyn Transport>,
    cache: Arc<ResponseCache>,
    loading: Arc<LoadingTracker>,
    in_flight: Mutex<HashMap<String, CancellationToken>>,
    request_seq: AtomicU64,
}

impl ApiClient {
    /// Start building a client.
    #[must_use]
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    /// The shared response cache, for explicit invalidation by callers
    /// after mutating requests.
    #[must_use]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// The shared loading tracker.
    #[must_use]
    pub fn loading(&self) -> &Arc<LoadingTracker> {
        &self.loading
    }

    /// Ids of requests currently in flight.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<String> {
        lock(&self.in_flight).keys().cloned().collect()
    }

    /// Cancel one in-flight request by id. Returns whether it was found.
    pub fn cancel_request(&self, id: &str) -> bool {
        match lock(&self.in_flight).remove(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight request and clear the registry.
    pub fn cancel_all_requests(&self) {
        let tokens: Vec<CancellationToken> = lock(&self.in_flight).drain().map(|(_, t)| t).collect();
        for token in tokens {
            token.cancel();
        }
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}{url}", self.base_url.trim_end_matches('/'))
        }
    }

    fn merged_headers(&self, overrides: &HashMap<String, String>) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.extend(self.default_headers.clone());
        headers.extend(overrides.clone());
        headers
    }

    /// Issue one orchestrated request.
    ///
    /// Never returns `Err`; every failure path is folded into the
    /// [`ApiResult`] contract (`REQUEST_ABORTED` for cancellation or
    /// timeout, `REQUEST_ERROR` for transport exhaustion or interceptor
    /// failure).
    pub async fn request(&self, method: Method, url: &str, options: RequestOptions) -> ApiResult {
        let resolved = self.resolve_url(url);
        let cache_key = ResponseCache::cache_key(&resolved, &options.params);
        let cache_enabled = options.cache.enabled.unwrap_or(self.cache_settings.enabled);

        // Invalidation wins over caching: evict and go to the network.
        if options.cache.invalidate {
            self.cache.invalidate(&cache_key);
        } else if cache_enabled {
            if let Some(value) = self.cache.get(&cache_key) {
                tracing::debug!(key = %cache_key, "Cache hit");
                return ApiResult::ok(value);
            }
            tracing::debug!(key = %cache_key, "Cache miss");
        }

        let full_url = if options.params.is_empty() {
            resolved.clone()
        } else {
            format!("{resolved}?{}", options.params.query_string())
        };

        let transport_request = TransportRequest {
            url: full_url,
            method,
            headers: self.merged_headers(&options.headers),
            body: options.body.clone(),
        };

        let transport_request = match self.interceptors.run_request(transport_request).await {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Request interceptor failed");
                return ApiResult::failed(ApiError::request(e.to_string()));
            }
        };

        // Caller-supplied token takes precedence; the timeout timer is only
        // armed for internally created tokens.
        let (token, internal) = match options.cancel.clone() {
            Some(token) => (token, false),
            None => (CancellationToken::new(), true),
        };
        let request_id = format!(
            "{resolved}#{}",
            self.request_seq.fetch_add(1, Ordering::Relaxed)
        );
        lock(&self.in_flight).insert(request_id.clone(), token.clone());

        let timeout_task = internal.then(|| {
            let timeout = options.timeout.unwrap_or(self.timeout);
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                token.cancel();
            })
        });

        let retry = options.retry.as_ref().unwrap_or(&self.retry);
        let outcome = self
            .execute_with_retry(retry, &transport_request, &token)
            .await;

        if let Some(task) = timeout_task {
            task.abort();
        }
        lock(&self.in_flight).remove(&request_id);

        let response = match outcome {
            Ok(response) => response,
            Err(TransportError::Aborted) => {
                tracing::warn!(url = %transport_request.url, "Request aborted");
                return ApiResult::failed(ApiError::aborted());
            }
            Err(TransportError::Network(message)) => {
                return ApiResult::failed(ApiError::request(message));
            }
        };

        let response = match self.interceptors.run_response(response).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Response interceptor failed");
                return ApiResult::failed(ApiError::request(e.to_string()));
            }
        };

        self.status_hooks.notify(response.status);

        let kind = BodyKind::from_content_type(response.header("content-type"));
        let ok = response.ok();
        let body = kind.parse(response.body);

        if cache_enabled && ok {
            let ttl = options.cache.ttl.unwrap_or(self.cache_settings.ttl);
            self.cache.set_with_ttl(&cache_key, body.clone(), ttl);
        }

        if ok {
            ApiResult::ok(body)
        } else {
            ApiResult::http_failure(Some(body))
        }
    }

    /// Retry state machine over attempts `1..=attempts`.
    ///
    /// Transport errors and retryable statuses wait and retry; an ok
    /// response, a non-retryable status, or the last attempt ends the loop
    /// with the response as-is. Cancellation fires at any suspension point
    /// and is final.
    async fn execute_with_retry(
        &self,
        retry: &RetryConfig,
        request: &TransportRequest,
        token: &CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        let mut attempt: u32 = 1;
        loop {
            match self.transport.send(request.clone(), token.clone()).await {
                Ok(response) if response.ok() => return Ok(response),
                Ok(response) => {
                    match retry.decide(attempt, AttemptOutcome::Status(response.status)) {
                        // Non-retryable or final: the response stands as-is,
                        // even though it represents an HTTP error.
                        RetryDecision::Stop => return Ok(response),
                        RetryDecision::RetryAfter(delay) => {
                            tracing::warn!(
                                attempt,
                                status = response.status,
                                delay_ms = delay.as_millis(),
                                url = %request.url,
                                "Retryable status, retrying..."
                            );
                            wait_or_abort(delay, token).await?;
                        }
                    }
                }
                Err(TransportError::Aborted) => return Err(TransportError::Aborted),
                Err(TransportError::Network(message)) => {
                    match retry.decide(attempt, AttemptOutcome::TransportError) {
                        RetryDecision::Stop => {
                            tracing::error!(
                                attempt,
                                error = %message,
                                url = %request.url,
                                "Request failed after max attempts"
                            );
                            return Err(TransportError::Network(message));
                        }
                        RetryDecision::RetryAfter(delay) => {
                            tracing::warn!(
                                attempt,
                                delay_ms = delay.as_millis(),
                                error = %message,
                                url = %request.url,
                                "Transport error, retrying..."
                            );
                            wait_or_abort(delay, token).await?;
                        }
                    }
                }
            }
            attempt += 1;
        }
    }

    async fn tracked(&self, method: Method, url: &str, options: RequestOptions) -> ApiResult {
        let label = format!("{method} {url}");
        let result = self
            .loading
            .with_loading(&label, async {
                Ok::<ApiResult, std::convert::Infallible>(self.request(method, url, options).await)
            })
            .await;
        match result {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    fn serialize_body<T: Serialize>(
        payload: &T,
        mut options: RequestOptions,
    ) -> Result<RequestOptions, ApiError> {
        let body =
            serde_json::to_string(payload).map_err(|e| ApiError::request(e.to_string()))?;
        options.body = Some(body);
        Ok(options)
    }

    /// GET, tracked under the label `"GET <url>"`.
    pub async fn get(&self, url: &str, options: RequestOptions) -> ApiResult {
        self.tracked(Method::Get, url, options).await
    }

    /// POST with a JSON-serialized payload, tracked under `"POST <url>"`.
    pub async fn post<T: Serialize>(
        &self,
        url: &str,
        payload: &T,
        options: RequestOptions,
    ) -> ApiResult {
        match Self::serialize_body(payload, options) {
            Ok(options) => self.tracked(Method::Post, url, options).await,
            Err(e) => ApiResult::failed(e),
        }
    }

    /// PUT with a JSON-serialized payload, tracked under `"PUT <url>"`.
    pub async fn put<T: Serialize>(
        &self,
        url: &str,
        payload: &T,
        options: RequestOptions,
    ) -> ApiResult {
        match Self::serialize_body(payload, options) {
            Ok(options) => self.tracked(Method::Put, url, options).await,
            Err(e) => ApiResult::failed(e),
        }
    }

    /// PATCH with a JSON-serialized payload, tracked under `"PATCH <url>"`.
    pub async fn patch<T: Serialize>(
        &self,
        url: &str,
        payload: &T,
        options: RequestOptions,
    ) -> ApiResult {
        match Self::serialize_body(payload, options) {
            Ok(options) => self.tracked(Method::Patch, url, options).await,
            Err(e) => ApiResult::failed(e),
        }
    }

    /// DELETE, tracked under `"DELETE <url>"`.
    pub async fn delete(&self, url: &str, options: RequestOptions) -> ApiResult {
        self.tracked(Method::Delete, url, options).await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("cache_settings", &self.cache_settings)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    base_url: String,
    timeout: Duration,
    default_headers: HashMap<String, String>,
    retry: RetryConfig,
    cache_settings: CacheSettings,
    interceptors: InterceptorPipeline,
    status_hooks: StatusHooks,
    transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<ResponseCache>>,
    loading: Option<Arc<LoadingTracker>>,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClientBuilder {
    /// A builder with every default in place.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            default_headers: HashMap::new(),
            retry: RetryConfig::default(),
            cache_settings: CacheSettings::default(),
            interceptors: InterceptorPipeline::new(),
            status_hooks: StatusHooks::new(),
            transport: None,
            cache: None,
            loading: None,
        }
    }

    /// Base URL prepended to relative request paths.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Default timeout for calls without a caller-supplied token.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A default header sent on every request (overridable per call).
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Default retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Default cache behavior.
    #[must_use]
    pub fn cache_settings(mut self, settings: CacheSettings) -> Self {
        self.cache_settings = settings;
        self
    }

    /// Append a request interceptor.
    #[must_use]
    pub fn request_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptors.add_request(interceptor);
        self
    }

    /// Append a response interceptor.
    #[must_use]
    pub fn response_interceptor(mut self, interceptor: Arc<dyn ResponseInterceptor>) -> Self {
        self.interceptors.add_response(interceptor);
        self
    }

    /// Status-code callback registry.
    #[must_use]
    pub fn status_hooks(mut self, hooks: StatusHooks) -> Self {
        self.status_hooks = hooks;
        self
    }

    /// Inject the transport. Defaults to [`ReqwestTransport`].
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Inject the shared response cache. Defaults to a fresh cache with the
    /// standard TTL.
    #[must_use]
    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Inject the shared loading tracker.
    #[must_use]
    pub fn loading(mut self, loading: Arc<LoadingTracker>) -> Self {
        self.loading = Some(loading);
        self
    }

    /// Build the client.
    #[must_use]
    pub fn build(self) -> ApiClient {
        ApiClient {
            base_url: self.base_url,
            timeout: self.timeout,
            default_headers: self.default_headers,
            retry: self.retry,
            cache_settings: self.cache_settings,
            interceptors: self.interceptors,
            status_hooks: self.status_hooks,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::default())),
            cache: self.cache.unwrap_or_default(),
            loading: self.loading.unwrap_or_default(),
            in_flight: Mutex::new(HashMap::new()),
            request_seq: AtomicU64::new(0),
        }
    }
}
