//! # Fetchkit
//!
//! Client-side request orchestration for a remote HTTP API: every outbound
//! call transparently gains caching, automatic retry, timeout/cancellation,
//! and an ordered interceptor pipeline, and resolves to one uniform
//! [`ApiResult`] contract regardless of failure mode.
//!
//! ## Core Components
//!
//! - **`ApiClient`**: the orchestrator composing everything below around an
//!   injected [`Transport`]
//! - **`ResponseCache`**: TTL cache keyed by a deterministic request
//!   fingerprint, with pattern invalidation and a background sweeper
//! - **`RetryConfig`**: pure retry decisions with linear backoff
//! - **`InterceptorPipeline`**: ordered request/response transformations
//! - **`LoadingTracker`**: label-keyed in-flight operation tracking
//!
//! ## Example
//!
//! ```no_run
//! use fetchkit::{ApiClient, RequestOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = ApiClient::builder()
//!         .base_url("https://api.example.com")
//!         .timeout(Duration::from_secs(10))
//!         .build();
//!
//!     let options = RequestOptions::new()
//!         .param("page", 2)
//!         .cached(Some(Duration::from_secs(5)));
//!
//!     let result = client.get("/clients", options).await;
//!     if result.success {
//!         println!("data: {:?}", result.data);
//!     } else {
//!         println!("failed: {:?}", result.error);
//!     }
//! }
//! ```
//!
//! There are no module-level globals: the cache and loading tracker are
//! plain values injected into the client, and single-instance-per-app
//! semantics belong to the caller's composition root.

pub mod cache;
pub mod client;
pub mod error;
pub mod interceptor;
pub mod loading;
pub mod retry;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use cache::{KeyPattern, ResponseCache, SweeperHandle};
pub use client::{ApiClient, ApiClientBuilder, CacheOptions, CacheSettings, RequestOptions};
pub use error::{ApiError, ErrorCode, InterceptorError, TransportError};
pub use interceptor::{
    InterceptorPipeline, RequestInterceptor, ResponseInterceptor, StatusHooks, request_fn,
    response_fn,
};
pub use loading::{LoadingSnapshot, LoadingState, LoadingTracker, SubscriptionId};
pub use retry::{AttemptOutcome, RetryConfig, RetryDecision};
pub use transport::{Method, ReqwestTransport, Transport, TransportRequest, TransportResponse};
pub use types::{ApiResult, Body, BodyKind, QueryParams};
