//! # Sync Client
//!
//! Request gateway between consumers and the Engine. Each request reads
//! the store's connectivity mode, base URL and credential at call time and
//! is either answered from fixtures (mock mode) or sent over HTTP (real
//! mode). Every outcome is normalized into an [`ApiResult`].
//!
//! ## Reachability
//!
//! The gateway is the only place that writes `is_reachable` from network
//! activity:
//!
//! | outcome                         | result                 | `is_reachable` |
//! |---------------------------------|------------------------|----------------|
//! | 2xx                             | decoded envelope       | `true`         |
//! | non-2xx (any status)            | `Http { status }`      | unchanged      |
//! | timeout                         | `Timeout`              | unchanged      |
//! | host unreachable / refused      | `Network`              | `false`        |
//! | cancelled by caller             | `Cancelled`            | unchanged      |
//! | mock mode                       | fixture / echo         | unchanged      |
//!
//! ## Usage
//!
//! ```rust,ignore
//! let store = AppStore::in_memory();
//! let client = SyncClient::new(store.clone(), &Config::new());
//! let clusters = client.list_clusters(None).await?;
//! ```

pub mod endpoints;
pub mod envelope;
pub mod mock;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::console::config::Config;
use crate::console::state::{AppStore, ApplicationState};
use crate::shared::config::RequestTimeouts;
use crate::shared::error::{ApiError, ApiResult};

pub use endpoints::{AuditQuery, JobQuery, Query, ScoreQuery};
pub use envelope::Envelope;
pub use mock::MockRoutes;

/// Header carrying the credential token
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Live byte stream (job logs)
pub type ByteStream = Pin<Box<dyn Stream<Item = ApiResult<Bytes>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Replaces the method's default deadline
    pub timeout: Option<Duration>,
    /// Cancelling it abandons the request without touching the store
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Raw transport outcome, before any store side effect
enum Exchange {
    Failed(ApiError),
    Responded {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Clone)]
pub struct SyncClient {
    store: AppStore,
    http: reqwest::Client,
    mock: Arc<MockRoutes>,
    mock_latency: Duration,
    timeouts: RequestTimeouts,
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("mock", &self.mock)
            .field("mock_latency", &self.mock_latency)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl SyncClient {
    pub fn new(store: AppStore, config: &Config) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            mock: Arc::new(MockRoutes::fixtures()),
            mock_latency: config.mock_latency(),
            timeouts: config.timeouts(),
        }
    }

    pub fn with_mock_latency(mut self, latency: Duration) -> Self {
        self.mock_latency = latency;
        self
    }

    pub fn with_mock_routes(mut self, routes: MockRoutes) -> Self {
        self.mock = Arc::new(routes);
        self
    }

    pub fn with_timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn store(&self) -> &AppStore {
        &self.store
    }

    /// Send a request. `Ok(None)` means the Engine returned no data.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> ApiResult<Option<Value>> {
        let state = self.store.get_state();
        if state.is_mock() {
            return self.request_mock(method, path, body, &options).await;
        }
        self.request_real(&state, method, path, body, options).await
    }

    pub async fn get(&self, path: &str) -> ApiResult<Option<Value>> {
        self.request(Method::Get, path, None, RequestOptions::default())
            .await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> ApiResult<Option<Value>> {
        self.request(Method::Post, path, body, RequestOptions::default())
            .await
    }

    /// GET decoded into `T`
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let data = self.request(Method::Get, path, None, options).await?;
        decode_data(path, data)
    }

    /// POST `body` and decode the answer into `T`
    pub async fn post_json<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let data = self.request(Method::Post, path, Some(body), options).await?;
        decode_data(path, data)
    }

    /// `GET /health` with the short health deadline
    pub async fn health(&self) -> ApiResult<Option<Value>> {
        let options = RequestOptions::new().timeout(self.timeouts.health);
        self.request(Method::Get, "/health", None, options).await
    }

    /// Open a live byte stream. Failures never change reachability.
    pub async fn open_stream(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> ApiResult<ByteStream> {
        let state = self.store.get_state();
        if state.is_mock() {
            let options = RequestOptions {
                timeout: None,
                cancel,
            };
            let lines = self.request_mock(Method::Get, path, None, &options).await?;
            return Ok(mock_stream(lines));
        }

        let url = join_url(&state.endpoint_base_url, path);
        tracing::info!("Opening stream: {}", url);
        let request = self.with_credential(self.http.get(&url), &state);
        // Only the response head is bounded; the body is long-lived
        let open = tokio::time::timeout(self.timeouts.get, request.send());
        let response = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ApiError::cancelled()),
                response = open => response,
            },
            None => open.await,
        };

        let response = match response {
            Err(_) => return Err(ApiError::stream_unavailable("Timeout opening stream")),
            Ok(Err(e)) => {
                return Err(ApiError::stream_unavailable(format!(
                    "Stream unavailable: {}",
                    e
                )))
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let cause = envelope::error_for_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
                &body,
                path,
            );
            return Err(ApiError::stream_unavailable(cause.message));
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| ApiError::stream_unavailable(format!("Stream interrupted: {}", e)))
        });
        Ok(Box::pin(stream))
    }

    async fn request_mock(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: &RequestOptions,
    ) -> ApiResult<Option<Value>> {
        tracing::debug!("[mock] {} {}", method, path);
        if !self.mock_latency.is_zero() {
            let delay = tokio::time::sleep(self.mock_latency);
            match &options.cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(ApiError::cancelled()),
                    _ = delay => {}
                },
                None => delay.await,
            }
        }
        if options.is_cancelled() {
            return Err(ApiError::cancelled());
        }

        match method {
            Method::Get => self
                .mock
                .resolve(path)
                .map(Some)
                .ok_or_else(|| ApiError::mock_route_not_found(path)),
            // Simulated optimistic creation
            Method::Post => Ok(body),
        }
    }

    async fn request_real(
        &self,
        state: &ApplicationState,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> ApiResult<Option<Value>> {
        let url = join_url(&state.endpoint_base_url, path);
        let timeout = options.timeout.unwrap_or(match method {
            Method::Get => self.timeouts.get,
            Method::Post => self.timeouts.post,
        });
        tracing::debug!("{} {} (timeout {:?})", method, url, timeout);

        let mut request = match method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        };
        request = self.with_credential(request, state).timeout(timeout);
        if let Some(body) = body.as_ref() {
            request = request.json(body);
        }

        let pending = exchange(request);
        let outcome = match &options.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ApiError::cancelled()),
                outcome = pending => outcome,
            },
            None => pending.await,
        };
        // Cancelled while the response was being read: no side effects
        if options.is_cancelled() {
            return Err(ApiError::cancelled());
        }

        match outcome {
            Exchange::Failed(error) => {
                if error.is_connectivity() {
                    tracing::warn!("{} {} failed: {}", method, url, error);
                    self.store.set_reachable(false);
                } else {
                    tracing::debug!("{} {} failed: {}", method, url, error);
                }
                Err(error)
            }
            Exchange::Responded { status, body } if status.is_success() => {
                self.store.set_reachable(true);
                let decoded = Envelope::decode(&body).into_result();
                if let Err(e) = &decoded {
                    tracing::debug!("{} {} returned an error envelope: {}", method, url, e);
                }
                decoded
            }
            Exchange::Responded { status, body } => {
                let error = envelope::error_for_status(
                    status.as_u16(),
                    status.canonical_reason().unwrap_or(""),
                    &body,
                    path,
                );
                tracing::debug!("{} {} -> {}: {}", method, url, status, error);
                Err(error)
            }
        }
    }

    fn with_credential(
        &self,
        request: reqwest::RequestBuilder,
        state: &ApplicationState,
    ) -> reqwest::RequestBuilder {
        if state.credential_token.is_empty() {
            request
        } else {
            request.header(API_KEY_HEADER, &state.credential_token)
        }
    }
}

async fn exchange(request: reqwest::RequestBuilder) -> Exchange {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => return Exchange::Failed(ApiError::timeout()),
        Err(e) => return Exchange::Failed(ApiError::network(format!("Network error: {}", e))),
    };
    let status = response.status();
    match response.text().await {
        Ok(body) => Exchange::Responded { status, body },
        Err(e) if e.is_timeout() => Exchange::Failed(ApiError::timeout()),
        Err(e) => Exchange::Failed(ApiError::decode(format!(
            "Failed to read response body: {}",
            e
        ))),
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

fn decode_data<T: DeserializeOwned>(path: &str, data: Option<Value>) -> ApiResult<T> {
    serde_json::from_value(data.unwrap_or(Value::Null))
        .map_err(|e| ApiError::decode(format!("Unexpected response from {}: {}", path, e)))
}

/// Fixture lines (a JSON array of strings) replayed as newline-terminated chunks
fn mock_stream(lines: Option<Value>) -> ByteStream {
    let chunks: Vec<ApiResult<Bytes>> = lines
        .as_ref()
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(Value::as_str)
                .map(|line| Ok(Bytes::from(format!("{}\n", line))))
                .collect()
        })
        .unwrap_or_default();
    Box::pin(futures_util::stream::iter(chunks))
}
