//! Backend REST calls.
//!
//! # Data Flow
//! ```text
//! Handler (loop thread)
//!     → Backend::dispatch (spawns onto the backend executor)
//!     → RestClient::call (client.rs, reqwest)
//!     → completion closure (executor thread) → classification → SocketOps
//! ```
//!
//! # Design Decisions
//! - `RestClient` is the seam; tests swap in a scripted client
//! - Timeouts belong to the request; expiry surfaces as
//!   [`BackendError::Timeout`] and is classified like any other failure
//! - Closing a connection never cancels a call already dispatched

pub mod client;
pub mod json;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::runtime::Handle;
use url::Url;

use crate::config::Endpoint;
use crate::net::ConnectionId;
use crate::observability::metrics;

pub use client::ReqwestClient;

/// Header carrying the endpoint's auth token.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Header carrying the connection id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// HTTP method of a backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully described backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRequest {
    pub endpoint: String,
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub auth_token: String,
    pub trace_id: String,
    pub timeout: Duration,
}

impl BackendRequest {
    fn new(endpoint: &Endpoint, method: Method, trace_id: ConnectionId) -> Self {
        Self {
            endpoint: endpoint.name.clone(),
            method,
            url: endpoint.target.clone(),
            query: Vec::new(),
            form: Vec::new(),
            auth_token: endpoint.auth_token.clone(),
            trace_id: trace_id.to_string(),
            timeout: endpoint.request_timeout(),
        }
    }

    /// GET against the endpoint's target.
    pub fn lookup(endpoint: &Endpoint, trace_id: ConnectionId) -> Self {
        Self::new(endpoint, Method::Get, trace_id)
    }

    /// Form-encoded POST against the endpoint's target.
    pub fn policy(endpoint: &Endpoint, trace_id: ConnectionId, form: Vec<(String, String)>) -> Self {
        Self {
            form,
            ..Self::new(endpoint, Method::Post, trace_id)
        }
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }
}

/// Status and body of a completed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    pub status: u16,
    pub body: String,
}

/// A call that produced no HTTP response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("REST request timed out: {0}")]
    Timeout(String),

    #[error("REST server unreachable: {0}")]
    Connect(String),

    #[error("REST request failed: {0}")]
    Transport(String),

    #[error("REST request could not be built: {0}")]
    Build(String),
}

impl BackendError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout(_))
    }
}

/// Asynchronous HTTP call capability.
#[async_trait]
pub trait RestClient: Send + Sync {
    async fn call(&self, request: BackendRequest) -> Result<BackendResponse, BackendError>;
}

/// A REST client bound to the executor its calls run on.
#[derive(Clone)]
pub struct Backend {
    client: Arc<dyn RestClient>,
    executor: Handle,
}

impl Backend {
    pub fn new(client: Arc<dyn RestClient>, executor: Handle) -> Self {
        Self { client, executor }
    }

    /// Start `request` on the executor; `on_complete` runs there with the
    /// result, never on the loop thread.
    pub fn dispatch<F>(&self, request: BackendRequest, on_complete: F)
    where
        F: FnOnce(Result<BackendResponse, BackendError>) + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        self.executor.spawn(async move {
            let endpoint = request.endpoint.clone();
            let started = Instant::now();
            let result = client.call(request).await;
            metrics::backend_call_finished(&endpoint, started.elapsed());
            on_complete(result);
        });
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted client for handler tests.

    use std::sync::Mutex;

    use super::*;

    /// Replies with a fixed result and records every request it receives.
    pub struct StubClient {
        result: Result<BackendResponse, BackendError>,
        seen: Mutex<Vec<BackendRequest>>,
    }

    impl StubClient {
        pub fn status(status: u16, body: &str) -> Arc<Self> {
            Self::with_result(Ok(BackendResponse {
                status,
                body: body.to_string(),
            }))
        }

        pub fn failing(error: BackendError) -> Arc<Self> {
            Self::with_result(Err(error))
        }

        fn with_result(result: Result<BackendResponse, BackendError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                seen: Mutex::new(Vec::new()),
            })
        }

        pub fn requests(&self) -> Vec<BackendRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RestClient for StubClient {
        async fn call(&self, request: BackendRequest) -> Result<BackendResponse, BackendError> {
            self.seen.lock().unwrap().push(request);
            self.result.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubClient;
    use super::*;
    use crate::config::Endpoint;

    #[test]
    fn lookup_request_carries_endpoint_settings() {
        let endpoint = Endpoint::for_tests("aliases", crate::config::Mode::TcpLookup);
        let id = ConnectionId::new();
        let request = BackendRequest::lookup(&endpoint, id).with_query("key", "a b");

        assert_eq!(request.method, Method::Get);
        assert_eq!(request.url, endpoint.target);
        assert_eq!(request.auth_token, endpoint.auth_token);
        assert_eq!(request.trace_id, id.to_string());
        assert_eq!(request.timeout, endpoint.request_timeout());
        assert_eq!(request.query, vec![("key".to_string(), "a b".to_string())]);
        assert!(request.form.is_empty());
    }

    #[tokio::test]
    async fn dispatch_runs_completion_with_result() {
        let stub = StubClient::status(200, "[]");
        let backend = Backend::new(stub.clone(), Handle::current());
        let endpoint = Endpoint::for_tests("aliases", crate::config::Mode::TcpLookup);
        let (tx, rx) = tokio::sync::oneshot::channel();

        backend.dispatch(BackendRequest::lookup(&endpoint, ConnectionId::new()), move |result| {
            let _ = tx.send(result);
        });

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(stub.requests().len(), 1);
    }

    #[test]
    fn timeout_is_distinguished() {
        assert!(BackendError::Timeout("deadline".into()).is_timeout());
        assert!(!BackendError::Connect("refused".into()).is_timeout());
    }
}
