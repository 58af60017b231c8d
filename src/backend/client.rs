//! reqwest-backed [`RestClient`].
//!
//! # Responsibilities
//! - Build one pooled HTTP client with the configured user agent
//! - Attach query/form parameters, auth token and request id headers
//! - Classify reqwest failures into [`BackendError`]

use async_trait::async_trait;

use super::{
    BackendError, BackendRequest, BackendResponse, Method, RestClient, AUTH_TOKEN_HEADER,
    REQUEST_ID_HEADER,
};

/// HTTP client shared by every endpoint.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(user_agent: &str) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| BackendError::Build(e.to_string()))?;
        Ok(Self { client })
    }

    fn classify(error: reqwest::Error, request: &BackendRequest) -> BackendError {
        if error.is_timeout() {
            tracing::warn!(
                connection = %request.trace_id,
                endpoint = %request.endpoint,
                timeout_ms = request.timeout.as_millis() as u64,
                "Backend request timed out"
            );
            BackendError::Timeout(error.to_string())
        } else if error.is_connect() {
            tracing::warn!(
                connection = %request.trace_id,
                endpoint = %request.endpoint,
                url = %request.url,
                "Failed to connect to backend"
            );
            BackendError::Connect(error.to_string())
        } else if error.is_builder() {
            BackendError::Build(error.to_string())
        } else {
            tracing::error!(
                connection = %request.trace_id,
                endpoint = %request.endpoint,
                error = %error,
                "Backend request failed"
            );
            BackendError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl RestClient for ReqwestClient {
    async fn call(&self, request: BackendRequest) -> Result<BackendResponse, BackendError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url.clone()),
            Method::Post => self.client.post(request.url.clone()).form(&request.form),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        tracing::debug!(
            connection = %request.trace_id,
            endpoint = %request.endpoint,
            method = ?request.method,
            url = %request.url,
            "Calling backend"
        );

        let response = builder
            .header(AUTH_TOKEN_HEADER, &request.auth_token)
            .header(REQUEST_ID_HEADER, &request.trace_id)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| Self::classify(e, &request))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Self::classify(e, &request))?;

        tracing::debug!(
            connection = %request.trace_id,
            endpoint = %request.endpoint,
            status,
            body_len = body.len(),
            "Backend responded"
        );

        Ok(BackendResponse { status, body })
    }
}
