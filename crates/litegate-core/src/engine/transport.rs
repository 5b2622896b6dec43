//! The session-layer boundary.
//!
//! Everything litegate knows about the lite-server wire protocol is this trait:
//! issue a request against an endpoint, await a response or a failure. Retry and
//! backoff semantics belong to the transport implementation, not to the pool.

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{LiteRequest, NodeEndpoint};

use super::errors::EngineError;

/// Capability set an engine requires from the session layer.
#[async_trait]
pub trait LiteTransport: Send + Sync {
    /// Issues one request against the given endpoint and awaits the decoded
    /// response payload.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the session cannot be reached, times out,
    /// or answers with an error envelope.
    async fn query(
        &self,
        endpoint: &NodeEndpoint,
        request: &LiteRequest,
    ) -> Result<serde_json::Value, EngineError>;
}

/// Transport speaking JSON over an HTTP session bridge.
///
/// Lite servers are commonly fronted by an ADNL-over-HTTP bridge; the session
/// handshake (including the endpoint's public key) terminates there, so this
/// transport only carries the request envelope.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client fails to build.
    pub fn new(timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Sanitizes network errors to prevent information disclosure.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() || error.is_decode() {
            "response body error".to_string()
        } else {
            "network error".to_string()
        }
    }
}

/// Splits a response envelope into its payload.
///
/// The bridge answers either `{"error": {"code", "message"}}` or
/// `{"result": ...}`; a bare payload without the `result` wrapper is passed
/// through unchanged.
fn unwrap_envelope(envelope: serde_json::Value) -> Result<serde_json::Value, EngineError> {
    if let Some(error) = envelope.get("error") {
        let code = error
            .get("code")
            .and_then(serde_json::Value::as_i64)
            .and_then(|c| i32::try_from(c).ok())
            .unwrap_or(-1);
        let message = error
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(EngineError::Server(code, message));
    }
    match envelope {
        serde_json::Value::Object(mut map) if map.contains_key("result") => {
            Ok(map.remove("result").unwrap_or(serde_json::Value::Null))
        }
        other => Ok(other),
    }
}

#[async_trait]
impl LiteTransport for HttpTransport {
    async fn query(
        &self,
        endpoint: &NodeEndpoint,
        request: &LiteRequest,
    ) -> Result<serde_json::Value, EngineError> {
        let response =
            self.client.post(endpoint.url()).json(request).send().await.map_err(|e| {
                if e.is_timeout() {
                    EngineError::Timeout
                } else {
                    EngineError::ConnectionFailed(Self::sanitize_network_error(&e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::HttpStatus(status.as_u16()));
        }

        let envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse(Self::sanitize_network_error(&e)))?;

        unwrap_envelope(envelope)
    }
}
