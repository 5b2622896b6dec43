use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::trace;

use crate::types::{LiteRequest, NodeEndpoint};

use super::{errors::EngineError, transport::LiteTransport};

/// One authenticated session to one upstream lite server.
///
/// The endpoint is immutable after construction. An engine serves one request
/// at a time; concurrency against a node comes from the number of engines the
/// node's server group holds, never from multiplexing a single session.
pub struct Engine {
    endpoint: NodeEndpoint,
    transport: Arc<dyn LiteTransport>,
    in_flight: Semaphore,
}

impl Engine {
    /// Creates an engine bound to the given endpoint and session transport.
    #[must_use]
    pub fn new(endpoint: NodeEndpoint, transport: Arc<dyn LiteTransport>) -> Self {
        Self { endpoint, transport, in_flight: Semaphore::new(1) }
    }

    /// Returns the endpoint this engine is bound to.
    #[must_use]
    pub fn endpoint(&self) -> &NodeEndpoint {
        &self.endpoint
    }

    /// Issues a request over this session and awaits the response.
    ///
    /// Waits for the session to become free first; the transport's own timeout
    /// bounds the request itself.
    ///
    /// # Errors
    ///
    /// Propagates the transport's failure verbatim; the caller decides how to
    /// react. Returns [`EngineError::Closed`] if the engine is being torn down.
    pub async fn query(&self, request: &LiteRequest) -> Result<serde_json::Value, EngineError> {
        let _permit = self.in_flight.acquire().await.map_err(|_| EngineError::Closed)?;
        trace!(engine = %self.endpoint, method = %request.method, "dispatching request");
        self.transport.query(&self.endpoint, request).await
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("endpoint", &self.endpoint).finish_non_exhaustive()
    }
}
