use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::{
    sync::HeadSource,
    types::{ChainHead, LiteRequest},
};

use super::{errors::EngineError, pool::EnginePool, session::Engine};

/// Where a client's requests land: one engine, or the whole pool.
#[derive(Clone)]
enum Backend {
    Single(Arc<Engine>),
    Pool(Arc<EnginePool>),
}

/// Logical request issuer over one engine or the engine pool.
///
/// The batch size bounds how many requests the client keeps in flight at once;
/// it is fixed at construction. Cloning a client shares the same batch budget.
#[derive(Clone)]
pub struct Client {
    backend: Backend,
    batch: Arc<Semaphore>,
    batch_size: usize,
}

impl Client {
    /// Creates a client pinned to a single engine.
    #[must_use]
    pub fn single(engine: Arc<Engine>, batch_size: usize) -> Self {
        Self {
            backend: Backend::Single(engine),
            batch: Arc::new(Semaphore::new(batch_size)),
            batch_size,
        }
    }

    /// Creates a client dispatching through the pool's round-robin rotation.
    #[must_use]
    pub fn pooled(pool: Arc<EnginePool>, batch_size: usize) -> Self {
        Self {
            backend: Backend::Pool(pool),
            batch: Arc::new(Semaphore::new(batch_size)),
            batch_size,
        }
    }

    /// Returns the in-flight request ceiling of this client.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Issues a request and awaits the response or failure.
    ///
    /// Waits for a batch slot when the client is at its in-flight ceiling. The
    /// pool is not consulted again on failure; the error surfaces verbatim and
    /// the rotation routes future requests to other engines.
    ///
    /// # Errors
    ///
    /// Propagates the engine's failure to the caller.
    pub async fn request(&self, request: &LiteRequest) -> Result<serde_json::Value, EngineError> {
        let _permit = self.batch.acquire().await.map_err(|_| EngineError::Closed)?;
        let engine = match &self.backend {
            Backend::Single(engine) => Arc::clone(engine),
            Backend::Pool(pool) => pool.next_engine(),
        };
        engine.query(request).await
    }

    /// Fetches the current masterchain head.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidResponse`] when the upstream's masterchain
    /// info does not carry a well-formed `last` block.
    pub async fn fetch_latest_head(&self) -> Result<ChainHead, EngineError> {
        let info = self.request(&LiteRequest::masterchain_info()).await?;
        let last = match info {
            serde_json::Value::Object(mut map) if map.contains_key("last") => {
                map.remove("last").unwrap_or(serde_json::Value::Null)
            }
            other => other,
        };
        serde_json::from_value(last)
            .map_err(|e| EngineError::InvalidResponse(format!("malformed masterchain info: {e}")))
    }
}

#[async_trait]
impl HeadSource for Client {
    async fn latest_head(&self) -> Result<ChainHead, EngineError> {
        self.fetch_latest_head().await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            Backend::Single(engine) => format!("engine {}", engine.endpoint()),
            Backend::Pool(pool) => format!("pool of {}", pool.len()),
        };
        f.debug_struct("Client")
            .field("backend", &backend)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}
