use std::sync::atomic::{AtomicUsize, Ordering};

use crate::types::LiteRequest;

use super::{client::Client, errors::EngineError};

/// The redundant clients provisioned against one upstream node.
///
/// Length always equals the configured parallelism count. A group is the
/// isolated alternative to the pool: its requests only ever touch its own
/// node's sessions and its capacity is only its own clients' batch budget.
pub struct ServerGroup {
    clients: Vec<Client>,
    cursor: AtomicUsize,
}

impl ServerGroup {
    /// Creates a group over the given clients. The builder guarantees one
    /// client per parallel connection slot.
    pub(crate) fn new(clients: Vec<Client>) -> Self {
        debug_assert!(!clients.is_empty());
        Self { clients, cursor: AtomicUsize::new(0) }
    }

    /// Returns the number of parallel connection slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if the group has no clients. The builder never produces
    /// such a group; present for API completeness.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Returns the group's aggregate in-flight ceiling.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.clients.iter().map(Client::batch_size).sum()
    }

    /// Returns the group's clients in slot order.
    #[must_use]
    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    /// Issues a request through the group's own rotation.
    ///
    /// # Errors
    ///
    /// Propagates the selected client's failure verbatim.
    pub async fn request(&self, request: &LiteRequest) -> Result<serde_json::Value, EngineError> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        self.clients[index].request(request).await
    }
}

impl std::fmt::Debug for ServerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerGroup").field("clients", &self.clients.len()).finish_non_exhaustive()
    }
}
