use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::{errors::EngineError, session::Engine};

/// Round-robin dispatcher over every engine across every configured node.
///
/// The engine set is fixed at construction; there is no runtime
/// reconfiguration. Dispatch visits engines in stable cyclic order, so for K
/// nodes with P engines each, all K×P engines are handed out before any one of
/// them repeats. The cursor is the pool's only mutable state and is only
/// advanced here.
pub struct EnginePool {
    engines: Vec<Arc<Engine>>,
    cursor: AtomicUsize,
}

impl EnginePool {
    /// Creates a pool over the given engines, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptyPool`] when no engines are supplied.
    pub fn new(engines: Vec<Arc<Engine>>) -> Result<Self, EngineError> {
        if engines.is_empty() {
            return Err(EngineError::EmptyPool);
        }
        Ok(Self { engines, cursor: AtomicUsize::new(0) })
    }

    /// Returns the next engine in cyclic order.
    #[must_use]
    pub fn next_engine(&self) -> Arc<Engine> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.engines.len();
        Arc::clone(&self.engines[index])
    }

    /// Returns the number of engines in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Returns `true` if the pool holds no engines. Construction forbids this;
    /// present for API completeness.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Returns all engines in registration order.
    #[must_use]
    pub fn engines(&self) -> &[Arc<Engine>] {
        &self.engines
    }
}

impl std::fmt::Debug for EnginePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnginePool").field("engines", &self.engines.len()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::transport::LiteTransport,
        types::{LiteRequest, NodeEndpoint},
    };
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl LiteTransport for NullTransport {
        async fn query(
            &self,
            _endpoint: &NodeEndpoint,
            _request: &LiteRequest,
        ) -> Result<serde_json::Value, EngineError> {
            Ok(serde_json::Value::Null)
        }
    }

    fn engines_for(nodes: usize, per_node: usize) -> Vec<Arc<Engine>> {
        let transport: Arc<dyn LiteTransport> = Arc::new(NullTransport);
        let mut engines = Vec::new();
        for node in 0..nodes {
            for _ in 0..per_node {
                let endpoint = NodeEndpoint {
                    host: format!("10.0.0.{node}"),
                    port: 4924,
                    public_key: [0u8; 32],
                };
                engines.push(Arc::new(Engine::new(endpoint, Arc::clone(&transport))));
            }
        }
        engines
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(matches!(EnginePool::new(Vec::new()), Err(EngineError::EmptyPool)));
    }

    #[test]
    fn test_round_robin_visits_every_engine_before_repeating() {
        // 3 nodes × 4 engines: one full rotation hands out all 12 distinct engines.
        let pool = EnginePool::new(engines_for(3, 4)).unwrap();

        let mut seen = Vec::new();
        for _ in 0..pool.len() {
            let engine = pool.next_engine();
            assert!(
                !seen.iter().any(|e| Arc::ptr_eq(e, &engine)),
                "engine repeated before a full rotation"
            );
            seen.push(engine);
        }
        assert_eq!(seen.len(), 12);

        // The second rotation repeats the same stable order.
        for expected in &seen {
            assert!(Arc::ptr_eq(expected, &pool.next_engine()));
        }
    }

    #[test]
    fn test_round_robin_interleaves_nodes() {
        // Engines are registered node-major, so consecutive picks stay within a
        // node only as long as its slots last; the cycle still spreads load
        // evenly: every engine appears exactly twice after two rotations.
        let pool = EnginePool::new(engines_for(2, 2)).unwrap();
        let mut counts = std::collections::HashMap::new();
        for _ in 0..8 {
            let engine = pool.next_engine();
            *counts.entry(Arc::as_ptr(&engine) as usize).or_insert(0) += 1;
        }
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 2));
    }

    #[test]
    fn test_single_engine_pool_cycles() {
        let pool = EnginePool::new(engines_for(1, 1)).unwrap();
        let first = pool.next_engine();
        let second = pool.next_engine();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
