use std::{sync::Arc, time::Duration};

use tracing::{error, info, warn};

use crate::{
    config::{InvalidKeyPolicy, LiteServerEntry, LiteServersConfig},
    types::NodeEndpoint,
};

use super::{
    client::Client,
    errors::EngineError,
    group::ServerGroup,
    pool::EnginePool,
    session::Engine,
    transport::{HttpTransport, LiteTransport},
};

/// Everything constructed from the lite-server configuration.
///
/// Built once at process start and passed by reference to whatever needs it;
/// engines live for the process lifetime.
#[derive(Debug)]
pub struct EngineSet {
    /// Every engine across every node, in configuration order.
    pub pool: Arc<EnginePool>,

    /// Pooled client with the aggregate batch budget
    /// (engine count × per-engine batch unit).
    pub client: Client,

    /// One group per usable configured node, each holding the node's parallel
    /// clients.
    pub groups: Vec<ServerGroup>,
}

/// Builds engines, server groups, and the pool from configured node entries.
pub struct EngineSetBuilder {
    parallelism: usize,
    engine_batch: usize,
    invalid_key_policy: InvalidKeyPolicy,
    request_timeout: Duration,
    transport: Option<Arc<dyn LiteTransport>>,
}

impl Default for EngineSetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineSetBuilder {
    /// Creates a builder with the default parallelism (50 sessions per node)
    /// and batch unit (10 in-flight requests per engine).
    #[must_use]
    pub fn new() -> Self {
        Self {
            parallelism: 50,
            engine_batch: 10,
            invalid_key_policy: InvalidKeyPolicy::Abort,
            request_timeout: Duration::from_secs(30),
            transport: None,
        }
    }

    /// Creates a builder taking every knob from the lite-server configuration.
    #[must_use]
    pub fn from_config(config: &LiteServersConfig) -> Self {
        Self {
            parallelism: config.parallelism,
            engine_batch: config.engine_batch,
            invalid_key_policy: config.on_invalid_key,
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
            transport: None,
        }
    }

    /// Sets the number of parallel sessions per node.
    #[must_use]
    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Sets the per-engine in-flight request ceiling.
    #[must_use]
    pub fn engine_batch(mut self, engine_batch: usize) -> Self {
        self.engine_batch = engine_batch;
        self
    }

    /// Sets the handling of entries that fail to parse.
    #[must_use]
    pub fn invalid_key_policy(mut self, policy: InvalidKeyPolicy) -> Self {
        self.invalid_key_policy = policy;
        self
    }

    /// Sets the per-request timeout of the default HTTP transport.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Substitutes the session transport (tests, alternative bridges).
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn LiteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Constructs all engines, groups, and the pooled client.
    ///
    /// For each usable node, `parallelism` engines are built and wrapped in
    /// single-engine clients forming the node's [`ServerGroup`]; every engine is
    /// also registered into the global pool, whose client gets the aggregate
    /// batch budget.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoServersConfigured`] when the entry list is empty
    /// or every entry was excluded; [`EngineError::InvalidEndpoint`] when an
    /// entry fails to parse under the `abort` policy.
    pub fn build(&self, entries: &[LiteServerEntry]) -> Result<EngineSet, EngineError> {
        if entries.is_empty() {
            return Err(EngineError::NoServersConfigured);
        }

        let transport = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(HttpTransport::new(self.request_timeout)?) as Arc<dyn LiteTransport>,
        };

        let mut engines = Vec::with_capacity(entries.len() * self.parallelism);
        let mut groups = Vec::with_capacity(entries.len());

        for entry in entries {
            let endpoint = match NodeEndpoint::parse(&entry.address, entry.port, &entry.key) {
                Ok(endpoint) => endpoint,
                Err(reason) => match self.invalid_key_policy {
                    InvalidKeyPolicy::Abort => {
                        error!(
                            node = %entry.address,
                            reason = %reason,
                            "invalid lite server entry, aborting pool construction"
                        );
                        return Err(EngineError::InvalidEndpoint {
                            node: entry.address.clone(),
                            reason,
                        });
                    }
                    InvalidKeyPolicy::Skip => {
                        warn!(
                            node = %entry.address,
                            reason = %reason,
                            "invalid lite server entry, excluding node"
                        );
                        continue;
                    }
                },
            };

            let mut clients = Vec::with_capacity(self.parallelism);
            for _ in 0..self.parallelism {
                let engine = Arc::new(Engine::new(endpoint.clone(), Arc::clone(&transport)));
                clients.push(Client::single(Arc::clone(&engine), self.engine_batch));
                engines.push(engine);
            }
            groups.push(ServerGroup::new(clients));
        }

        if engines.is_empty() {
            return Err(EngineError::NoServersConfigured);
        }

        let pool = Arc::new(EnginePool::new(engines)?);
        let aggregate_batch = pool.len() * self.engine_batch;
        let client = Client::pooled(Arc::clone(&pool), aggregate_batch);

        info!(
            nodes = groups.len(),
            engines = pool.len(),
            batch = aggregate_batch,
            "engine pool constructed"
        );

        Ok(EngineSet { pool, client, groups })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LiteRequest;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

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

    fn entry(address: &str) -> LiteServerEntry {
        LiteServerEntry {
            address: address.to_string(),
            port: 4924,
            key: BASE64.encode([7u8; 32]),
        }
    }

    fn bad_entry(address: &str) -> LiteServerEntry {
        LiteServerEntry { address: address.to_string(), port: 4924, key: "!!".to_string() }
    }

    fn builder() -> EngineSetBuilder {
        EngineSetBuilder::new()
            .parallelism(3)
            .engine_batch(10)
            .transport(Arc::new(NullTransport))
    }

    #[test]
    fn test_empty_configuration_is_fatal() {
        let result = builder().build(&[]);
        assert!(matches!(result, Err(EngineError::NoServersConfigured)));
    }

    #[test]
    fn test_builds_groups_and_pool() {
        let set = builder().build(&[entry("10.0.0.1"), entry("10.0.0.2")]).unwrap();

        // K=2 nodes × P=3 sessions.
        assert_eq!(set.groups.len(), 2);
        assert!(set.groups.iter().all(|g| g.len() == 3));
        assert_eq!(set.pool.len(), 6);
    }

    #[test]
    fn test_aggregate_and_group_batch_capacity() {
        let set = builder().build(&[entry("10.0.0.1"), entry("10.0.0.2")]).unwrap();

        // Pool capacity is the sum of every engine's batch unit; a group only
        // contributes its own P engines.
        assert_eq!(set.client.batch_size(), 6 * 10);
        assert_eq!(set.groups[0].capacity(), 3 * 10);
    }

    #[test]
    fn test_integer_addresses_resolve() {
        let set = builder().build(&[entry("16909060")]).unwrap();
        assert_eq!(set.pool.engines()[0].endpoint().host, "1.2.3.4");
    }

    #[test]
    fn test_invalid_key_aborts_by_default() {
        let result = builder().build(&[entry("10.0.0.1"), bad_entry("10.0.0.2")]);
        match result {
            Err(EngineError::InvalidEndpoint { node, .. }) => assert_eq!(node, "10.0.0.2"),
            other => panic!("expected InvalidEndpoint, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_key_skip_excludes_node() {
        let set = builder()
            .invalid_key_policy(InvalidKeyPolicy::Skip)
            .build(&[entry("10.0.0.1"), bad_entry("10.0.0.2")])
            .unwrap();

        assert_eq!(set.groups.len(), 1);
        assert_eq!(set.pool.len(), 3);
    }

    #[test]
    fn test_skip_that_excludes_everything_is_fatal() {
        let result = builder()
            .invalid_key_policy(InvalidKeyPolicy::Skip)
            .build(&[bad_entry("10.0.0.1"), bad_entry("10.0.0.2")]);
        assert!(matches!(result, Err(EngineError::NoServersConfigured)));
    }

    #[test]
    fn test_from_config_takes_every_knob() {
        let config = LiteServersConfig {
            entries: vec![entry("10.0.0.1")],
            parallelism: 2,
            engine_batch: 5,
            on_invalid_key: InvalidKeyPolicy::Skip,
            request_timeout_seconds: 10,
        };

        let set = EngineSetBuilder::from_config(&config)
            .transport(Arc::new(NullTransport))
            .build(&config.entries)
            .unwrap();
        assert_eq!(set.pool.len(), 2);
        assert_eq!(set.client.batch_size(), 10);
    }
}
