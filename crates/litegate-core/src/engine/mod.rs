//! Lite-server session management: engines, clients, groups, and the pool.
//!
//! One [`Engine`] is one authenticated session to one upstream node. A node is
//! provisioned with P parallel engines (a [`ServerGroup`]), because a single
//! session cannot usefully pipeline unboundedly; every engine across every node
//! is also registered in the global [`EnginePool`], which dispatches requests in
//! stable cyclic order so load spreads across nodes and sessions alike.
//!
//! [`Client`] is the request façade over either one engine or the pool, bounding
//! in-flight requests with a fixed batch size. The pooled client's batch size is
//! the sum of every member engine's batch unit; a group's clients keep only
//! their own, smaller budget, which is what callers use when they need isolation
//! from pool-wide contention.
//!
//! The wire protocol itself lives behind [`LiteTransport`]; the pool never
//! retries across engines — a failed request surfaces to the caller and the
//! rotation naturally routes future requests elsewhere.

pub mod builder;
pub mod client;
pub mod errors;
pub mod group;
pub mod pool;
pub mod session;
pub mod transport;

pub use builder::{EngineSet, EngineSetBuilder};
pub use client::Client;
pub use errors::EngineError;
pub use group::ServerGroup;
pub use pool::EnginePool;
pub use session::Engine;
pub use transport::{HttpTransport, LiteTransport};
