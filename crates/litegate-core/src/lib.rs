//! # Litegate Core
//!
//! Core library for the litegate lite-server gateway.
//!
//! This crate provides the foundational components for:
//!
//! - **[`engine`]**: Multi-node session management — one authenticated engine per
//!   connection slot, per-node server groups, and a round-robin engine pool that
//!   presents every session as a single logical client with aggregate batching.
//!
//! - **[`sync`]**: Chain head tracking and live distribution — a single background
//!   tracker polling the pool for the latest head, a torn-read-free snapshot, and a
//!   subscription registry fanning change events out to live consumers.
//!
//! - **[`config`]**: Layered application configuration (defaults, TOML file,
//!   environment overrides) including lite-server endpoint lists.
//!
//! - **[`types`]**: Shared wire and domain types (`LiteRequest`, `ChainHead`,
//!   `NodeEndpoint`).
//!
//! ## Architecture
//!
//! ```text
//! configuration
//!       │
//!       ▼
//! ┌──────────────────┐     ┌─────────────────────┐
//! │ EngineSetBuilder  │────►│ ServerGroup (per node)│
//! │  (K nodes × P)    │     └─────────────────────┘
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐     ┌───────────────┐     ┌──────────────────────┐
//! │    EnginePool     │◄────│   BlockSync   │────►│ SubscriptionRegistry │
//! │  (round-robin)    │ poll│  (head tracker)│emit │  (per-connection)    │
//! └──────────────────┘     └───────────────┘     └──────────────────────┘
//! ```
//!
//! The routing layer only ever talks to the pooled [`engine::Client`] (on-demand
//! queries) or to [`sync::BlockSync`] (live feeds).

pub mod config;
pub mod engine;
pub mod sync;
pub mod types;
