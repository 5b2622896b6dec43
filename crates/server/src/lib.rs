//! HTTP/WebSocket routing glue over `litegate-core`.
//!
//! The routing layer only ever talks to the pooled client (on-demand queries),
//! the per-node server groups (message submission), or the block sync tracker
//! (live feeds); it contains no independent logic beyond request validation and
//! response shaping.

pub mod router;
pub mod watch;
