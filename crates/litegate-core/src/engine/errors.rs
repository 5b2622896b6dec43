use thiserror::Error;

/// Errors surfaced by engines, clients, and pool construction.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Request exceeded the configured timeout duration.
    #[error("request timeout")]
    Timeout,

    /// Failed to establish a connection to the upstream endpoint.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Network-level error from the underlying HTTP client.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTTP-level error (non-2xx status code) from the session bridge.
    #[error("http status {0}")]
    HttpStatus(u16),

    /// Error envelope returned by the lite server.
    ///
    /// First field is the lite-server error code, second is the message.
    #[error("lite server error {0}: {1}")]
    Server(i32, String),

    /// Response from the upstream could not be parsed or was malformed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A configured endpoint entry could not be parsed.
    #[error("invalid lite server entry {node}: {reason}")]
    InvalidEndpoint {
        /// The configured address of the offending entry.
        node: String,
        /// Why the entry failed to parse.
        reason: String,
    },

    /// No upstream nodes are configured (or all were excluded), so no pool can
    /// be built. Fatal at startup.
    #[error("no usable lite servers configured")]
    NoServersConfigured,

    /// An engine pool cannot be constructed without engines.
    #[error("engine pool is empty")]
    EmptyPool,

    /// The engine or client was shut down while a request waited for a slot.
    #[error("engine closed")]
    Closed,
}
