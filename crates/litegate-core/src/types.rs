//! Shared wire and domain types.
//!
//! The lite-server wire protocol itself is an external collaborator; these types
//! describe only its boundary: a method-plus-params request envelope, the opaque
//! JSON response forwarded verbatim, and the chain head summary the tracker
//! maintains.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Length in bytes of a lite-server session public key.
pub const NODE_KEY_LEN: usize = 32;

/// A request issued against a lite server.
///
/// The payload is an opaque method name plus JSON parameters; litegate does not
/// interpret responses beyond the envelope (see [`crate::engine::transport`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteRequest {
    /// Lite API method name (e.g. `getMasterchainInfo`).
    pub method: String,

    /// Method parameters, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl LiteRequest {
    /// Creates a request with the given method and parameters.
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self { method: method.into(), params }
    }

    /// Request for the current masterchain head.
    #[must_use]
    pub fn masterchain_info() -> Self {
        Self::new("getMasterchainInfo", None)
    }

    /// Request for a full block by masterchain seqno.
    #[must_use]
    pub fn block(seqno: u32) -> Self {
        Self::new("getBlock", Some(serde_json::json!({ "seqno": seqno })))
    }

    /// Request resolving the masterchain block closest to a unix time.
    #[must_use]
    pub fn block_by_utime(utime: u64) -> Self {
        Self::new("lookupBlockByUtime", Some(serde_json::json!({ "utime": utime })))
    }

    /// Request for chain configuration at a block, optionally restricted to
    /// specific parameter ids.
    #[must_use]
    pub fn chain_config(seqno: u32, ids: Option<&str>) -> Self {
        let params = match ids {
            Some(ids) => serde_json::json!({ "seqno": seqno, "ids": ids }),
            None => serde_json::json!({ "seqno": seqno }),
        };
        Self::new("getConfigParams", Some(params))
    }

    /// Request for an account's state at a block.
    #[must_use]
    pub fn account_state(seqno: u32, address: &str) -> Self {
        Self::new(
            "getAccountState",
            Some(serde_json::json!({ "seqno": seqno, "address": address })),
        )
    }

    /// Request for an account's transactions starting from `(lt, hash)`.
    #[must_use]
    pub fn transactions(address: &str, lt: &str, hash: &str) -> Self {
        Self::new(
            "getTransactions",
            Some(serde_json::json!({ "address": address, "lt": lt, "hash": hash })),
        )
    }

    /// Request submitting a serialized external message.
    #[must_use]
    pub fn send_message(boc: &str) -> Self {
        Self::new("sendMessage", Some(serde_json::json!({ "boc": boc })))
    }
}

/// The latest known masterchain head summary.
///
/// Exactly one live instance exists per process, owned by the block sync tracker
/// and replaced wholesale on every detected advance. Readers always observe a
/// complete value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Workchain of the head block (`-1` for the masterchain).
    pub workchain: i32,

    /// Shard identifier, as the decimal string the lite API uses.
    pub shard: String,

    /// Masterchain sequence number. Strictly increasing across snapshots.
    pub seqno: u32,

    /// Base64 root hash of the head block.
    pub root_hash: String,

    /// Base64 file hash of the head block.
    pub file_hash: String,

    /// Unix time the head block was generated, when the upstream reports it.
    #[serde(default)]
    pub gen_utime: u64,
}

/// Address, port and session public key of one upstream lite server.
///
/// Immutable once constructed; engines hold it by value and never share it
/// mutably.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoint {
    /// Host to connect to (dotted quad or hostname).
    pub host: String,

    /// TCP port of the lite-server session bridge.
    pub port: u16,

    /// 32-byte session public key.
    pub public_key: [u8; NODE_KEY_LEN],
}

impl NodeEndpoint {
    /// Parses an endpoint from its configured parts.
    ///
    /// The address may be a hostname, a dotted quad, or — as in the global network
    /// config the original service consumes — a signed 32-bit integer encoding of
    /// an IPv4 address. The key must be base64 for exactly 32 bytes.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the address is empty, the port is
    /// zero, or the key fails to decode to 32 bytes.
    pub fn parse(address: &str, port: u16, key_base64: &str) -> Result<Self, String> {
        let address = address.trim();
        if address.is_empty() {
            return Err("empty address".to_string());
        }
        if port == 0 {
            return Err("port must be greater than 0".to_string());
        }

        let host = match address.parse::<i64>() {
            Ok(raw) => int_to_ip(raw as i32).to_string(),
            Err(_) => address.to_string(),
        };

        let key = BASE64
            .decode(key_base64.trim())
            .map_err(|e| format!("key is not valid base64: {e}"))?;
        let public_key: [u8; NODE_KEY_LEN] = key
            .try_into()
            .map_err(|k: Vec<u8>| format!("key must be {NODE_KEY_LEN} bytes, got {}", k.len()))?;

        Ok(Self { host, port, public_key })
    }

    /// Returns the HTTP bridge URL for this endpoint.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Returns the session public key re-encoded as base64.
    #[must_use]
    pub fn key_base64(&self) -> String {
        BASE64.encode(self.public_key)
    }
}

impl std::fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Converts a signed 32-bit integer IPv4 encoding to an address.
///
/// Network configs for lite servers publish addresses this way; the most
/// significant byte of the integer is the first octet.
#[must_use]
pub fn int_to_ip(raw: i32) -> Ipv4Addr {
    Ipv4Addr::from(raw as u32)
}
