use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use litegate_core::{
    engine::{Client, EngineError, ServerGroup},
    sync::BlockSync,
    types::LiteRequest,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::watch;

/// Shared handles the routing layer works with. Constructed once at startup.
#[derive(Clone)]
pub struct AppState {
    /// Pooled client for on-demand queries.
    pub client: Client,

    /// Per-node server groups, used where node isolation matters (`/send`).
    pub groups: Arc<Vec<ServerGroup>>,

    /// The process-wide block sync tracker.
    pub block_sync: Arc<BlockSync>,
}

/// Builds the public route table.
pub fn create_router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    let cors = cors_layer(cors_allowed_origins);

    Router::new()
        .route("/", get(handle_index))
        .route("/block/watch", get(watch::handle_block_watch))
        .route("/block/watch/changed", get(watch::handle_block_watch_changed))
        .route("/block/latest", get(handle_block_latest))
        .route("/block/utime/:utime", get(handle_block_by_utime))
        .route("/block/:seqno", get(handle_get_block))
        .route("/block/:seqno/config", get(handle_get_config))
        .route("/block/:seqno/config/:ids", get(handle_get_config_ids))
        .route("/block/:seqno/:address", get(handle_account_get))
        .route("/account/:address/tx/:lt/:hash", get(handle_get_transactions))
        .route("/send", post(handle_send))
        .layer(cors)
        .with_state(state)
}

/// CORS policy: GET/POST from the configured origins, or any origin when the
/// list is empty.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST]).allow_headers(Any);

    let origins: Vec<HeaderValue> = allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

async fn handle_index() -> &'static str {
    "litegate: lite-server gateway"
}

/// Serves the tracker's current snapshot; 503 until the first successful poll.
async fn handle_block_latest(State(state): State<AppState>) -> Response {
    match state.block_sync.current() {
        Some(head) => (StatusCode::OK, Json((*head).clone())).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "not synced yet" })),
        )
            .into_response(),
    }
}

async fn handle_get_block(State(state): State<AppState>, Path(seqno): Path<u32>) -> Response {
    forward(&state.client, LiteRequest::block(seqno)).await
}

async fn handle_block_by_utime(State(state): State<AppState>, Path(utime): Path<u64>) -> Response {
    forward(&state.client, LiteRequest::block_by_utime(utime)).await
}

async fn handle_get_config(State(state): State<AppState>, Path(seqno): Path<u32>) -> Response {
    forward(&state.client, LiteRequest::chain_config(seqno, None)).await
}

async fn handle_get_config_ids(
    State(state): State<AppState>,
    Path((seqno, ids)): Path<(u32, String)>,
) -> Response {
    forward(&state.client, LiteRequest::chain_config(seqno, Some(&ids))).await
}

async fn handle_account_get(
    State(state): State<AppState>,
    Path((seqno, address)): Path<(u32, String)>,
) -> Response {
    forward(&state.client, LiteRequest::account_state(seqno, &address)).await
}

async fn handle_get_transactions(
    State(state): State<AppState>,
    Path((address, lt, hash)): Path<(String, String, String)>,
) -> Response {
    forward(&state.client, LiteRequest::transactions(&address, &lt, &hash)).await
}

/// Message submission body.
#[derive(Debug, Deserialize)]
pub struct SendBody {
    /// Base64-serialized external message.
    pub boc: String,
}

/// Submits a message through the per-node server groups.
///
/// Submission deliberately avoids the pool: each attempt goes to a specific
/// node's own sessions, and the next group is only tried after the previous
/// node refused.
async fn handle_send(State(state): State<AppState>, Json(body): Json<SendBody>) -> Response {
    if body.boc.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "boc must not be empty" })),
        )
            .into_response();
    }

    match send_via_groups(&state.groups, &body.boc).await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => {
            warn!(error = %e, "message submission failed on every node");
            engine_error_response(&e)
        }
    }
}

/// Tries each group in turn until one node accepts the message.
async fn send_via_groups(
    groups: &[ServerGroup],
    boc: &str,
) -> Result<serde_json::Value, EngineError> {
    let request = LiteRequest::send_message(boc);
    let mut last_error = EngineError::NoServersConfigured;
    for group in groups {
        match group.request(&request).await {
            Ok(value) => return Ok(value),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

/// Forwards an on-demand query through the pooled client, returning the
/// upstream payload verbatim.
async fn forward(client: &Client, request: LiteRequest) -> Response {
    let method = request.method.clone();
    match client.request(&request).await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => {
            warn!(method = %method, error = %e, "upstream request failed");
            engine_error_response(&e)
        }
    }
}

/// Maps an engine failure onto an HTTP error response.
fn engine_error_response(error: &EngineError) -> Response {
    let status = match error {
        EngineError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        EngineError::Server(..)
        | EngineError::InvalidResponse(_)
        | EngineError::ConnectionFailed(_)
        | EngineError::Network(_)
        | EngineError::HttpStatus(_)
        | EngineError::NoServersConfigured => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": error.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use litegate_core::{
        config::LiteServerEntry,
        engine::{EngineSetBuilder, LiteTransport},
        types::NodeEndpoint,
    };
    use serde_json::json;

    struct ScriptedTransport {
        fail_hosts: Vec<String>,
    }

    #[async_trait]
    impl LiteTransport for ScriptedTransport {
        async fn query(
            &self,
            endpoint: &NodeEndpoint,
            request: &LiteRequest,
        ) -> Result<serde_json::Value, EngineError> {
            if self.fail_hosts.contains(&endpoint.host) {
                return Err(EngineError::ConnectionFailed("refused".to_string()));
            }
            Ok(json!({ "host": endpoint.host, "method": request.method }))
        }
    }

    fn entries(hosts: &[&str]) -> Vec<LiteServerEntry> {
        hosts
            .iter()
            .map(|host| LiteServerEntry {
                address: (*host).to_string(),
                port: 4924,
                key: BASE64.encode([1u8; 32]),
            })
            .collect()
    }

    fn groups_with(fail_hosts: &[&str], hosts: &[&str]) -> Vec<ServerGroup> {
        let transport = Arc::new(ScriptedTransport {
            fail_hosts: fail_hosts.iter().map(|h| (*h).to_string()).collect(),
        });
        EngineSetBuilder::new()
            .parallelism(2)
            .transport(transport)
            .build(&entries(hosts))
            .unwrap()
            .groups
    }

    #[tokio::test]
    async fn test_send_falls_through_to_next_group() {
        let groups = groups_with(&["10.0.0.1"], &["10.0.0.1", "10.0.0.2"]);

        let value = send_via_groups(&groups, "dGVzdA==").await.unwrap();
        assert_eq!(value["host"], "10.0.0.2");
        assert_eq!(value["method"], "sendMessage");
    }

    #[tokio::test]
    async fn test_send_reports_last_error_when_all_nodes_refuse() {
        let groups = groups_with(&["10.0.0.1", "10.0.0.2"], &["10.0.0.1", "10.0.0.2"]);

        let err = send_via_groups(&groups, "dGVzdA==").await.unwrap_err();
        assert!(matches!(err, EngineError::ConnectionFailed(_)));
    }

    #[test]
    fn test_engine_error_status_mapping() {
        let cases = [
            (EngineError::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (EngineError::Server(651, "block not found".into()), StatusCode::BAD_GATEWAY),
            (EngineError::ConnectionFailed("refused".into()), StatusCode::BAD_GATEWAY),
            (EngineError::Closed, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(engine_error_response(&error).status(), expected, "{error}");
        }
    }

    #[test]
    fn test_cors_layer_builds_for_all_origin_shapes() {
        let _ = cors_layer(&["https://app.example.com".to_string()]);
        let _ = cors_layer(&[]);
        let _ = cors_layer(&["not a header value \u{7f}".to_string()]);
    }
}
