//! RPC request handlers.
//!
//! Every handler takes the shared [`ChainNode`] as axum state and answers
//! in JSON, except `/metrics` which returns Prometheus text.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use msgchain_node::{ChainInfo, ChainNode};
use msgchain_replication::StorageSummary;
use msgchain_types::{Block, Message};

use crate::error::RpcError;

pub type AppState = Arc<ChainNode>;

/// Body of simple acknowledgements.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    fn success() -> Json<Self> {
        Json(Self { status: "success" })
    }
}

// ── Submission ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitMessage {
    pub sender: String,
    pub receiver: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct RejectedEntry {
    pub position: usize,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub accepted: usize,
    pub rejected: Vec<RejectedEntry>,
}

/// POST /submit - encrypt and buffer a batch of messages
pub async fn submit(
    State(node): State<AppState>,
    Json(batch): Json<Vec<SubmitMessage>>,
) -> Result<Json<SubmitResponse>, RpcError> {
    let messages: Vec<Message> = batch
        .into_iter()
        .map(|m| Message::new(m.sender, m.receiver, m.content))
        .collect();
    let count = messages.len();

    let report = node.submit(messages).await?;
    tracing::info!(
        submitted = count,
        accepted = report.accepted,
        rejected = report.rejected.len(),
        "messages submitted"
    );

    Ok(Json(SubmitResponse {
        message: "Messages submitted successfully".to_string(),
        accepted: report.accepted,
        rejected: report
            .rejected
            .into_iter()
            .map(|r| RejectedEntry {
                position: r.position,
                error: r.error.to_string(),
            })
            .collect(),
    }))
}

// ── Chain ────────────────────────────────────────────────────────────────

/// GET /blockchain_info - chain length, block summaries and pending count
pub async fn blockchain_info(State(node): State<AppState>) -> Json<ChainInfo> {
    Json(node.chain_info().await)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct LengthResponse {
    pub length: u64,
}

/// GET /blockchain_length
pub async fn blockchain_length(State(node): State<AppState>) -> Json<LengthResponse> {
    Json(LengthResponse {
        length: node.chain_length(),
    })
}

#[derive(Debug, Deserialize)]
pub struct BlockIndexQuery {
    pub index: Option<String>,
}

/// GET /block_by_index?index=N - a full block
pub async fn block_by_index(
    State(node): State<AppState>,
    Query(query): Query<BlockIndexQuery>,
) -> Result<Json<Block>, RpcError> {
    let raw = query
        .index
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RpcError::InvalidRequest("index not specified".into()))?;
    let index: u64 = raw
        .trim()
        .parse()
        .map_err(|_| RpcError::InvalidRequest(format!("invalid index: {raw}")))?;

    Ok(Json(node.block_by_index(index)?))
}

// ── Storage nodes ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VerifyStorageRequest {
    pub user_id: String,
    /// Capacity in bytes, as a decimal string.
    pub capacity: String,
}

/// POST /verify_storage - register a storage node or change its capacity
pub async fn verify_storage(
    State(node): State<AppState>,
    Json(req): Json<VerifyStorageRequest>,
) -> Result<Json<StatusResponse>, RpcError> {
    if req.capacity.is_empty() {
        return Err(RpcError::InvalidRequest("capacity cannot be empty".into()));
    }
    let capacity: i64 = req
        .capacity
        .trim()
        .parse()
        .map_err(|_| RpcError::InvalidRequest(format!("invalid capacity: {}", req.capacity)))?;

    let recorded = node.register_node(req.user_id.as_str(), capacity);
    let summary = node.storage_summary();
    tracing::info!(
        user_id = %req.user_id,
        capacity = recorded,
        nodes = summary.node_count,
        total_gib = summary.total_capacity_gib,
        "storage verified"
    );
    Ok(StatusResponse::success())
}

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub user_id: String,
}

/// POST /heartbeat - refresh a node's last-seen time
pub async fn heartbeat(
    State(node): State<AppState>,
    Json(req): Json<UserRequest>,
) -> Json<StatusResponse> {
    if !node.heartbeat(req.user_id.as_str()) {
        tracing::debug!(user_id = %req.user_id, "heartbeat from unknown node");
    }
    StatusResponse::success()
}

/// POST /remove_storage - drop a node and re-replicate its blocks
pub async fn remove_storage(
    State(node): State<AppState>,
    Json(req): Json<UserRequest>,
) -> Result<Json<StatusResponse>, RpcError> {
    if node.remove_node(req.user_id.as_str()) {
        tracing::info!(user_id = %req.user_id, "storage removed");
        Ok(StatusResponse::success())
    } else {
        Err(RpcError::NodeNotFound(req.user_id))
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStorageRequest {
    pub user_id: String,
    /// Accepted for compatibility; the registry knows the recorded value.
    #[serde(default)]
    pub prev_capacity: i64,
    pub new_capacity: i64,
}

/// POST /update_storage - change a node's capacity
pub async fn update_storage(
    State(node): State<AppState>,
    Json(req): Json<UpdateStorageRequest>,
) -> Json<StatusResponse> {
    let recorded = node.update_node_capacity(req.user_id.as_str(), req.new_capacity);
    tracing::info!(
        user_id = %req.user_id,
        claimed_previous = req.prev_capacity,
        capacity = recorded,
        "storage capacity updated"
    );
    StatusResponse::success()
}

/// GET /storage_summary - node count and aggregate capacity
pub async fn storage_summary(
    State(node): State<AppState>,
) -> Json<StorageSummary> {
    Json(node.storage_summary())
}

// ── Metrics ──────────────────────────────────────────────────────────────

/// GET /metrics - Prometheus text exposition
pub async fn metrics(State(node): State<AppState>) -> Result<impl IntoResponse, RpcError> {
    let body = node
        .metrics
        .encode_text()
        .map_err(|e| RpcError::Server(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use msgchain_crypto::CipherKey;
    use msgchain_node::NodeConfig;
    use msgchain_nullables::NullClock;

    // ---- Helpers ----

    fn test_node(min_batch: usize, max_batch: usize) -> AppState {
        let config = NodeConfig {
            min_batch,
            max_batch,
            placement_seed: Some(1),
            ..NodeConfig::default()
        };
        let key = CipherKey::new(vec![3u8; 32]).unwrap();
        let clock = Arc::new(NullClock::new(0));
        Arc::new(ChainNode::with_parts(config, key, clock).unwrap())
    }

    fn msg(sender: &str, receiver: &str, content: &str) -> SubmitMessage {
        SubmitMessage {
            sender: sender.into(),
            receiver: receiver.into(),
            content: content.into(),
        }
    }

    fn index_query(index: Option<&str>) -> Query<BlockIndexQuery> {
        Query(BlockIndexQuery {
            index: index.map(String::from),
        })
    }

    // ---- Submission ----

    #[tokio::test]
    async fn submit_reports_accepted_count() {
        let node = test_node(5, 100);
        let batch = vec![msg("alice", "bob", "hi"), msg("bob", "alice", "hello")];

        let Json(resp) = submit(State(node.clone()), Json(batch)).await.unwrap();
        assert_eq!(resp.accepted, 2);
        assert!(resp.rejected.is_empty());

        let Json(info) = blockchain_info(State(node)).await;
        assert_eq!(info.length, 1);
        assert_eq!(info.pending_messages, 2);
    }

    #[tokio::test]
    async fn full_batch_shows_up_as_block() {
        let node = test_node(1, 2);
        let batch = vec![msg("a", "b", "1"), msg("c", "d", "2")];
        submit(State(node.clone()), Json(batch)).await.unwrap();

        let Json(len) = blockchain_length(State(node.clone())).await;
        assert_eq!(len, LengthResponse { length: 2 });

        let Json(block) = block_by_index(State(node), index_query(Some("1")))
            .await
            .unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.messages.len(), 2);
        assert_eq!(block.messages[0].sender, "a");
    }

    // ---- Block lookup ----

    #[tokio::test]
    async fn block_by_index_validates_query() {
        let node = test_node(5, 100);

        let err = block_by_index(State(node.clone()), index_query(None))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = block_by_index(State(node.clone()), index_query(Some("-1")))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = block_by_index(State(node.clone()), index_query(Some("7")))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let Json(genesis) = block_by_index(State(node), index_query(Some("0")))
            .await
            .unwrap();
        assert!(genesis.is_genesis());
    }

    // ---- Storage nodes ----

    #[tokio::test]
    async fn verify_storage_parses_capacity() {
        let node = test_node(5, 100);

        let req = VerifyStorageRequest {
            user_id: "u1".into(),
            capacity: "1073741824".into(),
        };
        let Json(resp) = verify_storage(State(node.clone()), Json(req)).await.unwrap();
        assert_eq!(resp.status, "success");
        assert_eq!(node.storage_summary().total_capacity_bytes, 1 << 30);

        for bad in ["", "lots"] {
            let req = VerifyStorageRequest {
                user_id: "u2".into(),
                capacity: bad.into(),
            };
            let err = verify_storage(State(node.clone()), Json(req))
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(node.storage_summary().node_count, 1);
    }

    #[tokio::test]
    async fn remove_unknown_node_is_not_found() {
        let node = test_node(5, 100);
        node.register_node("u1", 10);

        let req = UserRequest {
            user_id: "ghost".into(),
        };
        let err = remove_storage(State(node.clone()), Json(req))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let req = UserRequest {
            user_id: "u1".into(),
        };
        let Json(resp) = remove_storage(State(node.clone()), Json(req)).await.unwrap();
        assert_eq!(resp.status, "success");
        assert_eq!(node.storage_summary().node_count, 0);
    }

    #[tokio::test]
    async fn heartbeat_and_update_always_succeed() {
        let node = test_node(5, 100);
        node.register_node("u1", 10);

        let Json(resp) = heartbeat(
            State(node.clone()),
            Json(UserRequest {
                user_id: "nobody".into(),
            }),
        )
        .await;
        assert_eq!(resp.status, "success");

        let req = UpdateStorageRequest {
            user_id: "u1".into(),
            prev_capacity: 999,
            new_capacity: 50,
        };
        update_storage(State(node.clone()), Json(req)).await;
        assert_eq!(node.storage_summary().total_capacity_bytes, 50);
    }

    #[test]
    fn update_request_prev_capacity_is_optional() {
        let req: UpdateStorageRequest =
            serde_json::from_str(r#"{"user_id":"u1","new_capacity":5}"#).unwrap();
        assert_eq!(req.prev_capacity, 0);
        assert_eq!(req.new_capacity, 5);
    }

    // ---- Metrics ----

    #[tokio::test]
    async fn metrics_returns_prometheus_text() {
        let node = test_node(5, 100);
        node.register_node("u1", 10);
        let response = metrics(State(node)).await.unwrap().into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; version=0.0.4"
        );
    }
}
