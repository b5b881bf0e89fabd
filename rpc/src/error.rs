//! RPC error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use msgchain_ledger::LedgerError;
use msgchain_node::{NodeError, PipelineError};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("storage node not found: {0}")]
    NodeNotFound(String),

    #[error("submission timed out; queued messages are still being processed")]
    SubmissionTimeout,

    #[error("node error: {0}")]
    Node(String),

    #[error("server error: {0}")]
    Server(String),
}

impl RpcError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RpcError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::BlockNotFound(_) | RpcError::NodeNotFound(_) => StatusCode::NOT_FOUND,
            RpcError::SubmissionTimeout => StatusCode::REQUEST_TIMEOUT,
            RpcError::Node(_) | RpcError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
struct FailureBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = FailureBody {
            status: "failure",
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for RpcError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::SubmissionTimeout(_) => RpcError::SubmissionTimeout,
            other => RpcError::Node(other.to_string()),
        }
    }
}

impl From<NodeError> for RpcError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::Ledger(LedgerError::IndexOutOfRange { index, length }) => {
                RpcError::BlockNotFound(format!("index {index} (chain length {length})"))
            }
            NodeError::Pipeline(inner) => inner.into(),
            other => RpcError::Node(other.to_string()),
        }
    }
}
