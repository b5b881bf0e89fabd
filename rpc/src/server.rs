//! Axum-based RPC server.

use std::net::SocketAddr;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::Instrument;

use msgchain_node::tracing_spans::rpc_span;

use crate::error::RpcError;
use crate::handlers::{self, AppState};

/// Build the router with every route bound to `node`. `/metrics` is only
/// mounted when the node config enables it.
pub fn router(node: AppState) -> Router {
    let mut routes = Router::new()
        .route("/submit", post(handlers::submit))
        .route("/blockchain_info", get(handlers::blockchain_info))
        .route("/blockchain_length", get(handlers::blockchain_length))
        .route("/block_by_index", get(handlers::block_by_index))
        .route("/verify_storage", post(handlers::verify_storage))
        .route("/heartbeat", post(handlers::heartbeat))
        .route("/remove_storage", post(handlers::remove_storage))
        .route("/update_storage", post(handlers::update_storage))
        .route("/storage_summary", get(handlers::storage_summary));
    if node.config.enable_metrics {
        routes = routes.route("/metrics", get(handlers::metrics));
    }
    routes
        .layer(middleware::from_fn(trace_request))
        .with_state(node)
}

async fn trace_request(req: Request, next: Next) -> Response {
    let span = rpc_span(req.uri().path());
    async move {
        let method = req.method().clone();
        let response = next.run(req).await;
        tracing::debug!(%method, status = response.status().as_u16(), "request handled");
        response
    }
    .instrument(span)
    .await
}

pub struct RpcServer {
    pub bind: String,
    pub port: u16,
}

impl RpcServer {
    pub fn new(bind: impl Into<String>, port: u16) -> Self {
        Self {
            bind: bind.into(),
            port,
        }
    }

    /// Bind and serve until a shutdown signal arrives on `shutdown_rx`.
    pub async fn start(
        &self,
        node: AppState,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), RpcError> {
        let listener = TcpListener::bind((self.bind.as_str(), self.port))
            .await
            .map_err(|e| RpcError::Server(format!("bind {}:{}: {e}", self.bind, self.port)))?;
        serve_on(listener, node, shutdown_rx).await
    }
}

/// Serve on an already-bound listener until a shutdown signal arrives.
pub async fn serve_on(
    listener: TcpListener,
    node: AppState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), RpcError> {
    let addr: SocketAddr = listener
        .local_addr()
        .map_err(|e| RpcError::Server(e.to_string()))?;
    tracing::info!(%addr, "RPC server listening");

    axum::serve(listener, router(node))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            tracing::info!("RPC server shutting down");
        })
        .await
        .map_err(|e| RpcError::Server(e.to_string()))
}
