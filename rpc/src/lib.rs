//! HTTP/JSON server for the msgchain node.
//!
//! Provides endpoints for:
//! - Message submission
//! - Chain overview, length and block lookup
//! - Storage node registration, heartbeats, removal and capacity updates
//! - Prometheus metrics

pub mod error;
pub mod handlers;
pub mod server;

pub use error::RpcError;
pub use server::{router, serve_on, RpcServer};
