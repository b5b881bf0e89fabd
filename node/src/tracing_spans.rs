//! Pre-built [`tracing::Span`] constructors for common node operations.
//!
//! Consistent span names and field sets make traces easy to filter and
//! correlate.

use tracing::{info_span, Span};

/// Span covering one mining pass.
pub fn mine_span() -> Span {
    info_span!("mine")
}

/// Span covering the absorption of one submitted batch.
pub fn submit_span(batch_len: usize) -> Span {
    info_span!("submit", batch_len = %batch_len)
}

/// Span covering a single HTTP request handled by the RPC server.
pub fn rpc_span(route: &str) -> Span {
    info_span!("rpc", route = %route)
}
