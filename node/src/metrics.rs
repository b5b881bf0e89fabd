//! Prometheus metrics for the msgchain node.
//!
//! The [`NodeMetrics`] struct owns a dedicated [`Registry`] that the HTTP
//! `/metrics` route encodes into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

use crate::NodeError;

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub blocks_mined: IntCounter,
    /// Messages that reached the pending buffer.
    pub messages_accepted: IntCounter,
    /// Messages dropped because encryption failed.
    pub messages_rejected: IntCounter,
    /// Submit calls answered with a timeout.
    pub submission_timeouts: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub pending_messages: IntGauge,
    /// Blocks in the chain, genesis included.
    pub chain_length: IntGauge,
    pub storage_nodes: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Wall time of one mining pass, in milliseconds.
    pub mining_duration_ms: Histogram,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Result<Self, NodeError> {
        let registry = Registry::new();

        let blocks_mined = register_int_counter_with_registry!(
            Opts::new("msgchain_blocks_mined_total", "Total blocks mined by this node"),
            registry
        )?;

        let messages_accepted = register_int_counter_with_registry!(
            Opts::new(
                "msgchain_messages_accepted_total",
                "Total messages that reached the pending buffer"
            ),
            registry
        )?;

        let messages_rejected = register_int_counter_with_registry!(
            Opts::new(
                "msgchain_messages_rejected_total",
                "Total messages rejected by the cipher stage"
            ),
            registry
        )?;

        let submission_timeouts = register_int_counter_with_registry!(
            Opts::new(
                "msgchain_submission_timeouts_total",
                "Total submit calls that hit their deadline"
            ),
            registry
        )?;

        let pending_messages = register_int_gauge_with_registry!(
            Opts::new(
                "msgchain_pending_messages",
                "Current number of messages waiting to be mined"
            ),
            registry
        )?;

        let chain_length = register_int_gauge_with_registry!(
            Opts::new("msgchain_chain_length", "Current number of blocks in the chain"),
            registry
        )?;

        let storage_nodes = register_int_gauge_with_registry!(
            Opts::new(
                "msgchain_storage_nodes",
                "Current number of registered storage nodes"
            ),
            registry
        )?;

        // Exponential buckets covering 0.1 ms → ~1.6 s.
        let mining_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "msgchain_mining_duration_ms",
                "Mining pass duration in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(0.1, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            blocks_mined,
            messages_accepted,
            messages_rejected,
            submission_timeouts,
            pending_messages,
            chain_length,
            storage_nodes,
            mining_duration_ms,
        })
    }

    /// Encode every metric in the Prometheus text format.
    pub fn encode_text(&self) -> Result<String, NodeError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| NodeError::Metrics(prometheus::Error::Msg(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_encode() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.blocks_mined.inc();
        metrics.chain_length.set(2);
        metrics.mining_duration_ms.observe(1.5);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("msgchain_blocks_mined_total 1"));
        assert!(text.contains("msgchain_chain_length 2"));
        assert!(text.contains("msgchain_mining_duration_ms_count 1"));
    }

    #[test]
    fn separate_instances_do_not_collide() {
        let a = NodeMetrics::new().unwrap();
        let b = NodeMetrics::new().unwrap();
        a.messages_accepted.inc_by(3);
        assert_eq!(b.messages_accepted.get(), 0);
    }
}
