//! msgchain node: turns submitted messages into a hash-linked chain.
//!
//! The node is the central coordinator that:
//! - Encrypts incoming messages on a bounded pipeline
//! - Buffers them with aging priorities until a batch is due
//! - Mines batches into blocks on the ledger
//! - Replicates every block across registered storage nodes

pub mod chain_event;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod pipeline;
pub mod scheduler;
pub mod shutdown;
pub mod tracing_spans;

pub use chain_event::{ChainEvent, EventBus};
pub use config::{load_key_file, parse_key_json, NodeConfig};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{ChainInfo, ChainNode};
pub use pipeline::{
    IngestionPipeline, MessageSealer, PipelineConfig, PipelineError, RejectedMessage, SubmitReport,
};
pub use scheduler::{MiningScheduler, SchedulerConfig};
pub use shutdown::ShutdownController;
