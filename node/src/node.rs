//! The msgchain node: wires the ledger, scheduler, pipeline and storage
//! registry together and runs their background tickers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use msgchain_crypto::CipherKey;
use msgchain_ledger::Ledger;
use msgchain_replication::{ReplicationRegistry, StorageSummary};
use msgchain_types::{Block, BlockSummary, Clock, Message, NodeId, SystemClock};

use crate::chain_event::{ChainEvent, EventBus};
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::metrics::NodeMetrics;
use crate::pipeline::{IngestionPipeline, MessageSealer, PipelineError, SubmitReport};
use crate::scheduler::MiningScheduler;
use crate::shutdown::ShutdownController;

/// Timeout for waiting on background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Overview of the chain and the pending buffer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainInfo {
    pub length: u64,
    pub blocks: Vec<BlockSummary>,
    pub pending_messages: usize,
}

/// A running msgchain node.
pub struct ChainNode {
    pub config: NodeConfig,
    pub ledger: Arc<Ledger>,
    pub scheduler: Arc<MiningScheduler>,
    pub registry: Arc<ReplicationRegistry>,
    pub metrics: Arc<NodeMetrics>,
    pub shutdown: Arc<ShutdownController>,
    pipeline: IngestionPipeline,
    /// Handles for spawned background tasks (joined during shutdown).
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl ChainNode {
    /// Create a node on the wall clock, sealing messages with `key`.
    ///
    /// Must be called inside a tokio runtime: the pipeline workers are
    /// spawned here. Tickers start with [`start`](Self::start).
    pub fn new(config: NodeConfig, key: CipherKey) -> Result<Self, NodeError> {
        Self::with_parts(config, key, Arc::new(SystemClock))
    }

    /// Create a node with an explicit clock and sealer (tests).
    pub fn with_parts(
        config: NodeConfig,
        sealer: impl MessageSealer,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NodeError> {
        config.validate()?;

        let metrics = Arc::new(NodeMetrics::new()?);
        let shutdown = Arc::new(ShutdownController::new());
        let ledger = Arc::new(Ledger::new(Arc::clone(&clock)));

        let registry = Arc::new(match config.placement_seed {
            Some(seed) => {
                ReplicationRegistry::with_seed(Arc::clone(&clock), config.replication_factor, seed)
            }
            None => ReplicationRegistry::from_entropy(Arc::clone(&clock), config.replication_factor),
        });

        // Every mined block is handed to the placer.
        let mut events = EventBus::new();
        let placer = Arc::clone(&registry);
        events.subscribe(Box::new(move |event| {
            let ChainEvent::BlockMined { index, hash, .. } = event;
            let holders = placer.place(*hash);
            tracing::debug!(index, block = %hash, holders = holders.len(), "block replicated");
        }));

        let scheduler = Arc::new(MiningScheduler::new(
            config.scheduler_config(),
            Arc::clone(&ledger),
            Arc::clone(&clock),
            Arc::new(events),
            Arc::clone(&metrics),
        ));

        let (pipeline, task_handles) = IngestionPipeline::spawn(
            &config.pipeline_config(),
            sealer,
            Arc::clone(&scheduler),
            clock,
            Arc::clone(&metrics),
            &shutdown,
        );

        tracing::info!(
            min_batch = config.min_batch,
            max_batch = config.max_batch,
            replication_factor = config.replication_factor,
            "msgchain node created"
        );

        Ok(Self {
            config,
            ledger,
            scheduler,
            registry,
            metrics,
            shutdown,
            pipeline,
            task_handles: Mutex::new(task_handles),
            started: AtomicBool::new(false),
        })
    }

    /// Spawn the aging, mining and offline-sweep tickers.
    pub fn start(&self) -> Result<(), NodeError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyStarted);
        }

        // ── Aging ticker: raise priorities of waiting messages ──
        let scheduler = Arc::clone(&self.scheduler);
        let mut shutdown_rx = self.shutdown.subscribe();
        let aging_tick = self.config.aging_tick();
        let aging_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(aging_tick);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("aging ticker shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        scheduler.age_pending().await;
                    }
                }
            }
        });
        self.push_task(aging_handle);

        // ── Mining ticker: mine stale batches ──
        let scheduler = Arc::clone(&self.scheduler);
        let mut shutdown_rx = self.shutdown.subscribe();
        let mining_tick = self.config.mining_tick();
        let mining_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(mining_tick);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("mining ticker shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        scheduler.mine_if_due().await;
                    }
                }
            }
        });
        self.push_task(mining_handle);

        // ── Offline sweep: evict silent storage nodes ──
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);
        let mut shutdown_rx = self.shutdown.subscribe();
        let sweep_interval = self.config.offline_sweep_interval();
        let node_timeout = self.config.node_timeout();
        let sweep_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            // The first tick fires immediately; nothing can be stale yet.
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("offline sweep shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let removed = registry.sweep_offline(node_timeout);
                        if !removed.is_empty() {
                            tracing::info!(count = removed.len(), "offline storage nodes removed");
                        }
                        metrics.storage_nodes.set(registry.node_count() as i64);
                    }
                }
            }
        });
        self.push_task(sweep_handle);

        tracing::info!("msgchain node started");
        Ok(())
    }

    /// Stop every background task, waiting at most [`SHUTDOWN_TIMEOUT`].
    pub async fn stop(&self) -> Result<(), NodeError> {
        tracing::info!("msgchain node stopping");
        self.shutdown.shutdown();

        let handles: Vec<JoinHandle<()>> = self
            .task_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all)
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "shutdown timeout, some tasks may still be running"
            );
        }

        tracing::info!(
            chain_length = self.ledger.len(),
            pending = self.scheduler.pending_len().await,
            "msgchain node stopped"
        );
        Ok(())
    }

    fn push_task(&self, handle: JoinHandle<()>) {
        self.task_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    // ── Chain ───────────────────────────────────────────────────────────

    /// Feed a batch through the ingestion pipeline.
    pub async fn submit(&self, batch: Vec<Message>) -> Result<SubmitReport, PipelineError> {
        self.pipeline.submit(batch).await
    }

    pub async fn chain_info(&self) -> ChainInfo {
        ChainInfo {
            length: self.ledger.len(),
            blocks: self.ledger.summaries(),
            pending_messages: self.scheduler.pending_len().await,
        }
    }

    pub fn chain_length(&self) -> u64 {
        self.ledger.len()
    }

    pub fn block_by_index(&self, index: u64) -> Result<Block, NodeError> {
        Ok(self.ledger.get(index)?)
    }

    // ── Storage nodes ───────────────────────────────────────────────────

    /// Register a storage node or change its capacity. Returns the capacity
    /// recorded (negative input becomes 0).
    pub fn register_node(&self, id: impl Into<NodeId>, capacity: i64) -> u64 {
        let recorded = self.registry.upsert(id.into(), capacity);
        self.metrics.storage_nodes.set(self.registry.node_count() as i64);
        recorded
    }

    pub fn heartbeat(&self, id: impl Into<NodeId>) -> bool {
        self.registry.heartbeat(&id.into())
    }

    /// Remove a storage node, re-replicating what it held.
    pub fn remove_node(&self, id: impl Into<NodeId>) -> bool {
        let removed = self.registry.remove(&id.into());
        self.metrics.storage_nodes.set(self.registry.node_count() as i64);
        removed
    }

    pub fn update_node_capacity(&self, id: impl Into<NodeId>, new_capacity: i64) -> u64 {
        let recorded = self.registry.update_capacity(id.into(), new_capacity);
        self.metrics.storage_nodes.set(self.registry.node_count() as i64);
        recorded
    }

    pub fn storage_summary(&self) -> StorageSummary {
        self.registry.summary()
    }
}
