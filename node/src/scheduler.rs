//! Mining scheduler: owns the pending buffer and decides when it becomes a
//! block.
//!
//! Three triggers mine the buffer:
//! - the pending writer finds it at `max_batch` or more after an append;
//! - the mining tick finds the oldest `min_batch` messages older than
//!   `age_timeout`;
//! - the ingestion pipeline forces a pass when its encryption queue is full.
//!
//! A pass snapshots the oldest messages, orders them by priority, hands
//! their metadata to the ledger and only then drops exactly those messages
//! from the front of the buffer. Passes are serialized by `mining_lock`, and
//! only the pending writer appends (at the back), so the front of the buffer
//! is stable for the length of a pass.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::Instrument;

use msgchain_ledger::Ledger;
use msgchain_types::{Block, Clock, EncryptedMessage, MessageMetadata, PendingMessage};

use crate::chain_event::{ChainEvent, EventBus};
use crate::metrics::NodeMetrics;
use crate::tracing_spans::mine_span;

/// Batching and aging parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub min_batch: usize,
    pub max_batch: usize,
    pub age_timeout: Duration,
    pub age_quantum: Duration,
    pub max_block_bytes: u64,
}

pub struct MiningScheduler {
    pending: Mutex<VecDeque<PendingMessage>>,
    mining_lock: Mutex<()>,
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    metrics: Arc<NodeMetrics>,
    config: SchedulerConfig,
}

impl MiningScheduler {
    pub fn new(
        config: SchedulerConfig,
        ledger: Arc<Ledger>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        metrics.chain_length.set(ledger.len() as i64);
        Self {
            pending: Mutex::new(VecDeque::new()),
            mining_lock: Mutex::new(()),
            ledger,
            clock,
            events,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Append an encrypted message and mine at once if the buffer reached
    /// `max_batch`.
    pub async fn enqueue(&self, message: EncryptedMessage) -> Option<Block> {
        let len = {
            let mut pending = self.pending.lock().await;
            pending.push_back(PendingMessage::new(message));
            pending.len()
        };
        self.metrics.pending_messages.set(len as i64);

        if len >= self.config.max_batch {
            tracing::debug!(pending = len, "pending buffer full, mining");
            self.mine().await
        } else {
            None
        }
    }

    /// Raise every pending message's priority to the number of whole age
    /// quanta it has waited. Priorities never decrease.
    pub async fn age_pending(&self) {
        let now = self.clock.now();
        let quantum = self.config.age_quantum.as_millis().max(1);
        let mut pending = self.pending.lock().await;
        for entry in pending.iter_mut() {
            let waited = entry.message.submitted_at.elapsed_since(now).as_millis();
            let aged = (waited / quantum) as u64;
            entry.priority = entry.priority.max(aged);
        }
    }

    /// True when at least `min_batch` messages are pending and the oldest
    /// `min_batch` of them have all waited longer than `age_timeout`.
    pub async fn mining_due(&self) -> bool {
        let now = self.clock.now();
        let pending = self.pending.lock().await;
        pending.len() >= self.config.min_batch
            && pending
                .iter()
                .take(self.config.min_batch)
                .all(|p| p.message.submitted_at.elapsed_since(now) > self.config.age_timeout)
    }

    /// The mining tick: mine if [`mining_due`](Self::mining_due).
    pub async fn mine_if_due(&self) -> Option<Block> {
        if self.mining_due().await {
            self.mine().await
        } else {
            None
        }
    }

    /// Turn the oldest pending messages into a block.
    ///
    /// No-op (returns `None`) with fewer than `min_batch` pending. Otherwise
    /// takes up to `max_batch` messages, oldest first, stopping before their
    /// summed size would exceed `max_block_bytes` (the first message is
    /// always taken). The selection is stable-sorted by priority, highest
    /// first, so equal priorities keep arrival order.
    pub async fn mine(&self) -> Option<Block> {
        let _serial = self.mining_lock.lock().await;
        self.mine_locked().instrument(mine_span()).await
    }

    async fn mine_locked(&self) -> Option<Block> {
        let started = Instant::now();

        let mut batch = {
            let pending = self.pending.lock().await;
            if pending.len() < self.config.min_batch {
                return None;
            }
            self.select_batch(&pending)
        };
        let count = batch.len();
        let size: u64 = batch.iter().map(|p| p.message.estimated_size()).sum();

        batch.sort_by(|a, b| b.priority.cmp(&a.priority));
        let metadata: Vec<MessageMetadata> = batch.iter().map(|p| p.message.metadata()).collect();

        let block = self.ledger.append(metadata, size);

        let remaining = {
            let mut pending = self.pending.lock().await;
            pending.drain(..count);
            pending.len()
        };

        self.metrics.blocks_mined.inc();
        self.metrics.chain_length.set(self.ledger.len() as i64);
        self.metrics.pending_messages.set(remaining as i64);
        self.metrics
            .mining_duration_ms
            .observe(started.elapsed().as_secs_f64() * 1_000.0);

        tracing::info!(
            index = block.index,
            hash = %block.hash,
            messages = count,
            size,
            remaining,
            "block mined"
        );

        self.events.emit(&ChainEvent::BlockMined {
            index: block.index,
            hash: block.hash,
            message_count: count,
            size,
        });

        Some(block)
    }

    fn select_batch(&self, pending: &VecDeque<PendingMessage>) -> Vec<PendingMessage> {
        let mut batch = Vec::with_capacity(self.config.max_batch.min(pending.len()));
        let mut bytes = 0u64;
        for entry in pending.iter().take(self.config.max_batch) {
            let size = entry.message.estimated_size();
            if !batch.is_empty() && bytes.saturating_add(size) > self.config.max_block_bytes {
                break;
            }
            bytes = bytes.saturating_add(size);
            batch.push(entry.clone());
        }
        batch
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Copy of the pending buffer in arrival order.
    pub async fn pending_snapshot(&self) -> Vec<PendingMessage> {
        self.pending.lock().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgchain_nullables::NullClock;
    use msgchain_types::Timestamp;

    // ---- Helpers ----

    fn config(min_batch: usize, max_batch: usize) -> SchedulerConfig {
        SchedulerConfig {
            min_batch,
            max_batch,
            age_timeout: Duration::from_millis(1_000),
            age_quantum: Duration::from_millis(100),
            max_block_bytes: 5 * 1024,
        }
    }

    fn scheduler(cfg: SchedulerConfig) -> (Arc<NullClock>, Arc<Ledger>, MiningScheduler) {
        let clock = Arc::new(NullClock::new(10_000));
        let ledger = Arc::new(Ledger::new(clock.clone()));
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        let scheduler = MiningScheduler::new(
            cfg,
            Arc::clone(&ledger),
            clock.clone(),
            Arc::new(EventBus::new()),
            metrics,
        );
        (clock, ledger, scheduler)
    }

    fn encrypted(sender: &str, at: u64, payload: usize) -> EncryptedMessage {
        EncryptedMessage {
            sender: sender.to_string(),
            receiver: "bob".to_string(),
            ciphertext: vec![0xAB; payload],
            submitted_at: Timestamp::from_millis(at),
        }
    }

    // ---- Tests ----

    #[tokio::test]
    async fn mine_below_min_batch_is_noop() {
        let (_clock, ledger, scheduler) = scheduler(config(3, 10));
        scheduler.enqueue(encrypted("a", 10_000, 4)).await;
        scheduler.enqueue(encrypted("b", 10_000, 4)).await;

        assert!(scheduler.mine().await.is_none());
        assert_eq!(ledger.len(), 1);
        assert_eq!(scheduler.pending_len().await, 2);
    }

    #[tokio::test]
    async fn reaching_max_batch_mines_immediately() {
        let (_clock, ledger, scheduler) = scheduler(config(2, 3));
        assert!(scheduler.enqueue(encrypted("a", 10_000, 4)).await.is_none());
        assert!(scheduler.enqueue(encrypted("b", 10_000, 4)).await.is_none());
        let block = scheduler.enqueue(encrypted("c", 10_000, 4)).await.unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(block.messages.len(), 3);
        assert_eq!(ledger.len(), 2);
        assert_eq!(scheduler.pending_len().await, 0);
    }

    #[tokio::test]
    async fn equal_priorities_keep_arrival_order() {
        let (_clock, _ledger, scheduler) = scheduler(config(1, 10));
        {
            let mut pending = scheduler.pending.lock().await;
            for (sender, priority) in [("A", 2), ("B", 2), ("C", 5)] {
                pending.push_back(PendingMessage {
                    message: encrypted(sender, 10_000, 4),
                    priority,
                });
            }
        }

        let block = scheduler.mine().await.unwrap();
        let order: Vec<&str> = block.messages.iter().map(|m| m.sender.as_str()).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn aging_never_lowers_priority() {
        let (clock, _ledger, scheduler) = scheduler(config(5, 10));
        scheduler.enqueue(encrypted("a", 10_000, 4)).await;

        clock.advance_millis(350);
        scheduler.age_pending().await;
        assert_eq!(scheduler.pending_snapshot().await[0].priority, 3);

        // A clock stepping backwards must not undo earlier aging.
        clock.set(10_050);
        scheduler.age_pending().await;
        assert_eq!(scheduler.pending_snapshot().await[0].priority, 3);

        clock.set(10_999);
        scheduler.age_pending().await;
        assert_eq!(scheduler.pending_snapshot().await[0].priority, 9);
    }

    #[tokio::test]
    async fn mining_due_needs_min_batch_older_than_timeout() {
        let (clock, _ledger, scheduler) = scheduler(config(2, 10));
        scheduler.enqueue(encrypted("a", 10_000, 4)).await;
        clock.advance_millis(2_000);
        assert!(!scheduler.mining_due().await, "only one message pending");

        scheduler.enqueue(encrypted("b", 12_000, 4)).await;
        assert!(!scheduler.mining_due().await, "second message is fresh");

        clock.advance_millis(1_000);
        assert!(!scheduler.mining_due().await, "exactly the timeout is not longer");

        clock.advance_millis(1);
        assert!(scheduler.mining_due().await);
        assert!(scheduler.mine_if_due().await.is_some());
        assert!(!scheduler.mining_due().await);
    }

    #[tokio::test]
    async fn block_size_cap_splits_batches() {
        let mut cfg = config(1, 10);
        cfg.max_block_bytes = 100;
        let (_clock, ledger, scheduler) = scheduler(cfg);
        // Each estimate is 1 + 3 + 8 + 40 = 52 bytes.
        for sender in ["a", "b", "c"] {
            scheduler.enqueue(encrypted(sender, 10_000, 40)).await;
        }

        let first = scheduler.mine().await.unwrap();
        assert_eq!(first.messages.len(), 1);
        assert_eq!(first.size, 52);
        assert_eq!(scheduler.pending_len().await, 2);

        scheduler.mine().await.unwrap();
        scheduler.mine().await.unwrap();
        assert_eq!(ledger.len(), 4);
        assert_eq!(scheduler.pending_len().await, 0);
    }

    #[tokio::test]
    async fn oversized_single_message_is_still_mined() {
        let mut cfg = config(1, 10);
        cfg.max_block_bytes = 10;
        let (_clock, _ledger, scheduler) = scheduler(cfg);
        scheduler.enqueue(encrypted("a", 10_000, 500)).await;

        let block = scheduler.mine().await.unwrap();
        assert_eq!(block.messages.len(), 1);
        assert_eq!(block.size, 512);
    }

    #[tokio::test]
    async fn mining_takes_at_most_max_batch_oldest() {
        let (_clock, _ledger, scheduler) = scheduler(config(1, 3));
        {
            let mut pending = scheduler.pending.lock().await;
            for i in 0..5 {
                pending.push_back(PendingMessage::new(encrypted(&format!("s{i}"), 10_000, 4)));
            }
        }

        let block = scheduler.mine().await.unwrap();
        let order: Vec<&str> = block.messages.iter().map(|m| m.sender.as_str()).collect();
        assert_eq!(order, vec!["s0", "s1", "s2"]);
        let left: Vec<String> = scheduler
            .pending_snapshot()
            .await
            .into_iter()
            .map(|p| p.message.sender)
            .collect();
        assert_eq!(left, vec!["s3", "s4"]);
    }

    #[tokio::test]
    async fn block_mined_event_carries_block_hash() {
        let clock = Arc::new(NullClock::new(0));
        let ledger = Arc::new(Ledger::new(clock.clone()));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = Arc::clone(&seen);
        bus.subscribe(Box::new(move |event| {
            let ChainEvent::BlockMined { hash, .. } = event;
            sink.lock().unwrap().push(*hash);
        }));
        let scheduler = MiningScheduler::new(
            config(1, 10),
            ledger,
            clock,
            Arc::new(bus),
            Arc::new(NodeMetrics::new().unwrap()),
        );

        scheduler.enqueue(encrypted("a", 0, 4)).await;
        let block = scheduler.mine().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![block.hash]);
    }
}
