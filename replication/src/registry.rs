//! Thread-safe facade over the directory and placement table.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use msgchain_types::{BlockHash, Clock, NodeId};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::directory::{NodeDirectory, StorageSummary};
use crate::placer::{self, PlacementTable};

pub const DEFAULT_REPLICATION_FACTOR: usize = 3;

struct RegistryState {
    directory: NodeDirectory,
    placements: PlacementTable,
    rng: StdRng,
}

/// The storage registry shared by the node's request handlers, the mining
/// listener and the offline sweep.
///
/// Every operation runs under one lock, so a node's held set and the
/// placement table are always updated together.
pub struct ReplicationRegistry {
    state: Mutex<RegistryState>,
    clock: Arc<dyn Clock>,
    factor: usize,
}

impl ReplicationRegistry {
    /// Registry with a reproducible placement sequence.
    pub fn with_seed(clock: Arc<dyn Clock>, factor: usize, seed: u64) -> Self {
        Self::with_rng(clock, factor, StdRng::seed_from_u64(seed))
    }

    /// Registry seeded from the operating system.
    pub fn from_entropy(clock: Arc<dyn Clock>, factor: usize) -> Self {
        Self::with_rng(clock, factor, StdRng::from_entropy())
    }

    fn with_rng(clock: Arc<dyn Clock>, factor: usize, rng: StdRng) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                directory: NodeDirectory::new(),
                placements: PlacementTable::new(),
                rng,
            }),
            clock,
            factor,
        }
    }

    // Every mutation leaves the state consistent before returning, so a
    // guard recovered from a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    // -- Membership ------------------------------------------------------------

    /// Register a node, or set an existing node's capacity. Returns the
    /// capacity recorded after clamping.
    pub fn upsert(&self, id: NodeId, capacity: i64) -> u64 {
        let now = self.clock.now();
        let recorded = self.lock().directory.upsert(id.clone(), capacity, now);
        tracing::info!(node = %id, capacity = recorded, "storage node registered");
        recorded
    }

    /// Change a node's capacity, creating it if unknown.
    ///
    /// The aggregate is adjusted by the difference, exactly as for
    /// [`upsert`](Self::upsert).
    pub fn update_capacity(&self, id: NodeId, new_capacity: i64) -> u64 {
        let now = self.clock.now();
        let mut state = self.lock();
        let previous = state.directory.get(&id).map(|n| n.capacity);
        let recorded = state.directory.upsert(id.clone(), new_capacity, now);
        tracing::info!(node = %id, ?previous, capacity = recorded, "storage capacity updated");
        recorded
    }

    /// Record a sign of life. Returns false for an unknown node.
    pub fn heartbeat(&self, id: &NodeId) -> bool {
        let now = self.clock.now();
        let known = self.lock().directory.touch(id, now);
        if !known {
            tracing::debug!(node = %id, "heartbeat from unknown node ignored");
        }
        known
    }

    /// Remove a node after moving every block it holds elsewhere.
    pub fn remove(&self, id: &NodeId) -> bool {
        let mut state = self.lock();
        let removed = Self::remove_locked(&mut state, id, self.factor);
        if removed {
            tracing::info!(node = %id, "storage node removed");
        } else {
            tracing::debug!(node = %id, "remove of unknown node ignored");
        }
        removed
    }

    fn remove_locked(state: &mut RegistryState, id: &NodeId, factor: usize) -> bool {
        let mut held: Vec<BlockHash> = match state.directory.get(id) {
            Some(node) => node.held.iter().copied().collect(),
            None => return false,
        };
        held.sort();

        let RegistryState {
            directory,
            placements,
            rng,
        } = state;
        for hash in held {
            placer::redistribute(directory, placements, rng, hash, id, factor);
        }
        directory.take(id).is_some()
    }

    /// Remove every node silent for longer than `timeout`. Returns the
    /// removed ids in ascending order.
    pub fn sweep_offline(&self, timeout: Duration) -> Vec<NodeId> {
        let now = self.clock.now();
        let mut state = self.lock();
        let stale = state.directory.offline(now, timeout);
        for id in &stale {
            tracing::warn!(node = %id, timeout_secs = timeout.as_secs(), "node offline too long, removing");
            Self::remove_locked(&mut state, id, self.factor);
        }
        stale
    }

    // -- Placement ---------------------------------------------------------------

    /// Assign a block to `factor` nodes.
    pub fn place(&self, hash: BlockHash) -> Vec<NodeId> {
        let mut state = self.lock();
        let RegistryState {
            directory,
            placements,
            rng,
        } = &mut *state;
        placer::place(directory, placements, rng, hash, self.factor)
    }

    pub fn placement(&self, hash: &BlockHash) -> Option<Vec<NodeId>> {
        self.lock().placements.get(hash).map(<[NodeId]>::to_vec)
    }

    /// Blocks a node currently holds, in ascending hash order. Empty for an
    /// unknown node.
    pub fn blocks_held_by(&self, id: &NodeId) -> Vec<BlockHash> {
        let state = self.lock();
        let mut held: Vec<BlockHash> = state
            .directory
            .get(id)
            .map(|n| n.held.iter().copied().collect())
            .unwrap_or_default();
        held.sort();
        held
    }

    // -- Aggregates --------------------------------------------------------------

    pub fn total_capacity(&self) -> u64 {
        self.lock().directory.total_capacity()
    }

    pub fn node_count(&self) -> usize {
        self.lock().directory.len()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.lock().directory.contains(id)
    }

    pub fn summary(&self) -> StorageSummary {
        self.lock().directory.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgchain_nullables::NullClock;

    // ---- Helpers ----

    fn registry(seed: u64) -> (Arc<NullClock>, ReplicationRegistry) {
        let clock = Arc::new(NullClock::new(1_000));
        let registry = ReplicationRegistry::with_seed(clock.clone(), 3, seed);
        (clock, registry)
    }

    fn id(s: &str) -> NodeId {
        NodeId::new(s)
    }

    fn block(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    // ---- Tests ----

    #[test]
    fn removing_a_holder_restores_the_factor() {
        let (_clock, registry) = registry(17);
        for name in ["n1", "n2", "n3", "n4", "n5"] {
            registry.upsert(id(name), 100);
        }
        // Keep placing until n2 holds the block so its removal matters.
        let mut holders = registry.place(block(1));
        let mut byte = 1;
        while !holders.contains(&id("n2")) {
            byte += 1;
            holders = registry.place(block(byte));
        }

        assert!(registry.remove(&id("n2")));
        let after = registry.placement(&block(byte)).unwrap();
        assert_eq!(after.len(), 3);
        assert!(!after.contains(&id("n2")));
        assert!(!registry.contains(&id("n2")));
        assert_eq!(registry.total_capacity(), 400);
    }

    #[test]
    fn removing_the_last_nodes_terminates() {
        let (_clock, registry) = registry(2);
        registry.upsert(id("a"), 10);
        registry.upsert(id("b"), 10);
        registry.place(block(1));

        assert!(registry.remove(&id("a")));
        assert_eq!(registry.placement(&block(1)), Some(vec![id("b")]));
        assert!(registry.remove(&id("b")));
        assert_eq!(registry.placement(&block(1)), Some(vec![]));
        assert_eq!(registry.node_count(), 0);
    }

    #[test]
    fn remove_unknown_is_false() {
        let (_clock, registry) = registry(0);
        assert!(!registry.remove(&id("ghost")));
    }

    #[test]
    fn negative_capacity_leaves_aggregate_unchanged() {
        let (_clock, registry) = registry(0);
        registry.upsert(id("a"), 100);
        assert_eq!(registry.upsert(id("b"), -50), 0);
        assert_eq!(registry.total_capacity(), 100);
        assert_eq!(registry.node_count(), 2);
    }

    #[test]
    fn update_capacity_adjusts_aggregate() {
        let (_clock, registry) = registry(0);
        registry.upsert(id("a"), 100);
        registry.upsert(id("b"), 40);
        registry.update_capacity(id("a"), 250);
        assert_eq!(registry.total_capacity(), 290);

        registry.update_capacity(id("c"), 10);
        assert_eq!(registry.total_capacity(), 300);
        assert_eq!(registry.node_count(), 3);
    }

    #[test]
    fn heartbeat_unknown_node_is_noop() {
        let (_clock, registry) = registry(0);
        assert!(!registry.heartbeat(&id("ghost")));
        assert_eq!(registry.node_count(), 0);
    }

    #[test]
    fn sweep_removes_only_silent_nodes() {
        let (clock, registry) = registry(4);
        registry.upsert(id("quiet"), 10);
        registry.upsert(id("chatty"), 20);
        registry.place(block(1));

        clock.advance(Duration::from_secs(600));
        assert!(registry.heartbeat(&id("chatty")));
        clock.advance(Duration::from_secs(400));

        let removed = registry.sweep_offline(Duration::from_secs(900));
        assert_eq!(removed, vec![id("quiet")]);
        assert_eq!(registry.node_count(), 1);
        assert_eq!(registry.total_capacity(), 20);
        assert_eq!(registry.placement(&block(1)), Some(vec![id("chatty")]));
    }

    #[test]
    fn blocks_held_by_tracks_placements() {
        let (_clock, registry) = registry(9);
        registry.upsert(id("a"), 1);
        registry.upsert(id("b"), 1);
        registry.place(block(2));
        registry.place(block(1));

        assert_eq!(registry.blocks_held_by(&id("a")), vec![block(1), block(2)]);
        assert!(registry.blocks_held_by(&id("ghost")).is_empty());
    }

    #[test]
    fn summary_matches_aggregates() {
        let (_clock, registry) = registry(0);
        registry.upsert(id("a"), 1024 * 1024 * 1024);
        let summary = registry.summary();
        assert_eq!(summary.node_count, 1);
        assert_eq!(summary.total_capacity_bytes, 1024 * 1024 * 1024);
        assert!((summary.total_capacity_gib - 1.0).abs() < f64::EPSILON);
    }
}
