//! Storage node directory.
//!
//! Tracks every node that offered storage: its capacity, the blocks it holds
//! and when it was last heard from. The aggregate capacity is maintained
//! incrementally and always equals the sum over live nodes.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use msgchain_types::{BlockHash, NodeId, Timestamp};
use serde::Serialize;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A storage-contributing participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageNode {
    pub id: NodeId,
    /// Offered capacity in bytes. Never negative.
    pub capacity: u64,
    /// Hashes of blocks this node is responsible for replicating.
    pub held: HashSet<BlockHash>,
    pub last_seen: Timestamp,
}

impl StorageNode {
    fn new(id: NodeId, capacity: u64, now: Timestamp) -> Self {
        Self {
            id,
            capacity,
            held: HashSet::new(),
            last_seen: now,
        }
    }

    pub fn is_offline(&self, now: Timestamp, timeout: Duration) -> bool {
        self.last_seen.elapsed_since(now) > timeout
    }
}

/// Aggregate view over the directory.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StorageSummary {
    pub node_count: usize,
    pub total_capacity_bytes: u64,
    pub total_capacity_gib: f64,
}

#[derive(Debug, Default)]
pub struct NodeDirectory {
    nodes: HashMap<NodeId, StorageNode>,
    total_capacity: u64,
}

impl NodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Membership ------------------------------------------------------------

    /// Register a node or change an existing node's capacity.
    ///
    /// A negative capacity is clamped to 0. A new node starts with an empty
    /// held set and `last_seen = now`; an existing node keeps both. Returns
    /// the capacity actually recorded.
    pub fn upsert(&mut self, id: NodeId, capacity: i64, now: Timestamp) -> u64 {
        let capacity = if capacity < 0 {
            tracing::warn!(node = %id, capacity, "negative capacity, recording 0");
            0
        } else {
            capacity as u64
        };

        match self.nodes.get_mut(&id) {
            Some(node) => {
                self.total_capacity = self.total_capacity.saturating_sub(node.capacity);
                node.capacity = capacity;
            }
            None => {
                self.nodes
                    .insert(id.clone(), StorageNode::new(id, capacity, now));
            }
        }
        self.total_capacity = self.total_capacity.saturating_add(capacity);
        capacity
    }

    /// Refresh a node's `last_seen`. Unknown ids are ignored.
    pub fn touch(&mut self, id: &NodeId, now: Timestamp) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Delete a node and subtract its capacity from the aggregate.
    ///
    /// Does not touch placements; callers redistribute first.
    pub fn take(&mut self, id: &NodeId) -> Option<StorageNode> {
        let node = self.nodes.remove(id)?;
        self.total_capacity = self.total_capacity.saturating_sub(node.capacity);
        Some(node)
    }

    /// Ids of nodes not heard from for longer than `timeout`.
    pub fn offline(&self, now: Timestamp, timeout: Duration) -> Vec<NodeId> {
        let mut stale: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.is_offline(now, timeout))
            .map(|n| n.id.clone())
            .collect();
        stale.sort();
        stale
    }

    // -- Held sets ---------------------------------------------------------------

    pub fn mark_held(&mut self, id: &NodeId, hash: BlockHash) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.held.insert(hash);
        }
    }

    pub fn unmark_held(&mut self, id: &NodeId, hash: &BlockHash) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.held.remove(hash);
        }
    }

    // -- Queries -----------------------------------------------------------------

    pub fn get(&self, id: &NodeId) -> Option<&StorageNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// All node ids in ascending order, so sampling over them is
    /// reproducible under a seeded rng.
    pub fn sorted_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn total_capacity(&self) -> u64 {
        self.total_capacity
    }

    pub fn summary(&self) -> StorageSummary {
        StorageSummary {
            node_count: self.nodes.len(),
            total_capacity_bytes: self.total_capacity,
            total_capacity_gib: self.total_capacity as f64 / BYTES_PER_GIB,
        }
    }
}
