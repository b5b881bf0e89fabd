//! Replica placement.
//!
//! A mined block is assigned to `factor` distinct nodes chosen uniformly at
//! random. When a holder leaves, its blocks are topped back up from the
//! remaining nodes. The rng is passed in so tests can seed it.

use std::collections::HashMap;

use msgchain_types::{BlockHash, NodeId};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::directory::NodeDirectory;

/// Which nodes hold which block.
#[derive(Debug, Default)]
pub struct PlacementTable {
    placements: HashMap<BlockHash, Vec<NodeId>>,
}

impl PlacementTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &BlockHash) -> Option<&[NodeId]> {
        self.placements.get(hash).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    fn insert(&mut self, hash: BlockHash, holders: Vec<NodeId>) -> Option<Vec<NodeId>> {
        self.placements.insert(hash, holders)
    }
}

/// Choose holders for `hash` and record them.
///
/// Samples `factor` distinct nodes without replacement, or takes every node
/// when fewer are registered. Placing an already placed hash replaces its
/// previous placement and clears it from the old holders' held sets.
pub fn place<R: Rng + ?Sized>(
    directory: &mut NodeDirectory,
    table: &mut PlacementTable,
    rng: &mut R,
    hash: BlockHash,
    factor: usize,
) -> Vec<NodeId> {
    let ids = directory.sorted_ids();
    let chosen: Vec<NodeId> = if ids.len() <= factor {
        if ids.len() < factor {
            tracing::debug!(
                block = %hash,
                available = ids.len(),
                factor,
                "fewer nodes than replication factor, placing on all"
            );
        }
        ids
    } else {
        ids.choose_multiple(rng, factor).cloned().collect()
    };

    for node in &chosen {
        directory.mark_held(node, hash);
    }
    if let Some(previous) = table.insert(hash, chosen.clone()) {
        for node in previous.iter().filter(|n| !chosen.contains(n)) {
            directory.unmark_held(node, &hash);
        }
    }

    tracing::debug!(block = %hash, holders = ?chosen, "block placed");
    chosen
}

/// Restore `hash` to `factor` holders after `excluded` stops holding it.
///
/// Survivors keep the block. Replacements are drawn from one shuffled pool
/// of nodes that are neither excluded nor already holders, so the loop ends
/// once the factor is met or the pool runs dry. The resulting placement has
/// `min(factor, available)` holders.
pub fn redistribute<R: Rng + ?Sized>(
    directory: &mut NodeDirectory,
    table: &mut PlacementTable,
    rng: &mut R,
    hash: BlockHash,
    excluded: &NodeId,
    factor: usize,
) -> Vec<NodeId> {
    let current = table.get(&hash).map(<[NodeId]>::to_vec).unwrap_or_default();

    let mut holders: Vec<NodeId> = current
        .into_iter()
        .filter(|n| n != excluded && directory.contains(n))
        .collect();

    let mut pool: Vec<NodeId> = directory
        .sorted_ids()
        .into_iter()
        .filter(|n| n != excluded && !holders.contains(n))
        .collect();
    pool.shuffle(rng);

    for candidate in pool {
        if holders.len() >= factor {
            break;
        }
        directory.mark_held(&candidate, hash);
        holders.push(candidate);
    }

    directory.unmark_held(excluded, &hash);
    table.insert(hash, holders.clone());

    tracing::debug!(block = %hash, from = %excluded, holders = ?holders, "block redistributed");
    holders
}
