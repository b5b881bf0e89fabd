//! Block construction and canonical hashing.

use msgchain_crypto::CanonicalHasher;
use msgchain_types::{Block, BlockHash, MessageMetadata, Timestamp};

/// Compute the hash of a block from its contents.
///
/// Covers `index`, `timestamp`, every message's metadata in order,
/// `previous_hash` and `size`. The stored `hash` field is ignored, so
/// re-hashing an unchanged block always reproduces its stored hash.
pub fn compute_hash(block: &Block) -> BlockHash {
    hash_fields(
        block.index,
        block.timestamp,
        &block.messages,
        &block.previous_hash,
        block.size,
    )
}

/// Assemble a block and fill in its hash.
pub fn build_block(
    index: u64,
    timestamp: Timestamp,
    messages: Vec<MessageMetadata>,
    previous_hash: BlockHash,
    size: u64,
) -> Block {
    let hash = hash_fields(index, timestamp, &messages, &previous_hash, size);
    Block {
        index,
        timestamp,
        messages,
        previous_hash,
        hash,
        size,
    }
}

fn hash_fields(
    index: u64,
    timestamp: Timestamp,
    messages: &[MessageMetadata],
    previous_hash: &BlockHash,
    size: u64,
) -> BlockHash {
    let mut h = CanonicalHasher::new();
    h.u64(index).u64(timestamp.as_millis()).u64(messages.len() as u64);
    for meta in messages {
        h.str(&meta.sender)
            .str(&meta.receiver)
            .u64(meta.submitted_at.as_millis());
    }
    h.hash(previous_hash).u64(size);
    h.finish()
}
