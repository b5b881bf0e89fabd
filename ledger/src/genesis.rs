//! Genesis block creation.
//!
//! The genesis block has index 0, `previous_hash: BlockHash::ZERO` and a
//! single announcement entry from `Admin` to `All`. It folds no real
//! message, so its size is 0.

use msgchain_types::{Block, BlockHash, MessageMetadata, Timestamp};

use crate::block::build_block;

pub const GENESIS_SENDER: &str = "Admin";
pub const GENESIS_RECEIVER: &str = "All";

/// Create the genesis block stamped at `now`.
pub fn create_genesis_block(now: Timestamp) -> Block {
    let announcement = MessageMetadata::new(GENESIS_SENDER, GENESIS_RECEIVER, now);
    build_block(0, now, vec![announcement], BlockHash::ZERO, 0)
}
