//! The chain owner.
//!
//! Appends are serialized by `append_lock`, so at most one is in flight. The
//! new block is hashed while holding only that lock; the structural write
//! lock on the chain is taken just for the final push, which is the single
//! mutation readers of [`Ledger::latest`] can observe.

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use msgchain_types::{Block, BlockSummary, Clock, MessageMetadata};

use crate::block::{build_block, compute_hash};
use crate::error::LedgerError;
use crate::genesis::create_genesis_block;

pub struct Ledger {
    chain: RwLock<Vec<Block>>,
    append_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    /// Create a chain holding only a genesis block stamped with `clock.now()`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let genesis = create_genesis_block(clock.now());
        tracing::info!(hash = %genesis.hash, "genesis block created");
        Self {
            chain: RwLock::new(vec![genesis]),
            append_lock: Mutex::new(()),
            clock,
        }
    }

    // A push is the only mutation, so a guard recovered from a poisoned lock
    // still sees a whole chain.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Block>> {
        self.chain.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hash-link a new block holding `messages` onto the tail and return it.
    pub fn append(&self, messages: Vec<MessageMetadata>, size: u64) -> Block {
        let _serial = self.append_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (index, previous_hash) = {
            let chain = self.read();
            let tail = &chain[chain.len() - 1];
            (tail.index + 1, tail.hash)
        };

        let block = build_block(index, self.clock.now(), messages, previous_hash, size);

        self.chain
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(block.clone());

        tracing::debug!(
            index = block.index,
            hash = %block.hash,
            messages = block.messages.len(),
            size = block.size,
            "block appended"
        );
        block
    }

    /// The most recently appended block (genesis until the first append).
    pub fn latest(&self) -> Block {
        let chain = self.read();
        chain[chain.len() - 1].clone()
    }

    pub fn get(&self, index: u64) -> Result<Block, LedgerError> {
        let chain = self.read();
        chain
            .get(index as usize)
            .cloned()
            .ok_or(LedgerError::IndexOutOfRange {
                index,
                length: chain.len() as u64,
            })
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> u64 {
        self.read().len() as u64
    }

    /// Always false: the genesis block is present from construction.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Snapshot of the whole chain.
    pub fn blocks(&self) -> Vec<Block> {
        self.read().clone()
    }

    pub fn summaries(&self) -> Vec<BlockSummary> {
        self.read().iter().map(Block::summary).collect()
    }

    /// Re-hash every block and check indices and links.
    pub fn verify(&self) -> Result<(), LedgerError> {
        let chain = self.read();
        for (position, block) in chain.iter().enumerate() {
            let position = position as u64;
            if block.index != position {
                return Err(LedgerError::IndexGap {
                    position,
                    index: block.index,
                });
            }
            if compute_hash(block) != block.hash {
                return Err(LedgerError::HashMismatch { index: block.index });
            }
            let expected_previous = match position {
                0 => msgchain_types::BlockHash::ZERO,
                _ => chain[position as usize - 1].hash,
            };
            if block.previous_hash != expected_previous {
                return Err(LedgerError::BrokenLink { index: block.index });
            }
        }
        Ok(())
    }
}
