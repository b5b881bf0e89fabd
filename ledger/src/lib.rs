//! Append-only message chain.
//!
//! A single ordered sequence of blocks, each linked to its predecessor by
//! hash. Blocks record message metadata only. The [`Ledger`] owns the chain
//! exclusively; nothing outside this crate mutates it.

pub mod block;
pub mod error;
pub mod genesis;
pub mod ledger;

pub use block::{build_block, compute_hash};
pub use error::LedgerError;
pub use genesis::{create_genesis_block, GENESIS_RECEIVER, GENESIS_SENDER};
pub use ledger::Ledger;
