//! Fundamental types for msgchain.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! messages in their raw, encrypted and pending forms, blocks and block hashes,
//! storage node identifiers, and timestamps.

pub mod block;
pub mod message;
pub mod node_id;
pub mod time;

pub use block::{Block, BlockHash, BlockSummary};
pub use message::{EncryptedMessage, Message, MessageMetadata, PendingMessage};
pub use node_id::NodeId;
pub use time::{Clock, SystemClock, Timestamp};
