//! Blocks of the message chain and their hashes.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::message::MessageMetadata;
use crate::time::Timestamp;

/// A 32-byte block hash. Rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHash([u8; 32]);

impl Default for BlockHash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl BlockHash {
    /// All zeroes. Used as the genesis block's `previous_hash`.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(array))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({}\u{2026})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).ok_or_else(|| de::Error::custom("expected 64 hex characters"))
    }
}

/// A block in the chain.
///
/// Blocks carry only message metadata; message content never reaches a block,
/// neither as plaintext nor as ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, contiguous from 0.
    pub index: u64,
    /// When the block was cut.
    pub timestamp: Timestamp,
    /// Metadata of the folded messages, in mining order.
    pub messages: Vec<MessageMetadata>,
    /// Hash of the preceding block (`BlockHash::ZERO` for genesis).
    pub previous_hash: BlockHash,
    /// Hash over all the fields above plus `size`.
    pub hash: BlockHash,
    /// Estimated byte size of the folded messages.
    pub size: u64,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            index: self.index,
            timestamp: self.timestamp,
            message_count: self.messages.len(),
            hash: self.hash,
        }
    }
}

/// Compact per-block view used by chain listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub index: u64,
    pub timestamp: Timestamp,
    pub message_count: usize,
    pub hash: BlockHash,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let hash = BlockHash::new([0xab; 32]);
        assert_eq!(BlockHash::from_hex(&hash.to_hex()), Some(hash));
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(BlockHash::from_hex("abcd").is_none());
        assert!(BlockHash::from_hex("zz").is_none());
    }

    #[test]
    fn serializes_as_hex_string() {
        let hash = BlockHash::new([1u8; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: BlockHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn summary_counts_messages() {
        let block = Block {
            index: 3,
            timestamp: Timestamp::from_millis(10),
            messages: vec![
                MessageMetadata::new("a", "b", Timestamp::EPOCH),
                MessageMetadata::new("c", "d", Timestamp::EPOCH),
            ],
            previous_hash: BlockHash::ZERO,
            hash: BlockHash::new([9u8; 32]),
            size: 40,
        };
        let summary = block.summary();
        assert_eq!(summary.index, 3);
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.hash, block.hash);
        assert!(!block.is_genesis());
    }
}
