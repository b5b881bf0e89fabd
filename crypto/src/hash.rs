//! Blake2b hashing for blocks.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use msgchain_types::BlockHash;

type Blake2b256 = Blake2b<U32>;

/// Incremental Blake2b-256 over an unambiguous field encoding.
///
/// Integers are fixed-width big-endian and variable-length fields carry a
/// `u64` length prefix, so no two distinct field sequences produce the same
/// byte stream.
pub struct CanonicalHasher {
    inner: Blake2b256,
}

impl CanonicalHasher {
    pub fn new() -> Self {
        Self {
            inner: Blake2b256::new(),
        }
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.inner.update(value.to_be_bytes());
        self
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.u64(value.len() as u64);
        self.inner.update(value);
        self
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes())
    }

    pub fn hash(&mut self, value: &BlockHash) -> &mut Self {
        self.inner.update(value.as_bytes());
        self
    }

    pub fn finish(self) -> BlockHash {
        let result = self.inner.finalize();
        let mut output = [0u8; 32];
        output.copy_from_slice(&result);
        BlockHash::new(output)
    }
}

impl Default for CanonicalHasher {
    fn default() -> Self {
        Self::new()
    }
}
