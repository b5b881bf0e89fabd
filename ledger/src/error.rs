use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("block index {index} out of range (chain length {length})")]
    IndexOutOfRange { index: u64, length: u64 },

    #[error("block {index}: stored hash does not match its contents")]
    HashMismatch { index: u64 },

    #[error("block {index}: previous hash does not match the preceding block")]
    BrokenLink { index: u64 },

    #[error("block at position {position} carries index {index}")]
    IndexGap { position: u64, index: u64 },
}
