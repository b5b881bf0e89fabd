use thiserror::Error;

/// Failures of the cipher stage. Every variant is surfaced to the caller;
/// a failed seal never degrades into empty output.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("invalid key length: {0} bytes (expected 16, 24 or 32)")]
    InvalidKeyLength(usize),

    #[error("random source unavailable: {0}")]
    RandomSource(String),

    #[error("encryption failed")]
    Seal,

    #[error("ciphertext too short: {0} bytes")]
    Truncated(usize),

    #[error("decryption failed: authentication check failed")]
    Open,
}
