//! Cryptographic primitives for msgchain.
//!
//! - **AES-GCM** for sealing message content before it enters the pending buffer
//! - **Blake2b-256** for block hashes, over a canonical field encoding

pub mod cipher;
pub mod error;
pub mod hash;

pub use cipher::{decrypt, encrypt, CipherKey, NONCE_LEN, TAG_LEN};
pub use error::CipherError;
pub use hash::CanonicalHasher;
