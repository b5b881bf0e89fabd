//! Authenticated encryption of message content.
//!
//! AES-GCM with the key size picked from the key length (16, 24 or 32 bytes).
//! Every call draws a fresh 96-bit nonce from the OS random source and
//! prepends it to the output:
//!
//! ```text
//! [ nonce (12) | ciphertext (n) | tag (16) ]
//! ```
//!
//! The functions hold no state and are safe to call from any number of
//! workers at once.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::CipherError;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// AES-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;
/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `key`, returning `nonce || ciphertext || tag`.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    check_key_len(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce_bytes)
        .map_err(|e| CipherError::RandomSource(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let sealed = match key.len() {
        16 => seal::<Aes128Gcm>(key, nonce, plaintext)?,
        24 => seal::<Aes192Gcm>(key, nonce, plaintext)?,
        _ => seal::<Aes256Gcm>(key, nonce, plaintext)?,
    };

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt the output of [`encrypt`].
pub fn decrypt(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
    check_key_len(key)?;
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CipherError::Truncated(sealed.len()));
    }

    let (nonce_bytes, body) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    match key.len() {
        16 => open::<Aes128Gcm>(key, nonce, body),
        24 => open::<Aes192Gcm>(key, nonce, body),
        _ => open::<Aes256Gcm>(key, nonce, body),
    }
}

fn check_key_len(key: &[u8]) -> Result<(), CipherError> {
    match key.len() {
        16 | 24 | 32 => Ok(()),
        other => Err(CipherError::InvalidKeyLength(other)),
    }
}

fn seal<C>(key: &[u8], nonce: &Nonce<U12>, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>
where
    C: KeyInit + Aead + AeadCore<NonceSize = U12>,
{
    let cipher = C::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
    cipher.encrypt(nonce, plaintext).map_err(|_| CipherError::Seal)
}

fn open<C>(key: &[u8], nonce: &Nonce<U12>, body: &[u8]) -> Result<Vec<u8>, CipherError>
where
    C: KeyInit + Aead + AeadCore<NonceSize = U12>,
{
    let cipher = C::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
    cipher.decrypt(nonce, body).map_err(|_| CipherError::Open)
}

/// A validated symmetric key, wiped from memory on drop.
#[derive(Clone)]
pub struct CipherKey(Zeroizing<Vec<u8>>);

impl CipherKey {
    /// Wrap raw key bytes. Fails unless the length is 16, 24 or 32.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, CipherError> {
        let bytes = Zeroizing::new(bytes.into());
        check_key_len(&bytes)?;
        Ok(Self(bytes))
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        encrypt(&self.0, plaintext)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
        decrypt(&self.0, sealed)
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherKey(<{} bytes redacted>)", self.0.len())
    }
}
