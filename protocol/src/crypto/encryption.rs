//! # AES-256-GCM Sealing
//!
//! Authenticated encryption for keychain seeds. A wallet that pledges real
//! money keeps its seed sealed under a passphrase on disk; this module is
//! the seal.
//!
//! AES-256-GCM because it is an AEAD cipher (tampering with the sealed seed
//! fails authentication instead of decrypting to garbage) and because
//! hardware acceleration makes the cost irrelevant at this call frequency.
//!
//! ## Nonce management
//!
//! GCM is unforgiving about nonce reuse, so every `seal` draws a fresh
//! random 96-bit nonce from the OS CSPRNG. Seeds are sealed a handful of
//! times over a wallet's life; the 2^48 birthday bound is not a concern.
//!
//! ## Wire format
//!
//! `seal` returns `nonce || ciphertext` as a single buffer. The first 12
//! bytes are the nonce, the rest is ciphertext plus the 16-byte GCM tag.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// Errors during sealing and unsealing.
///
/// Deliberately vague: "wrong passphrase" and "corrupted ciphertext" are
/// indistinguishable on purpose.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("sealing failed")]
    SealFailed,

    #[error("unsealing failed: wrong passphrase or corrupted data")]
    UnsealFailed,

    #[error("sealed data too short: need at least {AES_NONCE_LENGTH} bytes")]
    SealedDataTooShort,
}

/// Derive a 32-byte AES key from a passphrase.
///
/// BLAKE3 `derive_key` with a fixed context. This is key *derivation*, not
/// key *stretching*: brute-force resistance comes from passphrase entropy.
pub fn passphrase_key(passphrase: &str) -> [u8; AES_KEY_LENGTH] {
    super::hash::domain_separated_hash("beacon.keychain.passphrase.v1", passphrase.as_bytes())
}

/// Encrypt `plaintext` under `key` with a random nonce.
///
/// Returns `nonce || ciphertext`.
pub fn seal(key: &[u8; AES_KEY_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::SealFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptionError::SealFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt data produced by [`seal`].
pub fn unseal(key: &[u8; AES_KEY_LENGTH], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH {
        return Err(EncryptionError::SealedDataTooShort);
    }
    let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::UnsealFailed)?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| EncryptionError::UnsealFailed)
}
