//! # Key Management
//!
//! Ed25519 keypair wrappers for the beacon protocol.
//!
//! Backers sign pledges with these keys, project creators prove ownership
//! with them, and every script on the chain ultimately resolves to one.
//! Wrapping `ed25519-dalek` gives us one place to audit signing, a stable
//! error surface, and type safety: a public key cannot be confused with a
//! key hash or a raw message.
//!
//! Private key material is never logged and never serialized implicitly.
//! `BeaconKeypair` deliberately does not implement `Serialize`; exporting a
//! secret requires the explicit `secret_bytes()` call, and durable storage
//! goes through the sealed-keychain path in `wallet::keychain`.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

/// Errors that can occur during key operations.
///
/// Intentionally vague about *why* something failed; error messages are not
/// a channel for leaking key material details.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// An Ed25519 keypair controlling coins or a project identity.
#[derive(Clone)]
pub struct BeaconKeypair {
    signing_key: SigningKey,
}

/// The public half of a keypair, safe to share with the world.
///
/// Appears verbatim in pay-to-pubkey scripts, in input scripts next to the
/// signature, and as the auth key inside project descriptors. Serializes
/// as a hex string so descriptors stay human-readable.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeaconPublicKey {
    bytes: [u8; PUBLIC_KEY_LENGTH],
}

impl Serialize for BeaconPublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BeaconPublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// A detached Ed25519 signature over a message digest.
///
/// Always exactly 64 bytes. Sighash wire encoding appends the one-byte
/// mode on top of this; see `chain::sighash`.
#[derive(Clone, PartialEq, Eq)]
pub struct BeaconSignature {
    bytes: Vec<u8>,
}

impl BeaconKeypair {
    /// Generate a fresh keypair from the OS cryptographic RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    ///
    /// The keychain derives every wallet key this way. A weak seed yields a
    /// weak key; the caller is responsible for entropy.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Returns the public key associated with this keypair.
    pub fn public_key(&self) -> BeaconPublicKey {
        BeaconPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message and return the detached signature.
    ///
    /// Ed25519 is deterministic: the same key and message always produce
    /// the same signature, so there is no signing-time RNG to get wrong.
    pub fn sign(&self, message: &[u8]) -> BeaconSignature {
        BeaconSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    /// Verify a signature against this keypair's public key.
    pub fn verify(&self, message: &[u8], signature: &BeaconSignature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Export the raw 32-byte secret. Handle with extreme care.
    pub fn secret_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for BeaconKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret half.
        f.debug_struct("BeaconKeypair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl BeaconPublicKey {
    /// Wrap raw public key bytes without validating the curve point.
    ///
    /// Validation happens at verification time; an off-curve key simply
    /// fails to verify anything.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Parse a public key from an arbitrary byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(KeyError::InvalidPublicKey);
        }
        let mut arr = [0u8; PUBLIC_KEY_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// The raw 32 key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.bytes
    }

    /// Verify a detached signature over `message`.
    ///
    /// Returns `false` for malformed signatures, off-curve keys, and plain
    /// wrong signatures alike. No error oracle for attackers.
    pub fn verify(&self, message: &[u8], signature: &BeaconSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        if signature.bytes.len() != SIGNATURE_LENGTH {
            return false;
        }
        let mut sig_arr = [0u8; SIGNATURE_LENGTH];
        sig_arr.copy_from_slice(&signature.bytes);
        let sig = DalekSignature::from_bytes(&sig_arr);
        verifying_key.verify(message, &sig).is_ok()
    }

    /// Hex rendering of the key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Debug for BeaconPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BeaconPublicKey({})", self.to_hex())
    }
}

impl fmt::Display for BeaconPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl BeaconSignature {
    /// Wrap a 64-byte signature.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// The raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for BeaconSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BeaconSignature({})", hex::encode(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let kp = BeaconKeypair::generate();
        let msg = b"pledge 10 coins to the lego castle";
        let sig = kp.sign(msg);
        assert!(kp.verify(msg, &sig));
    }

    #[test]
    fn wrong_message_fails() {
        let kp = BeaconKeypair::generate();
        let sig = kp.sign(b"correct message");
        assert!(!kp.verify(b"wrong message", &sig));
    }

    #[test]
    fn wrong_key_fails() {
        let kp1 = BeaconKeypair::generate();
        let kp2 = BeaconKeypair::generate();
        let sig = kp1.sign(b"message");
        assert!(!kp2.public_key().verify(b"message", &sig));
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        let seed = [42u8; 32];
        let a = BeaconKeypair::from_seed(&seed);
        let b = BeaconKeypair::from_seed(&seed);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"x").as_bytes(), b.sign(b"x").as_bytes());
    }

    #[test]
    fn pubkey_from_slice_rejects_wrong_length() {
        assert!(BeaconPublicKey::from_slice(&[0u8; 31]).is_err());
        assert!(BeaconPublicKey::from_slice(&[0u8; 33]).is_err());
        assert!(BeaconPublicKey::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn all_zero_key_verifies_nothing() {
        // The identity point is a small-order point that strict Ed25519
        // implementations reject.
        let key = BeaconPublicKey::from_bytes([0u8; 32]);
        let sig = BeaconSignature::from_bytes([0u8; 64]);
        assert!(!key.verify(b"anything", &sig));
    }

    #[test]
    fn debug_never_prints_secret() {
        let kp = BeaconKeypair::generate();
        let rendered = format!("{:?}", kp);
        let secret_hex = hex::encode(kp.secret_bytes());
        assert!(!rendered.contains(&secret_hex));
    }
}
