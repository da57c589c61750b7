//! # Cryptographic Primitives
//!
//! Low-level building blocks shared by the chain layer and the
//! crowdfunding protocol: hashing, Ed25519 keys and signatures, and the
//! AES-GCM seal for keychain seeds. Don't roll your own; everything above
//! this module goes through these wrappers.

pub mod encryption;
pub mod hash;
pub mod keys;
pub mod signatures;

pub use encryption::EncryptionError;
pub use hash::{blake3_hash, domain_separated_hash, double_sha256, key_hash, sha256};
pub use keys::{BeaconKeypair, BeaconPublicKey, BeaconSignature, KeyError};
pub use signatures::{sign, verify, verify_raw, SignatureError};
