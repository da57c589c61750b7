//! # Hashing Utilities
//!
//! Two hash functions, two jobs, and we refuse to add more without a very
//! good reason:
//!
//! - **SHA-256** (and the classic double-SHA-256 construction) for
//!   everything on the consensus surface: transaction ids, sighash digests,
//!   key hashes inside scripts. This is the format the underlying chain
//!   speaks and bit-exactness is mandatory.
//!
//! - **BLAKE3** for everything internal to the crowdfunding protocol:
//!   project ids, pledge hashes, keychain derivation. Nothing on the chain
//!   ever sees these digests, so we are free to use the faster hash and its
//!   built-in `derive_key` domain separation.

use sha2::{Digest, Sha256};

use crate::config::KEY_HASH_LENGTH;

/// Compute the SHA-256 hash of the input data.
///
/// Returns a fixed 32-byte digest. Used on the consensus surface and as a
/// building block for [`double_sha256`].
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Compute the double-SHA-256 hash: `SHA-256(SHA-256(data))`.
///
/// Transaction ids and signature digests on the chain use this
/// construction, which also closes the door on length-extension tricks.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Hash a public key down to the 20-byte form that appears in
/// pay-to-key-hash scripts and addresses: SHA-256 truncated to 20 bytes.
pub fn key_hash(pubkey: &[u8]) -> [u8; KEY_HASH_LENGTH] {
    let digest = sha256(pubkey);
    let mut out = [0u8; KEY_HASH_LENGTH];
    out.copy_from_slice(&digest[..KEY_HASH_LENGTH]);
    out
}

/// Compute the BLAKE3 hash of the input data.
///
/// The workhorse for protocol-internal identifiers.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Compute a domain-separated hash using BLAKE3's `derive_key` mode.
///
/// Domain separation guarantees that a project id, a pledge hash, and an
/// owner-auth digest over the same bytes can never collide. The context
/// string is mixed into the hash IV itself, so prepending a tag manually
/// is never necessary (and never done).
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Hash multiple byte slices together without concatenation overhead.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string, the canonical test vector.
        let hash = sha256(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(hash.as_slice(), expected.as_slice());
    }

    #[test]
    fn double_sha256_is_sha256_of_sha256() {
        let single = sha256(b"beacon");
        let double = double_sha256(b"beacon");
        assert_eq!(double, sha256(&single));
        assert_ne!(double, single);
    }

    #[test]
    fn key_hash_is_truncated_sha256() {
        let pubkey = [7u8; 32];
        let hash = key_hash(&pubkey);
        assert_eq!(hash.len(), KEY_HASH_LENGTH);
        assert_eq!(&hash[..], &sha256(&pubkey)[..KEY_HASH_LENGTH]);
    }

    #[test]
    fn domain_separation_changes_digest() {
        let data = b"same data";
        let a = domain_separated_hash("beacon.test.a", data);
        let b = domain_separated_hash("beacon.test.b", data);
        assert_ne!(a, b);
        assert_ne!(a, blake3_hash(data));
    }

    #[test]
    fn multi_part_hash_matches_concatenation() {
        let multi = blake3_hash_multi(&[b"hello", b" world"]);
        let single = blake3_hash(b"hello world");
        assert_eq!(multi, single);
    }
}
