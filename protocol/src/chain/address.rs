//! Addresses.
//!
//! An address is the 20-byte hash of an Ed25519 public key, rendered with
//! the `bcn1` prefix. It is exactly the payload of a pay-to-key-hash
//! script; converting between the two is lossless in both directions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::KEY_HASH_LENGTH;
use crate::crypto::{hash, BeaconPublicKey};

/// Human-readable prefix on rendered addresses.
const ADDRESS_HRP: &str = "bcn1";

/// Errors from address parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with {ADDRESS_HRP}")]
    MissingPrefix,

    #[error("address payload is not {KEY_HASH_LENGTH} hex-encoded bytes")]
    MalformedPayload,
}

/// A pay-to-key-hash destination.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    key_hash: [u8; KEY_HASH_LENGTH],
}

impl Address {
    /// The address controlled by the given public key.
    pub fn from_public_key(key: &BeaconPublicKey) -> Self {
        Self {
            key_hash: hash::key_hash(key.as_bytes()),
        }
    }

    /// Wrap a raw key hash (e.g. extracted from a script).
    pub fn from_key_hash(key_hash: [u8; KEY_HASH_LENGTH]) -> Self {
        Self { key_hash }
    }

    /// The 20-byte key hash this address wraps.
    pub fn key_hash(&self) -> &[u8; KEY_HASH_LENGTH] {
        &self.key_hash
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ADDRESS_HRP, hex::encode(self.key_hash))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let payload = s
            .strip_prefix(ADDRESS_HRP)
            .ok_or(AddressError::MissingPrefix)?;
        let bytes = hex::decode(payload).map_err(|_| AddressError::MalformedPayload)?;
        if bytes.len() != KEY_HASH_LENGTH {
            return Err(AddressError::MalformedPayload);
        }
        let mut key_hash = [0u8; KEY_HASH_LENGTH];
        key_hash.copy_from_slice(&bytes);
        Ok(Self { key_hash })
    }
}
