//! # External Ports
//!
//! The core consumes the outside world through four narrow interfaces:
//! a UTXO oracle, a transaction broadcaster, a clock, and a key provider.
//! Chain synchronization, P2P networking, and key storage all live behind
//! these traits; the protocol code never touches them directly.
//!
//! The async ports return boxed futures so implementations stay
//! object-safe and the wallet can hold them as trait objects. Only two
//! operations suspend at all: UTXO resolution during pledge verification
//! and transaction broadcast.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::chain::{Address, OutPoint, Transaction, TxOutput};
use crate::crypto::{BeaconKeypair, BeaconPublicKey};

/// Boxed future returned by the async ports.
pub type PortFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Resolves outpoints against the current UTXO set.
pub trait UtxoOracle: Send + Sync {
    /// Resolve each outpoint to its unspent output.
    ///
    /// The result list matches the request order; an entry is `None` when
    /// the outpoint is unknown to the oracle (spent, never existed, or on
    /// a fork).
    fn resolve(&self, outpoints: Vec<OutPoint>) -> PortFuture<Vec<Option<TxOutput>>>;
}

/// Error surfaced by a failed broadcast.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("broadcast failed: {reason}")]
pub struct BroadcastError {
    pub reason: String,
}

impl BroadcastError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Hands transactions to the network.
pub trait Broadcaster: Send + Sync {
    /// Broadcast a transaction. Completion means peer acceptance, not
    /// confirmation.
    fn broadcast(&self, tx: Transaction) -> PortFuture<Result<Transaction, BroadcastError>>;
}

/// Wall-clock time in seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// The system clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Supplies and locates signing keys.
///
/// Key derivation itself is outside the core; the wallet only needs fresh
/// destinations, fresh project auth keys, and lookups from public material
/// back to a signing key.
pub trait KeyProvider: Send + Sync {
    /// A never-before-issued receive address.
    fn fresh_receive_address(&self) -> Address;

    /// A never-before-issued project authentication key, together with its
    /// derivation index. The index is recorded in the project descriptor
    /// so a wallet restored from seed can find the key again even past the
    /// lookahead window.
    fn fresh_auth_key(&self) -> (BeaconPublicKey, u32);

    /// Locate the signing key for a public key, if this provider owns it.
    fn find_key_by_pubkey(&self, pubkey: &BeaconPublicKey) -> Option<BeaconKeypair>;

    /// Locate an auth key by its recorded derivation index.
    fn auth_key_by_index(&self, index: u32) -> Option<BeaconKeypair>;

    /// Locate the signing key whose public key hashes to `address`.
    fn key_for_address(&self, address: &Address) -> Option<BeaconKeypair>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_past_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }

    #[test]
    fn broadcast_error_displays_reason() {
        let err = BroadcastError::new("peer rejected");
        assert_eq!(err.to_string(), "broadcast failed: peer rejected");
    }
}
