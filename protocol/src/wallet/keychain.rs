//! Deterministic keychain.
//!
//! Every wallet key derives from one 32-byte seed through BLAKE3's
//! `derive_key` mode, on two separate branches:
//!
//! - the **receive** branch funds stubs, change, and revocations;
//! - the **auth** branch issues one fresh key per created project, so two
//!   projects by the same owner cannot be linked through their keys.
//!
//! Fresh-key counters are bookkeeping, not secrets: a wallet restored from
//! the bare seed re-derives the same keys and finds issued ones again by
//! scanning a lookahead window past its counters. Auth keys beyond the
//! window are recoverable through the index recorded in the project file.
//!
//! For durable storage the seed is sealed under a passphrase with
//! AES-256-GCM; see [`SeedKeychain::seal`] and [`SeedKeychain::open_sealed`].

use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;

use crate::chain::Address;
use crate::config::KEYCHAIN_LOOKAHEAD;
use crate::crypto::{domain_separated_hash, encryption, BeaconKeypair, BeaconPublicKey};
use crate::crypto::EncryptionError;
use crate::ports::KeyProvider;

const RECEIVE_CONTEXT: &str = "beacon.keychain.receive.v1";
const AUTH_CONTEXT: &str = "beacon.keychain.auth.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Receive,
    Auth,
}

impl Branch {
    fn context(self) -> &'static str {
        match self {
            Branch::Receive => RECEIVE_CONTEXT,
            Branch::Auth => AUTH_CONTEXT,
        }
    }
}

struct Counters {
    next_receive: u32,
    next_auth: u32,
    issued: HashMap<[u8; 32], (Branch, u32)>,
}

/// A seed-derived key provider.
pub struct SeedKeychain {
    seed: [u8; 32],
    counters: Mutex<Counters>,
}

impl SeedKeychain {
    /// Build a keychain over an existing seed.
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            counters: Mutex::new(Counters {
                next_receive: 0,
                next_auth: 0,
                issued: HashMap::new(),
            }),
        }
    }

    /// Generate a keychain with a fresh random seed.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::new(seed)
    }

    /// Seal the seed under a passphrase for durable storage.
    pub fn seal(&self, passphrase: &str) -> Result<Vec<u8>, EncryptionError> {
        encryption::seal(&encryption::passphrase_key(passphrase), &self.seed)
    }

    /// Reconstruct a keychain from sealed bytes and the passphrase.
    pub fn open_sealed(sealed: &[u8], passphrase: &str) -> Result<Self, EncryptionError> {
        let seed_bytes = encryption::unseal(&encryption::passphrase_key(passphrase), sealed)?;
        let seed: [u8; 32] = seed_bytes
            .try_into()
            .map_err(|_| EncryptionError::UnsealFailed)?;
        Ok(Self::new(seed))
    }

    fn derive(&self, branch: Branch, index: u32) -> BeaconKeypair {
        let mut material = Vec::with_capacity(36);
        material.extend_from_slice(&self.seed);
        material.extend_from_slice(&index.to_le_bytes());
        BeaconKeypair::from_seed(&domain_separated_hash(branch.context(), &material))
    }

    /// Scan the issued map and the lookahead windows for a key satisfying
    /// `matches`.
    fn scan_for_key(
        &self,
        counters: &Counters,
        matches: impl Fn(&BeaconKeypair) -> bool,
    ) -> Option<BeaconKeypair> {
        for (branch, next) in [
            (Branch::Receive, counters.next_receive),
            (Branch::Auth, counters.next_auth),
        ] {
            for index in 0..next + KEYCHAIN_LOOKAHEAD {
                let keypair = self.derive(branch, index);
                if matches(&keypair) {
                    return Some(keypair);
                }
            }
        }
        None
    }
}

impl KeyProvider for SeedKeychain {
    fn fresh_receive_address(&self) -> Address {
        let mut counters = self.counters.lock();
        let index = counters.next_receive;
        counters.next_receive += 1;
        let keypair = self.derive(Branch::Receive, index);
        counters
            .issued
            .insert(*keypair.public_key().as_bytes(), (Branch::Receive, index));
        Address::from_public_key(&keypair.public_key())
    }

    fn fresh_auth_key(&self) -> (BeaconPublicKey, u32) {
        let mut counters = self.counters.lock();
        let index = counters.next_auth;
        counters.next_auth += 1;
        let keypair = self.derive(Branch::Auth, index);
        counters
            .issued
            .insert(*keypair.public_key().as_bytes(), (Branch::Auth, index));
        (keypair.public_key(), index)
    }

    fn find_key_by_pubkey(&self, pubkey: &BeaconPublicKey) -> Option<BeaconKeypair> {
        let counters = self.counters.lock();
        if let Some((branch, index)) = counters.issued.get(pubkey.as_bytes()) {
            return Some(self.derive(*branch, *index));
        }
        self.scan_for_key(&counters, |kp| kp.public_key() == *pubkey)
    }

    fn auth_key_by_index(&self, index: u32) -> Option<BeaconKeypair> {
        Some(self.derive(Branch::Auth, index))
    }

    fn key_for_address(&self, address: &Address) -> Option<BeaconKeypair> {
        let counters = self.counters.lock();
        self.scan_for_key(&counters, |kp| {
            Address::from_public_key(&kp.public_key()) == *address
        })
    }
}
