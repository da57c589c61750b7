//! Wallet state persistence.
//!
//! The wallet persists exactly three collections: active pledges, the
//! projects they belong to, and revoked pledges. Revoked pledges are kept
//! so that a restart does not resurrect them as active; everything else
//! (coins, keys) is reconstructed from the chain and the seed.
//!
//! Durability discipline: `commit` and the success branch of a revocation
//! flush through the persister *before* reporting success or notifying
//! listeners. A persister that lies about durability breaks the wallet's
//! crash-safety story, not its logic.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::project::{PledgeMessage, ProjectEnvelope};

/// The persisted wallet state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    /// Active (committed, unrevoked, unclaimed) pledges.
    pub pledges: Vec<PledgeMessage>,

    /// The projects those pledges belong to.
    pub projects: Vec<ProjectEnvelope>,

    /// Pledges that were revoked by double-spend. Kept so a restart does
    /// not re-count them as active.
    pub revoked: Vec<PledgeMessage>,
}

/// Error from a persister.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("wallet persistence failed: {reason}")]
pub struct PersistError {
    pub reason: String,
}

impl PersistError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Durable storage for wallet snapshots.
pub trait WalletPersister: Send + Sync {
    /// Durably store the snapshot. Returning `Ok` promises the data
    /// survives a crash.
    fn save(&self, snapshot: &WalletSnapshot) -> Result<(), PersistError>;
}

/// In-memory persister for tests and ephemeral wallets.
#[derive(Default)]
pub struct MemoryPersister {
    last: Mutex<Option<WalletSnapshot>>,
    saves: Mutex<u32>,
}

impl MemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently saved snapshot.
    pub fn last(&self) -> Option<WalletSnapshot> {
        self.last.lock().clone()
    }

    /// How many saves have happened.
    pub fn save_count(&self) -> u32 {
        *self.saves.lock()
    }
}

impl WalletPersister for MemoryPersister {
    fn save(&self, snapshot: &WalletSnapshot) -> Result<(), PersistError> {
        *self.last.lock() = Some(snapshot.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_json_roundtrip() {
        let snapshot = WalletSnapshot {
            pledges: vec![],
            projects: vec![],
            revoked: vec![],
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: WalletSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn memory_persister_records_saves() {
        let persister = MemoryPersister::new();
        assert_eq!(persister.save_count(), 0);
        persister.save(&WalletSnapshot::default()).unwrap();
        assert_eq!(persister.save_count(), 1);
        assert_eq!(persister.last(), Some(WalletSnapshot::default()));
    }
}
