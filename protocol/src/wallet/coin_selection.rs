//! Coin selection.
//!
//! Pledges cannot carry change outputs, so the wallet's selection
//! discipline differs from an ordinary payment wallet in one important
//! way: a single output of exactly the target value is always preferred,
//! because it can become a stub directly and no dependency transaction is
//! needed. Outputs that are already pledged never appear in the candidate
//! set at all; the wallet filters them out before selection under its own
//! lock.

use crate::chain::{Amount, OutPoint, TxOutput};

/// An output the wallet owns and could spend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedOutput {
    pub outpoint: OutPoint,
    pub output: TxOutput,
}

impl OwnedOutput {
    pub fn value(&self) -> Amount {
        self.output.value
    }
}

/// The outcome of a selection round.
#[derive(Debug, Clone, Default)]
pub struct CoinSelection {
    pub gathered: Vec<OwnedOutput>,
    pub total: Amount,
}

/// Strategy interface for picking spendable outputs.
pub trait CoinSelector: Send + Sync {
    /// Gather candidates until their sum covers `target`. Implementations
    /// return what they gathered even when it falls short; the caller
    /// compares `total` against the target.
    fn select(&self, target: Amount, candidates: Vec<OwnedOutput>) -> CoinSelection;
}

/// Largest-first accumulation, the fallback strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCoinSelector;

impl CoinSelector for DefaultCoinSelector {
    fn select(&self, target: Amount, mut candidates: Vec<OwnedOutput>) -> CoinSelection {
        candidates.sort_by(|a, b| b.value().cmp(&a.value()));
        let mut selection = CoinSelection::default();
        for candidate in candidates {
            if selection.total >= target {
                break;
            }
            // Saturation is unreachable with real wallet contents: the sum
            // of owned outputs cannot exceed the chain supply.
            selection.total = selection
                .total
                .checked_add(candidate.value())
                .unwrap_or(selection.total);
            selection.gathered.push(candidate);
        }
        selection
    }
}

/// The pledging wallet's selector: a single exact-value match beats any
/// combination, then defer to [`DefaultCoinSelector`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StubFirstSelector {
    fallback: DefaultCoinSelector,
}

impl CoinSelector for StubFirstSelector {
    fn select(&self, target: Amount, candidates: Vec<OwnedOutput>) -> CoinSelection {
        if let Some(exact) = candidates.iter().find(|c| c.value() == target) {
            return CoinSelection {
                total: exact.value(),
                gathered: vec![exact.clone()],
            };
        }
        self.fallback.select(target, candidates)
    }
}
