//! Satoshi amounts.
//!
//! `value` is always an integer satoshi count; no floating point anywhere
//! near money. Addition is checked against the chain's maximum supply so a
//! malicious pledge claiming absurd input values fails arithmetic instead
//! of wrapping into something plausible.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use thiserror::Error;

use crate::config::{COIN, MAX_MONEY};

/// Errors from checked amount arithmetic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    /// The result would exceed the chain's maximum supply.
    #[error("amount overflow: {a} + {b} exceeds the maximum supply")]
    Overflow { a: u64, b: u64 },

    /// The subtrahend is larger than the minuend.
    #[error("amount underflow: cannot subtract {b} from {a}")]
    Underflow { a: u64, b: u64 },
}

/// A non-negative monetary amount in satoshis.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero satoshis.
    pub const ZERO: Amount = Amount(0);

    /// One whole coin.
    pub const COIN: Amount = Amount(COIN);

    /// Wrap a raw satoshi count.
    pub const fn from_sat(sat: u64) -> Self {
        Amount(sat)
    }

    /// The raw satoshi count.
    pub const fn to_sat(self) -> u64 {
        self.0
    }

    /// `true` when the amount is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition. Fails once the sum passes [`MAX_MONEY`].
    pub fn checked_add(self, other: Amount) -> Result<Amount, AmountError> {
        let sum = self
            .0
            .checked_add(other.0)
            .filter(|sum| *sum <= MAX_MONEY)
            .ok_or(AmountError::Overflow {
                a: self.0,
                b: other.0,
            })?;
        Ok(Amount(sum))
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(AmountError::Underflow {
                a: self.0,
                b: other.0,
            })
    }

    /// Sum an iterator of amounts with overflow checking.
    pub fn checked_sum<I: IntoIterator<Item = Amount>>(amounts: I) -> Result<Amount, AmountError> {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, Amount::checked_add)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat", self.0)
    }
}

/// Unchecked summation for contexts that already validated their inputs
/// (test fixtures, display code). Protocol paths use [`Amount::checked_sum`].
impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        Amount(iter.map(|a| a.0).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_add_within_supply() {
        let a = Amount::from_sat(10_000_000);
        let b = Amount::from_sat(90_000_000);
        assert_eq!(a.checked_add(b).unwrap(), Amount::COIN);
    }

    #[test]
    fn checked_add_rejects_supply_overflow() {
        let a = Amount::from_sat(MAX_MONEY);
        let err = a.checked_add(Amount::from_sat(1)).unwrap_err();
        assert!(matches!(err, AmountError::Overflow { .. }));
    }

    #[test]
    fn checked_add_rejects_u64_overflow() {
        let a = Amount::from_sat(u64::MAX);
        assert!(a.checked_add(Amount::from_sat(1)).is_err());
    }

    #[test]
    fn checked_sub_underflow() {
        let err = Amount::from_sat(5)
            .checked_sub(Amount::from_sat(6))
            .unwrap_err();
        assert!(matches!(err, AmountError::Underflow { .. }));
    }

    #[test]
    fn checked_sum_over_iterator() {
        let amounts = [100u64, 200, 300].map(Amount::from_sat);
        assert_eq!(
            Amount::checked_sum(amounts).unwrap(),
            Amount::from_sat(600)
        );
    }

    #[test]
    fn serde_is_transparent() {
        let amount = Amount::from_sat(42_000);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "42000");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }
}
