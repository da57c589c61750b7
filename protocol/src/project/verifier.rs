//! Pledge verification.
//!
//! A pledge arrives as an untrusted message from an untrusted backer. The
//! verifier establishes, in order of increasing cost, that it is exactly
//! the transaction the protocol requires: one that pays the project's
//! outputs, spends a live stub, declares its value honestly, and carries a
//! signature the chain will accept. The first failing phase wins; later
//! phases never run.
//!
//! The only suspension point is the UTXO oracle call. Everything else is
//! pure, so any number of verifications may run concurrently.

use thiserror::Error;
use tracing::debug;

use super::descriptor::Project;
use super::messages::PledgeMessage;
use crate::chain::{script, Amount, OutPoint, ScriptError, Transaction, TxOutput};
use crate::ports::UtxoOracle;
use std::collections::HashSet;

/// The closed set of pledge verification failures.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// The pledge message carries no (decodable) transaction.
    #[error("pledge contains no transaction data")]
    NoTransactionData,

    /// Output count differs from the project's required outputs.
    #[error("pledge has {got} outputs, project requires {want}")]
    TxWrongNumberOfOutputs { got: usize, want: usize },

    /// An output differs from the project's corresponding output in
    /// amount or script bytes.
    #[error("pledge output {index} does not match the project's output")]
    OutputMismatch { index: usize },

    /// An output script is outside the standard template set.
    #[error("pledge output {index} is non-standard")]
    NonStandard { index: usize },

    /// The oracle could not resolve a referenced outpoint: the stub is
    /// spent, never existed, or sits on a fork.
    #[error("unknown UTXO: {outpoint}")]
    UnknownUtxo { outpoint: OutPoint },

    /// The declared total input value disagrees with the oracle-resolved
    /// total.
    #[error("declared input value {declared} does not match resolved value {resolved}")]
    CachedValueMismatch { declared: Amount, resolved: Amount },

    /// Two inputs reference the same outpoint.
    #[error("duplicated outpoint: {outpoint}")]
    DuplicatedOutPoint { outpoint: OutPoint },

    /// Script execution rejected an input.
    #[error("script validation failed: {0}")]
    Script(#[from] ScriptError),

    /// Value totals are inconsistent: when verifying, outputs exceed
    /// inputs; when combining, pledged inputs miss the project goal.
    #[error("value mismatch: expected {expected}, got {actual}")]
    ValueMismatch { expected: Amount, actual: Amount },
}

/// A pledge that survived every verification phase.
///
/// Carries the parsed pledge transaction and the oracle-confirmed input
/// value, so downstream consumers never re-derive either.
#[derive(Debug, Clone)]
pub struct VerifiedPledge {
    pub message: PledgeMessage,
    pub transaction: Transaction,
    pub total_input_value: Amount,
}

impl Project {
    /// Structural sanity checks that need no chain access.
    ///
    /// Decodes the pledge transaction and verifies: no duplicated
    /// outpoints, output count equal to the project's, byte-equal outputs
    /// in declared order, and standard output scripts. Returns the decoded
    /// transaction for the later phases.
    pub fn fast_sanity_check(
        &self,
        pledge: &PledgeMessage,
    ) -> Result<Transaction, VerificationError> {
        let tx = pledge
            .pledge_tx()
            .ok_or(VerificationError::NoTransactionData)?;

        let mut seen = HashSet::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            if !seen.insert(input.outpoint) {
                return Err(VerificationError::DuplicatedOutPoint {
                    outpoint: input.outpoint,
                });
            }
        }

        let required = self.outputs();
        if tx.outputs.len() != required.len() {
            return Err(VerificationError::TxWrongNumberOfOutputs {
                got: tx.outputs.len(),
                want: required.len(),
            });
        }
        for (index, (got, want)) in tx.outputs.iter().zip(required.iter()).enumerate() {
            if got.value != want.value || got.script != want.script {
                return Err(VerificationError::OutputMismatch { index });
            }
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            if !script::is_standard(&output.script) {
                return Err(VerificationError::NonStandard { index });
            }
        }
        Ok(tx)
    }

    /// Verify a pledge against this project and the given UTXO oracle.
    ///
    /// Phases, failing fast at the first error:
    ///
    /// 1. the message must carry a transaction;
    /// 2. [`fast_sanity_check`](Self::fast_sanity_check);
    /// 3. every referenced outpoint must resolve through the oracle;
    /// 4. the declared `total_input_value` must equal the resolved total;
    /// 5. each input's script must execute successfully against its
    ///    resolved prevout (a dummy signature fails here);
    /// 6. outputs must not exceed inputs. Implied by phases 2 and 4 for a
    ///    well-formed project, but checked explicitly.
    pub async fn verify_pledge(
        &self,
        oracle: &dyn UtxoOracle,
        pledge: &PledgeMessage,
    ) -> Result<VerifiedPledge, VerificationError> {
        if pledge.transactions.is_empty() {
            return Err(VerificationError::NoTransactionData);
        }
        let tx = self.fast_sanity_check(pledge)?;

        let outpoints: Vec<OutPoint> = tx.inputs.iter().map(|input| input.outpoint).collect();
        let resolved = oracle.resolve(outpoints.clone()).await;
        let mut prevouts: Vec<TxOutput> = Vec::with_capacity(outpoints.len());
        for (index, outpoint) in outpoints.iter().enumerate() {
            match resolved.get(index).and_then(Clone::clone) {
                Some(output) => prevouts.push(output),
                None => {
                    return Err(VerificationError::UnknownUtxo {
                        outpoint: *outpoint,
                    })
                }
            }
        }

        let resolved_total = Amount::checked_sum(prevouts.iter().map(|o| o.value)).map_err(
            |_| VerificationError::CachedValueMismatch {
                declared: pledge.total_input_value,
                resolved: Amount::ZERO,
            },
        )?;
        if resolved_total != pledge.total_input_value {
            return Err(VerificationError::CachedValueMismatch {
                declared: pledge.total_input_value,
                resolved: resolved_total,
            });
        }

        for (index, prevout) in prevouts.iter().enumerate() {
            script::verify_input_spend(&tx, index, &prevout.script)?;
        }

        let output_total =
            Amount::checked_sum(tx.outputs.iter().map(|o| o.value)).map_err(|_| {
                VerificationError::ValueMismatch {
                    expected: resolved_total,
                    actual: Amount::ZERO,
                }
            })?;
        if output_total > resolved_total {
            return Err(VerificationError::ValueMismatch {
                expected: resolved_total,
                actual: output_total,
            });
        }

        debug!(
            project = self.id(),
            value = %resolved_total,
            "pledge verified"
        );
        Ok(VerifiedPledge {
            message: pledge.clone(),
            transaction: tx,
            total_input_value: resolved_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::testutil::{pledge_message, ProjectFixture};

    // Phase coverage lives in the end-to-end suite; here we pin the parts
    // that need no oracle.

    #[test]
    fn fast_sanity_accepts_well_formed_pledge() {
        let fixture = ProjectFixture::new(Amount::COIN);
        let (pledge_tx, _stub) = fixture.pledge(10_000_000);
        let message = pledge_message(&pledge_tx, 10_000_000, fixture.project.id());
        fixture.project.fast_sanity_check(&message).unwrap();
    }

    #[test]
    fn fast_sanity_rejects_missing_tx() {
        let fixture = ProjectFixture::new(Amount::COIN);
        let message = PledgeMessage {
            transactions: vec![],
            total_input_value: Amount::ZERO,
            timestamp: 0,
            project_id: "abc".into(),
            contact: None,
        };
        assert!(matches!(
            fixture.project.fast_sanity_check(&message),
            Err(VerificationError::NoTransactionData)
        ));
    }

    #[test]
    fn fast_sanity_rejects_undecodable_tx() {
        let fixture = ProjectFixture::new(Amount::COIN);
        let message = PledgeMessage {
            transactions: vec![vec![0xFF, 0x00, 0x01]],
            total_input_value: Amount::ZERO,
            timestamp: 0,
            project_id: "abc".into(),
            contact: None,
        };
        assert!(matches!(
            fixture.project.fast_sanity_check(&message),
            Err(VerificationError::NoTransactionData)
        ));
    }
}
