//! Contract assembly: folding pledges into one claim transaction.
//!
//! Every pledge is signed with the append-permitted sighash mode, so their
//! inputs are order-independent and can be concatenated without touching a
//! single signature. The assembler therefore never signs anything; it only
//! arranges inputs under the project's fixed outputs.

use tracing::info;

use super::descriptor::Project;
use super::messages::PledgeMessage;
use super::verifier::VerificationError;
use crate::chain::{Amount, Transaction, TransactionBuilder};

impl Project {
    /// Combine pledges into a candidate claim transaction.
    ///
    /// The result has exactly the project's required outputs and, for each
    /// pledge, its input appended verbatim with the signature preserved.
    /// No value check is performed: if the pledged inputs fall short of
    /// the goal the transaction is simply incomplete and the network will
    /// reject it. Use [`complete_contract_strict`](Self::complete_contract_strict)
    /// to fail early instead.
    pub fn complete_contract<'a, I>(&self, pledges: I) -> Result<Transaction, VerificationError>
    where
        I: IntoIterator<Item = &'a PledgeMessage>,
    {
        let mut builder = TransactionBuilder::new();
        for output in self.outputs() {
            builder.add_output(output.clone());
        }
        let mut count = 0usize;
        for pledge in pledges {
            let tx = pledge
                .pledge_tx()
                .ok_or(VerificationError::NoTransactionData)?;
            for input in tx.inputs {
                builder.add_signed_input(input);
            }
            count += 1;
        }
        let contract = builder.finish();
        info!(
            project = self.id(),
            pledges = count,
            inputs = contract.inputs.len(),
            "assembled contract"
        );
        Ok(contract)
    }

    /// Combine pledges, requiring their declared values to add up to the
    /// project goal exactly.
    ///
    /// Declared values are trusted here because every stored pledge has
    /// already been through [`verify_pledge`](Self::verify_pledge); this
    /// is what the redundant `total_input_value` field buys.
    pub fn complete_contract_strict<'a, I>(
        &self,
        pledges: I,
    ) -> Result<Transaction, VerificationError>
    where
        I: IntoIterator<Item = &'a PledgeMessage> + Clone,
    {
        let total = Amount::checked_sum(
            pledges
                .clone()
                .into_iter()
                .map(|pledge| pledge.total_input_value),
        )
        .map_err(|_| VerificationError::ValueMismatch {
            expected: self.goal_amount(),
            actual: Amount::ZERO,
        })?;
        if total != self.goal_amount() {
            return Err(VerificationError::ValueMismatch {
                expected: self.goal_amount(),
                actual: total,
            });
        }
        self.complete_contract(pledges)
    }
}
