//! # Chain Primitives
//!
//! The UTXO-chain vocabulary the crowdfunding protocol is built from:
//! amounts, addresses, scripts, transactions, and signature hashing. This
//! layer knows nothing about projects or pledges; it is the consensus
//! surface of the underlying network, and its binary formats are fixed.

pub mod address;
pub mod amount;
pub mod script;
pub mod sighash;
pub mod transaction;

pub use address::{Address, AddressError};
pub use amount::{Amount, AmountError};
pub use script::{ScriptError, ScriptTemplate};
pub use sighash::SighashMode;
pub use transaction::{
    BuildError, CodecError, OutPoint, Transaction, TransactionBuilder, TxId, TxInput, TxOutput,
};
