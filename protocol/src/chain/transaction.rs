//! The transaction model: immutable parsed views plus a mutable builder.
//!
//! The binary encoding here is the consensus format of the underlying
//! chain: little-endian integers, CompactSize length prefixes, inputs then
//! outputs. Bit-exactness is mandatory; a transaction must survive
//! serialize -> parse -> serialize unchanged, and the transaction id is the
//! double-SHA-256 of exactly these bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::address::Address;
use super::amount::Amount;
use super::script::{self, ScriptError, ScriptTemplate};
use super::sighash::{self, SighashMode};
use crate::config::{LOCK_TIME_NONE, SEQUENCE_FINAL, TX_VERSION};
use crate::crypto::{double_sha256, BeaconKeypair};
use crate::serde_hex;

/// Errors from the consensus codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of transaction data")]
    UnexpectedEof,

    #[error("trailing bytes after transaction")]
    TrailingBytes,

    #[error("declared length {0} exceeds remaining data")]
    OversizedLength(u64),
}

/// Errors from the transaction builder.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("input index {0} out of range")]
    InputIndexOutOfRange(usize),

    #[error("input {0} has no connected output; cannot derive its signing script")]
    MissingConnectedOutput(usize),

    #[error("cannot sign prevout script: not pay-to-key-hash or pay-to-pubkey")]
    UnsupportedPrevout,

    #[error(transparent)]
    Script(#[from] ScriptError),
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A transaction id: the double-SHA-256 of the canonical serialization.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(#[serde(with = "serde_hex::array32")] pub [u8; 32]);

impl TxId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self)
    }
}

/// A reference to a specific output of a specific transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: TxId, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPoint({})", self)
    }
}

// ---------------------------------------------------------------------------
// Inputs and Outputs
// ---------------------------------------------------------------------------

/// A transaction output: an amount locked behind a script.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: Amount,
    #[serde(with = "serde_hex::bytes")]
    pub script: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: Amount, script: Vec<u8>) -> Self {
        Self { value, script }
    }

    /// An output paying `value` to an address.
    pub fn pay_to_address(value: Amount, address: &Address) -> Self {
        Self {
            value,
            script: script::pay_to_address(address),
        }
    }

    /// The address this output pays to, when it is pay-to-key-hash.
    pub fn address(&self) -> Option<Address> {
        match script::classify(&self.script) {
            ScriptTemplate::PayToKeyHash { key_hash } => Some(Address::from_key_hash(key_hash)),
            _ => None,
        }
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        encoding::write_u64(buf, self.value.to_sat());
        encoding::write_var_bytes(buf, &self.script);
    }
}

/// A transaction input: the outpoint it spends, the script satisfying that
/// outpoint's spending condition, and the sequence number.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TxInput {
    pub outpoint: OutPoint,
    #[serde(with = "serde_hex::bytes")]
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxInput {
    /// An unsigned input spending `outpoint` with a final sequence.
    pub fn unsigned(outpoint: OutPoint) -> Self {
        Self {
            outpoint,
            script_sig: Vec::new(),
            sequence: SEQUENCE_FINAL,
        }
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>, script_override: Option<&[u8]>) {
        buf.extend_from_slice(self.outpoint.txid.as_bytes());
        encoding::write_u32(buf, self.outpoint.vout);
        encoding::write_var_bytes(buf, script_override.unwrap_or(&self.script_sig));
        encoding::write_u32(buf, self.sequence);
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A parsed transaction. Immutable by convention: every mutation path goes
/// through [`TransactionBuilder`], and verified transactions are never
/// edited in place.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// Canonical consensus serialization.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + 64 * self.inputs.len() + 40 * self.outputs.len());
        encoding::write_u32(&mut buf, self.version);
        encoding::write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            input.encode_into(&mut buf, None);
        }
        encoding::write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode_into(&mut buf);
        }
        encoding::write_u32(&mut buf, self.lock_time);
        buf
    }

    /// Parse a transaction from its canonical serialization.
    ///
    /// Strict: trailing bytes are an error, so decode(encode(tx)) == tx is
    /// an identity and nothing can hide after the lock time.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = encoding::Cursor::new(data);
        let version = cursor.read_u32()?;
        let input_count = cursor.read_varint()?;
        let mut inputs = Vec::with_capacity(input_count.min(1024) as usize);
        for _ in 0..input_count {
            let mut txid = [0u8; 32];
            txid.copy_from_slice(cursor.read_exact(32)?);
            let vout = cursor.read_u32()?;
            let script_sig = cursor.read_var_bytes()?.to_vec();
            let sequence = cursor.read_u32()?;
            inputs.push(TxInput {
                outpoint: OutPoint::new(TxId(txid), vout),
                script_sig,
                sequence,
            });
        }
        let output_count = cursor.read_varint()?;
        let mut outputs = Vec::with_capacity(output_count.min(1024) as usize);
        for _ in 0..output_count {
            let value = Amount::from_sat(cursor.read_u64()?);
            let script = cursor.read_var_bytes()?.to_vec();
            outputs.push(TxOutput { value, script });
        }
        let lock_time = cursor.read_u32()?;
        if !cursor.is_empty() {
            return Err(CodecError::TrailingBytes);
        }
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// The transaction id.
    pub fn txid(&self) -> TxId {
        TxId(double_sha256(&self.encode()))
    }

    /// Re-parse a fresh serialization of this transaction.
    ///
    /// Tests use this to prove that nothing outside the canonical encoding
    /// (builder state, connected outputs) leaks into the result.
    pub fn round_trip(&self) -> Result<Transaction, CodecError> {
        Self::decode(&self.encode())
    }

    /// Sum of all output values.
    pub fn output_total(&self) -> Result<Amount, super::amount::AmountError> {
        Amount::checked_sum(self.outputs.iter().map(|o| o.value))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Mutable transaction assembly.
///
/// Inputs added through [`add_input`](Self::add_input) carry their
/// connected prevout so the builder can compute signature digests and
/// derive input scripts without consulting the chain. Inputs appended
/// verbatim (contract assembly) use [`add_signed_input`](Self::add_signed_input)
/// and are never re-signed.
pub struct TransactionBuilder {
    version: u32,
    lock_time: u32,
    inputs: Vec<TxInput>,
    connected: Vec<Option<TxOutput>>,
    outputs: Vec<TxOutput>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            version: TX_VERSION,
            lock_time: LOCK_TIME_NONE,
            inputs: Vec::new(),
            connected: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Reopen an assembled transaction for further additions. Existing
    /// inputs keep their signatures and are never re-signed; this is how
    /// the fee input is appended to a completed contract.
    pub fn from_transaction(tx: Transaction) -> Self {
        let connected = vec![None; tx.inputs.len()];
        Self {
            version: tx.version,
            lock_time: tx.lock_time,
            inputs: tx.inputs,
            connected,
            outputs: tx.outputs,
        }
    }

    /// Add an unsigned input together with the output it spends.
    pub fn add_input(&mut self, outpoint: OutPoint, connected: TxOutput) -> &mut Self {
        self.inputs.push(TxInput::unsigned(outpoint));
        self.connected.push(Some(connected));
        self
    }

    /// Append an already-signed input verbatim. The signature script is
    /// preserved untouched.
    pub fn add_signed_input(&mut self, input: TxInput) -> &mut Self {
        self.inputs.push(input);
        self.connected.push(None);
        self
    }

    /// Append an output.
    pub fn add_output(&mut self, output: TxOutput) -> &mut Self {
        self.outputs.push(output);
        self
    }

    /// Append an output paying `value` to `address`.
    pub fn pay_to_address(&mut self, value: Amount, address: &Address) -> &mut Self {
        self.outputs.push(TxOutput::pay_to_address(value, address));
        self
    }

    /// The connected prevout recorded for an input, if any.
    pub fn connected_output(&self, index: usize) -> Option<&TxOutput> {
        self.connected.get(index).and_then(|c| c.as_ref())
    }

    /// Current number of inputs.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Compute the signature digest for one input under the given mode and
    /// subscript, over the transaction as currently assembled.
    pub fn signature_hash(&self, index: usize, subscript: &[u8], mode: SighashMode) -> [u8; 32] {
        sighash::signature_hash(&self.as_transaction(), index, subscript, mode)
    }

    /// Sign input `index` with `keypair` under `mode`, deriving the input
    /// script from the connected prevout's template.
    pub fn sign_input(
        &mut self,
        index: usize,
        keypair: &BeaconKeypair,
        mode: SighashMode,
    ) -> Result<(), BuildError> {
        if index >= self.inputs.len() {
            return Err(BuildError::InputIndexOutOfRange(index));
        }
        let prevout = self.connected[index]
            .as_ref()
            .ok_or(BuildError::MissingConnectedOutput(index))?;
        let subscript = prevout.script.clone();
        let digest = self.signature_hash(index, &subscript, mode);
        let wire = sighash::encode_wire_signature(&keypair.sign(&digest), mode);
        let script_sig = match script::classify(&subscript) {
            ScriptTemplate::PayToKeyHash { .. } => {
                script::key_hash_input_script(&wire, &keypair.public_key())
            }
            ScriptTemplate::PayToPubkey { .. } => script::pubkey_input_script(&wire),
            _ => return Err(BuildError::UnsupportedPrevout),
        };
        self.inputs[index].script_sig = script_sig;
        Ok(())
    }

    /// Snapshot the builder as an immutable transaction.
    fn as_transaction(&self) -> Transaction {
        Transaction {
            version: self.version,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            lock_time: self.lock_time,
        }
    }

    /// Finish building and emit the transaction.
    pub fn finish(self) -> Transaction {
        Transaction {
            version: self.version,
            inputs: self.inputs,
            outputs: self.outputs,
            lock_time: self.lock_time,
        }
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Wire encoding primitives
// ---------------------------------------------------------------------------

pub(crate) mod encoding {
    use super::CodecError;

    pub fn write_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(buf: &mut Vec<u8>, v: u64) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    /// CompactSize: 1, 3, 5, or 9 bytes depending on magnitude.
    pub fn write_varint(buf: &mut Vec<u8>, v: u64) {
        match v {
            0..=0xFC => buf.push(v as u8),
            0xFD..=0xFFFF => {
                buf.push(0xFD);
                buf.extend_from_slice(&(v as u16).to_le_bytes());
            }
            0x1_0000..=0xFFFF_FFFF => {
                buf.push(0xFE);
                buf.extend_from_slice(&(v as u32).to_le_bytes());
            }
            _ => {
                buf.push(0xFF);
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
    }

    pub fn write_var_bytes(buf: &mut Vec<u8>, data: &[u8]) {
        write_varint(buf, data.len() as u64);
        buf.extend_from_slice(data);
    }

    pub struct Cursor<'a> {
        data: &'a [u8],
        pos: usize,
    }

    impl<'a> Cursor<'a> {
        pub fn new(data: &'a [u8]) -> Self {
            Self { data, pos: 0 }
        }

        pub fn is_empty(&self) -> bool {
            self.pos == self.data.len()
        }

        pub fn read_exact(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
            if self.pos + len > self.data.len() {
                return Err(CodecError::UnexpectedEof);
            }
            let slice = &self.data[self.pos..self.pos + len];
            self.pos += len;
            Ok(slice)
        }

        pub fn read_u32(&mut self) -> Result<u32, CodecError> {
            let bytes = self.read_exact(4)?;
            Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
        }

        pub fn read_u64(&mut self) -> Result<u64, CodecError> {
            let bytes = self.read_exact(8)?;
            Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
        }

        pub fn read_varint(&mut self) -> Result<u64, CodecError> {
            let first = self.read_exact(1)?[0];
            Ok(match first {
                0xFD => u16::from_le_bytes(self.read_exact(2)?.try_into().expect("2")) as u64,
                0xFE => u32::from_le_bytes(self.read_exact(4)?.try_into().expect("4")) as u64,
                0xFF => u64::from_le_bytes(self.read_exact(8)?.try_into().expect("8")),
                n => n as u64,
            })
        }

        pub fn read_var_bytes(&mut self) -> Result<&'a [u8], CodecError> {
            let len = self.read_varint()?;
            if len > self.data.len() as u64 {
                return Err(CodecError::OversizedLength(len));
            }
            self.read_exact(len as usize)
        }
    }
}
