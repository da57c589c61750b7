//! Signature hashing: what exactly a signature commits to.
//!
//! Two modes matter for assurance contracts:
//!
//! - [`SighashMode::All`] commits to every input and every output. The
//!   ordinary mode for dependency and revocation transactions.
//! - [`SighashMode::AllAnyoneCanPay`] commits to *this input only* plus
//!   every output. Other inputs can be added, removed, or reordered
//!   without invalidating the signature. This is the pledge mode: a backer
//!   signs their stub against the project's outputs, and anyone may later
//!   combine that input with strangers' inputs into one claim transaction.
//!
//! A signature travels on the wire as 64 raw Ed25519 bytes followed by the
//! one-byte mode the signer committed to. The mode byte feeds back into
//! digest computation, so it cannot be altered after the fact.

use super::script::ScriptError;
use super::transaction::{encoding, Transaction};
use crate::config::{SIGNATURE_LENGTH, WIRE_SIGNATURE_LENGTH};
use crate::crypto::{double_sha256, BeaconKeypair, BeaconPublicKey, BeaconSignature};

/// Base mode byte: commit to all outputs.
const SIGHASH_ALL: u8 = 0x01;

/// Flag bit: commit to this input only, permitting appended inputs.
const SIGHASH_ANYONE_CAN_PAY: u8 = 0x80;

/// The sighash policies the chain accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SighashMode {
    /// Commit to all inputs and all outputs.
    All,
    /// Commit to this input and all outputs; other inputs are free.
    AllAnyoneCanPay,
}

impl SighashMode {
    /// The byte appended to wire signatures.
    pub fn to_byte(self) -> u8 {
        match self {
            SighashMode::All => SIGHASH_ALL,
            SighashMode::AllAnyoneCanPay => SIGHASH_ALL | SIGHASH_ANYONE_CAN_PAY,
        }
    }

    /// Parse a mode byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b if b == SIGHASH_ALL => Some(SighashMode::All),
            b if b == SIGHASH_ALL | SIGHASH_ANYONE_CAN_PAY => Some(SighashMode::AllAnyoneCanPay),
            _ => None,
        }
    }

    /// `true` when unrelated inputs may be appended without invalidating
    /// signatures made under this mode.
    pub fn permits_appended_inputs(self) -> bool {
        matches!(self, SighashMode::AllAnyoneCanPay)
    }
}

/// Compute the digest a signature over input `input_index` commits to.
///
/// The digest serializes, in order: the transaction version; the committed
/// input set (all inputs under [`SighashMode::All`], only the signed one
/// under [`SighashMode::AllAnyoneCanPay`]) with the subscript standing in
/// for the signed input's script and empty scripts elsewhere; every
/// output; the lock time; and the mode as a little-endian u32. The result
/// is double-SHA-256 of those bytes.
///
/// # Panics
///
/// Panics if `input_index` is out of range; callers validate the index
/// before computing digests.
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    subscript: &[u8],
    mode: SighashMode,
) -> [u8; 32] {
    assert!(
        input_index < tx.inputs.len(),
        "signature_hash: input index {} out of range ({} inputs)",
        input_index,
        tx.inputs.len()
    );
    let mut buf = Vec::with_capacity(tx.encode().len() + 8);
    encoding::write_u32(&mut buf, tx.version);
    match mode {
        SighashMode::All => {
            encoding::write_varint(&mut buf, tx.inputs.len() as u64);
            for (i, input) in tx.inputs.iter().enumerate() {
                let script: &[u8] = if i == input_index { subscript } else { &[] };
                input.encode_into(&mut buf, Some(script));
            }
        }
        SighashMode::AllAnyoneCanPay => {
            encoding::write_varint(&mut buf, 1);
            tx.inputs[input_index].encode_into(&mut buf, Some(subscript));
        }
    }
    encoding::write_varint(&mut buf, tx.outputs.len() as u64);
    for output in &tx.outputs {
        output.encode_into(&mut buf);
    }
    encoding::write_u32(&mut buf, tx.lock_time);
    encoding::write_u32(&mut buf, mode.to_byte() as u32);
    double_sha256(&buf)
}

/// Append the mode byte to a raw signature, producing the wire form.
pub fn encode_wire_signature(signature: &BeaconSignature, mode: SighashMode) -> Vec<u8> {
    let mut wire = Vec::with_capacity(WIRE_SIGNATURE_LENGTH);
    wire.extend_from_slice(signature.as_bytes());
    wire.push(mode.to_byte());
    wire
}

/// Split a wire signature into its raw signature and declared mode.
pub fn split_wire_signature(wire: &[u8]) -> Result<(BeaconSignature, SighashMode), ScriptError> {
    if wire.len() != WIRE_SIGNATURE_LENGTH {
        return Err(ScriptError::MalformedSignature);
    }
    let mode_byte = wire[SIGNATURE_LENGTH];
    let mode =
        SighashMode::from_byte(mode_byte).ok_or(ScriptError::UnknownSighashMode(mode_byte))?;
    let mut sig = [0u8; SIGNATURE_LENGTH];
    sig.copy_from_slice(&wire[..SIGNATURE_LENGTH]);
    Ok((BeaconSignature::from_bytes(sig), mode))
}

/// Sign one input and return the wire-format signature.
pub fn sign_input(
    tx: &Transaction,
    input_index: usize,
    subscript: &[u8],
    keypair: &BeaconKeypair,
    mode: SighashMode,
) -> Vec<u8> {
    let digest = signature_hash(tx, input_index, subscript, mode);
    encode_wire_signature(&keypair.sign(&digest), mode)
}

/// Verify a wire signature for one input under a required mode.
///
/// The mode byte embedded in the signature must equal `mode`; a mismatch
/// fails before any curve arithmetic, as does an invalid signature.
pub fn verify_input_signature(
    tx: &Transaction,
    input_index: usize,
    subscript: &[u8],
    pubkey: &BeaconPublicKey,
    wire_signature: &[u8],
    mode: SighashMode,
) -> Result<(), ScriptError> {
    let (signature, embedded_mode) = split_wire_signature(wire_signature)?;
    if embedded_mode != mode {
        return Err(ScriptError::SighashModeMismatch {
            got: embedded_mode.to_byte(),
            want: mode.to_byte(),
        });
    }
    let digest = signature_hash(tx, input_index, subscript, mode);
    if pubkey.verify(&digest, &signature) {
        Ok(())
    } else {
        Err(ScriptError::SignatureRejected)
    }
}
