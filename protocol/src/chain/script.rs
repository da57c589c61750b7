//! Scripts: the spending conditions on transaction outputs.
//!
//! The core treats script bytes as opaque except for two jobs:
//!
//! 1. **Classification.** Project outputs and pledge outputs must belong to
//!    one of the standard templates (pay-to-key-hash, pay-to-pubkey,
//!    m-of-n multisig); anything else is non-standard and a verifier
//!    rejects it. Template matching is over raw bytes, so byte equality is
//!    the comparison everywhere.
//!
//! 2. **Execution.** Verifying a pledge means actually running each input's
//!    signature script against the script of the output it spends. The
//!    interpreter below is a small stack machine covering exactly the
//!    opcodes the standard templates use.

use thiserror::Error;

use super::address::Address;
use super::sighash;
use super::transaction::Transaction;
use crate::config::{KEY_HASH_LENGTH, PUBLIC_KEY_LENGTH, WIRE_SIGNATURE_LENGTH};
use crate::crypto::{hash, BeaconPublicKey};

/// Opcodes understood by the interpreter. Byte values match the classic
/// UTXO script encoding so raw scripts read familiarly in hex dumps.
pub mod opcodes {
    /// Push an empty item.
    pub const OP_0: u8 = 0x00;
    /// Largest direct push: lengths 0x01..=0x4b prefix that many raw bytes.
    pub const MAX_DIRECT_PUSH: u8 = 0x4b;
    /// OP_1 through OP_16 push the small numbers 1..=16.
    pub const OP_1: u8 = 0x51;
    pub const OP_16: u8 = 0x60;
    /// Duplicate the top stack item.
    pub const OP_DUP: u8 = 0x76;
    /// Verify the top two items are equal, consuming both.
    pub const OP_EQUALVERIFY: u8 = 0x88;
    /// Pop a public key, hash it, push the 20-byte key hash.
    pub const OP_KEYHASH: u8 = 0xa9;
    /// Pop a public key and a signature, verify against the spending tx.
    pub const OP_CHECKSIG: u8 = 0xac;
    /// m-of-n threshold signature check.
    pub const OP_CHECKMULTISIG: u8 = 0xae;
}

use self::opcodes::*;

/// Errors raised while parsing or executing scripts, including signature
/// failures surfaced by OP_CHECKSIG.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("truncated push in script")]
    TruncatedPush,

    #[error("opcode {0:#04x} is not a push; signature scripts are push-only")]
    NonPushInSignatureScript(u8),

    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("stack underflow during script execution")]
    StackUnderflow,

    #[error("OP_EQUALVERIFY failed")]
    EqualVerifyFailed,

    #[error("malformed signature: expected {WIRE_SIGNATURE_LENGTH} bytes")]
    MalformedSignature,

    #[error("unknown sighash mode byte {0:#04x}")]
    UnknownSighashMode(u8),

    #[error("sighash mode byte {got:#04x} does not match required mode {want:#04x}")]
    SighashModeMismatch { got: u8, want: u8 },

    #[error("malformed public key in script")]
    MalformedPublicKey,

    #[error("malformed multisig parameters")]
    MalformedMultisig,

    #[error("signature rejected")]
    SignatureRejected,

    #[error("script finished with a false or empty stack")]
    FalseStackTop,

    #[error("input index {index} out of range for transaction with {inputs} inputs")]
    InputIndexOutOfRange { index: usize, inputs: usize },
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// The standard output script templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptTemplate {
    /// `OP_DUP OP_KEYHASH <20-byte hash> OP_EQUALVERIFY OP_CHECKSIG`
    PayToKeyHash { key_hash: [u8; KEY_HASH_LENGTH] },
    /// `<32-byte pubkey> OP_CHECKSIG`
    PayToPubkey { pubkey: [u8; PUBLIC_KEY_LENGTH] },
    /// `OP_m <pubkey>... OP_n OP_CHECKMULTISIG`
    Multisig {
        required: u8,
        pubkeys: Vec<[u8; PUBLIC_KEY_LENGTH]>,
    },
    /// Anything else. Not relayed, not accepted in project outputs.
    NonStandard,
}

/// Classify a raw script against the standard templates.
pub fn classify(script: &[u8]) -> ScriptTemplate {
    if let Some(key_hash) = match_pay_to_key_hash(script) {
        return ScriptTemplate::PayToKeyHash { key_hash };
    }
    if let Some(pubkey) = match_pay_to_pubkey(script) {
        return ScriptTemplate::PayToPubkey { pubkey };
    }
    if let Some((required, pubkeys)) = match_multisig(script) {
        return ScriptTemplate::Multisig { required, pubkeys };
    }
    ScriptTemplate::NonStandard
}

/// The standardness predicate: membership in one of the three templates.
pub fn is_standard(script: &[u8]) -> bool {
    !matches!(classify(script), ScriptTemplate::NonStandard)
}

fn match_pay_to_key_hash(script: &[u8]) -> Option<[u8; KEY_HASH_LENGTH]> {
    if script.len() != 25 {
        return None;
    }
    if script[0] != OP_DUP
        || script[1] != OP_KEYHASH
        || script[2] != KEY_HASH_LENGTH as u8
        || script[23] != OP_EQUALVERIFY
        || script[24] != OP_CHECKSIG
    {
        return None;
    }
    let mut key_hash = [0u8; KEY_HASH_LENGTH];
    key_hash.copy_from_slice(&script[3..23]);
    Some(key_hash)
}

fn match_pay_to_pubkey(script: &[u8]) -> Option<[u8; PUBLIC_KEY_LENGTH]> {
    if script.len() != 2 + PUBLIC_KEY_LENGTH {
        return None;
    }
    if script[0] != PUBLIC_KEY_LENGTH as u8 || script[script.len() - 1] != OP_CHECKSIG {
        return None;
    }
    let mut pubkey = [0u8; PUBLIC_KEY_LENGTH];
    pubkey.copy_from_slice(&script[1..1 + PUBLIC_KEY_LENGTH]);
    Some(pubkey)
}

fn match_multisig(script: &[u8]) -> Option<(u8, Vec<[u8; PUBLIC_KEY_LENGTH]>)> {
    // Shortest multisig: OP_1 <key> OP_1 OP_CHECKMULTISIG.
    if script.len() < 3 + 1 + PUBLIC_KEY_LENGTH {
        return None;
    }
    if script[script.len() - 1] != OP_CHECKMULTISIG {
        return None;
    }
    let required = small_num(script[0])?;
    let total = small_num(script[script.len() - 2])?;
    if required == 0 || total == 0 || required > total {
        return None;
    }
    let mut pubkeys = Vec::with_capacity(total as usize);
    let mut cursor = 1;
    let keys_end = script.len() - 2;
    while cursor < keys_end {
        if script[cursor] != PUBLIC_KEY_LENGTH as u8 {
            return None;
        }
        cursor += 1;
        if cursor + PUBLIC_KEY_LENGTH > keys_end {
            return None;
        }
        let mut key = [0u8; PUBLIC_KEY_LENGTH];
        key.copy_from_slice(&script[cursor..cursor + PUBLIC_KEY_LENGTH]);
        pubkeys.push(key);
        cursor += PUBLIC_KEY_LENGTH;
    }
    if pubkeys.len() != total as usize {
        return None;
    }
    Some((required, pubkeys))
}

fn small_num(op: u8) -> Option<u8> {
    if (OP_1..=OP_16).contains(&op) {
        Some(op - OP_1 + 1)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn push_data(buf: &mut Vec<u8>, data: &[u8]) {
    debug_assert!(data.len() <= MAX_DIRECT_PUSH as usize);
    buf.push(data.len() as u8);
    buf.extend_from_slice(data);
}

/// Build a pay-to-key-hash output script.
pub fn pay_to_key_hash(key_hash: &[u8; KEY_HASH_LENGTH]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_KEYHASH);
    push_data(&mut script, key_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Build the output script paying to an address.
pub fn pay_to_address(address: &Address) -> Vec<u8> {
    pay_to_key_hash(address.key_hash())
}

/// Build a pay-to-pubkey output script.
pub fn pay_to_pubkey(pubkey: &BeaconPublicKey) -> Vec<u8> {
    let mut script = Vec::with_capacity(2 + PUBLIC_KEY_LENGTH);
    push_data(&mut script, pubkey.as_bytes());
    script.push(OP_CHECKSIG);
    script
}

/// Build an m-of-n multisig output script.
pub fn multisig(required: u8, pubkeys: &[BeaconPublicKey]) -> Vec<u8> {
    assert!(
        required >= 1 && (required as usize) <= pubkeys.len() && pubkeys.len() <= 16,
        "multisig parameters out of range"
    );
    let mut script = Vec::with_capacity(3 + pubkeys.len() * (1 + PUBLIC_KEY_LENGTH));
    script.push(OP_1 + required - 1);
    for key in pubkeys {
        push_data(&mut script, key.as_bytes());
    }
    script.push(OP_1 + pubkeys.len() as u8 - 1);
    script.push(OP_CHECKMULTISIG);
    script
}

/// Input script spending a pay-to-key-hash output: `<sig> <pubkey>`.
pub fn key_hash_input_script(wire_signature: &[u8], pubkey: &BeaconPublicKey) -> Vec<u8> {
    let mut script = Vec::with_capacity(2 + wire_signature.len() + PUBLIC_KEY_LENGTH);
    push_data(&mut script, wire_signature);
    push_data(&mut script, pubkey.as_bytes());
    script
}

/// Input script spending a pay-to-pubkey output: `<sig>`.
pub fn pubkey_input_script(wire_signature: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(1 + wire_signature.len());
    push_data(&mut script, wire_signature);
    script
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

/// Run input `input_index`'s signature script against the script of the
/// output it spends, in the context of `tx`.
///
/// This is the whole spend-authorization check: the signature script may
/// only push data, and the prevout script then consumes those pushes.
pub fn verify_input_spend(
    tx: &Transaction,
    input_index: usize,
    prevout_script: &[u8],
) -> Result<(), ScriptError> {
    let input = tx
        .inputs
        .get(input_index)
        .ok_or(ScriptError::InputIndexOutOfRange {
            index: input_index,
            inputs: tx.inputs.len(),
        })?;
    let mut stack = parse_pushes(&input.script_sig)?;
    execute(prevout_script, &mut stack, tx, input_index)?;
    match stack.last() {
        Some(top) if is_truthy(top) => Ok(()),
        _ => Err(ScriptError::FalseStackTop),
    }
}

/// Parse a push-only script into its stack items.
fn parse_pushes(script: &[u8]) -> Result<Vec<Vec<u8>>, ScriptError> {
    let mut stack = Vec::new();
    let mut cursor = 0;
    while cursor < script.len() {
        let op = script[cursor];
        cursor += 1;
        match op {
            OP_0 => stack.push(Vec::new()),
            1..=MAX_DIRECT_PUSH => {
                let len = op as usize;
                if cursor + len > script.len() {
                    return Err(ScriptError::TruncatedPush);
                }
                stack.push(script[cursor..cursor + len].to_vec());
                cursor += len;
            }
            OP_1..=OP_16 => stack.push(vec![op - OP_1 + 1]),
            other => return Err(ScriptError::NonPushInSignatureScript(other)),
        }
    }
    Ok(stack)
}

/// Execute an output script over an existing stack.
fn execute(
    script: &[u8],
    stack: &mut Vec<Vec<u8>>,
    tx: &Transaction,
    input_index: usize,
) -> Result<(), ScriptError> {
    let mut cursor = 0;
    while cursor < script.len() {
        let op = script[cursor];
        cursor += 1;
        match op {
            OP_0 => stack.push(Vec::new()),
            1..=MAX_DIRECT_PUSH => {
                let len = op as usize;
                if cursor + len > script.len() {
                    return Err(ScriptError::TruncatedPush);
                }
                stack.push(script[cursor..cursor + len].to_vec());
                cursor += len;
            }
            OP_1..=OP_16 => stack.push(vec![op - OP_1 + 1]),
            OP_DUP => {
                let top = stack.last().ok_or(ScriptError::StackUnderflow)?.clone();
                stack.push(top);
            }
            OP_KEYHASH => {
                let data = stack.pop().ok_or(ScriptError::StackUnderflow)?;
                stack.push(hash::key_hash(&data).to_vec());
            }
            OP_EQUALVERIFY => {
                let a = stack.pop().ok_or(ScriptError::StackUnderflow)?;
                let b = stack.pop().ok_or(ScriptError::StackUnderflow)?;
                if a != b {
                    return Err(ScriptError::EqualVerifyFailed);
                }
            }
            OP_CHECKSIG => {
                let pubkey = stack.pop().ok_or(ScriptError::StackUnderflow)?;
                let signature = stack.pop().ok_or(ScriptError::StackUnderflow)?;
                check_signature(tx, input_index, script, &pubkey, &signature)?;
                stack.push(vec![1]);
            }
            OP_CHECKMULTISIG => {
                run_checkmultisig(stack, tx, input_index, script)?;
                stack.push(vec![1]);
            }
            other => return Err(ScriptError::UnknownOpcode(other)),
        }
    }
    Ok(())
}

fn run_checkmultisig(
    stack: &mut Vec<Vec<u8>>,
    tx: &Transaction,
    input_index: usize,
    subscript: &[u8],
) -> Result<(), ScriptError> {
    let total = pop_count(stack)?;
    if total == 0 || total > 16 {
        return Err(ScriptError::MalformedMultisig);
    }
    let mut pubkeys = Vec::with_capacity(total);
    for _ in 0..total {
        pubkeys.push(stack.pop().ok_or(ScriptError::StackUnderflow)?);
    }
    pubkeys.reverse();

    let required = pop_count(stack)?;
    if required == 0 || required > total {
        return Err(ScriptError::MalformedMultisig);
    }
    let mut signatures = Vec::with_capacity(required);
    for _ in 0..required {
        signatures.push(stack.pop().ok_or(ScriptError::StackUnderflow)?);
    }
    signatures.reverse();

    // Signatures must appear in key order; each key is tried at most once.
    let mut key_cursor = 0;
    for signature in &signatures {
        let mut matched = false;
        while key_cursor < pubkeys.len() {
            let key = &pubkeys[key_cursor];
            key_cursor += 1;
            if check_signature(tx, input_index, subscript, key, signature).is_ok() {
                matched = true;
                break;
            }
        }
        if !matched {
            return Err(ScriptError::SignatureRejected);
        }
    }
    Ok(())
}

fn pop_count(stack: &mut Vec<Vec<u8>>) -> Result<usize, ScriptError> {
    let item = stack.pop().ok_or(ScriptError::StackUnderflow)?;
    match item.as_slice() {
        [] => Ok(0),
        [n] => Ok(*n as usize),
        _ => Err(ScriptError::MalformedMultisig),
    }
}

/// Verify a wire signature (64 bytes plus mode byte) for the given input.
///
/// The digest is recomputed from the transaction under the mode the
/// signature itself declares; the signer's mode commitment is therefore
/// covered by the signature and cannot be stripped or swapped.
fn check_signature(
    tx: &Transaction,
    input_index: usize,
    subscript: &[u8],
    pubkey_bytes: &[u8],
    wire_signature: &[u8],
) -> Result<(), ScriptError> {
    let (signature, mode) = sighash::split_wire_signature(wire_signature)?;
    let pubkey =
        BeaconPublicKey::from_slice(pubkey_bytes).map_err(|_| ScriptError::MalformedPublicKey)?;
    let digest = sighash::signature_hash(tx, input_index, subscript, mode);
    if pubkey.verify(&digest, &signature) {
        Ok(())
    } else {
        Err(ScriptError::SignatureRejected)
    }
}

fn is_truthy(data: &[u8]) -> bool {
    data.iter().any(|b| *b != 0)
}
