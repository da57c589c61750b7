//! # Protocol Configuration & Constants
//!
//! Every magic number in beacon lives here. The chain-level values are part
//! of the consensus surface of the underlying UTXO network: changing them
//! breaks compatibility with every deployed wallet and every pledge already
//! in flight, so treat this file as frozen outside of a network upgrade.

// ---------------------------------------------------------------------------
// Monetary Units
// ---------------------------------------------------------------------------

/// Satoshis per coin. All amounts in the protocol are integer satoshi
/// counts; no floating point anywhere near money.
pub const COIN: u64 = 100_000_000;

/// Maximum number of satoshis that can ever exist. Checked amount
/// arithmetic fails past this bound instead of wrapping.
pub const MAX_MONEY: u64 = 21_000_000 * COIN;

/// Flat minimum fee attached to revocation transactions and to the
/// fee-adding contract finalization step. Pledges themselves carry no
/// change output, so fee handling stays out of the pledge path entirely.
pub const MIN_TX_FEE: u64 = 10_000;

// ---------------------------------------------------------------------------
// Transaction Format
// ---------------------------------------------------------------------------

/// Transaction format version emitted by the builder.
pub const TX_VERSION: u32 = 1;

/// Sequence value marking an input as final.
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Default lock time: spendable immediately.
pub const LOCK_TIME_NONE: u32 = 0;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 public keys are 32 bytes and appear verbatim in pay-to-pubkey
/// scripts and project auth keys.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 signatures are 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// A signature as it appears inside an input script: the 64 raw signature
/// bytes followed by the one-byte sighash mode the signer committed to.
pub const WIRE_SIGNATURE_LENGTH: usize = SIGNATURE_LENGTH + 1;

/// Key hashes in pay-to-key-hash scripts and addresses are truncated
/// SHA-256 digests, 20 bytes.
pub const KEY_HASH_LENGTH: usize = 20;

/// AES-256-GCM key length for sealed keychain seeds.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length. 96 bits, the only length you should use.
pub const AES_NONCE_LENGTH: usize = 12;

// ---------------------------------------------------------------------------
// Keychain
// ---------------------------------------------------------------------------

/// How many keys past the highest issued index the keychain scans when
/// asked to locate a key by its public bytes. A project created with an
/// auth key beyond this window records the key index in its descriptor so
/// a wallet restored from seed can still prove ownership.
pub const KEYCHAIN_LOOKAHEAD: u32 = 10;
