//! The three interchange messages: project details, the project envelope,
//! and the pledge.
//!
//! These are the payloads that travel between backers, project owners, and
//! servers, and the payloads the wallet persists. They are serde structs
//! with optional, defaulted fields so old parsers skip new fields and new
//! parsers tolerate old data. Anything that gets hashed or signed goes
//! through a hand-rolled canonical byte encoding instead, so identity
//! never depends on a serializer's field ordering.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chain::transaction::encoding;
use crate::chain::{Amount, Transaction, TxOutput};
use crate::crypto::{domain_separated_hash, BeaconPublicKey};
use crate::serde_hex;

/// Domain tag for pledge hashes.
const PLEDGE_HASH_CONTEXT: &str = "beacon.pledge.hash.v1";

// ---------------------------------------------------------------------------
// Project messages
// ---------------------------------------------------------------------------

/// The inner project descriptor: everything a backer needs to construct a
/// pledge, plus human-readable metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetails {
    /// Network identifier the project lives on (e.g. "unittest", "main").
    pub network: String,

    /// Short human-readable project title.
    pub title: String,

    /// Longer free-form description.
    pub memo: String,

    /// The outputs a claim transaction must pay, in order. Their sum is
    /// the project goal.
    pub outputs: Vec<TxOutput>,

    /// Where completed pledges should be submitted, if the owner runs a
    /// collection endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,

    /// Opaque owner-side bookkeeping data, echoed back in submissions.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_hex::opt_bytes")]
    pub merchant_data: Option<Vec<u8>>,

    /// Unix time after which the project stops accepting pledges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,

    /// Unix time the project was created.
    pub time: u64,

    /// Public key the owner authenticates with.
    pub auth_key: BeaconPublicKey,

    /// Keychain index of `auth_key`, recorded so a wallet restored from
    /// seed can locate the key even past its lookahead window.
    pub auth_key_index: u32,
}

impl ProjectDetails {
    /// The project goal: the checked sum of all required outputs.
    pub fn goal(&self) -> Result<Amount, crate::chain::AmountError> {
        Amount::checked_sum(self.outputs.iter().map(|o| o.value))
    }
}

/// The outer project wrapper.
///
/// Carries the descriptor as opaque bytes so future versions can attach a
/// certification signature without breaking existing parsers, and so the
/// project id can hash the exact bytes that were received rather than a
/// re-serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEnvelope {
    /// Serialized [`ProjectDetails`].
    #[serde(with = "serde_hex::bytes")]
    pub serialized_details: Vec<u8>,

    /// Reserved: a future certification signature over the details.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_hex::opt_bytes")]
    pub signature: Option<Vec<u8>>,
}

impl ProjectEnvelope {
    /// Wrap freshly built details.
    pub fn from_details(details: &ProjectDetails) -> Result<Self, serde_json::Error> {
        Ok(Self {
            serialized_details: serde_json::to_vec(details)?,
            signature: None,
        })
    }

    /// Parse the carried details.
    pub fn parse_details(&self) -> Result<ProjectDetails, serde_json::Error> {
        serde_json::from_slice(&self.serialized_details)
    }
}

// ---------------------------------------------------------------------------
// Pledge message
// ---------------------------------------------------------------------------

/// Optional backer contact information attached to a pledge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PledgeContact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A pledge as it travels from backer to project owner.
///
/// `transactions` is ordered: the last entry is the pledge transaction
/// itself, and any earlier entries are dependency transactions needed to
/// resolve the stub it spends. `total_input_value` redundantly declares
/// the stub value so that, once verified against the UTXO oracle, the
/// message can be stored and trusted without re-querying the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PledgeMessage {
    #[serde(with = "serde_hex::byte_vecs")]
    pub transactions: Vec<Vec<u8>>,

    pub total_input_value: Amount,

    /// Unix time the pledge was created.
    pub timestamp: u64,

    /// Id of the project this pledge is for.
    pub project_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<PledgeContact>,
}

impl PledgeMessage {
    /// The serialized pledge transaction: the last entry, by convention.
    pub fn pledge_tx_bytes(&self) -> Option<&[u8]> {
        self.transactions.last().map(Vec::as_slice)
    }

    /// The serialized dependency transactions, in broadcast order.
    pub fn dependency_tx_bytes(&self) -> &[Vec<u8>] {
        match self.transactions.len() {
            0 => &[],
            n => &self.transactions[..n - 1],
        }
    }

    /// Decode the pledge transaction. `None` when the message carries no
    /// transactions or the bytes do not parse.
    pub fn pledge_tx(&self) -> Option<Transaction> {
        Transaction::decode(self.pledge_tx_bytes()?).ok()
    }

    /// Stable identity of this pledge, used as the wallet's bookkeeping
    /// key and to mark revocations.
    pub fn pledge_hash(&self) -> PledgeHash {
        PledgeHash(domain_separated_hash(
            PLEDGE_HASH_CONTEXT,
            &self.canonical_bytes(),
        ))
    }

    /// Deterministic byte encoding covering every field, length-prefixed
    /// throughout.
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + self.transactions.iter().map(Vec::len).sum::<usize>());
        encoding::write_varint(&mut buf, self.transactions.len() as u64);
        for tx in &self.transactions {
            encoding::write_var_bytes(&mut buf, tx);
        }
        encoding::write_u64(&mut buf, self.total_input_value.to_sat());
        encoding::write_u64(&mut buf, self.timestamp);
        encoding::write_var_bytes(&mut buf, self.project_id.as_bytes());
        match &self.contact {
            None => buf.push(0x00),
            Some(contact) => {
                buf.push(0x01);
                encoding::write_var_bytes(
                    &mut buf,
                    contact.name.as_deref().unwrap_or("").as_bytes(),
                );
                encoding::write_var_bytes(
                    &mut buf,
                    contact.email.as_deref().unwrap_or("").as_bytes(),
                );
            }
        }
        buf
    }
}

/// Identity of a pledge message.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PledgeHash([u8; 32]);

impl PledgeHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PledgeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PledgeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PledgeHash({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Address;
    use crate::crypto::BeaconKeypair;

    fn sample_details() -> ProjectDetails {
        let key = BeaconKeypair::generate().public_key();
        ProjectDetails {
            network: "unittest".into(),
            title: "My cool project".into(),
            memo: "A project to make awesome things ... out of Lego!".into(),
            outputs: vec![TxOutput::pay_to_address(
                Amount::COIN,
                &Address::from_public_key(&key),
            )],
            payment_url: None,
            merchant_data: None,
            expires: None,
            time: 1_400_000_000,
            auth_key: key,
            auth_key_index: 0,
        }
    }

    fn sample_pledge() -> PledgeMessage {
        PledgeMessage {
            transactions: vec![vec![0xAA, 0xBB], vec![0xCC]],
            total_input_value: Amount::from_sat(10_000_000),
            timestamp: 1_400_000_100,
            project_id: "abc".into(),
            contact: None,
        }
    }

    #[test]
    fn details_json_roundtrip() {
        let details = sample_details();
        let json = serde_json::to_string(&details).unwrap();
        let back: ProjectDetails = serde_json::from_str(&json).unwrap();
        assert_eq!(back, details);
    }

    #[test]
    fn envelope_preserves_details_bytes() {
        let details = sample_details();
        let envelope = ProjectEnvelope::from_details(&details).unwrap();
        assert_eq!(envelope.parse_details().unwrap(), details);

        // The envelope round-trips without touching the inner bytes.
        let json = serde_json::to_string(&envelope).unwrap();
        let back: ProjectEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.serialized_details, envelope.serialized_details);
    }

    #[test]
    fn unknown_detail_fields_are_tolerated() {
        // A newer serializer may add fields; an older parser must not choke.
        let details = sample_details();
        let mut value = serde_json::to_value(&details).unwrap();
        value["certification_level"] = serde_json::json!(3);
        let back: ProjectDetails = serde_json::from_value(value).unwrap();
        assert_eq!(back, details);
    }

    #[test]
    fn pledge_tx_is_last_entry() {
        let pledge = sample_pledge();
        assert_eq!(pledge.pledge_tx_bytes(), Some(&[0xCC][..]));
        assert_eq!(pledge.dependency_tx_bytes(), &[vec![0xAA, 0xBB]]);
    }

    #[test]
    fn empty_pledge_has_no_tx() {
        let mut pledge = sample_pledge();
        pledge.transactions.clear();
        assert!(pledge.pledge_tx_bytes().is_none());
        assert!(pledge.pledge_tx().is_none());
        assert!(pledge.dependency_tx_bytes().is_empty());
    }

    #[test]
    fn pledge_hash_is_stable_and_field_sensitive() {
        let pledge = sample_pledge();
        assert_eq!(pledge.pledge_hash(), pledge.clone().pledge_hash());

        let mut tampered = pledge.clone();
        tampered.total_input_value = Amount::from_sat(20_000_000);
        assert_ne!(tampered.pledge_hash(), pledge.pledge_hash());

        let mut contact = pledge.clone();
        contact.contact = Some(PledgeContact {
            name: Some("Satoshi".into()),
            email: None,
        });
        assert_ne!(contact.pledge_hash(), pledge.pledge_hash());
    }

    #[test]
    fn pledge_json_roundtrip() {
        let pledge = sample_pledge();
        let json = serde_json::to_string(&pledge).unwrap();
        let back: PledgeMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pledge);
    }
}
