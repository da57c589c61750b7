//! End-to-end tests for the assurance-contract protocol.
//!
//! These exercise the full pledge lifecycle across module boundaries:
//! project construction, pledge creation against a wallet, every
//! verification failure mode, contract assembly, owner authentication,
//! and claim observation. Each test stands alone; there is no shared
//! state and no ordering dependency between them.
//!
//! Amounts are satoshis on a unit-test chain. The canonical scenario: a
//! project with a 1-coin (100_000_000 satoshi) goal and backers pledging
//! percentages of it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use beacon_protocol::chain::{
    script, Address, Amount, OutPoint, SighashMode, Transaction, TransactionBuilder, TxId,
    TxInput, TxOutput,
};
use beacon_protocol::crypto::BeaconKeypair;
use beacon_protocol::ports::{
    BroadcastError, Broadcaster, Clock, KeyProvider, PortFuture, UtxoOracle,
};
use beacon_protocol::project::{
    PledgeMessage, Project, VerificationError,
};
use beacon_protocol::wallet::keychain::SeedKeychain;
use beacon_protocol::wallet::persistence::MemoryPersister;
use beacon_protocol::wallet::{InlineExecutor, PledgingWallet};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// An oracle over a fixed UTXO set.
#[derive(Default)]
struct StaticOracle {
    utxos: HashMap<OutPoint, TxOutput>,
}

impl StaticOracle {
    fn empty() -> Self {
        Self::default()
    }

    fn with(utxos: impl IntoIterator<Item = (OutPoint, TxOutput)>) -> Self {
        Self {
            utxos: utxos.into_iter().collect(),
        }
    }
}

impl UtxoOracle for StaticOracle {
    fn resolve(&self, outpoints: Vec<OutPoint>) -> PortFuture<Vec<Option<TxOutput>>> {
        let resolved = outpoints
            .iter()
            .map(|outpoint| self.utxos.get(outpoint).cloned())
            .collect();
        Box::pin(std::future::ready(resolved))
    }
}

/// A broadcaster that accepts everything and remembers it.
#[derive(Default)]
struct LoopbackBroadcaster {
    sent: Mutex<Vec<Transaction>>,
}

impl Broadcaster for LoopbackBroadcaster {
    fn broadcast(&self, tx: Transaction) -> PortFuture<Result<Transaction, BroadcastError>> {
        self.sent.lock().push(tx.clone());
        Box::pin(std::future::ready(Ok(tx)))
    }
}

struct FixedClock(u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const GOAL: u64 = 100_000_000;

fn make_project(goal: u64) -> Project {
    let owner = BeaconKeypair::generate();
    let details = Project::make_details(
        "My cool project",
        "A project to make awesome things ... out of Lego!",
        &Address::from_public_key(&owner.public_key()),
        Amount::from_sat(goal),
        &owner.public_key(),
        0,
        1_400_000_000,
    );
    Project::from_details(&details).expect("valid project")
}

/// A pledge of `sats` built from a made-up funded stub, as a backer's
/// wallet would construct it. Returns the message plus the stub's
/// outpoint and output for seeding oracles.
fn make_pledge(project: &Project, sats: u64) -> (PledgeMessage, OutPoint, TxOutput) {
    let backer = BeaconKeypair::generate();
    let funding = Transaction {
        version: 1,
        inputs: vec![TxInput::unsigned(OutPoint::new(
            TxId(rand::random::<[u8; 32]>()),
            0,
        ))],
        outputs: vec![TxOutput::pay_to_address(
            Amount::from_sat(sats),
            &Address::from_public_key(&backer.public_key()),
        )],
        lock_time: 0,
    };
    let stub_outpoint = OutPoint::new(funding.txid(), 0);
    let stub = funding.outputs[0].clone();

    let mut builder = TransactionBuilder::new();
    builder.add_input(stub_outpoint, stub.clone());
    for output in project.outputs() {
        builder.add_output(output.clone());
    }
    builder
        .sign_input(0, &backer, SighashMode::AllAnyoneCanPay)
        .expect("signable");
    let tx = builder.finish().round_trip().expect("codec is lossless");

    let message = PledgeMessage {
        transactions: vec![tx.encode()],
        total_input_value: Amount::from_sat(sats),
        timestamp: 1_400_000_100,
        project_id: project.id().to_owned(),
        contact: None,
    };
    (message, stub_outpoint, stub)
}

fn rebuild_message(message: &PledgeMessage, tx: &Transaction) -> PledgeMessage {
    PledgeMessage {
        transactions: vec![tx.encode()],
        ..message.clone()
    }
}

// ---------------------------------------------------------------------------
// Universal properties
// ---------------------------------------------------------------------------

#[test]
fn accessors_and_serialization_roundtrip() {
    let project = make_project(GOAL);
    assert_eq!(project.title(), "My cool project");
    assert_eq!(
        project.memo(),
        "A project to make awesome things ... out of Lego!"
    );
    assert_eq!(project.goal_amount(), Amount::from_sat(GOAL));

    // serialize -> parse -> reserialize is byte identity.
    let bytes = serde_json::to_vec(project.envelope()).unwrap();
    let reparsed = Project::from_envelope(serde_json::from_slice(&bytes).unwrap()).unwrap();
    assert_eq!(serde_json::to_vec(reparsed.envelope()).unwrap(), bytes);
    assert_eq!(reparsed.id(), project.id());
}

#[test]
fn slug_is_deterministic() {
    assert_eq!(
        beacon_protocol::project::title_to_url_slug(
            "A really $cool %20 Title with ;;lots asdf\n of weird // chars"
        ),
        "a-really-cool-20-title-with-lots-asdf-of-weird--chars"
    );
}

#[test]
fn appended_inputs_do_not_invalidate_pledge_signature() {
    let project = make_project(GOAL);
    let (message, _, stub) = make_pledge(&project, 10_000_000);
    let pledge_tx = message.pledge_tx().unwrap();
    assert!(SighashMode::AllAnyoneCanPay.permits_appended_inputs());

    // Splice the pledge's input into a transaction with arbitrary extra
    // inputs, in an arbitrary position.
    let (other, _, other_stub) = make_pledge(&project, 90_000_000);
    let other_tx = other.pledge_tx().unwrap();
    let mut builder = TransactionBuilder::new();
    builder.add_signed_input(other_tx.inputs[0].clone());
    builder.add_signed_input(pledge_tx.inputs[0].clone());
    builder.add_signed_input(TxInput::unsigned(OutPoint::new(TxId([0xEE; 32]), 7)));
    for output in project.outputs() {
        builder.add_output(output.clone());
    }
    let combined = builder.finish();

    script::verify_input_spend(&combined, 0, &other_stub.script).expect("sibling still valid");
    script::verify_input_spend(&combined, 1, &stub.script).expect("pledge still valid");
}

// ---------------------------------------------------------------------------
// Verification scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s1_happy_path() {
    let project = make_project(GOAL);
    let (message, outpoint, stub) = make_pledge(&project, 10_000_000);
    let oracle = StaticOracle::with([(outpoint, stub)]);

    let verified = project.verify_pledge(&oracle, &message).await.unwrap();
    assert_eq!(verified.total_input_value, Amount::from_sat(10_000_000));
    assert_eq!(verified.total_input_value, message.total_input_value);
    assert_eq!(verified.transaction.outputs, project.outputs());
}

#[tokio::test]
async fn s2_missing_utxo() {
    let project = make_project(GOAL);
    let (message, _, _) = make_pledge(&project, 10_000_000);
    let err = project
        .verify_pledge(&StaticOracle::empty(), &message)
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::UnknownUtxo { .. }));
}

#[tokio::test]
async fn s3_tampered_declared_value() {
    let project = make_project(GOAL);
    let (mut message, outpoint, stub) = make_pledge(&project, 10_000_000);
    message.total_input_value = Amount::from_sat(20_000_000);
    let err = project
        .verify_pledge(&StaticOracle::with([(outpoint, stub)]), &message)
        .await
        .unwrap_err();
    match err {
        VerificationError::CachedValueMismatch { declared, resolved } => {
            assert_eq!(declared, Amount::from_sat(20_000_000));
            assert_eq!(resolved, Amount::from_sat(10_000_000));
        }
        other => panic!("expected CachedValueMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn s4_tampered_output_amount() {
    let project = make_project(GOAL);
    let (message, outpoint, stub) = make_pledge(&project, 10_000_000);
    let mut tx = message.pledge_tx().unwrap();
    tx.outputs[0].value = Amount::from_sat(100);
    let tampered = rebuild_message(&message, &tx);
    let err = project
        .verify_pledge(&StaticOracle::with([(outpoint, stub)]), &tampered)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VerificationError::OutputMismatch { index: 0 }
    ));
}

#[tokio::test]
async fn s5_project_grew_an_output() {
    let project = make_project(GOAL);
    let (message, outpoint, stub) = make_pledge(&project, 10_000_000);

    // The project is extended with a second required output after the
    // pledge was made.
    let mut details = project.details().clone();
    details
        .outputs
        .push(TxOutput::new(Amount::from_sat(100), details.outputs[0].script.clone()));
    let extended = Project::from_details(&details).unwrap();

    let err = extended
        .verify_pledge(&StaticOracle::with([(outpoint, stub)]), &message)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VerificationError::TxWrongNumberOfOutputs { got: 1, want: 2 }
    ));
}

#[test]
fn s6_duplicated_input_outpoint() {
    let project = make_project(GOAL);
    let (message, _, _) = make_pledge(&project, 10_000_000);
    let mut tx = message.pledge_tx().unwrap();
    tx.inputs.push(tx.inputs[0].clone());
    let tampered = rebuild_message(&message, &tx);

    let err = project.fast_sanity_check(&tampered).unwrap_err();
    assert!(matches!(err, VerificationError::DuplicatedOutPoint { .. }));
}

#[tokio::test]
async fn s7_dummy_signature() {
    let project = make_project(GOAL);
    let (message, outpoint, stub) = make_pledge(&project, 10_000_000);
    let mut tx = message.pledge_tx().unwrap();

    // Replace the real signature with a zeroed placeholder of the right
    // shape (64 zero bytes plus a valid mode byte).
    let backer_pubkey = {
        let script_sig = &tx.inputs[0].script_sig;
        let sig_len = script_sig[0] as usize;
        script_sig[2 + sig_len..].to_vec()
    };
    let mut dummy_wire = vec![0u8; 64];
    dummy_wire.push(SighashMode::AllAnyoneCanPay.to_byte());
    let mut script_sig = vec![dummy_wire.len() as u8];
    script_sig.extend_from_slice(&dummy_wire);
    script_sig.push(backer_pubkey.len() as u8);
    script_sig.extend_from_slice(&backer_pubkey);
    tx.inputs[0].script_sig = script_sig;

    let tampered = rebuild_message(&message, &tx);
    let err = project
        .verify_pledge(&StaticOracle::with([(outpoint, stub)]), &tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::Script(_)));
}

#[tokio::test]
async fn nonstandard_pledge_output_rejected() {
    // A project whose output script is outside the standard templates:
    // the pledge necessarily copies it and must be rejected as such.
    let owner = BeaconKeypair::generate();
    let mut details = Project::make_details(
        "weird",
        "anyone-can-spend goal",
        &Address::from_public_key(&owner.public_key()),
        Amount::from_sat(GOAL),
        &owner.public_key(),
        0,
        1_400_000_000,
    );
    details.outputs[0].script = vec![0x51]; // bare OP_1
    let project = Project::from_details(&details).unwrap();
    let (message, outpoint, stub) = make_pledge(&project, 10_000_000);

    let err = project
        .verify_pledge(&StaticOracle::with([(outpoint, stub)]), &message)
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::NonStandard { index: 0 }));
}

// ---------------------------------------------------------------------------
// Contract assembly scenarios
// ---------------------------------------------------------------------------

#[test]
fn s8_contract_complete() {
    let project = make_project(GOAL);
    let (pledge1, _, _) = make_pledge(&project, 10_000_000);
    let (pledge2, _, _) = make_pledge(&project, 90_000_000);

    let contract = project
        .complete_contract_strict([&pledge1, &pledge2].into_iter())
        .unwrap();
    assert_eq!(contract.inputs.len(), 2);
    assert_eq!(contract.outputs, project.outputs());
}

#[test]
fn s9_contract_incomplete() {
    let project = make_project(GOAL);
    let (pledge1, _, _) = make_pledge(&project, 10_000_000);
    let (pledge2, _, _) = make_pledge(&project, 70_000_000);

    // Lenient assembly still yields a two-input transaction.
    let contract = project
        .complete_contract([&pledge1, &pledge2].into_iter())
        .unwrap();
    assert_eq!(contract.inputs.len(), 2);

    // Strict finalization refuses the shortfall.
    let err = project
        .complete_contract_strict([&pledge1, &pledge2].into_iter())
        .unwrap_err();
    assert!(matches!(err, VerificationError::ValueMismatch { .. }));
}

#[tokio::test]
async fn assembled_contract_passes_script_validation() {
    let project = make_project(GOAL);
    let (pledge1, outpoint1, stub1) = make_pledge(&project, 10_000_000);
    let (pledge2, outpoint2, stub2) = make_pledge(&project, 90_000_000);

    // Both pledges verify individually.
    let oracle = StaticOracle::with([(outpoint1, stub1.clone()), (outpoint2, stub2.clone())]);
    project.verify_pledge(&oracle, &pledge1).await.unwrap();
    project.verify_pledge(&oracle, &pledge2).await.unwrap();

    // And their signatures hold inside the combined transaction.
    let contract = project
        .complete_contract_strict([&pledge1, &pledge2].into_iter())
        .unwrap();
    let stub_for = |input: &TxInput| {
        if input.outpoint == outpoint1 {
            stub1.clone()
        } else {
            stub2.clone()
        }
    };
    for (index, input) in contract.inputs.iter().enumerate() {
        script::verify_input_spend(&contract, index, &stub_for(input).script)
            .expect("pledge signature survives assembly");
    }
}

// ---------------------------------------------------------------------------
// Owner authentication
// ---------------------------------------------------------------------------

#[test]
fn s10_owner_auth() {
    let keys = SeedKeychain::generate();
    let (auth_key, index) = keys.fresh_auth_key();
    let details = Project::make_details(
        "My cool project",
        "Lego!",
        &keys.fresh_receive_address(),
        Amount::from_sat(GOAL),
        &auth_key,
        index,
        1_400_000_000,
    );
    let project = Project::from_details(&details).unwrap();

    let signature = project.sign_as_owner(&keys, "legolegolego").unwrap();
    project
        .authenticate_owner("legolegolego", &signature)
        .unwrap();
    project
        .authenticate_owner("duplo!duplo!duplo!", &signature)
        .unwrap_err();
}

// ---------------------------------------------------------------------------
// Full wallet lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wallet_pledge_verify_claim_lifecycle() {
    // Backer wallet with funds.
    let keys = Arc::new(SeedKeychain::generate());
    let broadcaster = Arc::new(LoopbackBroadcaster::default());
    let wallet = PledgingWallet::new(
        keys.clone(),
        broadcaster.clone(),
        Arc::new(FixedClock(1_400_000_000)),
        Arc::new(MemoryPersister::new()),
    );
    let funding = Transaction {
        version: 1,
        inputs: vec![TxInput::unsigned(OutPoint::new(TxId([0x11; 32]), 0))],
        outputs: vec![TxOutput::pay_to_address(
            Amount::from_sat(50_000_000),
            &keys.fresh_receive_address(),
        )],
        lock_time: 0,
    };
    wallet.notify_transaction(&funding);

    // Pledge 10% of a 1-coin project; a dependency is needed.
    let project = make_project(GOAL);
    let mut pending = wallet
        .create_pledge(&project, Amount::from_sat(10_000_000))
        .unwrap();
    let message = wallet.commit(&mut pending, true).await.unwrap();
    let dependency = pending.dependency.clone().expect("dependency was needed");
    assert_eq!(broadcaster.sent.lock().clone(), vec![dependency.clone()]);

    // The project owner verifies against an oracle that knows the
    // broadcast dependency's outputs.
    let oracle = StaticOracle::with(
        dependency
            .outputs
            .iter()
            .cloned()
            .enumerate()
            .map(|(vout, output)| (OutPoint::new(dependency.txid(), vout as u32), output)),
    );
    let verified = project.verify_pledge(&oracle, &message).await.unwrap();
    assert_eq!(verified.total_input_value, Amount::from_sat(10_000_000));

    // A 90% pledge arrives from elsewhere; the contract completes, and
    // the backer wallet recognizes the claim when it sees the contract.
    let (other, _, _) = make_pledge(&project, 90_000_000);
    let contract = project
        .complete_contract_strict([&message, &other].into_iter())
        .unwrap();

    let claims = Arc::new(AtomicU32::new(0));
    let seen = claims.clone();
    wallet.add_on_claim_handler(
        move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        },
        Arc::new(InlineExecutor),
    );
    wallet.notify_transaction(&contract);
    assert_eq!(claims.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn wallet_revocation_lifecycle() {
    let keys = Arc::new(SeedKeychain::generate());
    let broadcaster = Arc::new(LoopbackBroadcaster::default());
    let wallet = PledgingWallet::new(
        keys.clone(),
        broadcaster.clone(),
        Arc::new(FixedClock(1_400_000_000)),
        Arc::new(MemoryPersister::new()),
    );
    let funding = Transaction {
        version: 1,
        inputs: vec![TxInput::unsigned(OutPoint::new(TxId([0x22; 32]), 0))],
        outputs: vec![TxOutput::pay_to_address(
            Amount::from_sat(10_000_000),
            &keys.fresh_receive_address(),
        )],
        lock_time: 0,
    };
    wallet.notify_transaction(&funding);

    let project = make_project(GOAL);
    let mut pending = wallet
        .create_pledge(&project, Amount::from_sat(10_000_000))
        .unwrap();
    let message = wallet.commit(&mut pending, false).await.unwrap();
    assert_eq!(wallet.pledges().len(), 1);

    let revocation = wallet.revoke_pledge(&message).await.unwrap();
    assert!(wallet.pledges().is_empty());
    assert!(wallet.was_pledge_revoked(&message));

    // The revocation spends the same stub the pledge did.
    let pledge_tx = message.pledge_tx().unwrap();
    assert_eq!(
        revocation.transaction.inputs[0].outpoint,
        pledge_tx.inputs[0].outpoint
    );
}
