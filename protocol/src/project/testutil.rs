//! Shared fixtures for project and verifier tests.

use crate::chain::{
    Address, Amount, OutPoint, SighashMode, Transaction, TransactionBuilder, TxId, TxInput,
    TxOutput,
};
use crate::crypto::BeaconKeypair;
use crate::project::descriptor::Project;
use crate::project::messages::PledgeMessage;

/// A project plus the machinery to mint pledges against it from made-up
/// funding transactions.
pub struct ProjectFixture {
    pub project: Project,
    pub owner_key: BeaconKeypair,
}

impl ProjectFixture {
    /// A single-output project with the given goal.
    pub fn new(goal: Amount) -> Self {
        let owner_key = BeaconKeypair::generate();
        let details = Project::make_details(
            "My cool project",
            "A project to make awesome things ... out of Lego!",
            &Address::from_public_key(&owner_key.public_key()),
            goal,
            &owner_key.public_key(),
            0,
            1_400_000_000,
        );
        let project = Project::from_details(&details).expect("valid details");
        Self { project, owner_key }
    }

    /// Build a valid pledge of `sats` from a fresh backer.
    ///
    /// Returns the round-tripped pledge transaction and the fake stub
    /// output it spends (for feeding an oracle).
    pub fn pledge(&self, sats: u64) -> (Transaction, TxOutput) {
        let backer = BeaconKeypair::generate();
        let stub_value = Amount::from_sat(sats);
        let (outpoint, stub) = fake_stub(&backer, stub_value);

        let mut builder = TransactionBuilder::new();
        builder.add_input(outpoint, stub.clone());
        for output in self.project.outputs() {
            builder.add_output(output.clone());
        }
        builder
            .sign_input(0, &backer, SighashMode::AllAnyoneCanPay)
            .expect("stub is signable");
        let tx = builder.finish().round_trip().expect("codec is lossless");
        (tx, stub)
    }
}

/// A made-up confirmed transaction paying `value` to `owner`, returning
/// the outpoint and output of its first output.
pub fn fake_stub(owner: &BeaconKeypair, value: Amount) -> (OutPoint, TxOutput) {
    let address = Address::from_public_key(&owner.public_key());
    let funding = Transaction {
        version: 1,
        inputs: vec![TxInput::unsigned(OutPoint::new(
            TxId(rand::random::<[u8; 32]>()),
            0,
        ))],
        outputs: vec![TxOutput::pay_to_address(value, &address)],
        lock_time: 0,
    };
    let outpoint = OutPoint::new(funding.txid(), 0);
    (outpoint, funding.outputs[0].clone())
}

/// Wrap a pledge transaction in a message declaring `sats` of input value.
pub fn pledge_message(tx: &Transaction, sats: u64, project_id: &str) -> PledgeMessage {
    PledgeMessage {
        transactions: vec![tx.encode()],
        total_input_value: Amount::from_sat(sats),
        timestamp: 1_400_000_100,
        project_id: project_id.to_owned(),
        contact: None,
    }
}
