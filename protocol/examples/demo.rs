//! Walkthrough of the full assurance-contract lifecycle.
//!
//! Creates a project, funds a backer wallet, pledges 10% of the goal,
//! verifies the pledge as the project owner would, brings in a second
//! backer for the remaining 90%, assembles the contract, and shows the
//! backer wallet observing the claim.
//!
//! Run with:
//!   cargo run --example demo

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use beacon_protocol::chain::{Amount, OutPoint, Transaction, TxId, TxInput, TxOutput};
use beacon_protocol::ports::{
    BroadcastError, Broadcaster, Clock, KeyProvider, PortFuture, SystemClock, UtxoOracle,
};
use beacon_protocol::project::Project;
use beacon_protocol::wallet::keychain::SeedKeychain;
use beacon_protocol::wallet::persistence::MemoryPersister;
use beacon_protocol::wallet::{InlineExecutor, PledgingWallet};

/// Broadcaster that accepts everything and feeds a shared UTXO view.
#[derive(Default)]
struct DemoNetwork {
    utxos: Mutex<HashMap<OutPoint, TxOutput>>,
}

impl DemoNetwork {
    fn confirm(&self, tx: &Transaction) {
        let mut utxos = self.utxos.lock();
        for input in &tx.inputs {
            utxos.remove(&input.outpoint);
        }
        let txid = tx.txid();
        for (vout, output) in tx.outputs.iter().enumerate() {
            utxos.insert(OutPoint::new(txid, vout as u32), output.clone());
        }
    }
}

impl Broadcaster for DemoNetwork {
    fn broadcast(&self, tx: Transaction) -> PortFuture<Result<Transaction, BroadcastError>> {
        self.confirm(&tx);
        Box::pin(std::future::ready(Ok(tx)))
    }
}

impl UtxoOracle for DemoNetwork {
    fn resolve(&self, outpoints: Vec<OutPoint>) -> PortFuture<Vec<Option<TxOutput>>> {
        let utxos = self.utxos.lock();
        let resolved = outpoints.iter().map(|op| utxos.get(op).cloned()).collect();
        Box::pin(std::future::ready(resolved))
    }
}

fn backer_wallet(network: &Arc<DemoNetwork>, seed: u8, coins: u64) -> (PledgingWallet, Arc<SeedKeychain>) {
    let keys = Arc::new(SeedKeychain::new([seed; 32]));
    let wallet = PledgingWallet::new(
        keys.clone(),
        network.clone(),
        Arc::new(SystemClock),
        Arc::new(MemoryPersister::new()),
    );
    // A pretend coinbase credits the wallet.
    let funding = Transaction {
        version: 1,
        inputs: vec![TxInput::unsigned(OutPoint::new(TxId([seed; 32]), 0))],
        outputs: vec![TxOutput::pay_to_address(
            Amount::from_sat(coins),
            &keys.fresh_receive_address(),
        )],
        lock_time: 0,
    };
    network.confirm(&funding);
    wallet.notify_transaction(&funding);
    (wallet, keys)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let network = Arc::new(DemoNetwork::default());
    let clock = SystemClock;

    // The project owner publishes a 1-coin project.
    let owner_keys = SeedKeychain::generate();
    let (auth_key, auth_index) = owner_keys.fresh_auth_key();
    let details = Project::make_details(
        "Lego Castle Fund",
        "A drawbridge, two towers, and a moat.",
        &owner_keys.fresh_receive_address(),
        Amount::COIN,
        &auth_key,
        auth_index,
        clock.now(),
    );
    let project = Project::from_details(&details).expect("valid project");
    println!("project  {}  (slug: {})", project.id(), project.slug());
    println!("goal     {}", project.goal_amount());

    // The owner proves authorship of an announcement.
    let signature = project
        .sign_as_owner(&owner_keys, "funding opens today")
        .expect("owner key available");
    project
        .authenticate_owner("funding opens today", &signature)
        .expect("authentic");
    println!("owner announcement authenticated");

    // Backer one pledges 10% out of a 50M-satoshi wallet; a dependency
    // transaction carves out the exact stub.
    let (wallet1, _) = backer_wallet(&network, 1, 50_000_000);
    wallet1.add_on_claim_handler(
        |pledge, tx| {
            println!(
                "backer 1 saw their {} pledge claimed by {}",
                pledge.total_input_value,
                tx.txid()
            );
        },
        Arc::new(InlineExecutor),
    );
    let mut pending1 = wallet1
        .create_pledge(&project, Amount::from_sat(10_000_000))
        .expect("enough funds");
    let pledge1 = wallet1.commit(&mut pending1, true).await.expect("commit");
    println!(
        "backer 1 pledged {} (dependency fees {})",
        pledge1.total_input_value, pending1.fees_paid
    );

    // Backer two covers the remaining 90% with an exact-value coin, so no
    // dependency is needed.
    let (wallet2, _) = backer_wallet(&network, 2, 90_000_000);
    let mut pending2 = wallet2
        .create_pledge(&project, Amount::from_sat(90_000_000))
        .expect("enough funds");
    let pledge2 = wallet2.commit(&mut pending2, true).await.expect("commit");
    println!(
        "backer 2 pledged {} (no dependency: {})",
        pledge2.total_input_value,
        pending2.dependency.is_none()
    );

    // The owner verifies both pledges against the network's UTXO view.
    for pledge in [&pledge1, &pledge2] {
        let verified = project
            .verify_pledge(network.as_ref(), pledge)
            .await
            .expect("pledge verifies");
        println!("verified pledge of {}", verified.total_input_value);
    }

    // Goal reached: anyone can assemble and broadcast the contract.
    let contract = project
        .complete_contract_strict([&pledge1, &pledge2].into_iter())
        .expect("goal reached");
    println!(
        "contract {} with {} inputs claims the goal",
        contract.txid(),
        contract.inputs.len()
    );
    network.confirm(&contract);

    // The backer wallet notices its stub was spent into the project's
    // outputs and reports the claim.
    wallet1.notify_transaction(&contract);
}
