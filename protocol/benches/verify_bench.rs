// Pledge verification benchmarks.
//
// Covers sighash digest computation, single-input script validation, full
// pledge verification against an in-memory oracle, and contract assembly
// at various pledge counts.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::HashMap;

use beacon_protocol::chain::{
    script, sighash, Address, Amount, OutPoint, SighashMode, Transaction, TransactionBuilder,
    TxId, TxInput, TxOutput,
};
use beacon_protocol::crypto::BeaconKeypair;
use beacon_protocol::ports::{PortFuture, UtxoOracle};
use beacon_protocol::project::{PledgeMessage, Project};

struct MapOracle(HashMap<OutPoint, TxOutput>);

impl UtxoOracle for MapOracle {
    fn resolve(&self, outpoints: Vec<OutPoint>) -> PortFuture<Vec<Option<TxOutput>>> {
        let resolved = outpoints.iter().map(|op| self.0.get(op).cloned()).collect();
        Box::pin(std::future::ready(resolved))
    }
}

fn make_project() -> Project {
    let owner = BeaconKeypair::generate();
    let details = Project::make_details(
        "bench project",
        "benchmarking",
        &Address::from_public_key(&owner.public_key()),
        Amount::COIN,
        &owner.public_key(),
        0,
        1_400_000_000,
    );
    Project::from_details(&details).unwrap()
}

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
    let outpoint = OutPoint::new(funding.txid(), 0);
    let stub = funding.outputs[0].clone();

    let mut builder = TransactionBuilder::new();
    builder.add_input(outpoint, stub.clone());
    for output in project.outputs() {
        builder.add_output(output.clone());
    }
    builder
        .sign_input(0, &backer, SighashMode::AllAnyoneCanPay)
        .unwrap();
    let tx = builder.finish();
    let message = PledgeMessage {
        transactions: vec![tx.encode()],
        total_input_value: Amount::from_sat(sats),
        timestamp: 1_400_000_100,
        project_id: project.id().to_owned(),
        contact: None,
    };
    (message, outpoint, stub)
}

fn bench_signature_hash(c: &mut Criterion) {
    let project = make_project();
    let (message, _, stub) = make_pledge(&project, 10_000_000);
    let tx = message.pledge_tx().unwrap();

    c.bench_function("sighash/anyone_can_pay", |b| {
        b.iter(|| sighash::signature_hash(&tx, 0, &stub.script, SighashMode::AllAnyoneCanPay));
    });
}

fn bench_script_validation(c: &mut Criterion) {
    let project = make_project();
    let (message, _, stub) = make_pledge(&project, 10_000_000);
    let tx = message.pledge_tx().unwrap();

    c.bench_function("script/verify_input_spend", |b| {
        b.iter(|| script::verify_input_spend(&tx, 0, &stub.script).unwrap());
    });
}

fn bench_verify_pledge(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let project = make_project();
    let (message, outpoint, stub) = make_pledge(&project, 10_000_000);
    let oracle = MapOracle([(outpoint, stub)].into_iter().collect());

    c.bench_function("verify/pledge", |b| {
        b.iter(|| {
            runtime
                .block_on(project.verify_pledge(&oracle, &message))
                .unwrap()
        });
    });
}

fn bench_complete_contract(c: &mut Criterion) {
    let mut group = c.benchmark_group("contract/complete");
    for size in [2usize, 10, 50] {
        let project = make_project();
        let pledges: Vec<_> = (0..size)
            .map(|_| make_pledge(&project, 1_000_000).0)
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &pledges, |b, pledges| {
            b.iter(|| project.complete_contract(pledges.iter()).unwrap());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_signature_hash,
    bench_script_validation,
    bench_verify_pledge,
    bench_complete_contract,
);
criterion_main!(benches);
