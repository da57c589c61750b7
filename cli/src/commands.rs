//! Command implementations.
//!
//! Each command is a thin translation layer: read JSON files, call into
//! `beacon-protocol`, print results. No protocol logic lives here.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use beacon_protocol::chain::{Address, Amount, OutPoint, TxId, TxOutput};
use beacon_protocol::ports::{Clock, KeyProvider, PortFuture, SystemClock, UtxoOracle};
use beacon_protocol::project::{PledgeMessage, Project, ProjectEnvelope};
use beacon_protocol::wallet::keychain::SeedKeychain;

use crate::cli::{
    ContractAssembleArgs, PledgeVerifyArgs, ProjectCreateArgs, ProjectShowArgs,
};

// ---------------------------------------------------------------------------
// File formats
// ---------------------------------------------------------------------------

/// One unspent output in a `--utxos` file.
#[derive(Debug, Serialize, Deserialize)]
struct UtxoRecord {
    /// Hex transaction id.
    txid: String,
    vout: u32,
    /// Value in satoshis.
    value: u64,
    /// Hex output script.
    script: String,
}

/// Oracle over the records of a `--utxos` file.
struct FileOracle {
    utxos: Vec<(OutPoint, TxOutput)>,
}

impl FileOracle {
    fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read UTXO file {}", path.display()))?;
        let records: Vec<UtxoRecord> =
            serde_json::from_slice(&data).context("malformed UTXO file")?;
        let mut utxos = Vec::with_capacity(records.len());
        for record in records {
            let txid_bytes: [u8; 32] = hex::decode(&record.txid)
                .ok()
                .and_then(|b| b.try_into().ok())
                .with_context(|| format!("bad txid in UTXO file: {}", record.txid))?;
            let script = hex::decode(&record.script).context("bad script hex in UTXO file")?;
            utxos.push((
                OutPoint::new(TxId(txid_bytes), record.vout),
                TxOutput::new(Amount::from_sat(record.value), script),
            ));
        }
        Ok(Self { utxos })
    }
}

impl UtxoOracle for FileOracle {
    fn resolve(&self, outpoints: Vec<OutPoint>) -> PortFuture<Vec<Option<TxOutput>>> {
        let resolved = outpoints
            .iter()
            .map(|wanted| {
                self.utxos
                    .iter()
                    .find(|(outpoint, _)| outpoint == wanted)
                    .map(|(_, output)| output.clone())
            })
            .collect();
        Box::pin(std::future::ready(resolved))
    }
}

fn load_project(path: &Path) -> Result<Project> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read project file {}", path.display()))?;
    let envelope: ProjectEnvelope =
        serde_json::from_slice(&data).context("malformed project file")?;
    Project::from_envelope(envelope).context("invalid project")
}

fn load_pledge(path: &Path) -> Result<PledgeMessage> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read pledge file {}", path.display()))?;
    serde_json::from_slice(&data).context("malformed pledge file")
}

// ---------------------------------------------------------------------------
// project
// ---------------------------------------------------------------------------

pub fn project_create(args: ProjectCreateArgs) -> Result<()> {
    let destination: Address = args
        .address
        .parse()
        .map_err(|e| anyhow::anyhow!("bad destination address: {e}"))?;
    if args.seed_out.is_some() && args.passphrase.is_none() {
        bail!("--seed-out requires --passphrase");
    }

    let keys = SeedKeychain::generate();
    let (auth_key, auth_index) = keys.fresh_auth_key();
    let details = Project::make_details(
        &args.title,
        &args.memo,
        &destination,
        Amount::from_sat(args.goal),
        &auth_key,
        auth_index,
        SystemClock.now(),
    );
    let project = Project::from_details(&details)?;

    std::fs::write(&args.out, serde_json::to_vec_pretty(project.envelope())?)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    info!(file = %args.out.display(), "project file written");

    if let Some(seed_out) = &args.seed_out {
        let passphrase = args.passphrase.as_deref().expect("checked above");
        let sealed = keys
            .seal(passphrase)
            .map_err(|e| anyhow::anyhow!("failed to seal keychain seed: {e}"))?;
        std::fs::write(seed_out, hex::encode(sealed))
            .with_context(|| format!("failed to write {}", seed_out.display()))?;
        info!(file = %seed_out.display(), "sealed owner keychain written");
    }

    println!("id:   {}", project.id());
    println!("slug: {}", project.slug());
    println!("goal: {}", project.goal_amount());
    Ok(())
}

pub fn project_show(args: ProjectShowArgs) -> Result<()> {
    let project = load_project(&args.file)?;
    println!("id:       {}", project.id());
    println!("slug:     {}", project.slug());
    println!("title:    {}", project.title());
    println!("memo:     {}", project.memo());
    println!("goal:     {}", project.goal_amount());
    println!("auth key: {}", project.auth_key());
    println!("outputs:");
    for (index, output) in project.outputs().iter().enumerate() {
        println!("  [{index}] {} -> {}", output.value, hex::encode(&output.script));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// pledge
// ---------------------------------------------------------------------------

pub async fn pledge_verify(args: PledgeVerifyArgs) -> Result<()> {
    let project = load_project(&args.project)?;
    let pledge = load_pledge(&args.pledge)?;
    let oracle = FileOracle::load(&args.utxos)?;

    match project.verify_pledge(&oracle, &pledge).await {
        Ok(verified) => {
            println!("pledge OK: {} toward {}", verified.total_input_value, project.id());
            Ok(())
        }
        Err(err) => {
            println!("pledge REJECTED: {err}");
            bail!("pledge failed verification")
        }
    }
}

// ---------------------------------------------------------------------------
// contract
// ---------------------------------------------------------------------------

pub fn contract_assemble(args: ContractAssembleArgs) -> Result<()> {
    let project = load_project(&args.project)?;
    let pledges = args
        .pledges
        .iter()
        .map(|path| load_pledge(path))
        .collect::<Result<Vec<_>>>()?;

    let contract = if args.strict {
        project.complete_contract_strict(pledges.iter())?
    } else {
        project.complete_contract(pledges.iter())?
    };

    info!(
        inputs = contract.inputs.len(),
        txid = %contract.txid(),
        "contract assembled"
    );
    println!("{}", hex::encode(contract.encode()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_protocol::crypto::BeaconKeypair;
    use beacon_protocol::project::PledgeMessage;
    use std::path::PathBuf;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).expect("write test file");
        path
    }

    fn sample_project() -> Project {
        let key = BeaconKeypair::generate().public_key();
        let details = Project::make_details(
            "CLI test project",
            "A goal and one output",
            &Address::from_public_key(&key),
            Amount::from_sat(100_000_000),
            &key,
            0,
            1_400_000_000,
        );
        Project::from_details(&details).expect("valid details")
    }

    fn sample_pledge() -> PledgeMessage {
        PledgeMessage {
            transactions: vec![vec![0xAA, 0xBB]],
            total_input_value: Amount::from_sat(10_000_000),
            timestamp: 1_400_000_100,
            project_id: "abc".into(),
            contact: None,
        }
    }

    #[tokio::test]
    async fn file_oracle_resolves_listed_utxos() {
        let dir = tempfile::tempdir().expect("tempdir");
        let txid = [0x11u8; 32];
        let records = vec![UtxoRecord {
            txid: hex::encode(txid),
            vout: 0,
            value: 10_000_000,
            script: "51".into(),
        }];
        let path = write_file(&dir, "utxos.json", &serde_json::to_vec(&records).unwrap());

        let oracle = FileOracle::load(&path).unwrap();
        let known = OutPoint::new(TxId(txid), 0);
        let unknown = OutPoint::new(TxId([0x22; 32]), 1);
        let resolved = oracle.resolve(vec![known, unknown]).await;

        assert_eq!(resolved.len(), 2);
        let output = resolved[0].as_ref().expect("known utxo resolves");
        assert_eq!(output.value, Amount::from_sat(10_000_000));
        assert_eq!(output.script, vec![0x51]);
        assert!(resolved[1].is_none());
    }

    #[test]
    fn file_oracle_rejects_bad_txid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(
            &dir,
            "utxos.json",
            br#"[{"txid":"zz","vout":0,"value":1,"script":"51"}]"#,
        );
        assert!(FileOracle::load(&path).is_err());
    }

    #[test]
    fn file_oracle_rejects_malformed_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(&dir, "utxos.json", b"not json at all");
        assert!(FileOracle::load(&path).is_err());
    }

    #[test]
    fn load_project_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let project = sample_project();
        let path = write_file(
            &dir,
            "project.json",
            &serde_json::to_vec(project.envelope()).unwrap(),
        );
        let loaded = load_project(&path).unwrap();
        assert_eq!(loaded.id(), project.id());
        assert_eq!(loaded.title(), "CLI test project");
        assert_eq!(loaded.goal_amount(), Amount::from_sat(100_000_000));
    }

    #[test]
    fn load_project_rejects_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(&dir, "project.json", b"{\"neither\": \"envelope\"}");
        assert!(load_project(&path).is_err());
    }

    #[test]
    fn load_project_reports_missing_file() {
        let err = load_project(Path::new("/nonexistent/project.json")).unwrap_err();
        assert!(err.to_string().contains("project.json"));
    }

    #[test]
    fn load_pledge_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pledge = sample_pledge();
        let path = write_file(&dir, "pledge.json", &serde_json::to_vec(&pledge).unwrap());
        assert_eq!(load_pledge(&path).unwrap(), pledge);
    }

    #[test]
    fn load_pledge_rejects_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(&dir, "pledge.json", b"[1, 2, 3]");
        assert!(load_pledge(&path).is_err());
    }
}
