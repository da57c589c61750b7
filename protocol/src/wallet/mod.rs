//! # The Pledging Wallet
//!
//! A wallet that knows how to form, track, revoke, and observe pledges.
//!
//! The wallet's single mutex guards all bookkeeping: owned coins, the
//! stub-to-pledge and project-to-pledge bijections, revoked pledges, and
//! in-flight revocations. UI, network, and persistence threads may all
//! touch one instance concurrently. Listener callbacks never run under the
//! lock; each registration carries its own executor and notifications are
//! dispatched after the lock is released, so `on_pledge` for a pledge
//! always happens before any `on_revoke` or `on_claim` for it.
//!
//! Lifecycle of a pledge here:
//!
//! ```text
//! create_pledge -> PendingPledge -> commit -> tracked
//! tracked -> revoke_pledge (broadcast ok) -> revoked   (terminal)
//! tracked -> stub seen spent to project outputs -> claimed (terminal)
//! ```

pub mod coin_selection;
pub mod keychain;
pub mod persistence;

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chain::{
    script, Address, Amount, AmountError, BuildError, OutPoint, ScriptTemplate, SighashMode,
    Transaction, TransactionBuilder, TxId, TxOutput,
};
use crate::config::MIN_TX_FEE;
use crate::crypto::{BeaconKeypair, BeaconPublicKey};
use crate::ports::{BroadcastError, Broadcaster, Clock, KeyProvider};
use crate::project::{PledgeHash, PledgeMessage, Project, VerificationError};

use coin_selection::{CoinSelection, CoinSelector, DefaultCoinSelector, OwnedOutput, StubFirstSelector};
use persistence::{PersistError, WalletPersister, WalletSnapshot};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("insufficient funds: need {needed}, spendable {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("precondition violated: {0}")]
    PreconditionViolated(&'static str),

    #[error("pledge is not tracked by this wallet")]
    UnknownPledge,

    #[error("no signing key available for output script")]
    KeyNotFound,

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Verification(#[from] VerificationError),
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Executes listener callbacks on behalf of a registration.
///
/// Registrations supply their own executor so the wallet never runs user
/// code on whichever thread happened to mutate state, and never under its
/// own lock.
pub trait NotificationExecutor: Send + Sync {
    fn execute(&self, task: Box<dyn FnOnce() + Send>);
}

/// Runs callbacks immediately on the notifying thread.
pub struct InlineExecutor;

impl NotificationExecutor for InlineExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

type OnPledgeFn = dyn Fn(&Project, &PledgeMessage) + Send + Sync;
type OnRevokeFn = dyn Fn(&PledgeMessage) + Send + Sync;
type OnClaimFn = dyn Fn(&PledgeMessage, &Transaction) + Send + Sync;

struct Registration<H: ?Sized> {
    handler: Arc<H>,
    executor: Arc<dyn NotificationExecutor>,
}

impl<H: ?Sized> Clone for Registration<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            executor: Arc::clone(&self.executor),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct ProjectRecord {
    project: Project,
    pledge: PledgeMessage,
}

#[derive(Default)]
struct WalletState {
    /// Outputs the wallet can spend, pledged stubs included.
    coins: HashMap<OutPoint, TxOutput>,

    /// Stub outpoint -> the committed pledge spending it. One half of the
    /// stub/pledge bijection.
    pledges: HashMap<OutPoint, PledgeMessage>,

    /// Pledge hash -> stub outpoint. The other half.
    stub_by_hash: HashMap<PledgeHash, OutPoint>,

    /// Project id -> (project, its pledge). One pledge per project.
    projects: HashMap<String, ProjectRecord>,

    /// Pledge hash -> project id.
    project_by_hash: HashMap<PledgeHash, String>,

    /// Pledges revoked by deliberate double-spend.
    revoked: HashMap<PledgeHash, PledgeMessage>,

    /// Revocation transactions we have initiated but not yet confirmed
    /// broadcast of; spends of stubs by these are self-inflicted.
    revoke_in_progress: HashSet<TxId>,
}

impl WalletState {
    /// Coins eligible for spending: everything not serving as a pledged
    /// stub.
    fn spendable(&self) -> Vec<OwnedOutput> {
        self.coins
            .iter()
            .filter(|(outpoint, _)| !self.pledges.contains_key(*outpoint))
            .map(|(outpoint, output)| OwnedOutput {
                outpoint: *outpoint,
                output: output.clone(),
            })
            .collect()
    }

    fn spendable_total(&self) -> Amount {
        self.spendable().iter().map(OwnedOutput::value).sum()
    }

    fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            pledges: self.pledges.values().cloned().collect(),
            projects: self
                .projects
                .values()
                .map(|record| record.project.envelope().clone())
                .collect(),
            revoked: self.revoked.values().cloned().collect(),
        }
    }

    fn insert_pledge(&mut self, project: Project, pledge: PledgeMessage, stub: OutPoint) {
        let hash = pledge.pledge_hash();
        let project_id = project.id().to_owned();
        self.pledges.insert(stub, pledge.clone());
        self.stub_by_hash.insert(hash, stub);
        self.project_by_hash.insert(hash, project_id.clone());
        self.projects.insert(project_id, ProjectRecord { project, pledge });
    }

    fn remove_pledge(&mut self, hash: PledgeHash) {
        if let Some(stub) = self.stub_by_hash.remove(&hash) {
            self.pledges.remove(&stub);
        }
        if let Some(project_id) = self.project_by_hash.remove(&hash) {
            self.projects.remove(&project_id);
        }
    }
}

// ---------------------------------------------------------------------------
// Pending pledge
// ---------------------------------------------------------------------------

/// A constructed but uncommitted pledge.
///
/// Dropping it abandons the pledge with no trace in the wallet; calling
/// [`PledgingWallet::commit`] makes it real.
#[derive(Debug)]
pub struct PendingPledge {
    pub project: Project,

    /// Transaction creating the stub, when no exact-value output existed.
    pub dependency: Option<Transaction>,

    /// The signed pledge transaction.
    pub pledge_tx: Transaction,

    /// Fees paid by the dependency transaction.
    pub fees_paid: Amount,

    stub_outpoint: OutPoint,
    stub_output: TxOutput,
    committed: bool,
}

impl PendingPledge {
    /// Render the interchange message for this pledge.
    pub fn message(&self, timestamp: u64) -> PledgeMessage {
        let mut transactions = Vec::with_capacity(2);
        if let Some(dependency) = &self.dependency {
            transactions.push(dependency.encode());
        }
        transactions.push(self.pledge_tx.encode());
        PledgeMessage {
            transactions,
            total_input_value: self.stub_output.value,
            timestamp,
            project_id: self.project.id().to_owned(),
            contact: None,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }
}

/// A broadcast revocation.
#[derive(Debug)]
pub struct Revocation {
    /// The double-spend transaction that invalidated the pledge.
    pub transaction: Transaction,
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// The pledging wallet. See the module docs for the concurrency story.
pub struct PledgingWallet {
    keys: Arc<dyn KeyProvider>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    persister: Arc<dyn WalletPersister>,
    selector: StubFirstSelector,
    state: Mutex<WalletState>,
    on_pledge: RwLock<Vec<Registration<OnPledgeFn>>>,
    on_revoke: RwLock<Vec<Registration<OnRevokeFn>>>,
    on_claim: RwLock<Vec<Registration<OnClaimFn>>>,
}

impl PledgingWallet {
    pub fn new(
        keys: Arc<dyn KeyProvider>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        persister: Arc<dyn WalletPersister>,
    ) -> Self {
        Self {
            keys,
            broadcaster,
            clock,
            persister,
            selector: StubFirstSelector::default(),
            state: Mutex::new(WalletState::default()),
            on_pledge: RwLock::new(Vec::new()),
            on_revoke: RwLock::new(Vec::new()),
            on_claim: RwLock::new(Vec::new()),
        }
    }

    /// Rebuild a wallet from a persisted snapshot.
    ///
    /// Pledge/stub bindings are reconstructed from the pledge transactions
    /// themselves; projects are re-matched to pledges through their first
    /// required output. Entries that no longer parse are logged and
    /// skipped rather than poisoning the whole wallet. Coins are not part
    /// of the snapshot and reappear as the chain is replayed through
    /// [`notify_transaction`](Self::notify_transaction).
    pub fn restore(
        keys: Arc<dyn KeyProvider>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        persister: Arc<dyn WalletPersister>,
        snapshot: &WalletSnapshot,
    ) -> Self {
        let wallet = Self::new(keys, broadcaster, clock, persister);
        {
            let mut state = wallet.state.lock();
            let mut pledge_by_first_output: HashMap<(Amount, Vec<u8>), PledgeMessage> =
                HashMap::new();
            for pledge in &snapshot.pledges {
                let Some(tx) = pledge.pledge_tx() else {
                    warn!("persisted pledge has no decodable transaction; skipping");
                    continue;
                };
                if tx.inputs.len() != 1 {
                    warn!(inputs = tx.inputs.len(), "persisted pledge tx malformed; skipping");
                    continue;
                }
                let stub = tx.inputs[0].outpoint;
                let hash = pledge.pledge_hash();
                if let Some(first) = tx.outputs.first() {
                    pledge_by_first_output
                        .insert((first.value, first.script.clone()), pledge.clone());
                }
                state.pledges.insert(stub, pledge.clone());
                state.stub_by_hash.insert(hash, stub);
            }
            for envelope in &snapshot.projects {
                let project = match Project::from_envelope(envelope.clone()) {
                    Ok(project) => project,
                    Err(err) => {
                        warn!(%err, "persisted project no longer parses; skipping");
                        continue;
                    }
                };
                let first = &project.outputs()[0];
                let Some(pledge) =
                    pledge_by_first_output.get(&(first.value, first.script.clone()))
                else {
                    warn!(project = project.id(), "no pledge matches persisted project");
                    continue;
                };
                state
                    .project_by_hash
                    .insert(pledge.pledge_hash(), project.id().to_owned());
                state.projects.insert(
                    project.id().to_owned(),
                    ProjectRecord {
                        project,
                        pledge: pledge.clone(),
                    },
                );
            }
            for pledge in &snapshot.revoked {
                state.revoked.insert(pledge.pledge_hash(), pledge.clone());
            }
            info!(
                pledges = state.pledges.len(),
                revoked = state.revoked.len(),
                "wallet restored"
            );
        }
        wallet
    }

    // -----------------------------------------------------------------------
    // Listener registration
    // -----------------------------------------------------------------------

    pub fn add_on_pledge_handler(
        &self,
        handler: impl Fn(&Project, &PledgeMessage) + Send + Sync + 'static,
        executor: Arc<dyn NotificationExecutor>,
    ) {
        self.on_pledge.write().push(Registration {
            handler: Arc::new(handler),
            executor,
        });
    }

    pub fn add_on_revoke_handler(
        &self,
        handler: impl Fn(&PledgeMessage) + Send + Sync + 'static,
        executor: Arc<dyn NotificationExecutor>,
    ) {
        self.on_revoke.write().push(Registration {
            handler: Arc::new(handler),
            executor,
        });
    }

    pub fn add_on_claim_handler(
        &self,
        handler: impl Fn(&PledgeMessage, &Transaction) + Send + Sync + 'static,
        executor: Arc<dyn NotificationExecutor>,
    ) {
        self.on_claim.write().push(Registration {
            handler: Arc::new(handler),
            executor,
        });
    }

    // -----------------------------------------------------------------------
    // Balances and accessors
    // -----------------------------------------------------------------------

    /// Total value of owned coins, pledged stubs included.
    pub fn balance(&self) -> Amount {
        self.state.lock().coins.values().map(|o| o.value).sum()
    }

    /// Value the wallet could actually spend: owned coins minus pledged
    /// stubs.
    pub fn available_balance(&self) -> Amount {
        self.state.lock().spendable_total()
    }

    /// All committed, unrevoked pledges.
    pub fn pledges(&self) -> Vec<PledgeMessage> {
        self.state.lock().pledges.values().cloned().collect()
    }

    /// The pledge this wallet holds for `project`, if any.
    pub fn pledge_for(&self, project: &Project) -> Option<PledgeMessage> {
        self.state
            .lock()
            .projects
            .get(project.id())
            .map(|record| record.pledge.clone())
    }

    /// The amount pledged to `project`, or zero.
    pub fn pledged_amount_for(&self, project: &Project) -> Amount {
        self.pledge_for(project)
            .map(|pledge| pledge.total_input_value)
            .unwrap_or(Amount::ZERO)
    }

    /// Whether this pledge has been revoked by this wallet.
    pub fn was_pledge_revoked(&self, pledge: &PledgeMessage) -> bool {
        self.state
            .lock()
            .revoked
            .contains_key(&pledge.pledge_hash())
    }

    /// The current persistable state.
    pub fn snapshot(&self) -> WalletSnapshot {
        self.state.lock().snapshot()
    }

    // -----------------------------------------------------------------------
    // Pledge creation
    // -----------------------------------------------------------------------

    /// Construct (but do not commit) a pledge of `value` to `project`.
    ///
    /// Finds a spendable output of exactly `value` to use as the stub,
    /// excluding outputs already pledged. When none exists, builds a
    /// dependency transaction paying `value` to a fresh own address (plus
    /// change) and uses its first output. The pledge transaction spends
    /// the stub as its sole input, under the append-permitted sighash,
    /// into exactly the project's outputs.
    pub fn create_pledge(
        &self,
        project: &Project,
        value: Amount,
    ) -> Result<PendingPledge, WalletError> {
        let (stub_outpoint, stub_output, dependency, fees_paid) = {
            let state = self.state.lock();
            let candidates = state.spendable();
            match self.find_exact_stub(value, candidates) {
                Some(stub) => {
                    debug!(stub = %stub.outpoint, "found existing stub");
                    (stub.outpoint, stub.output, None, Amount::ZERO)
                }
                None => {
                    let dependency = self.build_self_payment_locked(&state, value)?;
                    let stub_outpoint = OutPoint::new(dependency.txid(), 0);
                    let stub_output = dependency.outputs[0].clone();
                    info!(tx = %dependency.txid(), "created dependency tx for stub");
                    (
                        stub_outpoint,
                        stub_output,
                        Some(dependency),
                        Amount::from_sat(MIN_TX_FEE),
                    )
                }
            }
        };

        let mut builder = TransactionBuilder::new();
        builder.add_input(stub_outpoint, stub_output.clone());
        for output in project.outputs() {
            builder.add_output(output.clone());
        }
        let key = self
            .signing_key_for_output(&stub_output)
            .ok_or(WalletError::KeyNotFound)?;
        builder.sign_input(0, &key, SighashMode::AllAnyoneCanPay)?;
        let pledge_tx = builder.finish();

        info!(
            project = project.id(),
            value = %value,
            fees = %fees_paid,
            "created pledge tx"
        );
        Ok(PendingPledge {
            project: project.clone(),
            dependency,
            pledge_tx,
            fees_paid,
            stub_outpoint,
            stub_output,
            committed: false,
        })
    }

    /// Commit a pending pledge: record it in the wallet maps, persist
    /// durably, then notify listeners. Optionally broadcasts the
    /// dependency transaction first.
    pub async fn commit(
        &self,
        pending: &mut PendingPledge,
        broadcast_dependency: bool,
    ) -> Result<PledgeMessage, WalletError> {
        if pending.committed {
            return Err(WalletError::PreconditionViolated("pledge already committed"));
        }
        let message = pending.message(self.clock.now());

        if let Some(dependency) = &pending.dependency {
            if broadcast_dependency {
                info!(tx = %dependency.txid(), "broadcasting dependency");
                self.broadcaster.broadcast(dependency.clone()).await?;
            }
        }

        let snapshot = {
            let mut state = self.state.lock();
            if let Some(dependency) = &pending.dependency {
                self.apply_owned_transaction_locked(&mut state, dependency);
            }
            if state.pledges.contains_key(&pending.stub_outpoint) {
                return Err(WalletError::PreconditionViolated("stub is already pledged"));
            }
            if state.projects.contains_key(pending.project.id()) {
                return Err(WalletError::PreconditionViolated(
                    "wallet already pledged to this project",
                ));
            }
            if !state.coins.contains_key(&pending.stub_outpoint) {
                return Err(WalletError::PreconditionViolated(
                    "stub is not a wallet-owned output",
                ));
            }
            state.insert_pledge(
                pending.project.clone(),
                message.clone(),
                pending.stub_outpoint,
            );
            state.snapshot()
        };
        self.persister.save(&snapshot)?;
        // The flag flips only once the pledge is durably recorded; any
        // failure above leaves the pending pledge retryable.
        pending.committed = true;

        info!(
            project = pending.project.id(),
            pledge = %message.pledge_hash(),
            "pledge committed"
        );
        self.dispatch_on_pledge(&pending.project, &message);
        Ok(message)
    }

    // -----------------------------------------------------------------------
    // Revocation
    // -----------------------------------------------------------------------

    /// Revoke a committed pledge by double-spending its stub back to a
    /// fresh own address, minus the minimum fee.
    ///
    /// On broadcast success the pledge moves to the revoked set, the new
    /// state is persisted, and `on_revoke` fires. On broadcast failure the
    /// wallet state is left untouched and the error is surfaced.
    pub async fn revoke_pledge(
        &self,
        pledge: &PledgeMessage,
    ) -> Result<Revocation, WalletError> {
        let hash = pledge.pledge_hash();
        let (stub_outpoint, stub_output) = {
            let state = self.state.lock();
            let outpoint = *state
                .stub_by_hash
                .get(&hash)
                .ok_or(WalletError::UnknownPledge)?;
            let output = state
                .coins
                .get(&outpoint)
                .ok_or(WalletError::UnknownPledge)?
                .clone();
            (outpoint, output)
        };

        let refund = stub_output
            .value
            .checked_sub(Amount::from_sat(MIN_TX_FEE))
            .map_err(|_| WalletError::InsufficientFunds {
                needed: Amount::from_sat(MIN_TX_FEE),
                available: stub_output.value,
            })?;
        let refund_address = self.keys.fresh_receive_address();

        let mut builder = TransactionBuilder::new();
        builder.add_input(stub_outpoint, stub_output.clone());
        builder.pay_to_address(refund, &refund_address);
        let key = self
            .signing_key_for_output(&stub_output)
            .ok_or(WalletError::KeyNotFound)?;
        builder.sign_input(0, &key, SighashMode::All)?;
        let revocation = builder.finish();
        let revocation_txid = revocation.txid();

        self.state.lock().revoke_in_progress.insert(revocation_txid);
        info!(
            stub = %stub_outpoint,
            value = %stub_output.value,
            tx = %revocation_txid,
            "broadcasting revocation of pledge"
        );

        match self.broadcaster.broadcast(revocation.clone()).await {
            Ok(_) => {
                let snapshot = {
                    let mut state = self.state.lock();
                    state.revoke_in_progress.remove(&revocation_txid);
                    state.revoked.insert(hash, pledge.clone());
                    state.remove_pledge(hash);
                    self.apply_owned_transaction_locked(&mut state, &revocation);
                    state.snapshot()
                };
                self.persister.save(&snapshot)?;
                info!(pledge = %hash, "revocation broadcast ok; pledge marked revoked");
                self.dispatch_on_revoke(pledge);
                Ok(Revocation {
                    transaction: revocation,
                })
            }
            Err(err) => {
                warn!(pledge = %hash, %err, "failed to broadcast pledge revocation");
                Err(err.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Contract finalization
    // -----------------------------------------------------------------------

    /// Assemble the contract strictly, then attach one wallet-funded input
    /// of exactly the minimum fee and sign it with the standard sighash.
    ///
    /// A dependency transaction creating the fee-sized output is built and
    /// broadcast first; fee-shaped outputs essentially never exist in
    /// advance. The returned transaction is fully valid for broadcast.
    pub async fn complete_contract_with_fee(
        &self,
        project: &Project,
        pledges: &[PledgeMessage],
    ) -> Result<Transaction, WalletError> {
        let contract = project.complete_contract_strict(pledges.iter())?;
        let fee = Amount::from_sat(MIN_TX_FEE);

        let dependency = {
            let state = self.state.lock();
            self.build_self_payment_locked(&state, fee)?
        };
        info!(tx = %dependency.txid(), "broadcasting fee dependency");
        self.broadcaster.broadcast(dependency.clone()).await?;
        {
            let mut state = self.state.lock();
            self.apply_owned_transaction_locked(&mut state, &dependency);
        }

        let fee_outpoint = OutPoint::new(dependency.txid(), 0);
        let fee_output = dependency.outputs[0].clone();
        let mut builder = TransactionBuilder::from_transaction(contract);
        let fee_index = builder.input_count();
        builder.add_input(fee_outpoint, fee_output.clone());
        let key = self
            .signing_key_for_output(&fee_output)
            .ok_or(WalletError::KeyNotFound)?;
        builder.sign_input(fee_index, &key, SighashMode::All)?;
        let finalized = builder.finish();
        info!(tx = %finalized.txid(), inputs = finalized.inputs.len(), "prepared final contract");
        Ok(finalized)
    }

    // -----------------------------------------------------------------------
    // Chain observation
    // -----------------------------------------------------------------------

    /// Feed an observed transaction through the wallet.
    ///
    /// Updates coin bookkeeping, and watches for spends of pledged stubs:
    /// a spend we did not initiate whose outputs match the pledge's
    /// project is a claim (`on_claim` fires); any other foreign spend is
    /// logged and otherwise ignored.
    pub fn notify_transaction(&self, tx: &Transaction) {
        let txid = tx.txid();
        let claims = {
            let mut state = self.state.lock();
            let mut claims = Vec::new();
            if !state.revoke_in_progress.contains(&txid) {
                for input in &tx.inputs {
                    let Some(pledge) = state.pledges.get(&input.outpoint) else {
                        continue;
                    };
                    info!(stub = %input.outpoint, "saw spend of our pledged stub");
                    let project = state
                        .project_by_hash
                        .get(&pledge.pledge_hash())
                        .and_then(|id| state.projects.get(id))
                        .map(|record| &record.project);
                    match project {
                        Some(project) if outputs_match_project(tx, project) => {
                            info!(project = project.id(), "stub spent by matching contract: claimed");
                            claims.push(pledge.clone());
                        }
                        _ => {
                            warn!(
                                stub = %input.outpoint,
                                tx = %txid,
                                "unrecognized spend of pledged stub: cloned wallet?"
                            );
                        }
                    }
                }
            }
            self.apply_owned_transaction_locked(&mut state, tx);
            claims
        };
        for pledge in claims {
            self.dispatch_on_claim(&pledge, tx);
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// An exact-value spendable output, if one exists.
    fn find_exact_stub(&self, value: Amount, candidates: Vec<OwnedOutput>) -> Option<OwnedOutput> {
        let selection: CoinSelection = self.selector.select(value, candidates);
        if selection.total < value {
            return None;
        }
        selection.gathered.into_iter().find(|c| c.value() == value)
    }

    /// Build and sign a transaction paying exactly `value` to a fresh own
    /// address as output 0, with change (if any) as output 1.
    fn build_self_payment_locked(
        &self,
        state: &WalletState,
        value: Amount,
    ) -> Result<Transaction, WalletError> {
        let fee = Amount::from_sat(MIN_TX_FEE);
        let needed = value.checked_add(fee)?;
        let candidates = state.spendable();
        let available = candidates.iter().map(OwnedOutput::value).sum();
        let selection = DefaultCoinSelector.select(needed, candidates);
        if selection.total < needed {
            return Err(WalletError::InsufficientFunds { needed, available });
        }

        let mut builder = TransactionBuilder::new();
        for coin in &selection.gathered {
            builder.add_input(coin.outpoint, coin.output.clone());
        }
        builder.pay_to_address(value, &self.keys.fresh_receive_address());
        let change = selection.total.checked_sub(needed)?;
        if !change.is_zero() {
            builder.pay_to_address(change, &self.keys.fresh_receive_address());
        }
        for (index, coin) in selection.gathered.iter().enumerate() {
            let key = self
                .signing_key_for_output(&coin.output)
                .ok_or(WalletError::KeyNotFound)?;
            builder.sign_input(index, &key, SighashMode::All)?;
        }
        Ok(builder.finish())
    }

    /// Register `tx` against the coin set: inputs spend our coins, and any
    /// output paying one of our keys becomes a new coin.
    fn apply_owned_transaction_locked(&self, state: &mut WalletState, tx: &Transaction) {
        for input in &tx.inputs {
            state.coins.remove(&input.outpoint);
        }
        let txid = tx.txid();
        for (index, output) in tx.outputs.iter().enumerate() {
            if self.signing_key_for_output(output).is_some() {
                state
                    .coins
                    .insert(OutPoint::new(txid, index as u32), output.clone());
            }
        }
    }

    /// The signing key controlling `output`, if this wallet owns it.
    fn signing_key_for_output(&self, output: &TxOutput) -> Option<BeaconKeypair> {
        match script::classify(&output.script) {
            ScriptTemplate::PayToKeyHash { key_hash } => self
                .keys
                .key_for_address(&Address::from_key_hash(key_hash)),
            ScriptTemplate::PayToPubkey { pubkey } => self
                .keys
                .find_key_by_pubkey(&BeaconPublicKey::from_bytes(pubkey)),
            _ => None,
        }
    }

    fn dispatch_on_pledge(&self, project: &Project, pledge: &PledgeMessage) {
        let registrations: Vec<_> = self.on_pledge.read().clone();
        for registration in registrations {
            let handler = registration.handler;
            let project = project.clone();
            let pledge = pledge.clone();
            registration
                .executor
                .execute(Box::new(move || handler(&project, &pledge)));
        }
    }

    fn dispatch_on_revoke(&self, pledge: &PledgeMessage) {
        let registrations: Vec<_> = self.on_revoke.read().clone();
        for registration in registrations {
            let handler = registration.handler;
            let pledge = pledge.clone();
            registration
                .executor
                .execute(Box::new(move || handler(&pledge)));
        }
    }

    fn dispatch_on_claim(&self, pledge: &PledgeMessage, tx: &Transaction) {
        let registrations: Vec<_> = self.on_claim.read().clone();
        for registration in registrations {
            let handler = registration.handler;
            let pledge = pledge.clone();
            let tx = tx.clone();
            registration
                .executor
                .execute(Box::new(move || handler(&pledge, &tx)));
        }
    }
}

/// Structural comparison of a spending transaction against a project's
/// required outputs: same count, and byte-equal (value, script) pairs in
/// order.
fn outputs_match_project(tx: &Transaction, project: &Project) -> bool {
    let required = project.outputs();
    tx.outputs.len() == required.len()
        && tx
            .outputs
            .iter()
            .zip(required.iter())
            .all(|(got, want)| got.value == want.value && got.script == want.script)
}
