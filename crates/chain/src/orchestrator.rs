//! Transaction orchestration state machine.
//!
//! One [`ActionOrchestrator`] owns one logical action slot (an approve
//! button, a borrow flow step). It drives a lifecycle record through
//! `Idle → Simulating → Ready → Submitting → Pending → Success | Failed`,
//! keeping simulation failures (`prepare_error`, recoverable by
//! re-simulating) separate from post-submission failures (`error`).
//!
//! Wallet differences stay out of the machine: submission returns a tagged
//! [`SubmissionHandle`] and the `Pending` phase only ever watches the
//! resolved on-chain hash. A slot prepared with several calls submits them
//! as one all-or-nothing batch through the same lifecycle.

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::calldata::CallDescriptor;
use crate::wallet::{ProposalWatcher, SubmissionHandle, WalletCapabilities, WalletError};

/// A simulated, ready-to-send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub call: CallDescriptor,
    pub from: Address,
    pub gas_estimate: Option<u64>,
}

/// Terminal receipt outcome for a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    Success,
    Reverted,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("wallet rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SimulateError {
    #[error("simulation reverted: {0}")]
    Revert(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Network seam the orchestrator drives. The RPC adapter implements it for
/// production; tests substitute in-memory fakes.
#[async_trait]
pub trait Network: Send + Sync {
    async fn simulate(
        &self,
        call: &CallDescriptor,
        from: Address,
    ) -> Result<PreparedRequest, SimulateError>;
    async fn submit(&self, prepared: &PreparedRequest) -> Result<SubmissionHandle, NetworkError>;
    /// Submit several prepared requests as one all-or-nothing batch.
    async fn submit_batch(
        &self,
        prepared: &[PreparedRequest],
    ) -> Result<SubmissionHandle, NetworkError>;
    async fn wait_for_receipt(&self, hash: B256) -> Result<ReceiptOutcome, NetworkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Simulating,
    Ready,
    Submitting,
    Pending,
    Success,
    Failed,
}

/// Post-prepare failure taxonomy. `PrepareFailed` lives in the separate
/// `prepare_error` channel and never reaches the `on_error` callback; the
/// rest land in `error`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestrateError {
    /// Simulation reverted or could not complete; resolved by changing
    /// inputs and re-simulating, not by user-facing failure handling.
    #[error("simulation failed: {reason}")]
    PrepareFailed { reason: String },
    /// Wallet declined or failed to send. Surfaced immediately, no retry.
    #[error("submission failed: {reason}")]
    Submission { reason: String },
    /// Mined but reverted. For a multisig proposal rejected before the
    /// executed hash was known, the proposal id stands in for `hash`.
    #[error("transaction {hash} reverted on-chain")]
    Reverted { hash: B256 },
    /// The receipt watcher itself failed; the transaction may still land.
    #[error("receipt polling failed for {hash}: {reason}")]
    Receipt { hash: B256, reason: String },
}

impl OrchestrateError {
    /// Whether "retry fetching status" is the right offer, as opposed to
    /// "the action failed, try again".
    pub fn offers_status_retry(&self) -> bool {
        matches!(self, Self::Receipt { .. })
    }
}

/// Snapshot of one slot's lifecycle, shaped for a UI consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionStatus {
    pub phase: Phase,
    pub prepared: bool,
    pub is_loading: bool,
    pub data: Option<B256>,
    pub error: Option<OrchestrateError>,
    pub prepare_error: Option<OrchestrateError>,
}

/// What a ready slot will submit: one wallet transaction, or one atomic
/// batch of them.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PreparedPlan {
    Single(PreparedRequest),
    Batch(Vec<PreparedRequest>),
}

/// Mutable lifecycle record. Owned by the orchestrator for the duration of
/// one user-initiated action; replaced wholesale when a new action starts.
#[derive(Debug)]
struct Lifecycle {
    phase: Phase,
    calls: Vec<CallDescriptor>,
    prepared: Option<PreparedPlan>,
    hash: Option<B256>,
    error: Option<OrchestrateError>,
    prepare_error: Option<OrchestrateError>,
    callbacks_fired: bool,
}

impl Lifecycle {
    fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            calls: Vec::new(),
            prepared: None,
            hash: None,
            error: None,
            prepare_error: None,
            callbacks_fired: false,
        }
    }

    fn simulating(calls: Vec<CallDescriptor>) -> Self {
        Self {
            phase: Phase::Simulating,
            calls,
            ..Self::idle()
        }
    }

    fn status(&self) -> ActionStatus {
        ActionStatus {
            phase: self.phase,
            prepared: self.prepared.is_some(),
            is_loading: matches!(
                self.phase,
                Phase::Simulating | Phase::Submitting | Phase::Pending
            ),
            data: self.hash,
            error: self.error.clone(),
            prepare_error: self.prepare_error.clone(),
        }
    }
}

type LifecycleCell = Arc<Mutex<Lifecycle>>;
type SuccessHook = Box<dyn Fn(B256) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&OrchestrateError) + Send + Sync>;

/// State machine for one action slot.
///
/// Concurrent unrelated actions (an approval next to the main action) each
/// get their own orchestrator. Starting a new `prepare` while a previous
/// transaction is still pending does not cancel it: the in-flight record
/// runs to its terminal state on its own and still fires its callbacks.
pub struct ActionOrchestrator {
    label: String,
    sender: Address,
    capabilities: WalletCapabilities,
    network: Arc<dyn Network>,
    watcher: Option<Arc<dyn ProposalWatcher>>,
    current: Mutex<LifecycleCell>,
    on_success: Option<SuccessHook>,
    on_error: Option<ErrorHook>,
}

impl ActionOrchestrator {
    pub fn new(
        label: impl Into<String>,
        sender: Address,
        capabilities: WalletCapabilities,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            label: label.into(),
            sender,
            capabilities,
            network,
            watcher: None,
            current: Mutex::new(Arc::new(Mutex::new(Lifecycle::idle()))),
            on_success: None,
            on_error: None,
        }
    }

    /// Required for multisig wallets; resolves proposal ids to executed
    /// transaction hashes.
    pub fn with_proposal_watcher(mut self, watcher: Arc<dyn ProposalWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn on_success(mut self, hook: impl Fn(B256) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&OrchestrateError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    pub fn capabilities(&self) -> WalletCapabilities {
        self.capabilities
    }

    /// Current slot status.
    pub fn status(&self) -> ActionStatus {
        let status = self.current.lock().lock().status();
        status
    }

    /// Start a fresh lifecycle for `call`: simulate it and cache the
    /// prepared request on success. Called whenever the slot's inputs
    /// change and its enablement predicate holds.
    #[instrument(skip(self, call), fields(slot = %self.label, target = %call.target))]
    pub async fn prepare(&self, call: CallDescriptor) -> ActionStatus {
        self.start(vec![call]).await
    }

    /// Start a fresh lifecycle for an atomic batch: every call is simulated
    /// individually, and execution submits them as one all-or-nothing
    /// submission. Requires a wallet with the atomic-batch capability.
    #[instrument(skip(self, calls), fields(slot = %self.label, calls = calls.len()))]
    pub async fn prepare_batch(&self, calls: Vec<CallDescriptor>) -> ActionStatus {
        if calls.is_empty() {
            warn!(slot = %self.label, "prepare_batch with no calls");
            let record: LifecycleCell = Arc::new(Mutex::new(Lifecycle::idle()));
            record.lock().prepare_error = Some(OrchestrateError::PrepareFailed {
                reason: "empty batch".into(),
            });
            record.lock().phase = Phase::Failed;
            *self.current.lock() = record.clone();
            let status = record.lock().status();
            return status;
        }
        if calls.len() >= 2 && !self.capabilities.atomic_batch {
            warn!(slot = %self.label, "batch prepared for a wallet without atomic batching");
        }
        self.start(calls).await
    }

    async fn start(&self, calls: Vec<CallDescriptor>) -> ActionStatus {
        let record: LifecycleCell = Arc::new(Mutex::new(Lifecycle::simulating(calls.clone())));
        *self.current.lock() = record.clone();
        self.simulate_into(&record, &calls).await;
        let status = record.lock().status();
        debug!(slot = %self.label, phase = ?status.phase, "Prepare finished");
        status
    }

    /// Re-run simulation for the current calls, e.g. after an approval
    /// landed and the previous dry run stopped reverting.
    pub async fn retry_prepare(&self) -> ActionStatus {
        let record = self.current.lock().clone();
        let calls = {
            let mut lc = record.lock();
            if lc.calls.is_empty() {
                warn!(slot = %self.label, "retry_prepare with nothing to simulate");
                let status = lc.status();
                return status;
            }
            lc.phase = Phase::Simulating;
            lc.prepared = None;
            lc.prepare_error = None;
            lc.calls.clone()
        };
        self.simulate_into(&record, &calls).await;
        let status = record.lock().status();
        status
    }

    async fn simulate_into(&self, record: &LifecycleCell, calls: &[CallDescriptor]) {
        let mut prepared = Vec::with_capacity(calls.len());
        for call in calls {
            match self.network.simulate(call, self.sender).await {
                Ok(request) => prepared.push(request),
                Err(e) => {
                    debug!(slot = %self.label, target = %call.target, error = %e, "Simulation failed");
                    let mut lc = record.lock();
                    lc.prepare_error = Some(OrchestrateError::PrepareFailed {
                        reason: e.to_string(),
                    });
                    lc.phase = Phase::Failed;
                    return;
                }
            }
        }

        let plan = if prepared.len() == 1 {
            PreparedPlan::Single(prepared.remove(0))
        } else {
            PreparedPlan::Batch(prepared)
        };
        let mut lc = record.lock();
        lc.prepared = Some(plan);
        lc.prepare_error = None;
        lc.phase = Phase::Ready;
    }

    /// Submit the prepared plan and track it to a terminal state.
    ///
    /// With no prepared plan (fast user input racing simulation), this
    /// reports a stale-request condition through developer logs and leaves
    /// the record untouched; it never guesses at stale parameters.
    #[instrument(skip(self), fields(slot = %self.label))]
    pub async fn execute(&self) -> ActionStatus {
        let record = self.current.lock().clone();

        let plan = {
            let mut lc = record.lock();
            match (lc.phase, lc.prepared.clone()) {
                (Phase::Ready, Some(plan)) => {
                    lc.phase = Phase::Submitting;
                    plan
                }
                _ => {
                    error!(
                        slot = %self.label,
                        phase = ?lc.phase,
                        prepared = lc.prepared.is_some(),
                        calls = lc.calls.len(),
                        target = ?lc.calls.first().map(|c| c.target),
                        selector = ?lc.calls.first().and_then(|c| c.selector()).map(hex::encode),
                        sender = %self.sender,
                        "execute() with no prepared request; ignoring stale request"
                    );
                    let status = lc.status();
                    return status;
                }
            }
        };

        let submitted = match &plan {
            PreparedPlan::Single(prepared) => self.network.submit(prepared).await,
            PreparedPlan::Batch(prepared) => self.network.submit_batch(prepared).await,
        };
        let handle = match submitted {
            Ok(handle) => handle,
            Err(e) => {
                return self.fail(
                    &record,
                    OrchestrateError::Submission {
                        reason: e.to_string(),
                    },
                );
            }
        };

        // A multisig wallet hands back a proposal id, not a transaction
        // hash; everything downstream must watch the resolved hash.
        let hash = match self.resolve_handle(handle).await {
            Ok(hash) => hash,
            Err(e) => return self.fail(&record, e),
        };

        {
            let mut lc = record.lock();
            lc.phase = Phase::Pending;
            lc.hash = Some(hash);
        }
        info!(slot = %self.label, tx_hash = %hash, "Transaction pending");

        match self.network.wait_for_receipt(hash).await {
            Ok(ReceiptOutcome::Success) => {
                record.lock().phase = Phase::Success;
                self.fire_success(&record, hash);
                info!(slot = %self.label, tx_hash = %hash, "Transaction confirmed");
                let status = record.lock().status();
                status
            }
            Ok(ReceiptOutcome::Reverted) => self.fail(&record, OrchestrateError::Reverted { hash }),
            Err(e) => self.fail(
                &record,
                OrchestrateError::Receipt {
                    hash,
                    reason: e.to_string(),
                },
            ),
        }
    }

    async fn resolve_handle(&self, handle: SubmissionHandle) -> Result<B256, OrchestrateError> {
        match handle {
            SubmissionHandle::Direct(hash) => Ok(hash),
            SubmissionHandle::Proposal(proposal) => {
                let watcher = self.watcher.as_ref().ok_or_else(|| {
                    OrchestrateError::Submission {
                        reason: "multisig submission without a proposal watcher".into(),
                    }
                })?;
                handle.resolve(watcher.as_ref()).await.map_err(|e| match e {
                    WalletError::ProposalFailed(p) => OrchestrateError::Reverted { hash: p },
                    other => OrchestrateError::Receipt {
                        hash: proposal,
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    fn fail(&self, record: &LifecycleCell, err: OrchestrateError) -> ActionStatus {
        warn!(slot = %self.label, error = %err, "Action failed");
        let fire = {
            let mut lc = record.lock();
            lc.phase = Phase::Failed;
            lc.error = Some(err.clone());
            !std::mem::replace(&mut lc.callbacks_fired, true)
        };
        if fire {
            if let Some(hook) = &self.on_error {
                hook(&err);
            }
        }
        let status = record.lock().status();
        status
    }

    fn fire_success(&self, record: &LifecycleCell, hash: B256) {
        let fire = {
            let mut lc = record.lock();
            !std::mem::replace(&mut lc.callbacks_fired, true)
        };
        if fire {
            if let Some(hook) = &self.on_success {
                hook(hash);
            }
        }
    }
}
