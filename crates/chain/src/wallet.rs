//! Wallet capability model and submission-handle resolution.
//!
//! Wallet differences are confined to two places: a capability descriptor
//! built once at connect time, and a tagged handle type with one resolver
//! per kind. Nothing downstream branches on wallet identity.

use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::contracts::ISafe;

/// How a wallet reports a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletKind {
    /// Returns the on-chain transaction hash at submission time.
    Standard,
    /// Multisig-style (Safe): returns a proposal identifier; the real
    /// transaction hash only exists once co-signers execute the proposal.
    Multisig,
}

/// Capability descriptor passed to the orchestrator at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletCapabilities {
    /// Supports submitting multiple calls as one all-or-nothing transaction
    pub atomic_batch: bool,
    pub kind: WalletKind,
}

impl WalletCapabilities {
    pub fn standard() -> Self {
        Self {
            atomic_batch: false,
            kind: WalletKind::Standard,
        }
    }

    pub fn with_atomic_batch(mut self) -> Self {
        self.atomic_batch = true;
        self
    }

    pub fn multisig() -> Self {
        Self {
            // A Safe executes its queued calls atomically by construction.
            atomic_batch: true,
            kind: WalletKind::Multisig,
        }
    }
}

/// Map a connector identifier to capabilities. String matching on wallet
/// ids is a pragmatic fallback for connectors that expose no capability
/// API; it lives here and nowhere else.
pub fn detect_capabilities(connector_id: &str) -> WalletCapabilities {
    let id = connector_id.to_ascii_lowercase();
    if id.contains("safe") || id.contains("multisig") {
        return WalletCapabilities::multisig();
    }
    // EIP-5792 capable connectors advertise batch support in their id on
    // some platforms; anything unrecognized gets the conservative default.
    if id.contains("batch") || id.contains("smart") {
        return WalletCapabilities::standard().with_atomic_batch();
    }
    WalletCapabilities::standard()
}

/// What a wallet hands back at submission time. `Direct` carries the
/// on-chain transaction hash; `Proposal` carries a multisig proposal id
/// that must be resolved before any receipt is watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionHandle {
    Direct(B256),
    Proposal(B256),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("multisig proposal {0} failed on-chain")]
    ProposalFailed(B256),
    #[error("execution log for proposal {0} carries no transaction hash")]
    MissingTxHash(B256),
    #[error("rpc error while watching proposal: {0}")]
    Rpc(String),
}

/// Resolves a multisig proposal id to the hash of the transaction that
/// executed it.
#[async_trait]
pub trait ProposalWatcher: Send + Sync {
    async fn executed_tx_hash(&self, proposal: B256) -> Result<B256, WalletError>;
}

impl SubmissionHandle {
    /// Resolve to the real on-chain transaction hash. Direct handles are
    /// already resolved; proposals are watched until executed.
    pub async fn resolve(&self, watcher: &dyn ProposalWatcher) -> Result<B256, WalletError> {
        match self {
            Self::Direct(hash) => Ok(*hash),
            Self::Proposal(proposal) => {
                debug!(proposal = %proposal, "Watching multisig proposal for execution");
                watcher.executed_tx_hash(*proposal).await
            }
        }
    }
}

/// Log-polling watcher for Safe `ExecutionSuccess`/`ExecutionFailure`
/// events. Waits indefinitely; on-chain outcomes have no deadline and the
/// underlying transport applies its own retry policy.
pub struct SafeExecutionWatcher {
    rpc_url: String,
    safe: Address,
    poll_interval: Duration,
    /// How many blocks behind the head the first poll starts.
    lookback_blocks: u64,
}

impl SafeExecutionWatcher {
    pub fn new(rpc_url: impl Into<String>, safe: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            safe,
            poll_interval: Duration::from_secs(4),
            lookback_blocks: 10,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl ProposalWatcher for SafeExecutionWatcher {
    async fn executed_tx_hash(&self, proposal: B256) -> Result<B256, WalletError> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| WalletError::Rpc(format!("invalid rpc url: {e}")))?;
        let provider = ProviderBuilder::new().on_http(url);

        let head = provider
            .get_block_number()
            .await
            .map_err(|e| WalletError::Rpc(e.to_string()))?;
        // Rescanning the same window every poll is cheap at this rate and
        // immune to reorgs near the head.
        let from_block = head.saturating_sub(self.lookback_blocks);

        loop {
            let success = Filter::new()
                .address(self.safe)
                .event_signature(ISafe::ExecutionSuccess::SIGNATURE_HASH)
                .topic1(proposal)
                .from_block(from_block);
            let failure = Filter::new()
                .address(self.safe)
                .event_signature(ISafe::ExecutionFailure::SIGNATURE_HASH)
                .topic1(proposal)
                .from_block(from_block);

            let (success_logs, failure_logs) =
                tokio::join!(provider.get_logs(&success), provider.get_logs(&failure));

            let success_logs = success_logs.map_err(|e| WalletError::Rpc(e.to_string()))?;
            if let Some(log) = success_logs.first() {
                let hash = log
                    .transaction_hash
                    .ok_or(WalletError::MissingTxHash(proposal))?;
                debug!(proposal = %proposal, tx_hash = %hash, "Multisig proposal executed");
                return Ok(hash);
            }

            let failure_logs = failure_logs.map_err(|e| WalletError::Rpc(e.to_string()))?;
            if !failure_logs.is_empty() {
                warn!(proposal = %proposal, "Multisig proposal execution failed");
                return Err(WalletError::ProposalFailed(proposal));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
