//! Submission planning: decide how approvals and engine actions reach the
//! chain for a given wallet.
//!
//! The planner is pure. It looks at the latest allowance snapshots, the
//! wallet's capability descriptor and a user-level batching toggle, and
//! produces either one atomic batch or a sequential plan (approvals first,
//! then a single action transaction). It never submits anything itself.

use alloy::primitives::{Address, U256};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::debug;

use crate::calldata::{compose_multicall, decode_multicall, CallDescriptor, ComposeError, Composer};
use crate::reader::{ReadError, ReadState};
use crate::wallet::WalletCapabilities;

/// One spending requirement a planned action carries, paired with the
/// latest allowance snapshot for its (token, spender) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequirement {
    pub token: Address,
    pub spender: Address,
    /// Amount the action will pull; an approval is needed when the current
    /// allowance is below this.
    pub amount: U256,
    pub allowance: ReadState<U256>,
}

/// How the planned calls should be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStrategy {
    /// One all-or-nothing submission containing every call in order.
    Atomic { calls: Vec<CallDescriptor> },
    /// Approvals submitted (and confirmed) one by one, then the action.
    Sequential {
        approvals: SmallVec<[CallDescriptor; 2]>,
        action: CallDescriptor,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    /// At least one allowance snapshot has not resolved; planning against
    /// an unknown allowance could skip a required approval.
    #[error("allowance reads still resolving")]
    AllowancesPending,
    #[error("allowance read failed: {0}")]
    AllowanceRead(ReadError),
    #[error("no actions to plan")]
    NoActions,
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

/// Plan the submission of `actions` plus whatever approvals they need.
///
/// Approvals whose current allowance already covers the requirement are
/// dropped. With an atomic-batch wallet and batching enabled, everything
/// goes out as one batch with approvals ahead of the actions they unlock;
/// otherwise approvals run sequentially and multiple engine actions fold
/// into one engine multicall.
pub fn plan_batch(
    composer: &Composer,
    requirements: &[ApprovalRequirement],
    actions: &[CallDescriptor],
    capabilities: WalletCapabilities,
    batching_enabled: bool,
) -> Result<BatchStrategy, PlanError> {
    if actions.is_empty() {
        return Err(PlanError::NoActions);
    }

    let mut approvals: SmallVec<[CallDescriptor; 2]> = SmallVec::new();
    for requirement in requirements {
        let allowance = match &requirement.allowance {
            state if state.loading => return Err(PlanError::AllowancesPending),
            state => match (&state.data, &state.error) {
                (Some(allowance), _) => *allowance,
                (None, Some(e)) => return Err(PlanError::AllowanceRead(e.clone())),
                (None, None) => return Err(PlanError::AllowancesPending),
            },
        };
        if allowance >= requirement.amount {
            debug!(
                token = %requirement.token,
                spender = %requirement.spender,
                "Allowance sufficient, skipping approval"
            );
            continue;
        }
        approvals.push(composer.approve(
            requirement.token,
            requirement.spender,
            requirement.amount,
        )?);
    }

    // A lone action arriving pre-wrapped in a single-entry multicall is
    // unwrapped: the wrapper buys nothing and costs calldata.
    let mut actions: Vec<CallDescriptor> = if actions.len() == 1 {
        match decode_multicall(&actions[0]) {
            Ok(inner) if inner.len() == 1 => inner,
            _ => actions.to_vec(),
        }
    } else {
        actions.to_vec()
    };

    // Atomic batches only pay off for multi-action flows; a single action
    // goes out directly even when the wallet could batch it.
    if batching_enabled && capabilities.atomic_batch && actions.len() >= 2 {
        let mut calls = Vec::with_capacity(approvals.len() + actions.len());
        calls.extend(approvals);
        calls.extend(actions);
        return Ok(BatchStrategy::Atomic { calls });
    }

    let action = if actions.len() == 1 {
        actions.remove(0)
    } else {
        compose_multicall(&actions)?
    };
    Ok(BatchStrategy::Sequential { approvals, action })
}
