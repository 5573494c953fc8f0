//! On-chain interaction layer for the staking engine client: typed contract
//! bindings, pure calldata composition, read-only protocol queries, and the
//! transaction orchestration state machine with its wallet seams.

pub mod batching;
pub mod calldata;
pub mod contracts;
pub mod orchestrator;
pub mod provider;
pub mod reader;
pub mod wallet;

pub use batching::{plan_batch, ApprovalRequirement, BatchStrategy, PlanError};
pub use calldata::{
    compose_multicall, decode_multicall, CallDescriptor, ComposeError, Composer, REFERRAL_CODE,
};
pub use contracts::ProtocolAddresses;
pub use orchestrator::{
    ActionOrchestrator, ActionStatus, Network, NetworkError, OrchestrateError, Phase,
    PreparedRequest, ReceiptOutcome, SimulateError,
};
pub use provider::{RpcNetwork, WalletTransport};
pub use reader::{
    PositionReads, ProtocolReader, ReadError, ReadState, RiskParams, TokenReads, UrnState,
};
pub use wallet::{
    detect_capabilities, ProposalWatcher, SafeExecutionWatcher, SubmissionHandle,
    WalletCapabilities, WalletError, WalletKind,
};
