//! Calldata composition for staking engine operations.
//!
//! Builders are pure: they validate parameters and encode a single engine
//! (or token) operation into an opaque [`CallDescriptor`] without touching
//! network state. `compose_multicall` folds several same-target descriptors
//! into one `multicall(bytes[])` descriptor.
//!
//! Order inside a multicall is a protocol invariant, not something this
//! layer enforces: collateral must be locked before debt is drawn against
//! it, and the engine executes sub-calls exactly in the order given.
//! Callers sequence descriptors accordingly.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use thiserror::Error;

use crate::contracts::{IERC20, IStakingEngine};

/// Referral code attached to lock/selectFarm calls.
pub const REFERRAL_CODE: u16 = 0;

/// A single encoded protocol call: target contract, ABI-encoded payload,
/// attached native value. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    pub target: Address,
    pub payload: Bytes,
    pub value: U256,
}

impl CallDescriptor {
    pub fn new(target: Address, payload: Bytes) -> Self {
        Self {
            target,
            payload,
            value: U256::ZERO,
        }
    }

    /// Four-byte function selector of the payload, if present.
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.payload.get(..4).map(|s| {
            let mut sel = [0u8; 4];
            sel.copy_from_slice(s);
            sel
        })
    }
}

/// Errors from descriptor builders and multicall composition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("{op}: owner address is required")]
    MissingOwner { op: &'static str },
    #[error("{op}: recipient address is required")]
    MissingRecipient { op: &'static str },
    #[error("{op}: amount must be non-zero")]
    ZeroAmount { op: &'static str },
    #[error("approve: spender address is required")]
    MissingSpender,
    #[error("getReward: farm address is required")]
    MissingFarm,
    #[error("multicall requires at least one descriptor")]
    EmptyMulticall,
    #[error("multicall descriptors must share one target (expected {expected}, got {got})")]
    MixedTargets { expected: Address, got: Address },
    #[error("multicall descriptors must not carry native value")]
    ValueInMulticall,
    #[error("payload is not an engine multicall")]
    NotMulticall,
    #[error("payload decoding failed: {0}")]
    Decode(String),
}

/// Pure builder for engine and token call descriptors.
///
/// Holds only deployed addresses; every method returns a fresh descriptor
/// and performs no I/O.
#[derive(Debug, Clone, Copy)]
pub struct Composer {
    engine: Address,
}

impl Composer {
    pub fn new(engine: Address) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> Address {
        self.engine
    }

    fn engine_call(&self, payload: Vec<u8>) -> CallDescriptor {
        CallDescriptor::new(self.engine, Bytes::from(payload))
    }

    /// Open a new position at the owner's next index.
    pub fn open(&self, index: u64) -> Result<CallDescriptor, ComposeError> {
        Ok(self.engine_call(
            IStakingEngine::openCall {
                index: U256::from(index),
            }
            .abi_encode(),
        ))
    }

    /// Lock governance-token collateral into a position.
    pub fn lock(&self, owner: Address, index: u64, wad: U256) -> Result<CallDescriptor, ComposeError> {
        require_owner(owner, "lock")?;
        require_amount(wad, "lock")?;
        Ok(self.engine_call(
            IStakingEngine::lockCall {
                owner,
                index: U256::from(index),
                wad,
                refCode: REFERRAL_CODE,
            }
            .abi_encode(),
        ))
    }

    /// Withdraw collateral from a position to `to`.
    pub fn free(
        &self,
        owner: Address,
        index: u64,
        to: Address,
        wad: U256,
    ) -> Result<CallDescriptor, ComposeError> {
        require_owner(owner, "free")?;
        require_recipient(to, "free")?;
        require_amount(wad, "free")?;
        Ok(self.engine_call(
            IStakingEngine::freeCall {
                owner,
                index: U256::from(index),
                to,
                wad,
            }
            .abi_encode(),
        ))
    }

    /// Draw stablecoin debt against a position, paid out to `to`.
    pub fn draw(
        &self,
        owner: Address,
        index: u64,
        to: Address,
        wad: U256,
    ) -> Result<CallDescriptor, ComposeError> {
        require_owner(owner, "draw")?;
        require_recipient(to, "draw")?;
        require_amount(wad, "draw")?;
        Ok(self.engine_call(
            IStakingEngine::drawCall {
                owner,
                index: U256::from(index),
                to,
                wad,
            }
            .abi_encode(),
        ))
    }

    /// Repay part of a position's debt.
    pub fn wipe(&self, owner: Address, index: u64, wad: U256) -> Result<CallDescriptor, ComposeError> {
        require_owner(owner, "wipe")?;
        require_amount(wad, "wipe")?;
        Ok(self.engine_call(
            IStakingEngine::wipeCall {
                owner,
                index: U256::from(index),
                wad,
            }
            .abi_encode(),
        ))
    }

    /// Repay a position's entire debt, dust-safe.
    pub fn wipe_all(&self, owner: Address, index: u64) -> Result<CallDescriptor, ComposeError> {
        require_owner(owner, "wipeAll")?;
        Ok(self.engine_call(
            IStakingEngine::wipeAllCall {
                owner,
                index: U256::from(index),
            }
            .abi_encode(),
        ))
    }

    /// Route staking rewards to `farm`. The zero address deselects.
    pub fn select_farm(
        &self,
        owner: Address,
        index: u64,
        farm: Address,
    ) -> Result<CallDescriptor, ComposeError> {
        require_owner(owner, "selectFarm")?;
        Ok(self.engine_call(
            IStakingEngine::selectFarmCall {
                owner,
                index: U256::from(index),
                farm,
                refCode: REFERRAL_CODE,
            }
            .abi_encode(),
        ))
    }

    /// Delegate the locked token's voting power. The zero address undelegates.
    pub fn select_vote_delegate(
        &self,
        owner: Address,
        index: u64,
        delegate: Address,
    ) -> Result<CallDescriptor, ComposeError> {
        require_owner(owner, "selectVoteDelegate")?;
        Ok(self.engine_call(
            IStakingEngine::selectVoteDelegateCall {
                owner,
                index: U256::from(index),
                voteDelegate: delegate,
            }
            .abi_encode(),
        ))
    }

    /// Claim accrued farm rewards to `to`.
    pub fn get_reward(
        &self,
        owner: Address,
        index: u64,
        farm: Address,
        to: Address,
    ) -> Result<CallDescriptor, ComposeError> {
        require_owner(owner, "getReward")?;
        require_recipient(to, "getReward")?;
        if farm.is_zero() {
            return Err(ComposeError::MissingFarm);
        }
        Ok(self.engine_call(
            IStakingEngine::getRewardCall {
                owner,
                index: U256::from(index),
                farm,
                to,
            }
            .abi_encode(),
        ))
    }

    /// ERC-20 approval for `spender` on `token`.
    pub fn approve(
        &self,
        token: Address,
        spender: Address,
        value: U256,
    ) -> Result<CallDescriptor, ComposeError> {
        if spender.is_zero() {
            return Err(ComposeError::MissingSpender);
        }
        Ok(CallDescriptor::new(
            token,
            Bytes::from(IERC20::approveCall { spender, value }.abi_encode()),
        ))
    }
}

fn require_owner(owner: Address, op: &'static str) -> Result<(), ComposeError> {
    if owner.is_zero() {
        return Err(ComposeError::MissingOwner { op });
    }
    Ok(())
}

fn require_recipient(to: Address, op: &'static str) -> Result<(), ComposeError> {
    if to.is_zero() {
        return Err(ComposeError::MissingRecipient { op });
    }
    Ok(())
}

fn require_amount(wad: U256, op: &'static str) -> Result<(), ComposeError> {
    if wad.is_zero() {
        return Err(ComposeError::ZeroAmount { op });
    }
    Ok(())
}

/// Fold same-target descriptors into one `multicall(bytes[])` descriptor.
///
/// Payload order is preserved exactly as given; see the module docs for why
/// this matters.
pub fn compose_multicall(descriptors: &[CallDescriptor]) -> Result<CallDescriptor, ComposeError> {
    let first = descriptors.first().ok_or(ComposeError::EmptyMulticall)?;
    let target = first.target;

    let mut data = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        if descriptor.target != target {
            return Err(ComposeError::MixedTargets {
                expected: target,
                got: descriptor.target,
            });
        }
        if !descriptor.value.is_zero() {
            return Err(ComposeError::ValueInMulticall);
        }
        data.push(descriptor.payload.clone());
    }

    Ok(CallDescriptor::new(
        target,
        Bytes::from(IStakingEngine::multicallCall { data }.abi_encode()),
    ))
}

/// Decode a multicall descriptor back into its ordered sub-descriptors.
pub fn decode_multicall(descriptor: &CallDescriptor) -> Result<Vec<CallDescriptor>, ComposeError> {
    if descriptor.selector() != Some(IStakingEngine::multicallCall::SELECTOR) {
        return Err(ComposeError::NotMulticall);
    }
    let call = IStakingEngine::multicallCall::abi_decode(&descriptor.payload, true)
        .map_err(|e| ComposeError::Decode(e.to_string()))?;
    Ok(call
        .data
        .into_iter()
        .map(|payload| CallDescriptor::new(descriptor.target, payload))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer() -> Composer {
        Composer::new(Address::repeat_byte(0xEE))
    }

    fn owner() -> Address {
        Address::repeat_byte(0x11)
    }

    #[test]
    fn test_builders_validate_parameters() {
        let c = composer();

        assert_eq!(
            c.lock(Address::ZERO, 0, U256::from(1)).unwrap_err(),
            ComposeError::MissingOwner { op: "lock" }
        );
        assert_eq!(
            c.lock(owner(), 0, U256::ZERO).unwrap_err(),
            ComposeError::ZeroAmount { op: "lock" }
        );
        assert_eq!(
            c.draw(owner(), 0, Address::ZERO, U256::from(1)).unwrap_err(),
            ComposeError::MissingRecipient { op: "draw" }
        );
        assert_eq!(
            c.approve(Address::repeat_byte(0xAA), Address::ZERO, U256::MAX)
                .unwrap_err(),
            ComposeError::MissingSpender
        );
        assert_eq!(
            c.get_reward(owner(), 0, Address::ZERO, owner()).unwrap_err(),
            ComposeError::MissingFarm
        );
    }

    #[test]
    fn test_builders_target_engine() {
        let c = composer();
        let open = c.open(0).unwrap();
        assert_eq!(open.target, c.engine());
        assert_eq!(open.selector(), Some(IStakingEngine::openCall::SELECTOR));

        let lock = c.lock(owner(), 0, U256::from(100)).unwrap();
        assert_eq!(lock.target, c.engine());
        assert_eq!(lock.value, U256::ZERO);
        assert_eq!(lock.selector(), Some(IStakingEngine::lockCall::SELECTOR));

        let approve = c
            .approve(Address::repeat_byte(0xAA), c.engine(), U256::MAX)
            .unwrap();
        assert_eq!(approve.target, Address::repeat_byte(0xAA));
        assert_eq!(approve.selector(), Some(IERC20::approveCall::SELECTOR));
    }

    #[test]
    fn test_multicall_round_trip_preserves_order() {
        let c = composer();
        let a = c.open(0).unwrap();
        let b = c.lock(owner(), 0, U256::from(500)).unwrap();
        let d = c.draw(owner(), 0, owner(), U256::from(100)).unwrap();

        let composed = compose_multicall(&[a.clone(), b.clone(), d.clone()]).unwrap();
        assert_eq!(composed.target, c.engine());
        assert_eq!(
            composed.selector(),
            Some(IStakingEngine::multicallCall::SELECTOR)
        );

        let decoded = decode_multicall(&composed).unwrap();
        assert_eq!(decoded, vec![a, b, d]);
    }

    #[test]
    fn test_multicall_lock_before_draw_order_is_kept() {
        // The engine executes sub-calls in order; locking after drawing
        // would revert on-chain, so composition must never swap them.
        let c = composer();
        let lock = c.lock(owner(), 3, U256::from(1_000)).unwrap();
        let draw = c.draw(owner(), 3, owner(), U256::from(250)).unwrap();

        let decoded = decode_multicall(&compose_multicall(&[lock.clone(), draw.clone()]).unwrap()).unwrap();
        assert_eq!(decoded[0].selector(), Some(IStakingEngine::lockCall::SELECTOR));
        assert_eq!(decoded[1].selector(), Some(IStakingEngine::drawCall::SELECTOR));
    }

    #[test]
    fn test_multicall_rejects_mixed_targets_and_value() {
        let c = composer();
        let engine_call = c.open(0).unwrap();
        let token_call = c
            .approve(Address::repeat_byte(0xAA), c.engine(), U256::MAX)
            .unwrap();

        assert!(matches!(
            compose_multicall(&[engine_call.clone(), token_call]),
            Err(ComposeError::MixedTargets { .. })
        ));

        let mut with_value = engine_call;
        with_value.value = U256::from(1);
        assert_eq!(
            compose_multicall(&[with_value]).unwrap_err(),
            ComposeError::ValueInMulticall
        );

        assert_eq!(
            compose_multicall(&[]).unwrap_err(),
            ComposeError::EmptyMulticall
        );
    }

    #[test]
    fn test_decode_rejects_non_multicall() {
        let c = composer();
        let lock = c.lock(owner(), 0, U256::from(1)).unwrap();
        assert_eq!(decode_multicall(&lock).unwrap_err(), ComposeError::NotMulticall);
    }
}
