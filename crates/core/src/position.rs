//! Position snapshot: one urn's on-chain state joined with its risk
//! figures.

use alloy::primitives::{Address, U256};
use lockstake_chain::{RiskParams, UrnState};
use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::math::debt_value;
use crate::risk::{self, ReferencePrice, RiskSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub owner: Address,
    pub index: u64,
    /// Locked collateral (wad)
    pub collateral: U256,
    /// Actual debt with the accumulated rate applied (wad)
    pub debt: U256,
    pub reward_route: Option<Address>,
    pub delegate: Option<Address>,
    pub risk: RiskSnapshot,
}

impl PositionSnapshot {
    pub fn from_state(
        owner: Address,
        index: u64,
        state: &UrnState,
        params: &RiskParams,
        reference: &ReferencePrice,
        config: &RiskConfig,
    ) -> Self {
        Self {
            owner,
            index,
            collateral: state.ink,
            debt: debt_value(state.art, params.rate),
            reward_route: state.reward_route,
            delegate: state.delegate,
            risk: risk::compute(state.ink, state.art, params, reference, config),
        }
    }

    /// Closed positions keep their index forever; they are displayed but
    /// never counted at-risk.
    pub fn is_closed(&self) -> bool {
        self.collateral.is_zero() && self.debt.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{RAY, WAD};
    use crate::risk::PriceSource;

    #[test]
    fn test_snapshot_applies_rate_to_debt() {
        let params = RiskParams {
            // 10% accumulated interest
            rate: RAY + RAY / U256::from(10),
            spot: RAY,
            mat: RAY,
            par: RAY,
            dust: U256::ZERO,
            line: U256::ZERO,
            total_art: U256::ZERO,
        };
        let state = UrnState {
            ink: U256::from(100) * WAD,
            art: U256::from(50) * WAD,
            reward_route: Some(Address::repeat_byte(7)),
            delegate: None,
        };
        let reference = ReferencePrice {
            price: RAY * U256::from(2),
            source: PriceSource::Market,
        };

        let snapshot = PositionSnapshot::from_state(
            Address::repeat_byte(1),
            0,
            &state,
            &params,
            &reference,
            &RiskConfig::default(),
        );
        assert_eq!(snapshot.debt, U256::from(55) * WAD);
        assert_eq!(snapshot.reward_route, Some(Address::repeat_byte(7)));
        assert!(!snapshot.is_closed());
    }
}
