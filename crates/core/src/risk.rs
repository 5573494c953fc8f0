//! Collateral risk engine.
//!
//! Risk is the ratio of a position's liquidation price to the current
//! reference price, expressed as a percentage: 0% for a debt-free position,
//! 100% at (or past) the liquidation point. The same snapshot also carries
//! the slider bounds a UI needs: the floor imposed by the protocol's dust
//! limit and the ceiling imposed by the debt ceiling and the configured cap
//! indication.

use alloy::primitives::U256;
use lockstake_chain::RiskParams;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::RiskConfig;
use crate::math::{
    debt_value, delayed_price, liquidation_price, rad_to_wad, ray_to_f64, wad_to_ray,
};

/// Where the reference price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    /// Live market price from the off-chain feed
    Market,
    /// The oracle's delayed price reconstructed from on-chain parameters
    Protocol,
}

/// Reference price (ray) every risk figure in one pass is judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferencePrice {
    pub price: U256,
    pub source: PriceSource,
}

impl ReferencePrice {
    /// Prefer the live market price (wad); without one, fall back to the
    /// protocol's delayed price. The fallback is tagged, not fatal: a
    /// conservative on-chain price beats showing no risk figure at all.
    pub fn select(market_wad: Option<U256>, params: &RiskParams) -> Self {
        match market_wad {
            Some(price) if !price.is_zero() => Self {
                price: wad_to_ray(price),
                source: PriceSource::Market,
            },
            _ => {
                warn!("No market price available, falling back to protocol delayed price");
                Self {
                    price: delayed_price(params.par, params.spot, params.mat),
                    source: PriceSource::Protocol,
                }
            }
        }
    }
}

/// Risk classification of one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Liquidation,
}

impl RiskLevel {
    pub fn classify(risk_percent: f64, is_liquidated: bool, config: &RiskConfig) -> Self {
        if is_liquidated || risk_percent >= 100.0 {
            Self::Liquidation
        } else if risk_percent >= config.high_risk_threshold {
            Self::High
        } else if risk_percent >= config.medium_risk_threshold {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Full risk picture for one position at one reference price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// 0..=100; never NaN
    pub risk_percent: f64,
    /// Lowest reachable risk given the dust limit, if defined
    pub floor: Option<f64>,
    /// Highest presentable risk given the debt ceiling and the cap
    /// indication, if defined
    pub ceiling: Option<f64>,
    /// Reference price at which the position becomes unsafe (ray)
    pub liquidation_price: Option<U256>,
    pub is_liquidated: bool,
    pub price_source: PriceSource,
}

/// Compute the risk snapshot for a position with `ink` collateral (wad) and
/// `art` normalized debt (wad).
pub fn compute(
    ink: U256,
    art: U256,
    params: &RiskParams,
    reference: &ReferencePrice,
    config: &RiskConfig,
) -> RiskSnapshot {
    let debt = debt_value(art, params.rate);
    let liq_price = liquidation_price(ink, debt, params.mat);

    let risk_percent = if debt.is_zero() {
        0.0
    } else if ink.is_zero() || reference.price.is_zero() {
        // Debt with no collateral or no usable price: treat as fully unsafe.
        100.0
    } else {
        match liq_price {
            Some(lp) if lp >= reference.price => 100.0,
            Some(lp) => percent_of(lp, reference.price),
            None => 100.0,
        }
    };
    let is_liquidated = !debt.is_zero() && risk_percent >= 100.0;

    let bounds_defined = !ink.is_zero() && !reference.price.is_zero();

    // Dust floor: the protocol rejects any debt below dust, so the lowest
    // reachable non-zero risk is the risk at exactly dust.
    let floor = bounds_defined.then(|| {
        let dust_wad = rad_to_wad(params.dust);
        if debt <= dust_wad {
            0.0
        } else {
            risk_at(dust_wad, ink, params.mat, reference.price)
        }
    });

    // Ceiling: risk at the maximum debt this position could draw given the
    // remaining room under the debt ceiling, capped by the configured
    // indication so the UI never steers users to the liquidation edge.
    let ceiling = bounds_defined.then(|| {
        let drawn_rad = params.total_art * params.rate;
        let headroom = rad_to_wad(params.line.saturating_sub(drawn_rad));
        let max_debt = debt + headroom;
        risk_at(max_debt, ink, params.mat, reference.price)
            .min(config.cap_indication_percentage)
    });

    RiskSnapshot {
        risk_percent,
        floor,
        ceiling,
        liquidation_price: liq_price,
        is_liquidated,
        price_source: reference.source,
    }
}

/// Risk percent of a hypothetical debt at the same collateral and price.
fn risk_at(debt: U256, ink: U256, mat: U256, reference: U256) -> f64 {
    match liquidation_price(ink, debt, mat) {
        Some(lp) if lp >= reference => 100.0,
        Some(lp) => percent_of(lp, reference),
        None => 100.0,
    }
}

fn percent_of(numerator: U256, denominator: U256) -> f64 {
    (ray_to_f64(numerator) / ray_to_f64(denominator) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{RAY, WAD};

    fn params() -> RiskParams {
        RiskParams {
            rate: RAY,
            // price 0.05, par 1, mat 1.45 -> spot = 0.05 / 1.45
            spot: RAY / U256::from(20) * RAY / (RAY * U256::from(145) / U256::from(100)),
            mat: RAY * U256::from(145) / U256::from(100),
            par: RAY,
            dust: U256::from(10_000) * RAY * WAD,
            line: U256::from(60_000) * RAY * WAD,
            total_art: U256::from(38_000) * WAD,
        }
    }

    fn market_ref() -> ReferencePrice {
        // 0.05 USD market price
        ReferencePrice::select(Some(WAD / U256::from(20)), &params())
    }

    #[test]
    fn test_healthy_position_risk_and_bounds() {
        let ink = U256::from(2_400_000) * WAD;
        let art = U256::from(38_000) * WAD;

        let snapshot = compute(ink, art, &params(), &market_ref(), &RiskConfig::default());

        // liq price = 38_000 * 1.45 / 2_400_000 = 0.0229583; / 0.05 = 45.92%
        assert!((snapshot.risk_percent - 45.9166).abs() < 0.01);
        assert!(!snapshot.is_liquidated);
        assert_eq!(snapshot.price_source, PriceSource::Market);

        // floor at dust debt (10_000): 12.08%; ceiling at max debt
        // (38_000 + 22_000 headroom = 60_000): 72.5%, under the 94% cap
        let floor = snapshot.floor.unwrap();
        let ceiling = snapshot.ceiling.unwrap();
        assert!((floor - 12.0833).abs() < 0.01);
        assert!((ceiling - 72.5).abs() < 0.01);
        assert!(floor <= snapshot.risk_percent && snapshot.risk_percent <= ceiling);
    }

    #[test]
    fn test_debt_free_position_is_zero_risk() {
        let snapshot = compute(
            U256::from(1_000) * WAD,
            U256::ZERO,
            &params(),
            &market_ref(),
            &RiskConfig::default(),
        );
        assert_eq!(snapshot.risk_percent, 0.0);
        assert!(!snapshot.is_liquidated);
        // No debt also means no debt below dust: the floor reads zero.
        assert_eq!(snapshot.floor, Some(0.0));
    }

    #[test]
    fn test_zero_collateral_debtor_is_liquidated_not_nan() {
        let snapshot = compute(
            U256::ZERO,
            U256::from(500) * WAD,
            &params(),
            &market_ref(),
            &RiskConfig::default(),
        );
        assert_eq!(snapshot.risk_percent, 100.0);
        assert!(snapshot.is_liquidated);
        assert!(snapshot.liquidation_price.is_none());
        assert!(!snapshot.risk_percent.is_nan());
        assert!(snapshot.floor.is_none());
        assert!(snapshot.ceiling.is_none());
    }

    #[test]
    fn test_ceiling_is_capped_by_indication() {
        let p = RiskParams {
            // Effectively unlimited headroom
            line: U256::from(1_000_000_000u64) * RAY * WAD,
            ..params()
        };
        let snapshot = compute(
            U256::from(2_400_000) * WAD,
            U256::from(38_000) * WAD,
            &p,
            &market_ref(),
            &RiskConfig::default(),
        );
        assert_eq!(snapshot.ceiling, Some(94.0));
    }

    #[test]
    fn test_missing_market_price_falls_back_tagged() {
        let reference = ReferencePrice::select(None, &params());
        assert_eq!(reference.source, PriceSource::Protocol);
        // Reconstructed delayed price is close to the 0.05 the spot encodes.
        assert!((ray_to_f64(reference.price) - 0.05).abs() < 1e-6);

        let snapshot = compute(
            U256::from(2_400_000) * WAD,
            U256::from(38_000) * WAD,
            &params(),
            &reference,
            &RiskConfig::default(),
        );
        assert_eq!(snapshot.price_source, PriceSource::Protocol);
    }

    #[test]
    fn test_risk_levels_order_and_classify() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Liquidation);

        let config = RiskConfig::default();
        assert_eq!(RiskLevel::classify(10.0, false, &config), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(40.0, false, &config), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(75.0, false, &config), RiskLevel::High);
        assert_eq!(
            RiskLevel::classify(100.0, false, &config),
            RiskLevel::Liquidation
        );
        assert_eq!(
            RiskLevel::classify(0.0, true, &config),
            RiskLevel::Liquidation
        );
    }
}
