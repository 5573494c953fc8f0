//! Fixed-point arithmetic in the protocol's three scales.
//!
//! Quantities come in wad (18 decimals: token amounts, normalized debt),
//! ray (27 decimals: rates, ratios, prices) and rad (45 decimals: vat debt
//! totals, dust, line). All math stays in `U256` until the final display
//! conversion; `f64` never feeds back into an on-chain quantity.

use alloy::primitives::U256;

/// 10^18
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// 10^27
pub const RAY: U256 = U256::from_limbs([0x9FD0_803C_E800_0000, 0x033B_2E3C, 0, 0]);

/// 10^9, the wad/ray scale gap.
const WAD_RAY_GAP: U256 = U256::from_limbs([1_000_000_000, 0, 0, 0]);

pub fn wad_mul(a: U256, b: U256) -> U256 {
    a * b / WAD
}

/// Division in wad scale. Division by zero saturates rather than panicking;
/// callers treat `U256::MAX` as "no meaningful ratio".
pub fn wad_div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::MAX;
    }
    a * WAD / b
}

pub fn ray_mul(a: U256, b: U256) -> U256 {
    a * b / RAY
}

pub fn ray_div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::MAX;
    }
    a * RAY / b
}

pub fn wad_to_ray(wad: U256) -> U256 {
    wad * WAD_RAY_GAP
}

pub fn ray_to_wad(ray: U256) -> U256 {
    ray / WAD_RAY_GAP
}

pub fn rad_to_wad(rad: U256) -> U256 {
    rad / RAY
}

/// Actual debt in wad from normalized debt and the accumulated rate (ray).
pub fn debt_value(art: U256, rate: U256) -> U256 {
    art * rate / RAY
}

/// Reconstruct the oracle's delayed price (ray) from the vat's
/// margin-adjusted spot price: `spot * mat / par`.
pub fn delayed_price(par: U256, spot: U256, mat: U256) -> U256 {
    ray_div(ray_mul(spot, mat), par)
}

/// Reference price (ray) at which a position becomes unsafe, or `None` for
/// a position with no collateral.
pub fn liquidation_price(ink: U256, debt: U256, mat: U256) -> Option<U256> {
    if ink.is_zero() {
        return None;
    }
    // debt (wad) * mat (ray) / ink (wad) -> ray
    Some(debt * mat / ink)
}

pub fn wad_to_f64(wad: U256) -> f64 {
    u256_to_f64(wad) / 1e18
}

pub fn ray_to_f64(ray: U256) -> f64 {
    u256_to_f64(ray) / 1e27
}

/// Display conversion for wad values. Clamps non-finite and negative
/// inputs to zero.
pub fn f64_to_wad(value: f64) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 1e18) as u128)
}

/// `f64_to_wad` widened to ray scale; staying in u128 until the final
/// widening keeps prices up to ~10^20 representable without overflow.
pub fn f64_to_ray(value: f64) -> U256 {
    f64_to_wad(value) * WAD_RAY_GAP
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .into_limbs()
        .iter()
        .enumerate()
        .map(|(i, limb)| (*limb as f64) * 2f64.powi(64 * i as i32))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_constants() {
        assert_eq!(WAD, U256::from(10).pow(U256::from(18)));
        assert_eq!(RAY, U256::from(10).pow(U256::from(27)));
        assert_eq!(wad_to_ray(WAD), RAY);
        assert_eq!(ray_to_wad(RAY), WAD);
        assert_eq!(rad_to_wad(RAY * WAD), WAD);
    }

    #[test]
    fn test_wad_arithmetic() {
        let two = WAD * U256::from(2);
        let three = WAD * U256::from(3);
        assert_eq!(wad_mul(two, three), WAD * U256::from(6));
        assert_eq!(wad_div(three, two), WAD * U256::from(3) / U256::from(2));
        assert_eq!(wad_div(WAD, U256::ZERO), U256::MAX);
    }

    #[test]
    fn test_debt_value_applies_rate() {
        let art = WAD * U256::from(100);
        // 5% accumulated interest
        let rate = RAY + RAY / U256::from(20);
        assert_eq!(debt_value(art, rate), WAD * U256::from(105));
    }

    #[test]
    fn test_delayed_price_inverts_spot() {
        // price 2.90, par 1, mat 1.45 -> spot = 2.90 / 1.45 = 2.00
        let price = RAY * U256::from(290) / U256::from(100);
        let mat = RAY * U256::from(145) / U256::from(100);
        let spot = ray_div(ray_div(price, RAY), mat);
        assert_eq!(delayed_price(RAY, spot, mat), price);
    }

    #[test]
    fn test_liquidation_price_monotonicity() {
        let mat = RAY * U256::from(145) / U256::from(100);
        let ink = WAD * U256::from(1_000);
        let debt = WAD * U256::from(100);

        assert_eq!(liquidation_price(U256::ZERO, debt, mat), None);

        let base = liquidation_price(ink, debt, mat).unwrap();
        // More debt raises the liquidation price; more collateral lowers it.
        let more_debt = liquidation_price(ink, debt * U256::from(2), mat).unwrap();
        let more_ink = liquidation_price(ink * U256::from(2), debt, mat).unwrap();
        assert!(more_debt > base);
        assert!(more_ink < base);
    }

    #[test]
    fn test_f64_round_trips() {
        assert!((wad_to_f64(f64_to_wad(0.05)) - 0.05).abs() < 1e-9);
        assert!((ray_to_f64(f64_to_ray(1.45)) - 1.45).abs() < 1e-9);
        assert_eq!(f64_to_wad(f64::NAN), U256::ZERO);
        assert_eq!(f64_to_wad(-1.0), U256::ZERO);
    }
}
