//! # Loyalty Point Arithmetic
//!
//! Points are integers. The earn rate is expressed in basis points of a
//! point per currency unit, so `EarnRate::from_bps(100)` is 0.01 points per
//! unit spent.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

/// Points earned per currency unit, in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EarnRate(u32);

impl EarnRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        EarnRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }
}

impl Default for EarnRate {
    fn default() -> Self {
        EarnRate(100)
    }
}

/// `floor(amount × rate)`.
///
/// ```rust
/// use salon_core::loyalty::{points_earned, EarnRate};
/// use salon_core::money::Money;
///
/// let rate = EarnRate::from_bps(100);
/// assert_eq!(points_earned(Money::from_units(1_000), rate), 10);
/// assert_eq!(points_earned(Money::from_units(99), rate), 0);
/// ```
pub fn points_earned(amount: Money, rate: EarnRate) -> i64 {
    if !amount.is_positive() {
        return 0;
    }
    // cents / 100 units × bps / 10_000
    let points = amount.cents() as i128 * rate.bps() as i128 / 1_000_000;
    points as i64
}

/// Discount granted for redeeming `points`.
///
/// ## Errors
/// `Validation` when the discount does not fit in an i64 cent amount.
pub fn redemption_value(points: i64, point_value: Money) -> CoreResult<Money> {
    point_value.checked_mul(points.max(0)).ok_or_else(|| {
        ValidationError::OutOfRange {
            field: "loyalty_points_to_redeem".to_string(),
            min: 0,
            max: i64::MAX / point_value.cents().max(1),
        }
        .into()
    })
}

/// Balance left after redeeming `requested` points.
///
/// ## Errors
/// `InsufficientPoints` when `requested` exceeds `balance`.
pub fn balance_after_redeem(balance: i64, requested: i64) -> CoreResult<i64> {
    if requested > balance {
        return Err(CoreError::InsufficientPoints { balance, requested });
    }
    Ok(balance - requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_earned_floors() {
        let rate = EarnRate::from_bps(100);
        assert_eq!(points_earned(Money::from_units(10_000), rate), 100);
        assert_eq!(points_earned(Money::from_units(1_000), rate), 10);
        assert_eq!(points_earned(Money::from_cents(149_999), rate), 14);
        assert_eq!(points_earned(Money::zero(), rate), 0);
        assert_eq!(points_earned(Money::from_cents(-500), rate), 0);
    }

    #[test]
    fn test_full_point_per_unit() {
        assert_eq!(
            points_earned(Money::from_units(250), EarnRate::from_bps(10_000)),
            250
        );
    }

    #[test]
    fn test_redemption_value() {
        assert_eq!(
            redemption_value(30, Money::from_cents(100)).unwrap().cents(),
            3_000
        );
        assert_eq!(
            redemption_value(-5, Money::from_cents(100)).unwrap(),
            Money::zero()
        );
    }

    #[test]
    fn test_redemption_value_overflow_is_an_error() {
        let err = redemption_value(i64::MAX / 50, Money::from_cents(100)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_balance_after_redeem() {
        assert_eq!(balance_after_redeem(50, 20).unwrap(), 30);
        assert_eq!(balance_after_redeem(50, 50).unwrap(), 0);
        assert!(matches!(
            balance_after_redeem(30, 50),
            Err(CoreError::InsufficientPoints {
                balance: 30,
                requested: 50
            })
        ));
    }
}
