//! Reserve balance guard
//!
//! The wallet's native balance pays every fee. Acting on a reserve that only
//! barely covers the estimate risks a half-finished restake, so the guard
//! demands twice the estimate and reports top-ups against four times it.

use std::time::Duration;

use crate::FeeEstimate;

/// Multiple of the fee estimate the reserve must exceed
pub const SAFETY_MARGIN: f64 = 2.0;

/// Multiple of the fee estimate a suggested top-up targets
pub const TOP_UP_MARGIN: f64 = 4.0;

/// Refuses to act on a reserve that cannot safely cover fees
#[derive(Debug, Clone, Copy)]
pub struct BalanceGuard {
    cooldown: Duration,
}

impl BalanceGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    /// True when `2 x fee > reserve`
    pub fn is_balance_too_low(&self, fee_native: f64, reserve_native: f64) -> bool {
        SAFETY_MARGIN * fee_native > reserve_native
    }

    pub fn check(&self, fee: &FeeEstimate, reserve_native: f64) -> bool {
        self.is_balance_too_low(fee.total_native, reserve_native)
    }

    /// Native amount to add so the reserve covers four fee estimates
    pub fn minimum_top_up(&self, fee_native: f64, reserve_native: f64) -> f64 {
        (TOP_UP_MARGIN * fee_native - reserve_native).max(0.0)
    }

    /// Fixed wait after a low-balance finding
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for BalanceGuard {
    fn default() -> Self {
        Self::new(Duration::from_secs(10 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_times_boundary() {
        let guard = BalanceGuard::default();
        assert!(guard.is_balance_too_low(10.0, 19.0));
        assert!(!guard.is_balance_too_low(10.0, 21.0));
        assert!(!guard.is_balance_too_low(10.0, 20.0));
    }

    #[test]
    fn test_top_up_uses_four_times() {
        let guard = BalanceGuard::default();
        assert_eq!(guard.minimum_top_up(10.0, 19.0), 21.0);
        assert_eq!(guard.minimum_top_up(10.0, 50.0), 0.0);
    }

    #[test]
    fn test_check_uses_total_fee() {
        let guard = BalanceGuard::new(Duration::from_millis(1));
        let fee = FeeEstimate {
            gas_units: 100,
            gas_price_native: 0.05,
            swap_fee_native: 5.0,
            total_native: 10.0,
        };
        assert!(guard.check(&fee, 19.0));
        assert_eq!(guard.cooldown(), Duration::from_millis(1));
    }
}
