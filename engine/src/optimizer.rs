//! Optimal compounding interval
//!
//! A position growing at rate `k` that pays a fraction `f` of its principal
//! per compounding maximises its long-run growth `ln(1 + kT - f) / T` at
//! `T* = x*/k`, where `x*` is the positive root of
//!
//! ```text
//! h(x) = e^(x/(x+u)) - x - u,   u = 1 - f
//! ```
//!
//! The root is found with Newton-Raphson from `x0 = 1`.

use std::time::Duration;

use tracing::warn;

use crate::{GainRate, RestakerError, Result};

/// Relative step below which the iteration has converged
pub const STEP_TOLERANCE: f64 = 1e-6;

pub const MAX_ITERATIONS: usize = 100;

/// Root of `h` for a given fee ratio
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Root {
    pub x: f64,
    pub iterations: usize,
}

/// Solve `h(x) = 0` for fee ratio `f` in `[0, 1)`
pub fn solve_root(fee_ratio: f64) -> std::result::Result<Root, String> {
    if !fee_ratio.is_finite() || !(0.0..1.0).contains(&fee_ratio) {
        return Err(format!("fee ratio {} outside [0, 1)", fee_ratio));
    }
    // Costless compounding: x* = 0 is a double root Newton only reaches linearly
    if fee_ratio == 0.0 {
        return Ok(Root { x: 0.0, iterations: 0 });
    }

    let u = 1.0 - fee_ratio;
    let h = |x: f64| (x / (x + u)).exp() - x - u;
    let dh = |x: f64| (x / (x + u)).exp() * (1.0 / (x + u) - x / (x + u).powi(2)) - 1.0;

    let mut x0 = 1.0_f64;
    let mut x1 = x0 - h(x0) / dh(x0);

    for iteration in 0..MAX_ITERATIONS {
        if !x1.is_finite() {
            return Err(format!("iterate diverged at step {} (x={})", iteration, x1));
        }

        let mean_abs = (x0.abs() + x1.abs()) / 2.0;
        if mean_abs == 0.0 {
            return Ok(Root { x: 0.0, iterations: iteration });
        }
        if (x1 - x0).abs() / mean_abs < STEP_TOLERANCE {
            return Ok(Root { x: x1, iterations: iteration });
        }

        x0 = x1;
        x1 = x0 - h(x0) / dh(x0);
    }

    Err(format!(
        "solution not satisfying tolerances after {} iterations: x0={}, x1={}, tol={}",
        MAX_ITERATIONS, x0, x1, STEP_TOLERANCE
    ))
}

/// Optimal interval between compoundings, in seconds
pub fn optimal_interval_secs(fee_ratio: f64, gain_rate: GainRate) -> Result<f64> {
    if !gain_rate.is_finite() || gain_rate <= 0.0 {
        return Err(RestakerError::DegenerateGainRate { gain_rate });
    }

    match solve_root(fee_ratio) {
        Ok(root) => Ok(root.x / gain_rate),
        Err(reason) => {
            warn!(fee_ratio, gain_rate, reason = %reason, "Optimal interval is unreliable");
            Err(RestakerError::non_convergence(fee_ratio, gain_rate, reason))
        }
    }
}

/// Optimal interval as a [`Duration`]
pub fn optimal_interval(fee_ratio: f64, gain_rate: GainRate) -> Result<Duration> {
    optimal_interval_secs(fee_ratio, gain_rate).map(secs_to_duration)
}

/// Time the position needed to accrue its pending reward at `gain_rate`.
/// Underestimates when stake was added mid-period, overestimates when removed.
pub fn estimated_elapsed_secs(pending_reward_value: f64, staked_value: f64, gain_rate: GainRate) -> f64 {
    if staked_value <= 0.0 || gain_rate <= 0.0 {
        return 0.0;
    }
    (pending_reward_value / staked_value) / gain_rate
}

/// `max(0, optimal - elapsed)`
pub fn time_to_restake_secs(optimal_interval_secs: f64, estimated_elapsed_secs: f64) -> f64 {
    (optimal_interval_secs - estimated_elapsed_secs).max(0.0)
}

/// Non-negative seconds to a `Duration`, saturating on overflow
pub fn secs_to_duration(secs: f64) -> Duration {
    if !secs.is_finite() {
        return Duration::MAX;
    }
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}
