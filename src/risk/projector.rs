use crate::types::TradePlan;

/// Stock-price levels an engine produced for the underlying. The projector is
/// the only place these get translated into option premiums; everything
/// downstream treats trade-plan numbers as premium.
#[derive(Debug, Clone, Copy)]
pub struct StockLevels {
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
}

impl StockLevels {
    pub fn stop_distance(&self) -> f64 {
        (self.entry - self.stop).abs()
    }

    pub fn target_distance(&self) -> f64 {
        (self.target - self.entry).abs()
    }
}

/// Floor for projected premiums; options do not quote below a nickel here.
const PREMIUM_FLOOR: f64 = 0.05;

/// Project stock-price levels onto the contract via delta: a move of `dS` in
/// the underlying moves the premium about `|delta| * dS`. Entry is the current
/// mid.
pub fn project_with_delta(mid_now: f64, levels: StockLevels, delta: f64) -> TradePlan {
    let d = delta.abs();
    let entry = mid_now;
    let stop = (mid_now - levels.stop_distance() * d).max(PREMIUM_FLOOR);
    let target = (mid_now + levels.target_distance() * d).max(PREMIUM_FLOOR);
    TradePlan {
        entry,
        stop,
        target,
        risk_reward: risk_reward(entry, stop, target),
    }
}

/// Percentage fallback when the chain carries no greeks: stop at
/// `mid * (1 - stop_loss_pct)`, target at `mid * target_multiple`.
pub fn project_fallback(mid_now: f64, stop_loss_pct: f64, target_multiple: f64) -> TradePlan {
    let entry = mid_now;
    let stop = (mid_now * (1.0 - stop_loss_pct)).max(PREMIUM_FLOOR);
    let target = (mid_now * target_multiple).max(PREMIUM_FLOOR);
    TradePlan {
        entry,
        stop,
        target,
        risk_reward: risk_reward(entry, stop, target),
    }
}

/// Reward over risk; zero when the stop offers no risk to measure.
fn risk_reward(entry: f64, stop: f64, target: f64) -> f64 {
    let risk = entry - stop;
    if risk > 0.0 {
        (target - entry) / risk
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_projection_at_half_delta() {
        // delta -0.50, mid 1.20, stop 1 point away, target 2 points away.
        let levels = StockLevels {
            entry: 452.0,
            stop: 451.0,
            target: 454.0,
        };
        let plan = project_with_delta(1.20, levels, -0.5);
        assert!((plan.entry - 1.20).abs() < 1e-9);
        assert!((plan.stop - 0.70).abs() < 1e-9);
        assert!((plan.target - 2.20).abs() < 1e-9);
        assert!((plan.risk_reward - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_premium_floor_applies() {
        let levels = StockLevels {
            entry: 100.0,
            stop: 80.0,
            target: 120.0,
        };
        let plan = project_with_delta(0.50, levels, 0.9);
        assert_eq!(plan.stop, 0.05);
    }

    #[test]
    fn test_fallback_defaults() {
        let plan = project_fallback(1.00, 0.5, 2.0);
        assert!((plan.entry - 1.00).abs() < 1e-9);
        assert!((plan.stop - 0.50).abs() < 1e-9);
        assert!((plan.target - 2.00).abs() < 1e-9);
        assert!((plan.risk_reward - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_risk_reports_zero_ratio() {
        let plan = project_fallback(1.00, 0.0, 2.0);
        assert_eq!(plan.risk_reward, 0.0);
    }
}
