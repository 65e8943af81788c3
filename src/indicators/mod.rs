pub mod atr;
pub mod black_scholes;
pub mod bollinger;
pub mod cvd;
pub mod initial_balance;
pub mod orb;
pub mod rsi;
pub mod tpo;
pub mod vwap;

pub use atr::atr;
pub use black_scholes::{expected_move, implied_volatility, price_and_greeks, realized_volatility, OptionGreeks};
pub use bollinger::{bollinger, BollingerBands};
pub use cvd::{cumulative_volume_delta, CvdReading};
pub use initial_balance::{initial_balance, InitialBalance, OpeningType};
pub use orb::{orb_levels, OrbLevels};
pub use rsi::rsi;
pub use tpo::{build_tpo_profile, Impulse, TpoProfile};
pub use vwap::vwap;

use crate::types::Candle;

/// Simple moving average of the trailing `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let sum: f64 = values.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Exponential moving average seeded with the SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    let k = 2.0 / (period as f64 + 1.0);
    let mut value = seed;
    for v in &values[period..] {
        value = v * k + value * (1.0 - k);
    }
    Some(value)
}

/// Population standard deviation of the trailing `period` values.
pub fn stddev(values: &[f64], period: usize) -> Option<f64> {
    let mean = sma(values, period)?;
    let variance: f64 = values
        .iter()
        .rev()
        .take(period)
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / period as f64;
    Some(variance.sqrt())
}

/// Nullable bundle of the standard technicals. A `None` field means the
/// window was too short (or volume too thin) for that indicator; the fuser
/// drops null scores from the weighted sum.
#[derive(Debug, Clone, Default)]
pub struct TechnicalSnapshot {
    pub rsi14: Option<f64>,
    pub rsi5: Option<f64>,
    pub sma9: Option<f64>,
    pub sma20: Option<f64>,
    pub vwap: Option<f64>,
    pub boll_upper: Option<f64>,
    pub boll_lower: Option<f64>,
    pub atr: Option<f64>,
}

impl TechnicalSnapshot {
    pub fn from_candles(candles: &[Candle]) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let bands = bollinger(&closes, 20, 2.0);
        Self {
            rsi14: rsi(&closes, 14),
            rsi5: rsi(&closes, 5),
            sma9: sma(&closes, 9),
            // Bollinger's midline is the 20-period SMA.
            sma20: bands.as_ref().map(|b| b.middle),
            vwap: vwap(candles),
            boll_upper: bands.as_ref().map(|b| b.upper),
            boll_lower: bands.as_ref().map(|b| b.lower),
            atr: atr(candles, 14),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_requires_full_window() {
        assert_eq!(sma(&[1.0, 2.0], 3), None);
        assert_eq!(sma(&[1.0, 2.0, 3.0, 4.0], 2), Some(3.5));
    }

    #[test]
    fn test_ema_converges_toward_recent_values() {
        let values: Vec<f64> = (0..50).map(|i| if i < 25 { 10.0 } else { 20.0 }).collect();
        let e = ema(&values, 9).unwrap();
        assert!(e > 19.0, "ema {e} should track the later level");
    }

    #[test]
    fn test_stddev_of_constant_series_is_zero() {
        let values = vec![5.0; 30];
        assert_eq!(stddev(&values, 20), Some(0.0));
    }

    #[test]
    fn test_snapshot_on_empty_window_is_all_null() {
        let snap = TechnicalSnapshot::from_candles(&[]);
        assert!(snap.rsi14.is_none());
        assert!(snap.rsi5.is_none());
        assert!(snap.sma9.is_none());
        assert!(snap.sma20.is_none());
        assert!(snap.vwap.is_none());
        assert!(snap.boll_upper.is_none());
        assert!(snap.atr.is_none());
    }
}
