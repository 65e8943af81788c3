use crate::types::Candle;

/// Opening-range breakout levels from the first thirty one-minute candles.
/// Targets sit at one and two range-widths past each extreme; both stops are
/// the range midpoint.
#[derive(Debug, Clone, Copy)]
pub struct OrbLevels {
    pub high: f64,
    pub low: f64,
    pub mid: f64,
    pub range_size: f64,
    pub bull_target1: f64,
    pub bull_target2: f64,
    pub bear_target1: f64,
    pub bear_target2: f64,
    pub long_stop: f64,
    pub short_stop: f64,
}

/// Requires the full `duration_minutes` candles; a partial range stays silent.
pub fn orb_levels(candles: &[Candle], duration_minutes: usize) -> Option<OrbLevels> {
    if duration_minutes == 0 || candles.len() < duration_minutes {
        return None;
    }
    let window = &candles[..duration_minutes];

    let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    if low >= high {
        return None;
    }

    let range_size = high - low;
    let mid = (high + low) / 2.0;
    Some(OrbLevels {
        high,
        low,
        mid,
        range_size,
        bull_target1: high + range_size,
        bull_target2: high + 2.0 * range_size,
        bear_target1: low - range_size,
        bear_target2: low - 2.0 * range_size,
        long_stop: mid,
        short_stop: mid,
    })
}
