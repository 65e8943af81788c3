use crate::types::Candle;

/// Volume-weighted average price over the window, typical-price based.
/// A zero-volume window has no VWAP.
pub fn vwap(candles: &[Candle]) -> Option<f64> {
    let mut pv = 0.0;
    let mut total_volume = 0.0;
    for c in candles {
        pv += c.typical_price() * c.volume;
        total_volume += c.volume;
    }
    if total_volume <= 0.0 {
        return None;
    }
    Some(pv / total_volume)
}
