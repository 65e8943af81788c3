use crate::types::Candle;

/// Average True Range, Wilder smoothing. Needs `period + 1` candles so every
/// true range has a previous close.
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let true_range = |c: &Candle, prev_close: f64| -> f64 {
        let hl = c.high - c.low;
        let hc = (c.high - prev_close).abs();
        let lc = (c.low - prev_close).abs();
        hl.max(hc).max(lc)
    };

    let mut sum = 0.0;
    for i in 1..=period {
        sum += true_range(&candles[i], candles[i - 1].close);
    }
    let mut value = sum / period as f64;

    let p = period as f64;
    for i in (period + 1)..candles.len() {
        let tr = true_range(&candles[i], candles[i - 1].close);
        value = (value * (p - 1.0) + tr) / p;
    }
    Some(value)
}
