/// Relative Strength Index over closes, Wilder smoothing.
///
/// Needs at least `period + 1` closes; a loss-free window reads 100.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses += -change;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;

    let p = period as f64;
    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_history_is_none() {
        let closes: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        // Exactly `period` closes: one short of the first defined value.
        assert_eq!(rsi(&closes, 14), None);
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        assert!(rsi(&closes, 14).is_some());
    }

    #[test]
    fn test_pure_uptrend_reads_100() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn test_pure_downtrend_reads_near_zero() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let v = rsi(&closes, 14).unwrap();
        assert!(v < 1.0, "rsi {v}");
    }

    #[test]
    fn test_alternating_series_stays_in_band() {
        let closes: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        let v = rsi(&closes, 14).unwrap();
        assert!(v > 30.0 && v < 70.0, "rsi {v}");
    }
}
