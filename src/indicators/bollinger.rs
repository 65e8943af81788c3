use super::{sma, stddev};

#[derive(Debug, Clone, Copy)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands: SMA(period) +/- `k` standard deviations.
pub fn bollinger(closes: &[f64], period: usize, k: f64) -> Option<BollingerBands> {
    let middle = sma(closes, period)?;
    let sd = stddev(closes, period)?;
    Some(BollingerBands {
        upper: middle + k * sd,
        middle,
        lower: middle - k * sd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands_bracket_the_mean() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        let b = bollinger(&closes, 20, 2.0).unwrap();
        assert!(b.lower < b.middle && b.middle < b.upper);
    }

    #[test]
    fn test_flat_series_collapses_bands() {
        let closes = vec![50.0; 25];
        let b = bollinger(&closes, 20, 2.0).unwrap();
        assert_eq!(b.upper, b.middle);
        assert_eq!(b.lower, b.middle);
    }

    #[test]
    fn test_short_window_is_none() {
        let closes = vec![50.0; 19];
        assert!(bollinger(&closes, 20, 2.0).is_none());
    }
}
