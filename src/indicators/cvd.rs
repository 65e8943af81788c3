use crate::types::Candle;

#[derive(Debug, Clone, Copy)]
pub struct CvdReading {
    pub cumulative: f64,
    /// Price direction over the window disagrees with the delta direction.
    pub divergence: bool,
}

/// Cumulative volume delta. Each bar contributes its volume signed by body
/// direction and scaled by body-to-range ratio; zero-range bars contribute
/// nothing.
pub fn cumulative_volume_delta(candles: &[Candle]) -> Option<CvdReading> {
    if candles.is_empty() {
        return None;
    }

    let mut cumulative = 0.0;
    for c in candles {
        let range = c.range();
        if range <= 0.0 {
            continue;
        }
        let body = c.change();
        cumulative += body.signum() * c.volume * body.abs() / range;
    }

    let price_change = candles.last().map(|l| l.close)? - candles.first().map(|f| f.close)?;
    let divergence = price_change != 0.0
        && cumulative != 0.0
        && price_change.signum() != cumulative.signum();

    Some(CvdReading {
        cumulative,
        divergence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::types::Interval;

    fn candle(i: i64, open: f64, close: f64, volume: f64) -> Candle {
        let high = open.max(close) + 0.1;
        let low = open.min(close) - 0.1;
        Candle {
            ticker: "SPY".to_string(),
            ts: Utc::now() + Duration::minutes(i),
            interval: Interval::M1,
            open,
            high,
            low,
            close,
            volume,
            is_complete: true,
        }
    }

    #[test]
    fn test_aligned_rally_has_no_divergence() {
        let candles: Vec<Candle> = (0..20)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.2;
                candle(i, base, base + 0.2, 500.0)
            })
            .collect();
        let reading = cumulative_volume_delta(&candles).unwrap();
        assert!(reading.cumulative > 0.0);
        assert!(!reading.divergence);
    }

    #[test]
    fn test_rising_price_with_selling_pressure_diverges() {
        // Mostly heavy down bars with a few thin up bars that still drag the
        // closing price higher across the window.
        let mut candles = Vec::new();
        let mut price = 100.0;
        for i in 0..20i64 {
            if i % 4 == 0 {
                price += 1.2;
                candles.push(candle(i, price - 1.2, price, 50.0));
            } else {
                price -= 0.2;
                candles.push(candle(i, price + 0.2, price, 900.0));
            }
        }
        let reading = cumulative_volume_delta(&candles).unwrap();
        assert!(reading.cumulative < 0.0, "cvd {}", reading.cumulative);
        assert!(reading.divergence);
    }

    #[test]
    fn test_empty_window_is_none() {
        assert!(cumulative_volume_delta(&[]).is_none());
    }
}
