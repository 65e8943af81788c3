use std::collections::BTreeMap;

use super::{dollar_strike, Candidate, MarketView};
use crate::config::AuroraConfig;
use crate::indicators::orb_levels;
use crate::risk::StockLevels;
use crate::types::{EngineKind, OptionType, Reasoning, Weights};

/// Opening-range breakout engine. Primary during the opening-range session,
/// and the fallback whenever the main engine stays silent later in the day.
///
/// Direction comes from the broken side of the range. Breakout strength is
/// the penetration past the extreme in range units, scaled by the
/// `orb_breakout_mult` gene; confidence is `55 + min(20, 40 * strength)`.
pub fn evaluate(view: &MarketView, weights: &Weights, config: &AuroraConfig) -> Option<Candidate> {
    let orb = orb_levels(&view.candles, config.market.orb_duration_minutes)?;
    let price = view.last_price;

    let (direction, penetration) = if price > orb.high {
        (OptionType::Call, price - orb.high)
    } else if price < orb.low {
        (OptionType::Put, orb.low - price)
    } else {
        return None;
    };

    let strength = penetration / orb.range_size * weights.orb_breakout_mult;
    let confidence = 55.0 + (40.0 * strength).min(20.0);

    let stock_levels = match direction {
        OptionType::Call => StockLevels {
            entry: price,
            stop: orb.long_stop,
            target: orb.bull_target1,
        },
        OptionType::Put => StockLevels {
            entry: price,
            stop: orb.short_stop,
            target: orb.bear_target1,
        },
    };

    let mut scores = BTreeMap::new();
    scores.insert("breakout_strength".to_string(), strength);
    let (t1, t2) = match direction {
        OptionType::Call => (orb.bull_target1, orb.bull_target2),
        OptionType::Put => (orb.bear_target1, orb.bear_target2),
    };
    let summary = format!(
        "{} breakout of opening range [{:.2}, {:.2}], strength {:.2}, targets {:.2}/{:.2}",
        if direction == OptionType::Call { "upside" } else { "downside" },
        orb.low,
        orb.high,
        strength,
        t1,
        t2
    );

    Some(Candidate {
        engine: EngineKind::OrbMomentum,
        direction,
        confidence,
        strike: dollar_strike(price, direction),
        stock_levels,
        reasoning: Reasoning::OrbMomentum {
            orb_high: orb.high,
            orb_low: orb.low,
            breakout_strength: strength,
            underlying: price,
            scores,
            summary,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::types::{Candle, Interval};

    fn range_window() -> Vec<Candle> {
        (0..30i64)
            .map(|i| Candle {
                ticker: "SPY".to_string(),
                ts: Utc::now() + Duration::minutes(i),
                interval: Interval::M1,
                open: 450.0,
                high: 451.0,
                low: 449.0,
                close: 450.0,
                volume: 1000.0,
                is_complete: true,
            })
            .collect()
    }

    #[test]
    fn test_inside_range_is_silent() {
        let view = MarketView::new(450.5, range_window());
        assert!(evaluate(&view, &Weights::default(), &AuroraConfig::default()).is_none());
    }

    #[test]
    fn test_upside_breakout_emits_call() {
        // One point past a two-point range: strength 0.5.
        let view = MarketView::new(452.0, range_window());
        let c = evaluate(&view, &Weights::default(), &AuroraConfig::default()).unwrap();
        assert_eq!(c.direction, OptionType::Call);
        assert_eq!(c.engine, EngineKind::OrbMomentum);
        assert!((c.confidence - 75.0).abs() < 1e-9, "confidence {}", c.confidence);
        assert_eq!(c.stock_levels.stop, 450.0);
        assert_eq!(c.stock_levels.target, 453.0);
    }

    #[test]
    fn test_downside_breakout_emits_put() {
        let view = MarketView::new(448.5, range_window());
        let c = evaluate(&view, &Weights::default(), &AuroraConfig::default()).unwrap();
        assert_eq!(c.direction, OptionType::Put);
        // strength 0.25 -> 55 + 10
        assert!((c.confidence - 65.0).abs() < 1e-9);
        assert_eq!(c.stock_levels.target, 447.0);
    }

    #[test]
    fn test_confidence_caps_at_75() {
        let view = MarketView::new(460.0, range_window());
        let c = evaluate(&view, &Weights::default(), &AuroraConfig::default()).unwrap();
        assert!((c.confidence - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_range_is_silent() {
        let view = MarketView::new(452.0, range_window().into_iter().take(29).collect());
        assert!(evaluate(&view, &Weights::default(), &AuroraConfig::default()).is_none());
    }

    #[test]
    fn test_breakout_mult_scales_strength() {
        let mut weights = Weights::default();
        weights.orb_breakout_mult = 0.3;
        let view = MarketView::new(451.5, range_window());
        let damped = evaluate(&view, &weights, &AuroraConfig::default()).unwrap();
        let stock = evaluate(&view, &Weights::default(), &AuroraConfig::default()).unwrap();
        assert!(damped.confidence < stock.confidence);
    }
}
