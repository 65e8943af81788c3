use std::collections::BTreeMap;

use super::{half_dollar_strike, Candidate, MarketView};
use crate::config::AuroraConfig;
use crate::indicators::{expected_move, price_and_greeks, realized_volatility};
use crate::risk::StockLevels;
use crate::types::{EngineKind, OptionType, Reasoning, Weights};

/// Overnight drift beyond this reads as a directional bias.
const BIAS_THRESHOLD: f64 = 0.002;
/// Drift beyond this counts as a confirmed bias.
const CONFIRM_THRESHOLD: f64 = 0.005;
/// Annualized vol assumed when the reference window can't produce one.
const DEFAULT_SIGMA: f64 = 0.3;
/// 5-minute bars per trading year, for the realized-vol estimate.
const FIVE_MINUTE_PERIODS_PER_YEAR: f64 = 252.0 * 78.0;
const RISK_FREE_RATE: f64 = 0.05;
/// 0DTE horizon: one trading day.
const HORIZON_YEARS: f64 = 1.0 / 252.0;

/// Pre-market Black-Scholes engine.
///
/// Bias comes from the overnight drift of the live quote against the last
/// reference close; a neutral drift produces no signal. Confidence seeds at
/// 50 and collects +10 near the money, +5 for a mid-range sigma, +5 for a
/// confirmed bias.
pub fn evaluate(view: &MarketView, _weights: &Weights, _config: &AuroraConfig) -> Option<Candidate> {
    let spot = view.last_price;
    let closes = view.closes();
    let prev_close = closes.last().copied().filter(|c| *c > 0.0)?;
    if spot <= 0.0 {
        return None;
    }

    let drift = (spot - prev_close) / prev_close;
    let direction = if drift >= BIAS_THRESHOLD {
        OptionType::Call
    } else if drift <= -BIAS_THRESHOLD {
        OptionType::Put
    } else {
        return None;
    };
    let confirmed = drift.abs() >= CONFIRM_THRESHOLD;

    let sigma = realized_volatility(&closes, FIVE_MINUTE_PERIODS_PER_YEAR).unwrap_or(DEFAULT_SIGMA);
    let strike = half_dollar_strike(spot, direction);

    // Measured OTM-negative: a strike inside (-2%, 0) sits just out of the money.
    let moneyness = match direction {
        OptionType::Call => (spot - strike) / spot,
        OptionType::Put => (strike - spot) / spot,
    };

    let mut confidence = 50.0;
    let mut scores = BTreeMap::new();
    if moneyness > -0.02 && moneyness < 0.0 {
        confidence += 10.0;
        scores.insert("near_atm".to_string(), 1.0);
    }
    if sigma > 0.3 && sigma < 0.5 {
        confidence += 5.0;
        scores.insert("sigma_band".to_string(), 1.0);
    }
    if confirmed {
        confidence += 5.0;
        scores.insert("confirmed_bias".to_string(), 1.0);
    }

    let greeks = price_and_greeks(direction, spot, strike, RISK_FREE_RATE, sigma, HORIZON_YEARS);
    let em = expected_move(spot, sigma, HORIZON_YEARS);
    let stock_levels = match direction {
        OptionType::Call => StockLevels {
            entry: spot,
            stop: spot - 0.5 * em,
            target: spot + em,
        },
        OptionType::Put => StockLevels {
            entry: spot,
            stop: spot + 0.5 * em,
            target: spot - em,
        },
    };

    let bias = if direction == OptionType::Call { "BULLISH" } else { "BEARISH" };
    let summary = format!(
        "{} pre-market drift {:.2}% vs reference close {:.2}, sigma {:.2}",
        bias.to_lowercase(),
        drift * 100.0,
        prev_close,
        sigma
    );

    Some(Candidate {
        engine: EngineKind::BlackScholes,
        direction,
        confidence,
        strike,
        stock_levels,
        reasoning: Reasoning::BlackScholes {
            spot,
            sigma,
            theo_price: greeks.price,
            expected_move: em,
            bias: bias.to_string(),
            underlying: spot,
            scores,
            summary,
        },
    })
}
