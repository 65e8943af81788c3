use std::collections::BTreeMap;

use super::{dollar_strike, Candidate, MarketView};
use crate::config::AuroraConfig;
use crate::indicators::{
    build_tpo_profile, cumulative_volume_delta, initial_balance, TechnicalSnapshot,
};
use crate::risk::StockLevels;
use crate::types::{EngineKind, OptionType, Reasoning, Weights};

const MIN_CANDLES: usize = 30;

/// Value-area bias: price above it leans short (revert to value), price
/// below it leans long.
fn tpo_direction(price: f64, vah: f64, val: f64) -> Option<OptionType> {
    if price > vah {
        Some(OptionType::Put)
    } else if price < val {
        Some(OptionType::Call)
    } else {
        None
    }
}

fn rsi_direction(rsi14: Option<f64>) -> Option<OptionType> {
    match rsi14 {
        Some(v) if v < 30.0 => Some(OptionType::Call),
        Some(v) if v > 70.0 => Some(OptionType::Put),
        _ => None,
    }
}

/// TPO + mean-reversion engine for the regular session.
///
/// Builds the profile and technicals over the one-minute window, scores each
/// present signal into [0, 1], fuses them with the active weights, and picks
/// the direction: TPO bias leads, an RSI extreme decides when TPO is neutral,
/// and opposing non-neutral reads cancel the signal.
pub fn evaluate(view: &MarketView, weights: &Weights, config: &AuroraConfig) -> Option<Candidate> {
    if view.candles.len() < MIN_CANDLES {
        return None;
    }

    let price = view.last_price;
    let profile = build_tpo_profile(
        &view.candles,
        config.market.tick_size,
        config.market.value_area_fraction,
    )?;
    let snapshot = TechnicalSnapshot::from_candles(&view.candles);
    let ib = initial_balance(&view.candles, config.market.ib_duration_minutes);
    let cvd = cumulative_volume_delta(&view.candles);

    let tpo_dir = tpo_direction(price, profile.vah, profile.val);
    let rsi_dir = rsi_direction(snapshot.rsi14);

    let direction = match (tpo_dir, rsi_dir) {
        (Some(t), Some(r)) if t != r => return None,
        (Some(t), _) => t,
        (None, Some(r)) => r,
        (None, None) => return None,
    };

    // Per-signal scores; a missing indicator stays out of the weighted sum.
    let mut scores: BTreeMap<String, f64> = BTreeMap::new();
    scores.insert(
        "tpo".to_string(),
        if tpo_dir.is_some() { 0.7 } else { 0.3 },
    );
    if snapshot.rsi14.is_some() {
        scores.insert(
            "rsi".to_string(),
            if rsi_dir.is_some() { 0.8 } else { 0.5 },
        );
    }
    let ib_breakout = ib.map(|ib| ib.is_breakout(price)).unwrap_or(false);
    if ib.is_some() {
        scores.insert("ib".to_string(), if ib_breakout { 0.75 } else { 0.4 });
    }
    let cvd_divergence = cvd.map(|c| c.divergence).unwrap_or(false);
    if cvd.is_some() {
        scores.insert("cvd".to_string(), if cvd_divergence { 0.65 } else { 0.5 });
    }
    if let Some(vwap) = snapshot.vwap {
        let distance = (price - vwap).abs() / vwap;
        let score = if distance < 0.01 {
            0.6
        } else if distance < 0.02 {
            0.5
        } else {
            0.4
        };
        scores.insert("vwap".to_string(), score);
    }

    let weight_of = |name: &str| -> f64 {
        match name {
            "tpo" => weights.tpo,
            "rsi" => weights.rsi,
            "ib" => weights.ib,
            "cvd" => weights.cvd,
            "vwap" => weights.vwap,
            _ => 0.0,
        }
    };
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for (name, score) in &scores {
        let w = weight_of(name);
        weighted += w * score;
        total_weight += w;
    }
    if total_weight <= 0.0 {
        return None;
    }
    let confidence = 100.0 * weighted / total_weight;

    let atr = snapshot.atr.unwrap_or(config.risk.atr_fallback);
    let stop_distance = atr * 2.0 * weights.stop_loss_mult;
    let target_fallback = atr * weights.target_mult;
    let stock_levels = match direction {
        OptionType::Call => StockLevels {
            entry: price,
            stop: price - stop_distance,
            target: if profile.poc > price {
                profile.poc
            } else {
                price + target_fallback
            },
        },
        OptionType::Put => StockLevels {
            entry: price,
            stop: price + stop_distance,
            target: if profile.poc < price {
                profile.poc
            } else {
                price - target_fallback
            },
        },
    };

    let tpo_bias = match tpo_dir {
        Some(OptionType::Put) => "SHORT",
        Some(OptionType::Call) => "LONG",
        None => "NEUTRAL",
    };
    let summary = format!(
        "price {:.2} vs value area [{:.2}, {:.2}], poc {:.2}, bias {}, impulse {}",
        price,
        profile.val,
        profile.vah,
        profile.poc,
        tpo_bias,
        profile.impulse.as_str()
    );

    Some(Candidate {
        engine: EngineKind::TpoMit,
        direction,
        confidence,
        strike: dollar_strike(price, direction),
        stock_levels,
        reasoning: Reasoning::TpoMit {
            poc: profile.poc,
            vah: profile.vah,
            val: profile.val,
            tpo_bias: tpo_bias.to_string(),
            rsi14: snapshot.rsi14,
            ib_breakout,
            cvd_divergence,
            underlying: price,
            scores,
            summary,
        },
    })
}
