pub mod fuser;
pub mod orb_breakout;
pub mod premarket;
pub mod tpo_mit;

pub use fuser::SignalFuser;

use crate::risk::StockLevels;
use crate::types::{Candle, EngineKind, OptionType, Reasoning};

/// Market data one fuser evaluation sees: the live price plus the candle
/// window relevant to the session (today's regular-hours one-minute bars, or
/// recent reference bars in the pre-market).
#[derive(Debug, Clone)]
pub struct MarketView {
    pub last_price: f64,
    pub candles: Vec<Candle>,
}

impl MarketView {
    pub fn new(last_price: f64, candles: Vec<Candle>) -> Self {
        Self { last_price, candles }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

/// Engine output before the confidence-floor gate and contract overlay: a
/// direction, a fused confidence, the OTM strike, the stock-level plan the
/// risk projector will translate, and the audit reasoning.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub engine: EngineKind,
    pub direction: OptionType,
    pub confidence: f64,
    pub strike: f64,
    pub stock_levels: StockLevels,
    pub reasoning: Reasoning,
}

/// Round an OTM strike 0.5% away from the price to the nearest dollar.
pub(crate) fn dollar_strike(price: f64, direction: OptionType) -> f64 {
    let raw = match direction {
        OptionType::Call => price * 1.005,
        OptionType::Put => price * 0.995,
    };
    raw.round()
}

/// Round an OTM strike 0.5% away from the price to the nearest half dollar.
pub(crate) fn half_dollar_strike(price: f64, direction: OptionType) -> f64 {
    let raw = match direction {
        OptionType::Call => price * 1.005,
        OptionType::Put => price * 0.995,
    };
    (raw * 2.0).round() / 2.0
}
