use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::OptionType;

/// Which scoring engine produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    TpoMit,
    BlackScholes,
    OrbMomentum,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::TpoMit => "TPO_MIT",
            EngineKind::BlackScholes => "BLACK_SCHOLES",
            EngineKind::OrbMomentum => "ORB_MOMENTUM",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "TPO_MIT" => Some(EngineKind::TpoMit),
            "BLACK_SCHOLES" => Some(EngineKind::BlackScholes),
            "ORB_MOMENTUM" => Some(EngineKind::OrbMomentum),
            _ => None,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the contract-premium plan was derived: from the chain mid projected
/// through the contract's delta, or through the percentage fallback when the
/// chain carried no greeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingMode {
    DeltaProjected,
    PremiumFallback,
}

impl PricingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingMode::DeltaProjected => "DELTA_PROJECTED",
            PricingMode::PremiumFallback => "PREMIUM_FALLBACK",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DELTA_PROJECTED" => Some(PricingMode::DeltaProjected),
            "PREMIUM_FALLBACK" => Some(PricingMode::PremiumFallback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionStatus {
    Active,
    Closed,
    Expired,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Active => "ACTIVE",
            PredictionStatus::Closed => "CLOSED",
            PredictionStatus::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(PredictionStatus::Active),
            "CLOSED" => Some(PredictionStatus::Closed),
            "EXPIRED" => Some(PredictionStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeResult {
    Win,
    Loss,
}

impl OutcomeResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeResult::Win => "WIN",
            OutcomeResult::Loss => "LOSS",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "WIN" => Some(OutcomeResult::Win),
            "LOSS" => Some(OutcomeResult::Loss),
            _ => None,
        }
    }
}

/// Contract-premium trade plan attached to a prediction. All three levels are
/// option premiums, produced by the risk projector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradePlan {
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub risk_reward: f64,
}

/// Engine-specific reasoning stored with each prediction, plus the component
/// score map the fuser produced. Serialized as the `reasoning` JSON blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reasoning {
    TpoMit {
        poc: f64,
        vah: f64,
        val: f64,
        tpo_bias: String,
        rsi14: Option<f64>,
        ib_breakout: bool,
        cvd_divergence: bool,
        underlying: f64,
        scores: BTreeMap<String, f64>,
        summary: String,
    },
    BlackScholes {
        spot: f64,
        sigma: f64,
        theo_price: f64,
        expected_move: f64,
        bias: String,
        underlying: f64,
        scores: BTreeMap<String, f64>,
        summary: String,
    },
    OrbMomentum {
        orb_high: f64,
        orb_low: f64,
        breakout_strength: f64,
        underlying: f64,
        scores: BTreeMap<String, f64>,
        summary: String,
    },
}

impl Reasoning {
    pub fn summary(&self) -> &str {
        match self {
            Reasoning::TpoMit { summary, .. } => summary,
            Reasoning::BlackScholes { summary, .. } => summary,
            Reasoning::OrbMomentum { summary, .. } => summary,
        }
    }

    pub fn underlying(&self) -> f64 {
        match self {
            Reasoning::TpoMit { underlying, .. } => *underlying,
            Reasoning::BlackScholes { underlying, .. } => *underlying,
            Reasoning::OrbMomentum { underlying, .. } => *underlying,
        }
    }
}

/// One directional options recommendation. Created ACTIVE, transitions at most
/// once to CLOSED (graded) or EXPIRED (stale), never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub ticker: String,
    pub category: String,
    pub direction: OptionType,
    pub strike: f64,
    pub entry_pricing_mode: PricingMode,
    pub confidence: f64,
    /// Underlying price when the signal was generated; the grader projects
    /// premium moves off this level.
    pub entry_trigger: f64,
    pub session: String,
    pub engine: EngineKind,
    pub reasoning: Reasoning,
    pub status: PredictionStatus,
    pub generated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expiration: NaiveDate,
    pub plan: TradePlan,
}

/// Terminal record for a CLOSED prediction. One-to-one with the prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub prediction_id: String,
    pub result: OutcomeResult,
    pub actual_pnl: f64,
    pub closed_at: DateTime<Utc>,
}

/// Prediction joined to its outcome, the shape the grader's rolling stats and
/// the optimizer's fitness read.
#[derive(Debug, Clone)]
pub struct GradedPrediction {
    pub prediction_id: String,
    pub ticker: String,
    pub direction: OptionType,
    pub confidence: f64,
    pub generated_at: DateTime<Utc>,
    pub result: OutcomeResult,
    pub actual_pnl: f64,
    pub closed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_round_trip() {
        for e in [EngineKind::TpoMit, EngineKind::BlackScholes, EngineKind::OrbMomentum] {
            assert_eq!(EngineKind::from_str(e.as_str()), Some(e));
        }
        assert_eq!(EngineKind::from_str("MACD"), None);
    }

    #[test]
    fn test_reasoning_blob_round_trips() {
        let mut scores = BTreeMap::new();
        scores.insert("tpo".to_string(), 0.7);
        scores.insert("rsi".to_string(), 0.5);
        let r = Reasoning::TpoMit {
            poc: 450.0,
            vah: 450.75,
            val: 449.25,
            tpo_bias: "SHORT".to_string(),
            rsi14: Some(61.2),
            ib_breakout: false,
            cvd_divergence: true,
            underlying: 452.0,
            scores,
            summary: "price above value area".to_string(),
        };
        let json = serde_json::to_string(&r).unwrap();
        let back: Reasoning = serde_json::from_str(&json).unwrap();
        assert_eq!(back.underlying(), 452.0);
        assert_eq!(back.summary(), "price above value area");
    }
}
