use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "CALL",
            OptionType::Put => "PUT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CALL" => Some(OptionType::Call),
            "PUT" => Some(OptionType::Put),
            _ => None,
        }
    }

    /// +1 for calls, -1 for puts.
    pub fn sign(&self) -> f64 {
        match self {
            OptionType::Call => 1.0,
            OptionType::Put => -1.0,
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One option-chain row at a point in time. Snapshots are append-only; the
/// latest row per `(ticker, expiration, strike, option_type)` is the current view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionQuote {
    pub ticker: String,
    pub snapshot_ts: DateTime<Utc>,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    pub bid: f64,
    pub ask: f64,
    pub iv: Option<f64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub open_interest: Option<i64>,
    pub volume: Option<i64>,
}

impl OptionQuote {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}
