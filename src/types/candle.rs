#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Candle interval supported by the vendor and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    M1,
    M5,
    M15,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Interval::M1),
            "5m" => Some(Interval::M5),
            "15m" => Some(Interval::M15),
            _ => None,
        }
    }

    pub fn minutes(&self) -> u32 {
        match self {
            Interval::M1 => 1,
            Interval::M5 => 5,
            Interval::M15 => 15,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable OHLCV bar for `(ticker, ts, interval)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub ticker: String,
    pub ts: DateTime<Utc>,
    pub interval: Interval,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub is_complete: bool,
}

impl Candle {
    pub fn body_size(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn change(&self) -> f64 {
        self.close - self.open
    }

    /// `low <= min(open, close) <= max(open, close) <= high` and non-negative volume.
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
            && self.volume >= 0.0
    }
}

/// Point-in-time quote for a ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub ts: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub size: f64,
}

impl Quote {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            ticker: "SPY".to_string(),
            ts: Utc::now(),
            interval: Interval::M1,
            open,
            high,
            low,
            close,
            volume: 1000.0,
            is_complete: true,
        }
    }

    #[test]
    fn test_candle_shape_helpers() {
        let c = candle(450.0, 451.0, 449.5, 450.8);
        assert!(c.is_well_formed());
        assert!(c.is_bullish());
        assert!((c.range() - 1.5).abs() < 1e-9);
        assert!((c.body_size() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_candle_detected() {
        let c = candle(450.0, 449.0, 449.5, 450.8);
        assert!(!c.is_well_formed());
    }

    #[test]
    fn test_interval_round_trip() {
        for iv in [Interval::M1, Interval::M5, Interval::M15] {
            assert_eq!(Interval::from_str(iv.as_str()), Some(iv));
        }
        assert_eq!(Interval::from_str("1h"), None);
    }
}
