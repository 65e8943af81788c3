use crate::types::Candle;

/// How the auction opened, classified from where price opened, traveled and
/// settled relative to the initial-balance extremes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpeningType {
    Drive,
    TestDrive,
    RejectionReverse,
    Auction,
}

impl OpeningType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpeningType::Drive => "DRIVE",
            OpeningType::TestDrive => "TEST_DRIVE",
            OpeningType::RejectionReverse => "REJECTION_REVERSE",
            OpeningType::Auction => "AUCTION",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InitialBalance {
    pub ib_high: f64,
    pub ib_low: f64,
    pub opening_type: OpeningType,
}

impl InitialBalance {
    pub fn width(&self) -> f64 {
        self.ib_high - self.ib_low
    }

    pub fn is_breakout(&self, price: f64) -> bool {
        price > self.ib_high || price < self.ib_low
    }
}

const NEAR_THRESHOLD: f64 = 0.2;

/// Initial balance over the first `duration_minutes` one-minute candles.
///
/// Distances are measured in units of IB width with a 20% "near" threshold:
/// open near one extreme with the close near the other is a DRIVE; open and
/// close pinned to the same extreme is REJECTION_REVERSE; both extremes
/// touched with little net change is TEST_DRIVE; anything else is AUCTION.
pub fn initial_balance(candles: &[Candle], duration_minutes: usize) -> Option<InitialBalance> {
    if candles.is_empty() || duration_minutes == 0 {
        return None;
    }
    let window = &candles[..candles.len().min(duration_minutes)];

    let ib_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let ib_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let width = ib_high - ib_low;

    let open = window.first()?.open;
    let close = window.last()?.close;

    if width <= 0.0 {
        return Some(InitialBalance {
            ib_high,
            ib_low,
            opening_type: OpeningType::Auction,
        });
    }

    let near = NEAR_THRESHOLD * width;
    let open_near_low = (open - ib_low).abs() < near;
    let open_near_high = (ib_high - open).abs() < near;
    let close_near_low = (close - ib_low).abs() < near;
    let close_near_high = (ib_high - close).abs() < near;

    let touched_high = window.iter().any(|c| ib_high - c.high < near);
    let touched_low = window.iter().any(|c| c.low - ib_low < near);
    let small_net = (close - open).abs() < near;

    let opening_type = if (open_near_low && close_near_high) || (open_near_high && close_near_low) {
        OpeningType::Drive
    } else if (open_near_low && close_near_low) || (open_near_high && close_near_high) {
        OpeningType::RejectionReverse
    } else if touched_high && touched_low && small_net {
        OpeningType::TestDrive
    } else {
        OpeningType::Auction
    };

    Some(InitialBalance {
        ib_high,
        ib_low,
        opening_type,
    })
}
