use std::collections::BTreeMap;

use crate::types::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impulse {
    Bullish,
    Bearish,
    Neutral,
}

impl Impulse {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impulse::Bullish => "BULLISH",
            Impulse::Bearish => "BEARISH",
            Impulse::Neutral => "NEUTRAL",
        }
    }
}

/// Volume-at-price profile over a candle window.
///
/// Invariants: `val <= poc <= vah` and the mass inside `[val, vah]` covers at
/// least `value_area_fraction` of the total (the last expansion step may
/// overshoot by one tier).
#[derive(Debug, Clone)]
pub struct TpoProfile {
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub impulse: Impulse,
    pub histogram: BTreeMap<i64, f64>,
    pub total_mass: f64,
    pub range: f64,
    pub tick_size: f64,
}

impl TpoProfile {
    pub fn price_of(&self, tick: i64) -> f64 {
        tick as f64 * self.tick_size
    }

    /// Mass captured inside the value area, inclusive of both bounds.
    pub fn value_area_mass(&self) -> f64 {
        let lo = (self.val / self.tick_size).round() as i64;
        let hi = (self.vah / self.tick_size).round() as i64;
        self.histogram
            .range(lo..=hi)
            .map(|(_, mass)| *mass)
            .sum()
    }
}

/// Build a TPO profile from a candle window.
///
/// Each candle's volume is spread uniformly across every tick its `[low, high]`
/// span touches (inclusive). POC is the maximum-mass tick, lowest tick on a
/// tie. The value area grows from the POC toward whichever neighbor tick holds
/// more mass, downward on ties, until it holds `value_area_fraction` of the
/// total. Impulse is the window's net direction, NEUTRAL when the body is
/// under 10% of the session range.
pub fn build_tpo_profile(
    candles: &[Candle],
    tick_size: f64,
    value_area_fraction: f64,
) -> Option<TpoProfile> {
    if candles.is_empty() || tick_size <= 0.0 {
        return None;
    }

    let mut histogram: BTreeMap<i64, f64> = BTreeMap::new();
    for c in candles {
        let lo = (c.low / tick_size).floor() as i64;
        let hi = (c.high / tick_size).floor() as i64;
        let ticks = (hi - lo + 1) as f64;
        let share = c.volume / ticks;
        for t in lo..=hi {
            *histogram.entry(t).or_insert(0.0) += share;
        }
    }

    let total_mass: f64 = histogram.values().sum();
    if total_mass <= 0.0 {
        return None;
    }

    // Lowest tick wins ties, so scan ascending and require a strict improvement.
    let mut poc_tick = *histogram.keys().next()?;
    let mut poc_mass = f64::MIN;
    for (&tick, &mass) in &histogram {
        if mass > poc_mass {
            poc_mass = mass;
            poc_tick = tick;
        }
    }

    let target = value_area_fraction * total_mass;
    let mut lo_tick = poc_tick;
    let mut hi_tick = poc_tick;
    let mut covered = poc_mass;
    let min_tick = *histogram.keys().next()?;
    let max_tick = *histogram.keys().next_back()?;

    while covered < target && (lo_tick > min_tick || hi_tick < max_tick) {
        let below = if lo_tick > min_tick {
            Some(histogram.get(&(lo_tick - 1)).copied().unwrap_or(0.0))
        } else {
            None
        };
        let above = if hi_tick < max_tick {
            Some(histogram.get(&(hi_tick + 1)).copied().unwrap_or(0.0))
        } else {
            None
        };

        match (below, above) {
            // Ties expand down.
            (Some(b), Some(a)) if b >= a => {
                lo_tick -= 1;
                covered += b;
            }
            (Some(_), Some(a)) => {
                hi_tick += 1;
                covered += a;
            }
            (Some(b), None) => {
                lo_tick -= 1;
                covered += b;
            }
            (None, Some(a)) => {
                hi_tick += 1;
                covered += a;
            }
            (None, None) => break,
        }
    }

    let first = candles.first()?;
    let last = candles.last()?;
    let session_high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let session_low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let range = session_high - session_low;

    let net = last.close - first.open;
    let impulse = if range <= 0.0 || net.abs() / range < 0.1 {
        Impulse::Neutral
    } else if net > 0.0 {
        Impulse::Bullish
    } else {
        Impulse::Bearish
    };

    Some(TpoProfile {
        poc: poc_tick as f64 * tick_size,
        vah: hi_tick as f64 * tick_size,
        val: lo_tick as f64 * tick_size,
        impulse,
        histogram,
        total_mass,
        range,
        tick_size,
    })
}
