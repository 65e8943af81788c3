#![allow(dead_code)]
use crate::types::OptionType;

const SQRT_2PI: f64 = 2.5066282746310002;

/// First-order greeks alongside the theoretical price. Theta is per calendar
/// day; vega and rho are per one percentage point.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionGreeks {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / SQRT_2PI
}

/// Standard normal CDF via the Abramowitz & Stegun 7.1.26 polynomial.
fn norm_cdf(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.2316419 * x.abs());
    let poly = t
        * (0.319381530
            + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));
    let tail = norm_pdf(x.abs()) * poly;
    if x >= 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

fn d1(s: f64, k: f64, r: f64, sigma: f64, t: f64) -> f64 {
    ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt())
}

/// Closed-form Black-Scholes price and greeks. Expired contracts price at
/// intrinsic value with zeroed greeks.
pub fn price_and_greeks(
    option_type: OptionType,
    spot: f64,
    strike: f64,
    rate: f64,
    sigma: f64,
    t_years: f64,
) -> OptionGreeks {
    if t_years <= 0.0 || sigma <= 0.0 || spot <= 0.0 || strike <= 0.0 {
        let intrinsic = match option_type {
            OptionType::Call => (spot - strike).max(0.0),
            OptionType::Put => (strike - spot).max(0.0),
        };
        return OptionGreeks {
            price: intrinsic,
            ..OptionGreeks::default()
        };
    }

    let sqrt_t = t_years.sqrt();
    let d1 = d1(spot, strike, rate, sigma, t_years);
    let d2 = d1 - sigma * sqrt_t;
    let discount = (-rate * t_years).exp();
    let npd1 = norm_pdf(d1);

    let (price, delta, theta_annual, rho) = match option_type {
        OptionType::Call => {
            let price = spot * norm_cdf(d1) - strike * discount * norm_cdf(d2);
            let theta = -spot * npd1 * sigma / (2.0 * sqrt_t) - rate * strike * discount * norm_cdf(d2);
            let rho = strike * t_years * discount * norm_cdf(d2) / 100.0;
            (price, norm_cdf(d1), theta, rho)
        }
        OptionType::Put => {
            let price = strike * discount * norm_cdf(-d2) - spot * norm_cdf(-d1);
            let theta =
                -spot * npd1 * sigma / (2.0 * sqrt_t) + rate * strike * discount * norm_cdf(-d2);
            let rho = -strike * t_years * discount * norm_cdf(-d2) / 100.0;
            (price, norm_cdf(d1) - 1.0, theta, rho)
        }
    };

    OptionGreeks {
        price,
        delta,
        gamma: npd1 / (spot * sigma * sqrt_t),
        theta: theta_annual / 365.0,
        vega: spot * npd1 * sqrt_t / 100.0,
        rho,
    }
}

/// Implied volatility by bisection over [0.01, 5.0], tolerance 1e-4 on the
/// price, at most 100 iterations. None when the market price falls outside
/// the bracket's price span.
pub fn implied_volatility(
    option_type: OptionType,
    spot: f64,
    strike: f64,
    rate: f64,
    t_years: f64,
    market_price: f64,
) -> Option<f64> {
    if t_years <= 0.0 || market_price <= 0.0 {
        return None;
    }

    let mut lo = 0.01;
    let mut hi = 5.0;
    let price_at = |sigma: f64| price_and_greeks(option_type, spot, strike, rate, sigma, t_years).price;

    if market_price < price_at(lo) || market_price > price_at(hi) {
        return None;
    }

    let mut mid = 0.0;
    for _ in 0..100 {
        mid = (lo + hi) / 2.0;
        let diff = price_at(mid) - market_price;
        if diff.abs() < 1e-4 {
            return Some(mid);
        }
        if diff > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Some(mid)
}

/// One-sigma expected move of the underlying over `t_years`.
pub fn expected_move(spot: f64, sigma: f64, t_years: f64) -> f64 {
    spot * sigma * t_years.sqrt()
}

/// Annualized close-to-close realized volatility, for the pre-market path
/// when no chain IV is on hand. `periods_per_year` reflects the bar spacing
/// of the input closes.
pub fn realized_volatility(closes: &[f64], periods_per_year: f64) -> Option<f64> {
    if closes.len() < 3 {
        return None;
    }
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
        / (returns.len() - 1) as f64;
    let vol = variance.sqrt() * periods_per_year.sqrt();
    if vol.is_finite() && vol > 0.0 {
        Some(vol)
    } else {
        None
    }
}
