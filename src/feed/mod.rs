pub mod client;

pub use client::VendorClient;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
#[cfg(test)]
use mockall::automock;

use crate::types::{Candle, Interval, OptionQuote, Quote};

/// Read-only market data source. Implementations absorb transient vendor
/// failures: a broken call logs and returns `None` or an empty vector, so
/// nothing vendor-shaped ever propagates into the scheduler.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn quote(&self, ticker: &str) -> Option<Quote>;

    /// Batched quotes; tickers that fail to resolve are simply absent.
    async fn quotes(&self, tickers: &[String]) -> Vec<Quote>;

    /// Today's intraday candles, session-filtered to regular hours.
    async fn intraday_candles(&self, ticker: &str, interval: Interval) -> Vec<Candle>;

    async fn historical_candles(
        &self,
        ticker: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Candle>;

    async fn option_expirations(&self, ticker: &str) -> Vec<NaiveDate>;

    async fn option_chain(&self, ticker: &str, expiration: NaiveDate) -> Vec<OptionQuote>;
}
