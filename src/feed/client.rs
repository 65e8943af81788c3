use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::MarketFeed;
use crate::types::{Candle, Interval, OptionQuote, OptionType, Quote};

#[derive(Debug, Error)]
enum VendorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected payload: {0}")]
    Payload(String),
}

/// REST vendor client. Every request carries the bearer token and a bounded
/// timeout; failures are downgraded to empty results at the trait boundary.
#[derive(Debug, Clone)]
pub struct VendorClient {
    client: Client,
    base_url: String,
    token: String,
}

impl VendorClient {
    pub fn new(base_url: String, token: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, VendorError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "vendor request");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<T>().await?)
    }

    async fn fetch_quote(&self, ticker: &str) -> Result<Quote, VendorError> {
        let resp: QuoteResponse = self.get_json(&format!("/v1/quotes/{ticker}")).await?;
        Ok(Quote {
            ticker: ticker.to_string(),
            ts: Utc::now(),
            bid: resp.bid,
            ask: resp.ask,
            last: resp.last,
            size: resp.size.unwrap_or(0.0),
        })
    }

    async fn fetch_candles(
        &self,
        ticker: &str,
        interval: Interval,
        path: String,
    ) -> Result<Vec<Candle>, VendorError> {
        let resp: Vec<CandleRow> = self.get_json(&path).await?;
        let candles = resp
            .into_iter()
            .filter_map(|row| {
                let ts = Utc.timestamp_millis_opt(row.ts).single()?;
                Some(Candle {
                    ticker: ticker.to_string(),
                    ts,
                    interval,
                    open: row.open,
                    high: row.high,
                    low: row.low,
                    close: row.close,
                    volume: row.volume,
                    is_complete: row.complete.unwrap_or(true),
                })
            })
            .filter(Candle::is_well_formed)
            .collect();
        Ok(candles)
    }

    async fn fetch_chain(
        &self,
        ticker: &str,
        expiration: NaiveDate,
    ) -> Result<Vec<OptionQuote>, VendorError> {
        let resp: Vec<ChainRow> = self
            .get_json(&format!(
                "/v1/options/{ticker}/chain?expiration={}",
                expiration.format("%Y-%m-%d")
            ))
            .await?;
        let snapshot_ts = Utc::now();
        resp.into_iter()
            .map(|row| {
                let option_type = OptionType::from_str(&row.option_type)
                    .ok_or_else(|| VendorError::Payload(format!("option type {}", row.option_type)))?;
                Ok(OptionQuote {
                    ticker: ticker.to_string(),
                    snapshot_ts,
                    expiration,
                    strike: row.strike,
                    option_type,
                    bid: row.bid,
                    ask: row.ask,
                    iv: row.iv,
                    delta: row.delta,
                    gamma: row.gamma,
                    open_interest: row.open_interest,
                    volume: row.volume,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MarketFeed for VendorClient {
    async fn quote(&self, ticker: &str) -> Option<Quote> {
        match self.fetch_quote(ticker).await {
            Ok(q) => Some(q),
            Err(e) => {
                warn!(ticker, error = %e, "quote fetch failed");
                None
            }
        }
    }

    async fn quotes(&self, tickers: &[String]) -> Vec<Quote> {
        let fetches = tickers.iter().map(|t| self.quote(t));
        futures::future::join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn intraday_candles(&self, ticker: &str, interval: Interval) -> Vec<Candle> {
        let path = format!(
            "/v1/candles/{ticker}?interval={}&session=regular",
            interval.as_str()
        );
        match self.fetch_candles(ticker, interval, path).await {
            Ok(candles) => candles,
            Err(e) => {
                warn!(ticker, interval = %interval, error = %e, "intraday fetch failed");
                Vec::new()
            }
        }
    }

    async fn historical_candles(
        &self,
        ticker: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Candle> {
        let path = format!(
            "/v1/candles/{ticker}?interval={}&start={}&end={}",
            interval.as_str(),
            start.timestamp_millis(),
            end.timestamp_millis()
        );
        match self.fetch_candles(ticker, interval, path).await {
            Ok(candles) => candles,
            Err(e) => {
                warn!(ticker, interval = %interval, error = %e, "historical fetch failed");
                Vec::new()
            }
        }
    }

    async fn option_expirations(&self, ticker: &str) -> Vec<NaiveDate> {
        let result: Result<Vec<String>, VendorError> =
            self.get_json(&format!("/v1/options/{ticker}/expirations")).await;
        match result {
            Ok(dates) => dates
                .iter()
                .filter_map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .collect(),
            Err(e) => {
                warn!(ticker, error = %e, "expirations fetch failed");
                Vec::new()
            }
        }
    }

    async fn option_chain(&self, ticker: &str, expiration: NaiveDate) -> Vec<OptionQuote> {
        match self.fetch_chain(ticker, expiration).await {
            Ok(chain) => chain,
            Err(e) => {
                warn!(ticker, %expiration, error = %e, "chain fetch failed");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    bid: f64,
    ask: f64,
    last: f64,
    size: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CandleRow {
    ts: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    complete: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChainRow {
    strike: f64,
    #[serde(rename = "type")]
    option_type: String,
    bid: f64,
    ask: f64,
    iv: Option<f64>,
    delta: Option<f64>,
    gamma: Option<f64>,
    open_interest: Option<i64>,
    volume: Option<i64>,
}
