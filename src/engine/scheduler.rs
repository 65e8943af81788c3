use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use futures::future::join_all;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::calendar::{MarketCalendar, Session};
use crate::config::AuroraConfig;
use crate::database::Repository;
use crate::engine::Grader;
use crate::feed::MarketFeed;
use crate::indicators::implied_volatility;
use crate::risk::{project_fallback, project_with_delta};
use crate::strategies::{Candidate, MarketView, SignalFuser};
use crate::types::{Interval, OptionQuote, Prediction, PredictionStatus, PricingMode, Quote};

const RISK_FREE_RATE: f64 = 0.05;
/// Same-day contract horizon for IV backfill.
const ZERO_DTE_HORIZON_YEARS: f64 = 1.0 / 252.0;

/// Fixed-cadence daemon: one 30-second loop gated by the session, fanning out
/// per-ticker pipelines and invoking the grader once a minute. `start` is
/// idempotent; `stop` halts the timer and lets an in-flight tick drain.
pub struct Scheduler {
    feed: Arc<dyn MarketFeed>,
    repo: Arc<Repository>,
    fuser: Arc<SignalFuser>,
    grader: Arc<Grader>,
    calendar: MarketCalendar,
    config: Arc<AuroraConfig>,
    running: Arc<AtomicBool>,
    shutdown: Notify,
    tick_count: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        feed: Arc<dyn MarketFeed>,
        repo: Arc<Repository>,
        fuser: Arc<SignalFuser>,
        grader: Arc<Grader>,
        calendar: MarketCalendar,
        config: Arc<AuroraConfig>,
    ) -> Arc<Self> {
        Arc::new(Self {
            feed,
            repo,
            fuser,
            grader,
            calendar,
            config,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Notify::new(),
            tick_count: AtomicU64::new(0),
            handle: Mutex::new(None),
        })
    }

    /// Bring the loop up. Refuses without vendor credentials; calling on a
    /// running scheduler is a no-op.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if !self.config.has_vendor_credentials() {
            bail!("refusing to start: vendor credentials are not configured");
        }
        if self.running.swap(true, Ordering::AcqRel) {
            info!("scheduler already running");
            return Ok(());
        }

        // Recommendations don't survive the day they were made.
        let today = self.calendar.market_date(Utc::now());
        let expired = self.repo.expire_stale_predictions(today).await?;
        if expired > 0 {
            info!(expired, "expired stale predictions from previous sessions");
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut timer =
                tokio::time::interval(std::time::Duration::from_secs(scheduler.config.scheduler.tick_secs));
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if !scheduler.running.load(Ordering::Acquire) {
                            break;
                        }
                        scheduler.run_tick(Utc::now()).await;
                    }
                    _ = scheduler.shutdown.notified() => break,
                }
            }
            info!("scheduler loop drained");
        });
        *self.handle.lock().await = Some(handle);

        info!(
            tick_secs = self.config.scheduler.tick_secs,
            primary = %self.config.tickers.primary,
            "scheduler started"
        );
        Ok(())
    }

    /// Stop the timer. The in-flight tick, if any, completes before return.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_one();
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
        info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// One full cycle at `now`. Public to the crate so the cycle is testable
    /// without the timer.
    pub(crate) async fn run_tick(&self, now: DateTime<Utc>) {
        let session = self.calendar.session_at(now);
        if session.is_closed() {
            debug!(session = %session, "market closed, skipping tick");
            return;
        }

        let tickers = self.active_tickers(now);
        let quotes = self.feed.quotes(&tickers).await;

        let jobs = quotes
            .into_iter()
            .map(|quote| self.process_ticker(quote, session, now));
        join_all(jobs).await;

        let ticks = self.tick_count.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks % self.config.scheduler.grade_every_ticks == 0 {
            if let Err(e) = self.grader.grade_open().await {
                warn!(error = %e, "grading pass failed");
            }
        }
    }

    /// Phase 1 tracks a single primary underlier; the broader set joins only
    /// on Fridays.
    fn active_tickers(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut tickers = vec![self.config.tickers.primary.clone()];
        if self.calendar.is_friday(now) {
            for t in &self.config.tickers.friday {
                if !tickers.contains(t) {
                    tickers.push(t.clone());
                }
            }
        }
        tickers
    }

    async fn process_ticker(&self, quote: Quote, session: Session, now: DateTime<Utc>) {
        let ticker = quote.ticker.clone();
        if quote.last <= 0.0 {
            debug!(ticker, "quote without a trade price, skipping");
            return;
        }

        if let Err(e) = self.repo.insert_quote(&quote).await {
            warn!(ticker, error = %e, "quote persist failed, skipping cycle");
            return;
        }

        let view = match self.collect_view(&quote, session, now).await {
            Some(view) => view,
            None => return,
        };

        let Some(candidate) = self.fuser.evaluate(&ticker, session, &view).await else {
            return;
        };

        match self.is_duplicate(&ticker, &candidate).await {
            Ok(true) => {
                info!(
                    ticker,
                    direction = candidate.direction.as_str(),
                    engine = %candidate.engine,
                    "active signal already open, suppressing duplicate"
                );
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(ticker, error = %e, "duplicate check failed, skipping cycle");
                return;
            }
        }

        if let Err(e) = self.finalize_candidate(&ticker, candidate, session, now).await {
            warn!(ticker, error = %e, "prediction persist failed");
        }
    }

    /// Assemble the candle window for the session. Regular hours use today's
    /// one-minute bars; the pre-market engine reads recent five-minute
    /// reference bars instead. The persisted tail feeds the grader's premium
    /// projection later.
    async fn collect_view(
        &self,
        quote: &Quote,
        session: Session,
        now: DateTime<Utc>,
    ) -> Option<MarketView> {
        let ticker = &quote.ticker;
        let candles = if session.is_trading() {
            self.feed.intraday_candles(ticker, Interval::M1).await
        } else {
            self.feed
                .historical_candles(ticker, Interval::M5, now - ChronoDuration::days(5), now)
                .await
        };

        if candles.is_empty() {
            debug!(ticker, session = %session, "no candles from the feed this cycle");
            return Some(MarketView::new(quote.last, candles));
        }

        let tail_start = candles.len().saturating_sub(self.config.scheduler.candle_tail);
        if let Err(e) = self.repo.upsert_candles(&candles[tail_start..]).await {
            warn!(ticker, error = %e, "candle tail persist failed");
        }
        Some(MarketView::new(quote.last, candles))
    }

    /// Duplicate suppression key is `(ticker, direction, engine)`: different
    /// engines may each hold one side, the same engine cannot double-book it.
    async fn is_duplicate(&self, ticker: &str, candidate: &Candidate) -> Result<bool> {
        let active = self.repo.active_predictions(Some(ticker)).await?;
        Ok(active
            .iter()
            .any(|p| p.direction == candidate.direction && p.engine == candidate.engine))
    }

    /// Resolve the 0DTE expiration, overlay the contract-premium plan from
    /// the chain, and persist the prediction.
    async fn finalize_candidate(
        &self,
        ticker: &str,
        candidate: Candidate,
        session: Session,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let today = self.calendar.market_date(now);
        let expiration = self.resolve_expiration(ticker, today).await;

        let chain = self.feed.option_chain(ticker, expiration).await;
        let contract = nearest_contract(&chain, &candidate);

        let (plan, pricing_mode) = match contract {
            Some(row) if row.mid() > 0.0 => {
                let mut snapshot = row.clone();
                if snapshot.iv.is_none() {
                    // Vendors drop IV on thin rows; back it out from the mid.
                    snapshot.iv = implied_volatility(
                        snapshot.option_type,
                        candidate.reasoning.underlying(),
                        snapshot.strike,
                        RISK_FREE_RATE,
                        ZERO_DTE_HORIZON_YEARS,
                        snapshot.mid(),
                    );
                }
                self.repo.insert_chain_snapshot(std::slice::from_ref(&snapshot)).await?;
                match snapshot.delta {
                    Some(delta) => (
                        project_with_delta(snapshot.mid(), candidate.stock_levels, delta),
                        PricingMode::DeltaProjected,
                    ),
                    None => (
                        project_fallback(
                            snapshot.mid(),
                            self.config.risk.stop_loss_pct,
                            self.config.risk.target_multiple,
                        ),
                        PricingMode::PremiumFallback,
                    ),
                }
            }
            _ => {
                // Chain missing the target strike: not an error, just no
                // tradable contract this cycle.
                info!(
                    ticker,
                    strike = candidate.strike,
                    %expiration,
                    "no usable contract at target strike, dropping signal"
                );
                return Ok(());
            }
        };

        let prediction = Prediction {
            id: uuid::Uuid::new_v4().to_string(),
            ticker: ticker.to_string(),
            category: "0DTE".to_string(),
            direction: candidate.direction,
            strike: candidate.strike,
            entry_pricing_mode: pricing_mode,
            confidence: candidate.confidence,
            entry_trigger: candidate.reasoning.underlying(),
            session: session.as_str().to_string(),
            engine: candidate.engine,
            reasoning: candidate.reasoning,
            status: PredictionStatus::Active,
            generated_at: now,
            expires_at: None,
            expiration,
            plan,
        };

        self.repo.insert_prediction(&prediction).await?;
        info!(
            ticker,
            direction = prediction.direction.as_str(),
            engine = %prediction.engine,
            confidence = prediction.confidence,
            strike = prediction.strike,
            entry = plan.entry,
            stop = plan.stop,
            target = plan.target,
            "prediction persisted"
        );
        Ok(())
    }

    /// Same-day expiration when the vendor lists one, else the nearest listed
    /// date from today forward.
    async fn resolve_expiration(&self, ticker: &str, today: NaiveDate) -> NaiveDate {
        let expirations = self.feed.option_expirations(ticker).await;
        if expirations.contains(&today) {
            return today;
        }
        expirations
            .into_iter()
            .filter(|d| *d >= today)
            .min()
            .unwrap_or(today)
    }
}

fn nearest_contract<'a>(chain: &'a [OptionQuote], candidate: &Candidate) -> Option<&'a OptionQuote> {
    chain
        .iter()
        .filter(|row| row.option_type == candidate.direction)
        .min_by(|a, b| {
            let da = (a.strike - candidate.strike).abs();
            let db = (b.strike - candidate.strike).abs();
            da.total_cmp(&db)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MockMarketFeed;
    use crate::optimizer::Optimizer;
    use crate::types::{Candle, OptionType};
    use chrono::{Duration, TimeZone};

    fn bell_window(ticker: &str) -> Vec<Candle> {
        (0..60i64)
            .map(|i| {
                let phase = (i as f64 - 29.5).abs();
                let volume = 2000.0 - phase * 60.0;
                let drift = (i % 7) as f64 * 0.05 - 0.15;
                let mid = 450.0 + drift;
                Candle {
                    ticker: ticker.to_string(),
                    ts: Utc::now() + Duration::minutes(i),
                    interval: Interval::M1,
                    open: mid - 0.1,
                    high: mid + 0.25,
                    low: mid - 0.25,
                    close: mid + 0.1,
                    volume,
                    is_complete: true,
                }
            })
            .collect()
    }

    fn quote(ticker: &str, last: f64) -> Quote {
        Quote {
            ticker: ticker.to_string(),
            ts: Utc::now(),
            bid: last - 0.01,
            ask: last + 0.01,
            last,
            size: 100.0,
        }
    }

    fn chain_row(ticker: &str, strike: f64, option_type: OptionType, delta: Option<f64>) -> OptionQuote {
        OptionQuote {
            ticker: ticker.to_string(),
            snapshot_ts: Utc::now(),
            expiration: morning().date_naive(),
            strike,
            option_type,
            bid: 1.15,
            ask: 1.25,
            iv: Some(0.22),
            delta,
            gamma: Some(0.08),
            open_interest: Some(1000),
            volume: Some(5000),
        }
    }

    /// Tuesday 2025-06-10 14:30 UTC = 10:30 ET, a MORNING session instant.
    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 14, 30, 0).unwrap()
    }

    /// Saturday noon.
    fn weekend() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, 16, 0, 0).unwrap()
    }

    fn test_config() -> AuroraConfig {
        let mut cfg = AuroraConfig::default();
        cfg.vendor.api_base = "https://vendor.test".to_string();
        cfg.vendor.token = "token".to_string();
        cfg
    }

    async fn scheduler_with(feed: MockMarketFeed) -> (Arc<Scheduler>, Arc<Repository>) {
        let repo = Arc::new(Repository::in_memory().await.unwrap());
        let config = Arc::new(test_config());
        let fuser = Arc::new(SignalFuser::new(Arc::clone(&repo), Arc::clone(&config)));
        let optimizer = Arc::new(Optimizer::new(
            Arc::clone(&repo),
            Arc::clone(&fuser),
            Arc::clone(&config),
        ));
        let grader = Arc::new(Grader::new(
            Arc::clone(&repo),
            optimizer,
            Arc::clone(&config),
        ));
        let scheduler = Scheduler::new(
            Arc::new(feed),
            Arc::clone(&repo),
            fuser,
            grader,
            MarketCalendar::default(),
            config,
        );
        (scheduler, repo)
    }

    fn trading_feed() -> MockMarketFeed {
        let mut feed = MockMarketFeed::new();
        feed.expect_quotes()
            .returning(|tickers| tickers.iter().map(|t| quote(t, 452.0)).collect());
        feed.expect_intraday_candles()
            .returning(|ticker, _| bell_window(ticker));
        feed.expect_option_expirations()
            .returning(|_| vec![morning().date_naive()]);
        feed.expect_option_chain().returning(|ticker, _| {
            vec![
                chain_row(ticker, 450.0, OptionType::Put, Some(-0.5)),
                chain_row(ticker, 450.0, OptionType::Call, Some(0.5)),
                chain_row(ticker, 455.0, OptionType::Put, Some(-0.3)),
            ]
        });
        feed
    }

    #[tokio::test]
    async fn test_tick_persists_one_prediction() {
        let (scheduler, repo) = scheduler_with(trading_feed()).await;
        scheduler.run_tick(morning()).await;

        let active = repo.active_predictions(Some("SPY")).await.unwrap();
        assert_eq!(active.len(), 1);
        let p = &active[0];
        assert_eq!(p.direction, OptionType::Put);
        assert_eq!(p.strike, 450.0);
        assert_eq!(p.session, "MORNING");
        assert!(p.confidence >= 60.0);
        // Premium plan overlaid from the chain mid 1.20 at delta -0.5.
        assert!((p.plan.entry - 1.20).abs() < 1e-9);
        assert!(p.plan.stop < p.plan.entry && p.plan.target > p.plan.entry);
    }

    #[tokio::test]
    async fn test_second_tick_suppresses_duplicate() {
        let (scheduler, repo) = scheduler_with(trading_feed()).await;
        scheduler.run_tick(morning()).await;

        let active = repo.active_predictions(Some("SPY")).await.unwrap();
        assert_eq!(active.len(), 1);

        // The identical signal fires again 30 s later; the open
        // (ticker, direction, engine) slot suppresses it, so no second row is
        // ever minted even after the grader closes the first.
        scheduler
            .run_tick(morning() + Duration::seconds(30))
            .await;

        let all = repo.recent_predictions(Some("SPY"), 10).await.unwrap();
        assert_eq!(all.len(), 1, "duplicate (ticker, direction, engine) persisted");
    }

    #[tokio::test]
    async fn test_weekend_tick_is_inert() {
        let mut feed = MockMarketFeed::new();
        // No feed call is ever expected on a weekend.
        feed.expect_quotes().never();
        let (scheduler, repo) = scheduler_with(feed).await;
        scheduler.run_tick(weekend()).await;
        assert!(repo.active_predictions(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_priced_quote_is_skipped() {
        let mut feed = MockMarketFeed::new();
        feed.expect_quotes()
            .returning(|tickers| tickers.iter().map(|t| quote(t, 0.0)).collect());
        let (scheduler, repo) = scheduler_with(feed).await;
        scheduler.run_tick(morning()).await;
        assert!(repo.active_predictions(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_chain_drops_signal_without_error() {
        let mut feed = MockMarketFeed::new();
        feed.expect_quotes()
            .returning(|tickers| tickers.iter().map(|t| quote(t, 452.0)).collect());
        feed.expect_intraday_candles()
            .returning(|ticker, _| bell_window(ticker));
        feed.expect_option_expirations().returning(|_| Vec::new());
        feed.expect_option_chain().returning(|_, _| Vec::new());

        let (scheduler, repo) = scheduler_with(feed).await;
        scheduler.run_tick(morning()).await;
        assert!(repo.active_predictions(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_refuses_without_credentials() {
        let repo = Arc::new(Repository::in_memory().await.unwrap());
        let config = Arc::new(AuroraConfig::default());
        let fuser = Arc::new(SignalFuser::new(Arc::clone(&repo), Arc::clone(&config)));
        let optimizer = Arc::new(Optimizer::new(
            Arc::clone(&repo),
            Arc::clone(&fuser),
            Arc::clone(&config),
        ));
        let grader = Arc::new(Grader::new(
            Arc::clone(&repo),
            optimizer,
            Arc::clone(&config),
        ));
        let scheduler = Scheduler::new(
            Arc::new(MockMarketFeed::new()),
            repo,
            fuser,
            grader,
            MarketCalendar::default(),
            config,
        );
        assert!(scheduler.start().await.is_err());
        assert!(!scheduler.is_running());
    }

    /// Feed that answers every call with nothing, so loop iterations driven
    /// by the wall clock cannot mint predictions mid-test.
    fn inert_feed() -> MockMarketFeed {
        let mut feed = MockMarketFeed::new();
        feed.expect_quotes().returning(|_| Vec::new());
        feed
    }

    #[tokio::test]
    async fn test_start_expires_yesterdays_active_rows() {
        let (scheduler, repo) = scheduler_with(inert_feed()).await;
        // Plant a stale ACTIVE prediction from two days back.
        let mut stale = crate::database::tests::sample_prediction("SPY", OptionType::Call);
        stale.generated_at = Utc::now() - Duration::days(2);
        repo.insert_prediction(&stale).await.unwrap();

        scheduler.start().await.unwrap();
        scheduler.stop().await;

        let all = repo.recent_predictions(Some("SPY"), 10).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, PredictionStatus::Expired);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (scheduler, _repo) = scheduler_with(inert_feed()).await;
        scheduler.start().await.unwrap();
        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }
}
