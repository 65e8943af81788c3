#![allow(dead_code)]
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{info, warn};

use crate::types::{
    Candle, EngineKind, GradedPrediction, Interval, OptionQuote, Outcome, OutcomeResult,
    Prediction, PredictionStatus, PricingMode, Quote, Reasoning, TradePlan, Weights,
};

/// Typed persistence for candles, quotes, chain snapshots, predictions,
/// outcomes, parameter sets and backtest runs. The repository is the only
/// shared-state collaborator; every multi-row state transition happens in a
/// single transaction.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub async fn new(db_url: &str) -> Result<Self> {
        info!("initializing database at {db_url}");
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let repo = Self { pool };
        repo.create_schema().await?;
        Ok(repo)
    }

    /// Shared in-memory store, used by the test suites.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let repo = Self { pool };
        repo.create_schema().await?;
        Ok(repo)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                ticker TEXT NOT NULL,
                ts TEXT NOT NULL,
                interval TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                is_complete INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (ticker, ts, interval)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quotes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                ts TEXT NOT NULL,
                bid REAL NOT NULL,
                ask REAL NOT NULL,
                last REAL NOT NULL,
                size REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_quotes_ticker_ts ON quotes(ticker, ts)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS option_chain (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                snapshot_ts TEXT NOT NULL,
                expiration TEXT NOT NULL,
                strike REAL NOT NULL,
                type TEXT NOT NULL,
                bid REAL NOT NULL,
                ask REAL NOT NULL,
                iv REAL,
                delta REAL,
                gamma REAL,
                open_interest INTEGER,
                volume INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id TEXT PRIMARY KEY,
                ticker TEXT NOT NULL,
                category TEXT NOT NULL,
                direction TEXT NOT NULL,
                strike REAL NOT NULL,
                entry_pricing_mode TEXT NOT NULL,
                entry_price REAL NOT NULL,
                confidence REAL NOT NULL,
                entry_trigger REAL NOT NULL,
                stop_loss REAL NOT NULL,
                take_profit REAL NOT NULL,
                risk_reward_ratio REAL NOT NULL,
                session TEXT NOT NULL,
                engine TEXT NOT NULL,
                reasoning TEXT NOT NULL,
                status TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                expires_at TEXT,
                expiration TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_predictions_status ON predictions(ticker, status)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prediction_id TEXT NOT NULL UNIQUE REFERENCES predictions(id),
                actual_pnl REAL NOT NULL,
                result TEXT NOT NULL,
                closed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weights (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                genes TEXT NOT NULL,
                win_rate REAL NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_updated TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_weights_active ON weights(ticker, is_active)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weights_deltas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                weights_id INTEGER NOT NULL REFERENCES weights(id),
                old_genes TEXT NOT NULL,
                new_genes TEXT NOT NULL,
                reason TEXT NOT NULL,
                at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS backtest_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                strategy_name TEXT NOT NULL,
                time_range TEXT NOT NULL,
                total_trades INTEGER NOT NULL,
                win_rate REAL NOT NULL,
                profit_factor REAL NOT NULL,
                max_drawdown REAL NOT NULL,
                run_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Candles and quotes
    // ------------------------------------------------------------------

    pub async fn upsert_candles(&self, candles: &[Candle]) -> Result<()> {
        for c in candles {
            sqlx::query(
                r#"
                INSERT INTO candles (ticker, ts, interval, open, high, low, close, volume, is_complete)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(ticker, ts, interval) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume,
                    is_complete = excluded.is_complete
                "#,
            )
            .bind(&c.ticker)
            .bind(c.ts.to_rfc3339())
            .bind(c.interval.as_str())
            .bind(c.open)
            .bind(c.high)
            .bind(c.low)
            .bind(c.close)
            .bind(c.volume)
            .bind(i32::from(c.is_complete))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn latest_candle(&self, ticker: &str) -> Result<Option<Candle>> {
        let row = sqlx::query(
            r#"
            SELECT ticker, ts, interval, open, high, low, close, volume, is_complete
            FROM candles
            WHERE ticker = ?
            ORDER BY ts DESC
            LIMIT 1
            "#,
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;

        row.map(candle_from_row).transpose()
    }

    pub async fn candles_between(
        &self,
        ticker: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, ts, interval, open, high, low, close, volume, is_complete
            FROM candles
            WHERE ticker = ? AND interval = ? AND ts >= ? AND ts <= ?
            ORDER BY ts ASC
            "#,
        )
        .bind(ticker)
        .bind(interval.as_str())
        .bind(start.to_rfc3339())
        .bind(end.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(candle_from_row).collect()
    }

    pub async fn insert_quote(&self, quote: &Quote) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quotes (ticker, ts, bid, ask, last, size)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&quote.ticker)
        .bind(quote.ts.to_rfc3339())
        .bind(quote.bid)
        .bind(quote.ask)
        .bind(quote.last)
        .bind(quote.size)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_chain_snapshot(&self, rows: &[OptionQuote]) -> Result<()> {
        for o in rows {
            sqlx::query(
                r#"
                INSERT INTO option_chain
                    (ticker, snapshot_ts, expiration, strike, type, bid, ask, iv, delta, gamma, open_interest, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&o.ticker)
            .bind(o.snapshot_ts.to_rfc3339())
            .bind(o.expiration.format("%Y-%m-%d").to_string())
            .bind(o.strike)
            .bind(o.option_type.as_str())
            .bind(o.bid)
            .bind(o.ask)
            .bind(o.iv)
            .bind(o.delta)
            .bind(o.gamma)
            .bind(o.open_interest)
            .bind(o.volume)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Predictions and outcomes
    // ------------------------------------------------------------------

    pub async fn insert_prediction(&self, p: &Prediction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO predictions
                (id, ticker, category, direction, strike, entry_pricing_mode, entry_price,
                 confidence, entry_trigger, stop_loss, take_profit, risk_reward_ratio, session,
                 engine, reasoning, status, generated_at, expires_at, expiration)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&p.id)
        .bind(&p.ticker)
        .bind(&p.category)
        .bind(p.direction.as_str())
        .bind(p.strike)
        .bind(p.entry_pricing_mode.as_str())
        .bind(p.plan.entry)
        .bind(p.confidence)
        .bind(p.entry_trigger)
        .bind(p.plan.stop)
        .bind(p.plan.target)
        .bind(p.plan.risk_reward)
        .bind(&p.session)
        .bind(p.engine.as_str())
        .bind(serde_json::to_string(&p.reasoning)?)
        .bind(p.status.as_str())
        .bind(p.generated_at.to_rfc3339())
        .bind(p.expires_at.map(|t| t.to_rfc3339()))
        .bind(p.expiration.format("%Y-%m-%d").to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn active_predictions(&self, ticker: Option<&str>) -> Result<Vec<Prediction>> {
        let rows = match ticker {
            Some(t) => {
                sqlx::query(
                    r#"
                    SELECT * FROM predictions
                    WHERE status = 'ACTIVE' AND ticker = ?
                    ORDER BY generated_at ASC
                    "#,
                )
                .bind(t)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM predictions
                    WHERE status = 'ACTIVE'
                    ORDER BY generated_at ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(prediction_from_row).collect()
    }

    pub async fn recent_predictions(&self, ticker: Option<&str>, limit: u32) -> Result<Vec<Prediction>> {
        let rows = match ticker {
            Some(t) => {
                sqlx::query(
                    r#"
                    SELECT * FROM predictions
                    WHERE ticker = ?
                    ORDER BY generated_at DESC
                    LIMIT ?
                    "#,
                )
                .bind(t)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM predictions
                    ORDER BY generated_at DESC
                    LIMIT ?
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(prediction_from_row).collect()
    }

    pub async fn update_prediction_status(&self, id: &str, status: PredictionStatus) -> Result<()> {
        sqlx::query("UPDATE predictions SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record the terminal outcome and close the prediction in one transaction,
    /// so a CLOSED row and its outcome can never be observed apart.
    pub async fn insert_outcome_and_close(&self, outcome: &Outcome) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO outcomes (prediction_id, actual_pnl, result, closed_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&outcome.prediction_id)
        .bind(outcome.actual_pnl)
        .bind(outcome.result.as_str())
        .bind(outcome.closed_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE predictions SET status = 'CLOSED' WHERE id = ?")
            .bind(&outcome.prediction_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Mark ACTIVE predictions generated before `today` as EXPIRED. No outcome
    /// rows are written for expiries.
    pub async fn expire_stale_predictions(&self, today: NaiveDate) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE predictions
            SET status = 'EXPIRED'
            WHERE status = 'ACTIVE' AND date(generated_at) < ?
            "#,
        )
        .bind(today.format("%Y-%m-%d").to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn outcomes_joined(
        &self,
        ticker: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<GradedPrediction>> {
        let ticker_filter = ticker.unwrap_or("%");
        let since_filter = since
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "1970-01-01T00:00:00+00:00".to_string());

        let rows = sqlx::query(
            r#"
            SELECT p.id, p.ticker, p.direction, p.confidence, p.generated_at,
                   o.result, o.actual_pnl, o.closed_at
            FROM outcomes o
            JOIN predictions p ON p.id = o.prediction_id
            WHERE p.ticker LIKE ? AND o.closed_at >= ?
            ORDER BY o.closed_at ASC
            "#,
        )
        .bind(ticker_filter)
        .bind(since_filter)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(GradedPrediction {
                    prediction_id: row.get("id"),
                    ticker: row.get("ticker"),
                    direction: parse_direction(row.get("direction"))?,
                    confidence: row.get("confidence"),
                    generated_at: parse_ts(row.get("generated_at"))?,
                    result: parse_result(row.get("result"))?,
                    actual_pnl: row.get("actual_pnl"),
                    closed_at: parse_ts(row.get("closed_at"))?,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Weights
    // ------------------------------------------------------------------

    /// Replace the active parameter row for a ticker. The old row is
    /// deactivated, the new one inserted, and a delta logged, all in one
    /// transaction.
    pub async fn upsert_active_weights(
        &self,
        ticker: &str,
        genes: &Weights,
        win_rate: f64,
        reason: &str,
    ) -> Result<i64> {
        let new_genes = serde_json::to_string(genes)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let previous = sqlx::query(
            "SELECT id, genes FROM weights WHERE ticker = ? AND is_active = 1",
        )
        .bind(ticker)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(ref row) = previous {
            let old_id: i64 = row.get("id");
            sqlx::query("UPDATE weights SET is_active = 0 WHERE id = ?")
                .bind(old_id)
                .execute(&mut *tx)
                .await?;
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO weights (ticker, genes, win_rate, is_active, last_updated)
            VALUES (?, ?, ?, 1, ?)
            "#,
        )
        .bind(ticker)
        .bind(&new_genes)
        .bind(win_rate)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        let new_id = inserted.last_insert_rowid();

        if let Some(row) = previous {
            let old_genes: String = row.get("genes");
            sqlx::query(
                r#"
                INSERT INTO weights_deltas (weights_id, old_genes, new_genes, reason, at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(new_id)
            .bind(old_genes)
            .bind(&new_genes)
            .bind(reason)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(new_id)
    }

    /// Latest active weights for a ticker. A corrupt genes blob is treated as
    /// "no active row": logged and left in place for the next optimizer run
    /// to overwrite.
    pub async fn get_active_weights(&self, ticker: &str) -> Result<Option<(Weights, f64)>> {
        let row = sqlx::query(
            r#"
            SELECT genes, win_rate FROM weights
            WHERE ticker = ? AND is_active = 1
            ORDER BY last_updated DESC
            LIMIT 1
            "#,
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let genes: String = row.get("genes");
        match serde_json::from_str::<Weights>(&genes) {
            Ok(weights) => {
                if let Err(errors) = weights.validate() {
                    warn!(ticker, errors = ?errors, "active weights row out of bounds, using defaults");
                    return Ok(None);
                }
                Ok(Some((weights, row.get("win_rate"))))
            }
            Err(e) => {
                warn!(ticker, error = %e, "corrupt active weights row, using defaults");
                Ok(None)
            }
        }
    }

    pub async fn weights_delta_count(&self, ticker: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM weights_deltas d
            JOIN weights w ON w.id = d.weights_id
            WHERE w.ticker = ?
            "#,
        )
        .bind(ticker)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    // ------------------------------------------------------------------
    // Backtests
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_backtest_result(
        &self,
        ticker: &str,
        strategy_name: &str,
        time_range: &str,
        total_trades: i64,
        win_rate: f64,
        profit_factor: f64,
        max_drawdown: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO backtest_results
                (ticker, strategy_name, time_range, total_trades, win_rate, profit_factor, max_drawdown, run_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ticker)
        .bind(strategy_name)
        .bind(time_range)
        .bind(total_trades)
        .bind(win_rate)
        .bind(profit_factor)
        .bind(max_drawdown)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_direction(s: &str) -> Result<crate::types::OptionType> {
    crate::types::OptionType::from_str(s)
        .ok_or_else(|| anyhow::anyhow!("unknown direction: {s}"))
}

fn parse_result(s: &str) -> Result<OutcomeResult> {
    OutcomeResult::from_str(s).ok_or_else(|| anyhow::anyhow!("unknown result: {s}"))
}

fn candle_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Candle> {
    let interval: String = row.get("interval");
    Ok(Candle {
        ticker: row.get("ticker"),
        ts: parse_ts(row.get("ts"))?,
        interval: Interval::from_str(&interval)
            .ok_or_else(|| anyhow::anyhow!("unknown interval: {interval}"))?,
        open: row.get("open"),
        high: row.get("high"),
        low: row.get("low"),
        close: row.get("close"),
        volume: row.get("volume"),
        is_complete: row.get::<i32, _>("is_complete") == 1,
    })
}

fn prediction_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Prediction> {
    let direction: String = row.get("direction");
    let engine: String = row.get("engine");
    let status: String = row.get("status");
    let reasoning: String = row.get("reasoning");
    let expiration: String = row.get("expiration");
    let pricing_mode: String = row.get("entry_pricing_mode");

    Ok(Prediction {
        id: row.get("id"),
        ticker: row.get("ticker"),
        category: row.get("category"),
        direction: parse_direction(&direction)?,
        strike: row.get("strike"),
        entry_pricing_mode: PricingMode::from_str(&pricing_mode)
            .ok_or_else(|| anyhow::anyhow!("unknown pricing mode: {pricing_mode}"))?,
        confidence: row.get("confidence"),
        entry_trigger: row.get("entry_trigger"),
        session: row.get("session"),
        engine: EngineKind::from_str(&engine)
            .ok_or_else(|| anyhow::anyhow!("unknown engine: {engine}"))?,
        reasoning: serde_json::from_str::<Reasoning>(&reasoning)?,
        status: PredictionStatus::from_str(&status)
            .ok_or_else(|| anyhow::anyhow!("unknown status: {status}"))?,
        generated_at: parse_ts(row.get("generated_at"))?,
        expires_at: row
            .get::<Option<String>, _>("expires_at")
            .map(|s| parse_ts(&s))
            .transpose()?,
        expiration: NaiveDate::parse_from_str(&expiration, "%Y-%m-%d")?,
        plan: TradePlan {
            entry: row.get("entry_price"),
            stop: row.get("stop_loss"),
            target: row.get("take_profit"),
            risk_reward: row.get("risk_reward_ratio"),
        },
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::OptionType;
    use chrono::Duration;
    use std::collections::BTreeMap;

    pub(crate) fn sample_prediction(ticker: &str, direction: OptionType) -> Prediction {
        Prediction {
            id: uuid::Uuid::new_v4().to_string(),
            ticker: ticker.to_string(),
            category: "0DTE".to_string(),
            direction,
            strike: 450.0,
            entry_pricing_mode: PricingMode::DeltaProjected,
            confidence: 72.0,
            entry_trigger: 452.0,
            session: "MORNING".to_string(),
            engine: EngineKind::TpoMit,
            reasoning: Reasoning::TpoMit {
                poc: 450.0,
                vah: 450.75,
                val: 449.25,
                tpo_bias: "SHORT".to_string(),
                rsi14: Some(55.0),
                ib_breakout: false,
                cvd_divergence: false,
                underlying: 452.0,
                scores: BTreeMap::new(),
                summary: "test".to_string(),
            },
            status: PredictionStatus::Active,
            generated_at: Utc::now(),
            expires_at: None,
            expiration: Utc::now().date_naive(),
            plan: TradePlan {
                entry: 1.0,
                stop: 0.5,
                target: 2.0,
                risk_reward: 2.0,
            },
        }
    }

    #[tokio::test]
    async fn test_prediction_round_trip() {
        let repo = Repository::in_memory().await.unwrap();
        let p = sample_prediction("SPY", OptionType::Put);
        repo.insert_prediction(&p).await.unwrap();

        let active = repo.active_predictions(Some("SPY")).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, p.id);
        assert_eq!(active[0].direction, OptionType::Put);
        assert_eq!(active[0].engine, EngineKind::TpoMit);
        assert!((active[0].plan.target - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_outcome_closes_prediction_atomically() {
        let repo = Repository::in_memory().await.unwrap();
        let p = sample_prediction("SPY", OptionType::Call);
        repo.insert_prediction(&p).await.unwrap();

        repo.insert_outcome_and_close(&Outcome {
            prediction_id: p.id.clone(),
            result: OutcomeResult::Win,
            actual_pnl: 2.0,
            closed_at: Utc::now(),
        })
        .await
        .unwrap();

        assert!(repo.active_predictions(None).await.unwrap().is_empty());
        let graded = repo.outcomes_joined(Some("SPY"), None).await.unwrap();
        assert_eq!(graded.len(), 1);
        assert_eq!(graded[0].result, OutcomeResult::Win);

        // Second outcome for the same prediction violates uniqueness.
        assert!(repo
            .insert_outcome_and_close(&Outcome {
                prediction_id: p.id.clone(),
                result: OutcomeResult::Loss,
                actual_pnl: -0.5,
                closed_at: Utc::now(),
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_status_update_is_terminal_bookkeeping() {
        let repo = Repository::in_memory().await.unwrap();
        let p = sample_prediction("SPY", OptionType::Call);
        repo.insert_prediction(&p).await.unwrap();

        repo.update_prediction_status(&p.id, PredictionStatus::Expired)
            .await
            .unwrap();

        let all = repo.recent_predictions(Some("SPY"), 5).await.unwrap();
        assert_eq!(all[0].status, PredictionStatus::Expired);
        assert!(repo.active_predictions(Some("SPY")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expire_stale_skips_today_and_writes_no_outcome() {
        let repo = Repository::in_memory().await.unwrap();
        let mut old = sample_prediction("SPY", OptionType::Call);
        old.generated_at = Utc::now() - Duration::days(2);
        let fresh = sample_prediction("SPY", OptionType::Put);
        repo.insert_prediction(&old).await.unwrap();
        repo.insert_prediction(&fresh).await.unwrap();

        let expired = repo
            .expire_stale_predictions(Utc::now().date_naive())
            .await
            .unwrap();
        assert_eq!(expired, 1);

        let active = repo.active_predictions(None).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, fresh.id);
        assert!(repo.outcomes_joined(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_weights_upsert_writes_delta_on_replacement() {
        let repo = Repository::in_memory().await.unwrap();
        let first = Weights::default();
        repo.upsert_active_weights("SPY", &first, 0.5, "seed")
            .await
            .unwrap();
        // First activation has nothing to diff against.
        assert_eq!(repo.weights_delta_count("SPY").await.unwrap(), 0);

        let mut second = Weights::default();
        second.min_confidence = 65.0;
        repo.upsert_active_weights("SPY", &second, 0.3, "win rate 0.30 below floor 0.60")
            .await
            .unwrap();
        assert_eq!(repo.weights_delta_count("SPY").await.unwrap(), 1);

        let (active, win_rate) = repo.get_active_weights("SPY").await.unwrap().unwrap();
        assert_eq!(active.min_confidence, 65.0);
        assert!((win_rate - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_corrupt_weights_row_reads_as_absent() {
        let repo = Repository::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO weights (ticker, genes, win_rate, is_active, last_updated) VALUES ('SPY', 'not json', 0.5, 1, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&repo.pool)
        .await
        .unwrap();

        assert!(repo.get_active_weights("SPY").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_candle_upsert_is_idempotent() {
        let repo = Repository::in_memory().await.unwrap();
        let ts = Utc::now();
        let candle = Candle {
            ticker: "SPY".to_string(),
            ts,
            interval: Interval::M1,
            open: 450.0,
            high: 450.5,
            low: 449.8,
            close: 450.2,
            volume: 1000.0,
            is_complete: true,
        };
        repo.upsert_candles(&[candle.clone()]).await.unwrap();
        let mut updated = candle.clone();
        updated.close = 450.4;
        repo.upsert_candles(&[updated]).await.unwrap();

        let latest = repo.latest_candle("SPY").await.unwrap().unwrap();
        assert!((latest.close - 450.4).abs() < 1e-9);
    }
}
