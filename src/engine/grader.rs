use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::config::AuroraConfig;
use crate::database::Repository;
use crate::optimizer::Optimizer;
use crate::types::{Outcome, OutcomeResult, Prediction};

/// Post-hoc near-ATM delta used to project premiums at grade time, when the
/// contract's original greeks are no longer on hand.
const GRADE_DELTA: f64 = 0.5;
/// Projected premiums never read below a cent.
const PREMIUM_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, Default)]
pub struct GradeSummary {
    pub graded: usize,
    pub wins: usize,
    pub losses: usize,
}

impl GradeSummary {
    pub fn win_rate(&self) -> f64 {
        if self.graded == 0 {
            0.0
        } else {
            self.wins as f64 / self.graded as f64
        }
    }
}

/// Rolling win-rate over a trailing window.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollingStats {
    pub graded: usize,
    pub wins: usize,
    pub losses: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct DegradationReport {
    pub previous_rate: f64,
    pub recent_rate: f64,
    pub degradation: f64,
    pub alert: bool,
}

/// Closed-loop grader: evaluates ACTIVE predictions against the current
/// premium projection, writes outcomes, and hands the batch win rate to the
/// optimizer. Outcomes land in the same store the optimizer reads.
pub struct Grader {
    repo: Arc<Repository>,
    optimizer: Arc<Optimizer>,
    config: Arc<AuroraConfig>,
}

impl Grader {
    pub fn new(repo: Arc<Repository>, optimizer: Arc<Optimizer>, config: Arc<AuroraConfig>) -> Self {
        Self {
            repo,
            optimizer,
            config,
        }
    }

    /// Project the current premium off the stock move since generation using
    /// the near-ATM default delta.
    fn project_premium(prediction: &Prediction, current_stock: f64) -> f64 {
        let sign = prediction.direction.sign();
        let moved = (current_stock - prediction.entry_trigger) * sign * GRADE_DELTA;
        (prediction.plan.entry + moved).max(PREMIUM_EPSILON)
    }

    fn decide(prediction: &Prediction, current_premium: f64) -> OutcomeResult {
        if current_premium >= prediction.plan.target {
            OutcomeResult::Win
        } else if current_premium <= prediction.plan.stop {
            OutcomeResult::Loss
        } else if current_premium > prediction.plan.entry {
            OutcomeResult::Win
        } else {
            OutcomeResult::Loss
        }
    }

    /// Grade every ACTIVE prediction with a recent candle, then trigger
    /// retraining per ticker whose batch rate warrants it. A failed unit is
    /// skipped; the batch continues.
    pub async fn grade_open(&self) -> Result<GradeSummary> {
        let active = self.repo.active_predictions(None).await?;
        if active.is_empty() {
            return Ok(GradeSummary::default());
        }

        let mut summary = GradeSummary::default();
        let mut per_ticker: HashMap<String, (usize, usize)> = HashMap::new();

        for prediction in &active {
            let candle = match self.repo.latest_candle(&prediction.ticker).await {
                Ok(Some(candle)) => candle,
                Ok(None) => {
                    debug!(ticker = %prediction.ticker, "no candle on record, skipping grade");
                    continue;
                }
                Err(e) => {
                    warn!(ticker = %prediction.ticker, error = %e, "candle read failed, skipping grade");
                    continue;
                }
            };

            let current_premium = Self::project_premium(prediction, candle.close);
            let result = Self::decide(prediction, current_premium);
            let pnl = current_premium - prediction.plan.entry;

            let outcome = Outcome {
                prediction_id: prediction.id.clone(),
                result,
                actual_pnl: pnl,
                closed_at: Utc::now(),
            };
            if let Err(e) = self.repo.insert_outcome_and_close(&outcome).await {
                warn!(prediction_id = %prediction.id, error = %e, "outcome write failed");
                continue;
            }

            info!(
                ticker = %prediction.ticker,
                prediction_id = %prediction.id,
                result = result.as_str(),
                pnl,
                current_premium,
                "prediction graded"
            );

            summary.graded += 1;
            let entry = per_ticker.entry(prediction.ticker.clone()).or_default();
            entry.1 += 1;
            match result {
                OutcomeResult::Win => {
                    summary.wins += 1;
                    entry.0 += 1;
                }
                OutcomeResult::Loss => summary.losses += 1,
            }
        }

        if summary.graded > 0 {
            info!(
                graded = summary.graded,
                wins = summary.wins,
                losses = summary.losses,
                batch_rate = summary.win_rate(),
                "grading batch complete"
            );
        }

        // Retraining is fire-and-forget: an optimizer failure leaves the
        // existing active weights untouched.
        for (ticker, (wins, total)) in per_ticker {
            let rate = wins as f64 / total as f64;
            self.optimizer.maybe_evolve(&ticker, rate).await;
        }

        Ok(summary)
    }

    /// Expire ACTIVE predictions generated before `today`. No outcome rows.
    pub async fn expire_stale(&self, today: NaiveDate) -> Result<u64> {
        let expired = self.repo.expire_stale_predictions(today).await?;
        if expired > 0 {
            info!(expired, "stale predictions expired");
        }
        Ok(expired)
    }

    /// Win rate over the trailing window (default seven days).
    pub async fn win_rate(&self, ticker: &str, window_days: i64) -> Result<RollingStats> {
        let since = Utc::now() - Duration::days(window_days);
        let graded = self.repo.outcomes_joined(Some(ticker), Some(since)).await?;
        let wins = graded
            .iter()
            .filter(|g| matches!(g.result, OutcomeResult::Win))
            .count();
        let losses = graded.len() - wins;
        let rate = if graded.is_empty() {
            0.0
        } else {
            wins as f64 / graded.len() as f64
        };
        Ok(RollingStats {
            graded: graded.len(),
            wins,
            losses,
            rate,
        })
    }

    /// Compare the trailing week against the week before it. Alerts when the
    /// rate degraded beyond the threshold with enough graded volume to trust.
    pub async fn degradation(&self, ticker: &str) -> Result<DegradationReport> {
        let window = self.config.signals.rolling_window_days;
        let now = Utc::now();
        let one_window_ago = now - Duration::days(window);
        let two_windows_ago = now - Duration::days(2 * window);

        let graded = self
            .repo
            .outcomes_joined(Some(ticker), Some(two_windows_ago))
            .await?;

        let mut previous = (0usize, 0usize);
        let mut recent = (0usize, 0usize);
        for g in &graded {
            let bucket = if g.closed_at < one_window_ago {
                &mut previous
            } else {
                &mut recent
            };
            bucket.1 += 1;
            if matches!(g.result, OutcomeResult::Win) {
                bucket.0 += 1;
            }
        }

        let rate = |(wins, total): (usize, usize)| {
            if total == 0 {
                0.0
            } else {
                wins as f64 / total as f64
            }
        };
        let previous_rate = rate(previous);
        let recent_rate = rate(recent);
        let degradation = previous_rate - recent_rate;
        let alert = degradation > self.config.signals.degradation_alert_threshold
            && recent.1 >= self.config.signals.min_graded_for_alert;

        Ok(DegradationReport {
            previous_rate,
            recent_rate,
            degradation,
            alert,
        })
    }
}
