use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{orb_breakout, premarket, tpo_mit, Candidate, MarketView};
use crate::calendar::Session;
use crate::config::AuroraConfig;
use crate::database::Repository;
use crate::types::Weights;

struct CachedWeights {
    weights: Weights,
    refreshed_at: Instant,
}

/// Session-aware signal fuser.
///
/// Picks the engine for the session, fuses per-signal scores under the active
/// weight vector, and rejects anything under the weights' confidence floor.
/// Active weights live in a per-ticker cache with a short TTL, so an
/// optimizer hot-swap lands without a restart; `invalidate` forces the next
/// evaluation to reload immediately.
pub struct SignalFuser {
    repo: Arc<Repository>,
    config: Arc<AuroraConfig>,
    cache: RwLock<HashMap<String, CachedWeights>>,
}

impl SignalFuser {
    pub fn new(repo: Arc<Repository>, config: Arc<AuroraConfig>) -> Self {
        Self {
            repo,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Active weights for a ticker, loaded through the TTL cache. Absent or
    /// corrupt rows fall back to the built-in defaults.
    pub async fn active_weights(&self, ticker: &str) -> Weights {
        let ttl = Duration::from_secs(self.config.signals.weights_cache_ttl_secs);
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(ticker) {
                if entry.refreshed_at.elapsed() < ttl {
                    return entry.weights.clone();
                }
            }
        }

        let weights = match self.repo.get_active_weights(ticker).await {
            Ok(Some((weights, _win_rate))) => weights,
            Ok(None) => Weights::default(),
            Err(e) => {
                warn!(ticker, error = %e, "weights load failed, using defaults");
                Weights::default()
            }
        };

        let mut cache = self.cache.write().await;
        cache.insert(
            ticker.to_string(),
            CachedWeights {
                weights: weights.clone(),
                refreshed_at: Instant::now(),
            },
        );
        weights
    }

    /// Drop the cached weights for a ticker so the next evaluation reloads.
    pub async fn invalidate(&self, ticker: &str) {
        self.cache.write().await.remove(ticker);
    }

    /// Evaluate one ticker for the current session. Returns a candidate only
    /// when an engine fired and its confidence clears the active floor.
    pub async fn evaluate(
        &self,
        ticker: &str,
        session: Session,
        view: &MarketView,
    ) -> Option<Candidate> {
        let weights = self.active_weights(ticker).await;

        let candidate = match session {
            Session::PreMarket => premarket::evaluate(view, &weights, &self.config),
            Session::OpeningRange => orb_breakout::evaluate(view, &weights, &self.config),
            Session::Morning | Session::Afternoon | Session::PowerHour => {
                // ORB picks up the slack when the main engine stays silent.
                tpo_mit::evaluate(view, &weights, &self.config)
                    .or_else(|| orb_breakout::evaluate(view, &weights, &self.config))
            }
            _ => None,
        }?;

        if candidate.confidence < weights.min_confidence {
            debug!(
                ticker,
                engine = %candidate.engine,
                confidence = candidate.confidence,
                floor = weights.min_confidence,
                "candidate under confidence floor"
            );
            return None;
        }
        Some(candidate)
    }
}
