use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use tracing::{info, warn};

use crate::config::{AuroraConfig, GaSettings};
use crate::database::Repository;
use crate::strategies::SignalFuser;
use crate::types::{
    GradedPrediction, Weights, CVD_BOUNDS, IB_BOUNDS, MIN_CONFIDENCE_BOUNDS, ORB_BREAKOUT_BOUNDS,
    RSI_BOUNDS, STOP_LOSS_BOUNDS, TARGET_BOUNDS, TPO_BOUNDS, VWAP_BOUNDS,
};

/// Aggregate view of the graded history one evolution run scores against.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeStats {
    pub graded: usize,
    pub wins: usize,
    pub avg_pnl: f64,
}

impl OutcomeStats {
    pub fn from_history(history: &[GradedPrediction]) -> Self {
        if history.is_empty() {
            return Self::default();
        }
        let wins = history
            .iter()
            .filter(|g| matches!(g.result, crate::types::OutcomeResult::Win))
            .count();
        let avg_pnl = history.iter().map(|g| g.actual_pnl).sum::<f64>() / history.len() as f64;
        Self {
            graded: history.len(),
            wins,
            avg_pnl,
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.graded == 0 {
            0.0
        } else {
            self.wins as f64 / self.graded as f64
        }
    }
}

#[derive(Debug, Clone)]
struct Individual {
    genes: Weights,
    fitness: f64,
}

/// Pure genetic search over the weight genome. Holds no I/O; outcome reads
/// stay in the caller so the search is unit-testable against synthetic
/// histories.
pub struct Evolution {
    settings: GaSettings,
}

impl Evolution {
    pub fn new(settings: GaSettings) -> Self {
        Self { settings }
    }

    /// Score one genome against the graded history. With no history the
    /// genome reads a flat 0.5; otherwise 70% win rate plus a 30% bonus for a
    /// profitable average. The dataset-level score is deliberate: see the
    /// fitness note in DESIGN.md.
    fn evaluate(&self, _genes: &Weights, stats: &OutcomeStats) -> f64 {
        if stats.graded == 0 {
            return 0.5;
        }
        0.7 * stats.win_rate() + if stats.avg_pnl > 0.0 { 0.3 } else { 0.0 }
    }

    fn random_genes(&self, rng: &mut impl Rng) -> Weights {
        let mut genes = Weights {
            tpo: rng.gen_range(TPO_BOUNDS.0..=TPO_BOUNDS.1),
            rsi: rng.gen_range(RSI_BOUNDS.0..=RSI_BOUNDS.1),
            ib: rng.gen_range(IB_BOUNDS.0..=IB_BOUNDS.1),
            cvd: rng.gen_range(CVD_BOUNDS.0..=CVD_BOUNDS.1),
            vwap: rng.gen_range(VWAP_BOUNDS.0..=VWAP_BOUNDS.1),
            min_confidence: rng.gen_range(MIN_CONFIDENCE_BOUNDS.0..=MIN_CONFIDENCE_BOUNDS.1),
            orb_breakout_mult: rng.gen_range(ORB_BREAKOUT_BOUNDS.0..=ORB_BREAKOUT_BOUNDS.1),
            stop_loss_mult: rng.gen_range(STOP_LOSS_BOUNDS.0..=STOP_LOSS_BOUNDS.1),
            target_mult: rng.gen_range(TARGET_BOUNDS.0..=TARGET_BOUNDS.1),
        };
        genes.renormalize();
        genes
    }

    /// Roulette selection over non-negative fitness; uniform pick when the
    /// wheel has no mass.
    fn select<'a>(&self, population: &'a [Individual], rng: &mut impl Rng) -> &'a Individual {
        let total: f64 = population.iter().map(|i| i.fitness.max(0.0)).sum();
        if total <= 0.0 {
            return &population[rng.gen_range(0..population.len())];
        }
        let mut spin = rng.gen_range(0.0..total);
        for individual in population {
            spin -= individual.fitness.max(0.0);
            if spin <= 0.0 {
                return individual;
            }
        }
        population.last().expect("population is never empty")
    }

    /// Per-field uniform crossover, component weights renormalized after.
    pub fn crossover(&self, a: &Weights, b: &Weights, rng: &mut impl Rng) -> Weights {
        let mut pick = |x: f64, y: f64| if rng.gen_bool(0.5) { x } else { y };
        let mut child = Weights {
            tpo: pick(a.tpo, b.tpo),
            rsi: pick(a.rsi, b.rsi),
            ib: pick(a.ib, b.ib),
            cvd: pick(a.cvd, b.cvd),
            vwap: pick(a.vwap, b.vwap),
            min_confidence: pick(a.min_confidence, b.min_confidence),
            orb_breakout_mult: pick(a.orb_breakout_mult, b.orb_breakout_mult),
            stop_loss_mult: pick(a.stop_loss_mult, b.stop_loss_mult),
            target_mult: pick(a.target_mult, b.target_mult),
        };
        child.renormalize();
        child
    }

    /// Per-field mutation: with probability `mutation_rate`, nudge the gene by
    /// uniform noise within its step size, then clamp and renormalize.
    pub fn mutate(&self, genes: &mut Weights, rng: &mut impl Rng) {
        let rate = self.settings.mutation_rate;
        let mut nudge = |value: &mut f64, bounds: (f64, f64, f64)| {
            if rng.gen_bool(rate) {
                *value += rng.gen_range(-bounds.2..=bounds.2);
            }
        };
        nudge(&mut genes.tpo, TPO_BOUNDS);
        nudge(&mut genes.rsi, RSI_BOUNDS);
        nudge(&mut genes.ib, IB_BOUNDS);
        nudge(&mut genes.cvd, CVD_BOUNDS);
        nudge(&mut genes.vwap, VWAP_BOUNDS);
        nudge(&mut genes.min_confidence, MIN_CONFIDENCE_BOUNDS);
        nudge(&mut genes.orb_breakout_mult, ORB_BREAKOUT_BOUNDS);
        nudge(&mut genes.stop_loss_mult, STOP_LOSS_BOUNDS);
        nudge(&mut genes.target_mult, TARGET_BOUNDS);
        genes.clamp_to_bounds();
        genes.renormalize();
    }

    /// One full cycle: evaluate, keep the elite, refill with crossover or the
    /// best parent's clone, mutate, re-evaluate, and return the alpha.
    pub fn evolve(&self, stats: &OutcomeStats, rng: &mut impl Rng) -> Weights {
        let mut population: Vec<Individual> = (0..self.settings.population_size)
            .map(|_| {
                let genes = self.random_genes(rng);
                let fitness = self.evaluate(&genes, stats);
                Individual { genes, fitness }
            })
            .collect();

        for _ in 0..self.settings.generations.max(1) {
            population.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));

            let mut next: Vec<Individual> = population
                .iter()
                .take(self.settings.elite_count)
                .cloned()
                .collect();

            while next.len() < self.settings.population_size {
                let mut child = if rng.gen_bool(self.settings.crossover_rate) {
                    let a = self.select(&population, rng);
                    let b = self.select(&population, rng);
                    self.crossover(&a.genes, &b.genes, rng)
                } else {
                    population[0].genes.clone()
                };
                self.mutate(&mut child, rng);
                let fitness = self.evaluate(&child, stats);
                next.push(Individual {
                    genes: child,
                    fitness,
                });
            }
            population = next;
            for individual in &mut population {
                individual.fitness = self.evaluate(&individual.genes, stats);
            }
        }

        population.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
        population[0].genes.clone()
    }
}

/// Retraining trigger. Reads the graded history, runs the pure search, and
/// hot-swaps the active row; the fuser's cache TTL (plus an explicit
/// invalidate) picks the new vector up without a restart.
pub struct Optimizer {
    repo: Arc<Repository>,
    fuser: Arc<SignalFuser>,
    config: Arc<AuroraConfig>,
}

impl Optimizer {
    pub fn new(repo: Arc<Repository>, fuser: Arc<SignalFuser>, config: Arc<AuroraConfig>) -> Self {
        Self { repo, fuser, config }
    }

    /// Evolve and persist a new active weight vector for `ticker` when the
    /// observed win rate sits under the floor. Failures log and leave the
    /// current weights untouched.
    pub async fn maybe_evolve(&self, ticker: &str, current_win_rate: f64) {
        let floor = self.config.signals.win_rate_floor;
        if current_win_rate >= floor {
            return;
        }
        info!(
            ticker,
            win_rate = current_win_rate,
            floor,
            "win rate under floor, retraining weights"
        );
        if let Err(e) = self.evolve_and_store(ticker, current_win_rate).await {
            warn!(ticker, error = %e, "evolution failed, keeping current weights");
        }
    }

    async fn evolve_and_store(&self, ticker: &str, current_win_rate: f64) -> Result<()> {
        let history = self.repo.outcomes_joined(Some(ticker), None).await?;
        let stats = OutcomeStats::from_history(&history);

        let evolution = Evolution::new(self.config.ga.clone());
        let alpha = evolution.evolve(&stats, &mut rand::thread_rng());

        let reason = format!(
            "win rate {:.2} under floor {:.2} across {} graded outcomes",
            current_win_rate,
            self.config.signals.win_rate_floor,
            stats.graded
        );
        self.repo
            .upsert_active_weights(ticker, &alpha, current_win_rate, &reason)
            .await?;
        self.fuser.invalidate(ticker).await;

        info!(ticker, "activated evolved weights");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn settings() -> GaSettings {
        GaSettings::default()
    }

    #[test]
    fn test_crossover_keeps_components_normalized() {
        let evolution = Evolution::new(settings());
        let mut rng = StdRng::seed_from_u64(7);
        let a = evolution.random_genes(&mut rng);
        let b = evolution.random_genes(&mut rng);
        for _ in 0..50 {
            let child = evolution.crossover(&a, &b, &mut rng);
            assert!((child.component_sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_mutation_respects_bounds_and_normalization() {
        let evolution = Evolution::new(GaSettings {
            mutation_rate: 1.0,
            ..settings()
        });
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let mut genes = evolution.random_genes(&mut rng);
            evolution.mutate(&mut genes, &mut rng);
            assert!((genes.component_sum() - 1.0).abs() < 1e-9);
            assert!((MIN_CONFIDENCE_BOUNDS.0..=MIN_CONFIDENCE_BOUNDS.1)
                .contains(&genes.min_confidence));
            assert!((ORB_BREAKOUT_BOUNDS.0..=ORB_BREAKOUT_BOUNDS.1)
                .contains(&genes.orb_breakout_mult));
            assert!((STOP_LOSS_BOUNDS.0..=STOP_LOSS_BOUNDS.1).contains(&genes.stop_loss_mult));
            assert!((TARGET_BOUNDS.0..=TARGET_BOUNDS.1).contains(&genes.target_mult));
        }
    }

    #[test]
    fn test_empty_history_scores_half() {
        let evolution = Evolution::new(settings());
        let stats = OutcomeStats::default();
        assert_eq!(evolution.evaluate(&Weights::default(), &stats), 0.5);
    }

    #[test]
    fn test_fitness_rewards_wins_and_positive_pnl() {
        let evolution = Evolution::new(settings());
        let losing = OutcomeStats {
            graded: 10,
            wins: 3,
            avg_pnl: -0.4,
        };
        let winning = OutcomeStats {
            graded: 10,
            wins: 7,
            avg_pnl: 0.6,
        };
        let w = Weights::default();
        let low = evolution.evaluate(&w, &losing);
        let high = evolution.evaluate(&w, &winning);
        assert!((low - 0.21).abs() < 1e-9);
        assert!((high - 0.79).abs() < 1e-9);
    }

    #[test]
    fn test_evolve_returns_valid_alpha() {
        let evolution = Evolution::new(settings());
        let mut rng = StdRng::seed_from_u64(42);
        let stats = OutcomeStats {
            graded: 20,
            wins: 6,
            avg_pnl: -0.1,
        };
        let alpha = evolution.evolve(&stats, &mut rng);
        assert!((alpha.component_sum() - 1.0).abs() < 1e-9);
        assert!(alpha.validate().is_ok());
    }
}
