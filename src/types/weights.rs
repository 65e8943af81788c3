use serde::{Deserialize, Serialize};

/// Scoring weight vector for the fused confidence, plus the thresholds and
/// multipliers the engines consume. This is the genome the optimizer searches;
/// at most one row per ticker is active at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub tpo: f64,
    pub rsi: f64,
    pub ib: f64,
    pub cvd: f64,
    pub vwap: f64,
    pub min_confidence: f64,
    pub orb_breakout_mult: f64,
    pub stop_loss_mult: f64,
    pub target_mult: f64,
}

/// Inclusive bounds for one gene: `(lo, hi, mutation_step)`.
pub type GeneBounds = (f64, f64, f64);

pub const TPO_BOUNDS: GeneBounds = (0.05, 0.5, 0.05);
pub const RSI_BOUNDS: GeneBounds = (0.05, 0.4, 0.05);
pub const IB_BOUNDS: GeneBounds = (0.05, 0.4, 0.05);
pub const CVD_BOUNDS: GeneBounds = (0.05, 0.3, 0.05);
pub const VWAP_BOUNDS: GeneBounds = (0.05, 0.4, 0.05);
pub const MIN_CONFIDENCE_BOUNDS: GeneBounds = (50.0, 80.0, 5.0);
pub const ORB_BREAKOUT_BOUNDS: GeneBounds = (0.3, 3.0, 0.2);
pub const STOP_LOSS_BOUNDS: GeneBounds = (0.2, 0.8, 0.1);
pub const TARGET_BOUNDS: GeneBounds = (1.2, 4.0, 0.3);

impl Default for Weights {
    fn default() -> Self {
        Self {
            tpo: 0.30,
            rsi: 0.20,
            ib: 0.20,
            cvd: 0.10,
            vwap: 0.20,
            min_confidence: 60.0,
            orb_breakout_mult: 1.0,
            stop_loss_mult: 0.5,
            target_mult: 2.0,
        }
    }
}

impl Weights {
    pub fn component_sum(&self) -> f64 {
        self.tpo + self.rsi + self.ib + self.cvd + self.vwap
    }

    /// Renormalize the five component weights to sum to 1. Applied after any
    /// mutation or crossover; a degenerate all-zero vector falls back to the
    /// defaults.
    pub fn renormalize(&mut self) {
        let sum = self.component_sum();
        if sum <= 0.0 {
            let d = Weights::default();
            self.tpo = d.tpo;
            self.rsi = d.rsi;
            self.ib = d.ib;
            self.cvd = d.cvd;
            self.vwap = d.vwap;
            return;
        }
        self.tpo /= sum;
        self.rsi /= sum;
        self.ib /= sum;
        self.cvd /= sum;
        self.vwap /= sum;
    }

    /// Clamp every gene into its search bounds.
    pub fn clamp_to_bounds(&mut self) {
        self.tpo = self.tpo.clamp(TPO_BOUNDS.0, TPO_BOUNDS.1);
        self.rsi = self.rsi.clamp(RSI_BOUNDS.0, RSI_BOUNDS.1);
        self.ib = self.ib.clamp(IB_BOUNDS.0, IB_BOUNDS.1);
        self.cvd = self.cvd.clamp(CVD_BOUNDS.0, CVD_BOUNDS.1);
        self.vwap = self.vwap.clamp(VWAP_BOUNDS.0, VWAP_BOUNDS.1);
        self.min_confidence = self
            .min_confidence
            .clamp(MIN_CONFIDENCE_BOUNDS.0, MIN_CONFIDENCE_BOUNDS.1);
        self.orb_breakout_mult = self
            .orb_breakout_mult
            .clamp(ORB_BREAKOUT_BOUNDS.0, ORB_BREAKOUT_BOUNDS.1);
        self.stop_loss_mult = self.stop_loss_mult.clamp(STOP_LOSS_BOUNDS.0, STOP_LOSS_BOUNDS.1);
        self.target_mult = self.target_mult.clamp(TARGET_BOUNDS.0, TARGET_BOUNDS.1);
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        for (name, v) in [
            ("tpo", self.tpo),
            ("rsi", self.rsi),
            ("ib", self.ib),
            ("cvd", self.cvd),
            ("vwap", self.vwap),
        ] {
            if v < 0.0 {
                errors.push(format!("{name} weight must be non-negative"));
            }
        }
        if (self.component_sum() - 1.0).abs() > 1e-6 {
            errors.push("component weights must sum to 1".to_string());
        }
        if !(MIN_CONFIDENCE_BOUNDS.0..=MIN_CONFIDENCE_BOUNDS.1).contains(&self.min_confidence) {
            errors.push("min_confidence must be within [50, 80]".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_are_valid() {
        let w = Weights::default();
        assert!(w.validate().is_ok());
        assert!((w.component_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_renormalize_restores_unit_sum() {
        let mut w = Weights {
            tpo: 0.5,
            rsi: 0.4,
            ib: 0.4,
            cvd: 0.3,
            vwap: 0.4,
            ..Weights::default()
        };
        w.renormalize();
        assert!((w.component_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_renormalize_degenerate_falls_back_to_defaults() {
        let mut w = Weights {
            tpo: 0.0,
            rsi: 0.0,
            ib: 0.0,
            cvd: 0.0,
            vwap: 0.0,
            ..Weights::default()
        };
        w.renormalize();
        assert_eq!(w.tpo, Weights::default().tpo);
        assert!((w.component_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamp_pins_out_of_range_genes() {
        let mut w = Weights {
            min_confidence: 95.0,
            target_mult: 9.0,
            stop_loss_mult: 0.01,
            ..Weights::default()
        };
        w.clamp_to_bounds();
        assert_eq!(w.min_confidence, 80.0);
        assert_eq!(w.target_mult, 4.0);
        assert_eq!(w.stop_loss_mult, 0.2);
    }
}
