use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Underliers the scheduler tracks. Phase 1 runs a single primary underlier;
/// the Friday set only joins on Fridays (0DTE expirations across the board).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerSettings {
    pub primary: String,
    pub friday: Vec<String>,
}

impl Default for TickerSettings {
    fn default() -> Self {
        Self {
            primary: "SPY".to_string(),
            friday: vec!["QQQ".to_string(), "IWM".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSettings {
    /// TPO histogram bin size.
    pub tick_size: f64,
    pub value_area_fraction: f64,
    pub ib_duration_minutes: usize,
    pub orb_duration_minutes: usize,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            tick_size: 0.25,
            value_area_fraction: 0.70,
            ib_duration_minutes: 60,
            orb_duration_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSettings {
    pub confidence_floor: f64,
    pub win_rate_floor: f64,
    pub rolling_window_days: i64,
    pub degradation_alert_threshold: f64,
    pub min_graded_for_alert: usize,
    pub weights_cache_ttl_secs: u64,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            confidence_floor: 60.0,
            win_rate_floor: 0.60,
            rolling_window_days: 7,
            degradation_alert_threshold: 0.10,
            min_graded_for_alert: 10,
            weights_cache_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaSettings {
    pub population_size: usize,
    pub elite_count: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub generations: usize,
}

impl Default for GaSettings {
    fn default() -> Self {
        Self {
            population_size: 50,
            elite_count: 5,
            mutation_rate: 0.15,
            crossover_rate: 0.7,
            generations: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSettings {
    /// Premium-fallback stop: fraction of the mid lost at the stop.
    pub stop_loss_pct: f64,
    /// Premium-fallback target: multiple of the mid.
    pub target_multiple: f64,
    /// Stock-level stop distance when ATR is unavailable.
    pub atr_fallback: f64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.5,
            target_multiple: 2.0,
            atr_fallback: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub tick_secs: u64,
    /// Grader cadence in ticks: 2 ticks of 30 s puts reconcile on the minute.
    pub grade_every_ticks: u64,
    pub feed_timeout_secs: u64,
    /// How many trailing intraday candles get persisted per tick.
    pub candle_tail: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_secs: 30,
            grade_every_ticks: 2,
            feed_timeout_secs: 10,
            candle_tail: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorSettings {
    pub api_base: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuroraConfig {
    pub tickers: TickerSettings,
    pub market: MarketSettings,
    pub signals: SignalSettings,
    pub ga: GaSettings,
    pub risk: RiskSettings,
    pub scheduler: SchedulerSettings,
    pub vendor: VendorSettings,
    pub database_url: String,
}

impl Default for AuroraConfig {
    fn default() -> Self {
        Self {
            tickers: TickerSettings::default(),
            market: MarketSettings::default(),
            signals: SignalSettings::default(),
            ga: GaSettings::default(),
            risk: RiskSettings::default(),
            scheduler: SchedulerSettings::default(),
            vendor: VendorSettings::default(),
            database_url: "sqlite:./aurora.db".to_string(),
        }
    }
}

impl AuroraConfig {
    /// Layer an optional TOML file under `AURORA_`-prefixed environment
    /// variables (`AURORA_VENDOR__TOKEN`, `AURORA_DATABASE_URL`, ...).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&AuroraConfig::default())
                .context("serializing default configuration")?,
        );
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("AURORA").separator("__"))
            .build()
            .context("building configuration")?;
        let cfg: AuroraConfig = settings
            .try_deserialize()
            .context("deserializing configuration")?;
        cfg.validate().map_err(|errors| {
            anyhow::anyhow!("invalid configuration: {}", errors.join(", "))
        })?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.market.tick_size <= 0.0 {
            errors.push("market.tick_size must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.market.value_area_fraction) {
            errors.push("market.value_area_fraction must be within (0, 1]".to_string());
        }
        if self.market.ib_duration_minutes == 0 {
            errors.push("market.ib_duration_minutes must be > 0".to_string());
        }
        if self.market.orb_duration_minutes == 0 {
            errors.push("market.orb_duration_minutes must be > 0".to_string());
        }
        if !(0.0..=100.0).contains(&self.signals.confidence_floor) {
            errors.push("signals.confidence_floor must be within [0, 100]".to_string());
        }
        if !(0.0..=1.0).contains(&self.signals.win_rate_floor) {
            errors.push("signals.win_rate_floor must be within [0, 1]".to_string());
        }
        if self.ga.population_size == 0 {
            errors.push("ga.population_size must be > 0".to_string());
        }
        if self.ga.elite_count >= self.ga.population_size {
            errors.push("ga.elite_count must be < ga.population_size".to_string());
        }
        if !(0.0..=1.0).contains(&self.ga.mutation_rate) {
            errors.push("ga.mutation_rate must be within [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.ga.crossover_rate) {
            errors.push("ga.crossover_rate must be within [0, 1]".to_string());
        }
        if !(0.0..1.0).contains(&self.risk.stop_loss_pct) {
            errors.push("risk.stop_loss_pct must be within [0, 1)".to_string());
        }
        if self.risk.target_multiple < 1.0 {
            errors.push("risk.target_multiple must be >= 1".to_string());
        }
        if self.scheduler.tick_secs == 0 {
            errors.push("scheduler.tick_secs must be > 0".to_string());
        }
        if self.tickers.primary.is_empty() {
            errors.push("tickers.primary must be set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Vendor credentials are a hard requirement for the daemon; the
    /// scheduler refuses to start without them.
    pub fn has_vendor_credentials(&self) -> bool {
        !self.vendor.api_base.is_empty() && !self.vendor.token.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AuroraConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.market.tick_size, 0.25);
        assert_eq!(cfg.signals.confidence_floor, 60.0);
        assert_eq!(cfg.ga.population_size, 50);
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut cfg = AuroraConfig::default();
        cfg.market.tick_size = 0.0;
        cfg.ga.elite_count = 99;
        cfg.signals.win_rate_floor = 2.0;
        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_credentials_gate() {
        let mut cfg = AuroraConfig::default();
        assert!(!cfg.has_vendor_credentials());
        cfg.vendor.api_base = "https://vendor.example".to_string();
        cfg.vendor.token = "tok".to_string();
        assert!(cfg.has_vendor_credentials());
    }
}
