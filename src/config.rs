pub mod file_config;

use crate::domain::market::regime_profile::RegimeProfile;
use crate::domain::market::timeframe::{Granularity, Regime};
use crate::domain::risk::monte_carlo::{DEFAULT_SIMULATIONS, RiskSimulator};
use crate::domain::trading::signal::SignalPolicy;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use file_config::FileConfig;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_PAIRS: [&str; 6] = ["EURUSD", "USDJPY", "GBPUSD", "AUDUSD", "USDCHF", "XAUUSD"];
pub const DEFAULT_SEED: u64 = 42;

/// Process-wide settings, built once at startup and passed by reference.
///
/// Layering: defaults, then an optional TOML file, then `FXTREND_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub pairs: Vec<String>,
    pub default_start: NaiveDate,
    pub default_end: NaiveDate,
    pub random_seed: u64,
    pub log_level: String,
    pub monte_carlo_simulations: usize,
    /// Unseeded (OS entropy) when `None`
    pub simulation_seed: Option<u64>,
    pub short: RegimeProfile,
    pub medium: RegimeProfile,
    pub long: RegimeProfile,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            pairs: DEFAULT_PAIRS.iter().map(|s| s.to_string()).collect(),
            default_start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or(NaiveDate::MIN),
            default_end: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or(NaiveDate::MAX),
            random_seed: DEFAULT_SEED,
            log_level: "info".to_string(),
            monte_carlo_simulations: DEFAULT_SIMULATIONS,
            simulation_seed: None,
            short: RegimeProfile::for_regime(Regime::Short),
            medium: RegimeProfile::for_regime(Regime::Medium),
            long: RegimeProfile::for_regime(Regime::Long),
        }
    }
}

impl AppConfig {
    /// Defaults, optional TOML file, then the environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = config_file {
            config.apply_toml_file(path)?;
        }
        config.apply_lookup(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_lookup(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("FXTREND_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(pairs) = lookup("FXTREND_PAIRS") {
            self.pairs = parse_pairs(&pairs);
        }
        if let Some(start) = lookup("FXTREND_START_DATE") {
            self.default_start =
                parse_date(&start).context("Failed to parse FXTREND_START_DATE")?;
        }
        if let Some(end) = lookup("FXTREND_END_DATE") {
            self.default_end = parse_date(&end).context("Failed to parse FXTREND_END_DATE")?;
        }
        if let Some(seed) = lookup("FXTREND_SEED") {
            self.random_seed = seed
                .trim()
                .parse::<u64>()
                .context("Failed to parse FXTREND_SEED")?;
        }
        if let Some(level) = lookup("FXTREND_LOG_LEVEL") {
            self.log_level = level.trim().to_string();
        }
        if let Some(n) = lookup("FXTREND_MC_SIMULATIONS") {
            self.monte_carlo_simulations = n
                .trim()
                .parse::<usize>()
                .context("Failed to parse FXTREND_MC_SIMULATIONS")?;
        }
        if let Some(seed) = lookup("FXTREND_MC_SEED") {
            self.simulation_seed = Some(
                seed.trim()
                    .parse::<u64>()
                    .context("Failed to parse FXTREND_MC_SEED")?,
            );
        }
        Ok(())
    }

    pub fn apply_toml_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        self.apply_toml_str(&content)
            .with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn apply_toml_str(&mut self, content: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(content).context("Failed to parse TOML config")?;

        if let Some(dir) = file.data_dir {
            self.data_dir = dir;
        }
        if let Some(pairs) = file.pairs {
            self.pairs = pairs.iter().map(|p| p.trim().to_uppercase()).collect();
        }
        if let Some(start) = file.start_date {
            self.default_start = start;
        }
        if let Some(end) = file.end_date {
            self.default_end = end;
        }
        if let Some(seed) = file.random_seed {
            self.random_seed = seed;
        }
        if let Some(level) = file.log_level {
            self.log_level = level;
        }
        if let Some(mc) = file.monte_carlo {
            if let Some(n) = mc.simulations {
                self.monte_carlo_simulations = n;
            }
            if mc.seed.is_some() {
                self.simulation_seed = mc.seed;
            }
        }
        if let Some(overrides) = file.short {
            overrides.apply(&mut self.short).context("[short]")?;
        }
        if let Some(overrides) = file.medium {
            overrides.apply(&mut self.medium).context("[medium]")?;
        }
        if let Some(overrides) = file.long {
            overrides.apply(&mut self.long).context("[long]")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pairs.is_empty() {
            anyhow::bail!("At least one currency pair must be configured");
        }
        if self.default_start > self.default_end {
            anyhow::bail!(
                "Start date {} is after end date {}",
                self.default_start,
                self.default_end
            );
        }
        if self.monte_carlo_simulations == 0 {
            anyhow::bail!("Monte Carlo simulation count must be positive");
        }
        for regime in Regime::all() {
            self.profile(regime)
                .validate()
                .with_context(|| format!("Invalid {} regime profile", regime))?;
        }
        Ok(())
    }

    pub fn profile(&self, regime: Regime) -> &RegimeProfile {
        match regime {
            Regime::Short => &self.short,
            Regime::Medium => &self.medium,
            Regime::Long => &self.long,
        }
    }

    /// Granularities served by a regime
    pub fn granularities(&self, regime: Regime) -> Vec<Granularity> {
        Granularity::all()
            .into_iter()
            .filter(|g| g.regime() == regime)
            .collect()
    }

    pub fn is_known_pair(&self, symbol: &str) -> bool {
        self.pairs.iter().any(|p| p.eq_ignore_ascii_case(symbol))
    }

    /// Normalises `symbol` and checks it against the configured pairs.
    /// Unknown pairs fail unless `allow_unknown` is set, in which case they
    /// only warn.
    pub fn select_pair(&self, symbol: &str, allow_unknown: bool) -> Result<String> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            anyhow::bail!("Symbol must not be empty");
        }
        if !self.is_known_pair(&symbol) {
            if !allow_unknown {
                anyhow::bail!(
                    "Unknown pair {}. Configured pairs: {}",
                    symbol,
                    self.pairs.join(", ")
                );
            }
            warn!("{} is not in the configured pairs {:?}", symbol, self.pairs);
        }
        Ok(symbol)
    }

    pub fn signal_policy(&self) -> SignalPolicy {
        SignalPolicy::new(
            self.short.thresholds,
            self.medium.thresholds,
            self.long.thresholds,
        )
    }

    pub fn risk_simulator(&self) -> RiskSimulator {
        let simulator = RiskSimulator::new(self.monte_carlo_simulations);
        match self.simulation_seed {
            Some(seed) => simulator.with_seed(seed),
            None => simulator,
        }
    }
}

fn parse_pairs(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::from_str(raw.trim()).with_context(|| format!("Expected YYYY-MM-DD, got {:?}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::signal::SignalThresholds;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.pairs.len(), 6);
        assert_eq!(config.random_seed, 42);
        assert_eq!(config.monte_carlo_simulations, 1000);
        assert!(config.simulation_seed.is_none());
        assert_eq!(config.default_start, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(config.profile(Regime::Long).window_len, 50);
        assert_eq!(config.signal_policy(), SignalPolicy::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("FXTREND_PAIRS", "eurusd, gbpusd,"),
            ("FXTREND_SEED", "7"),
            ("FXTREND_MC_SIMULATIONS", "250"),
            ("FXTREND_MC_SEED", "99"),
            ("FXTREND_START_DATE", "2022-01-01"),
        ]))
        .unwrap();
        assert_eq!(config.pairs, vec!["EURUSD", "GBPUSD"]);
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.monte_carlo_simulations, 250);
        assert_eq!(config.simulation_seed, Some(99));
        assert!(config.is_known_pair("gbpusd"));
        assert!(!config.is_known_pair("USDJPY"));
    }

    #[test]
    fn test_bad_env_value_is_error() {
        let err = AppConfig::from_lookup(lookup_from(&[("FXTREND_SEED", "abc")])).unwrap_err();
        assert!(err.to_string().contains("FXTREND_SEED"));

        assert!(AppConfig::from_lookup(lookup_from(&[("FXTREND_MC_SIMULATIONS", "0")])).is_err());
        assert!(
            AppConfig::from_lookup(lookup_from(&[
                ("FXTREND_START_DATE", "2024-01-01"),
                ("FXTREND_END_DATE", "2023-01-01"),
            ]))
            .is_err()
        );
    }

    #[test]
    fn test_toml_overrides_profiles_and_policy() {
        let mut config = AppConfig::default();
        config
            .apply_toml_str(
                r#"
                pairs = ["usdjpy"]

                [short]
                hidden_units = 8
                buy_above = 0.9

                [long]
                price_band = 0.01
                "#,
            )
            .unwrap();
        config.validate().unwrap();

        assert_eq!(config.pairs, vec!["USDJPY"]);
        assert_eq!(config.short.hidden_units, 8);
        let policy = config.signal_policy();
        assert_eq!(
            *policy.thresholds(Regime::Short),
            SignalThresholds::Probability {
                buy_above: 0.9,
                sell_below: 0.2
            }
        );
        assert_eq!(
            *policy.thresholds(Regime::Long),
            SignalThresholds::PriceBand { band: 0.01 }
        );
    }

    #[test]
    fn test_invalid_profile_fails_validation() {
        let mut config = AppConfig::default();
        config.apply_toml_str("[medium]\nepochs = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fxtrend.toml");
        fs::write(&path, "random_seed = 11\n[monte_carlo]\nseed = 3\n").unwrap();

        let mut config = AppConfig::default();
        config.apply_toml_file(&path).unwrap();
        assert_eq!(config.random_seed, 11);
        assert_eq!(config.risk_simulator().simulations(), 1000);
        assert_eq!(config.simulation_seed, Some(3));

        assert!(config.apply_toml_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_select_pair_rejects_unknown_symbols() {
        let config = AppConfig::default();
        assert_eq!(config.select_pair(" eurusd ", false).unwrap(), "EURUSD");

        let err = config.select_pair("BTCUSD", false).unwrap_err();
        assert!(err.to_string().contains("BTCUSD"));
        assert!(config.select_pair("", true).is_err());

        assert_eq!(config.select_pair("btcusd", true).unwrap(), "BTCUSD");
    }

    #[test]
    fn test_granularity_table() {
        let config = AppConfig::default();
        assert_eq!(
            config.granularities(Regime::Short),
            vec![Granularity::M1, Granularity::M5, Granularity::M15, Granularity::M30]
        );
        assert_eq!(config.granularities(Regime::Medium), vec![Granularity::H1]);
        assert_eq!(
            config.granularities(Regime::Long),
            vec![Granularity::D1, Granularity::W1]
        );
    }
}
