//! Optional TOML configuration file.
//!
//! Every field is optional; only the keys present override the defaults.

use crate::domain::market::regime_profile::RegimeProfile;
use crate::domain::trading::signal::SignalThresholds;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub pairs: Option<Vec<String>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub random_seed: Option<u64>,
    pub log_level: Option<String>,
    pub monte_carlo: Option<MonteCarloSection>,
    pub short: Option<ProfileOverrides>,
    pub medium: Option<ProfileOverrides>,
    pub long: Option<ProfileOverrides>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonteCarloSection {
    pub simulations: Option<usize>,
    pub seed: Option<u64>,
}

/// Per-regime overrides of a `RegimeProfile`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileOverrides {
    pub window_len: Option<usize>,
    pub normalization_lookback: Option<usize>,
    pub hidden_units: Option<usize>,
    pub epochs: Option<usize>,
    pub learning_rate: Option<f64>,
    pub batch_size: Option<usize>,
    pub conv_filters: Option<usize>,
    pub conv_kernel: Option<usize>,
    pub buy_above: Option<f64>,
    pub sell_below: Option<f64>,
    pub price_band: Option<f64>,
}

impl ProfileOverrides {
    pub fn apply(&self, profile: &mut RegimeProfile) -> anyhow::Result<()> {
        if let Some(v) = self.window_len {
            profile.window_len = v;
        }
        if let Some(v) = self.normalization_lookback {
            profile.normalization_lookback = v;
        }
        if let Some(v) = self.hidden_units {
            profile.hidden_units = v;
        }
        if let Some(v) = self.epochs {
            profile.epochs = v;
        }
        if let Some(v) = self.learning_rate {
            profile.learning_rate = v;
        }
        if let Some(v) = self.batch_size {
            profile.batch_size = v;
        }
        if let Some(v) = self.conv_filters {
            profile.conv_filters = v;
        }
        if let Some(v) = self.conv_kernel {
            profile.conv_kernel = v;
        }

        match &mut profile.thresholds {
            SignalThresholds::Probability {
                buy_above,
                sell_below,
            } => {
                if self.price_band.is_some() {
                    anyhow::bail!(
                        "price_band does not apply to the {} regime; use buy_above/sell_below",
                        profile.regime
                    );
                }
                if let Some(v) = self.buy_above {
                    *buy_above = v;
                }
                if let Some(v) = self.sell_below {
                    *sell_below = v;
                }
            }
            SignalThresholds::PriceBand { band } => {
                if self.buy_above.is_some() || self.sell_below.is_some() {
                    anyhow::bail!(
                        "buy_above/sell_below do not apply to the {} regime; use price_band",
                        profile.regime
                    );
                }
                if let Some(v) = self.price_band {
                    *band = v;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::timeframe::Regime;

    #[test]
    fn test_parse_partial_file() {
        let file: FileConfig = toml::from_str(
            r#"
            pairs = ["EURUSD"]
            start_date = "2022-06-01"

            [monte_carlo]
            simulations = 500

            [medium]
            epochs = 5
            buy_above = 0.75
            "#,
        )
        .unwrap();
        assert_eq!(file.pairs.as_deref(), Some(&["EURUSD".to_string()][..]));
        assert_eq!(file.start_date, NaiveDate::from_ymd_opt(2022, 6, 1));
        assert_eq!(file.monte_carlo.unwrap().simulations, Some(500));

        let mut profile = RegimeProfile::for_regime(Regime::Medium);
        file.medium.unwrap().apply(&mut profile).unwrap();
        assert_eq!(profile.epochs, 5);
        assert_eq!(
            profile.thresholds,
            SignalThresholds::Probability {
                buy_above: 0.75,
                sell_below: 0.3
            }
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<FileConfig>("colour = \"blue\"").is_err());
    }

    #[test]
    fn test_mismatched_threshold_kind_rejected() {
        let overrides = ProfileOverrides {
            price_band: Some(0.05),
            ..ProfileOverrides::default()
        };
        let mut profile = RegimeProfile::for_regime(Regime::Short);
        assert!(overrides.apply(&mut profile).is_err());

        let mut long = RegimeProfile::for_regime(Regime::Long);
        overrides.apply(&mut long).unwrap();
        assert_eq!(long.thresholds, SignalThresholds::PriceBand { band: 0.05 });
    }
}
