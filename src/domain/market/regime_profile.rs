use crate::domain::market::timeframe::{Regime, TargetKind};
use crate::domain::ml::feature_registry;
use crate::domain::ml::model_kind::{ArchitectureHint, OutputRange, RefinerMode};
use crate::domain::risk::monte_carlo::DriftMode;
use crate::domain::trading::signal::SignalThresholds;
use serde::{Deserialize, Serialize};

/// Per-regime pipeline parameters.
///
/// Window length, architecture and training knobs are values here rather than
/// separate model types: one sequence model and one refiner are parameterised
/// by the profile of the regime they serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeProfile {
    pub regime: Regime,
    /// Rows per feature window (L)
    pub window_len: usize,
    /// Rolling min/max lookback used to normalise raw columns
    pub normalization_lookback: usize,
    pub architecture: ArchitectureHint,
    pub hidden_units: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Only read for `ArchitectureHint::ConvRecurrent`
    pub conv_filters: usize,
    pub conv_kernel: usize,
    pub thresholds: SignalThresholds,
}

impl RegimeProfile {
    pub fn for_regime(regime: Regime) -> Self {
        let thresholds = SignalThresholds::for_regime(regime);
        match regime {
            Regime::Short => Self {
                regime,
                window_len: 10,
                normalization_lookback: 10,
                architecture: ArchitectureHint::Recurrent,
                hidden_units: 50,
                epochs: 20,
                learning_rate: 0.01,
                batch_size: 64,
                conv_filters: 0,
                conv_kernel: 0,
                thresholds,
            },
            Regime::Medium => Self {
                regime,
                window_len: 20,
                normalization_lookback: 20,
                architecture: ArchitectureHint::ConvRecurrent,
                hidden_units: 100,
                epochs: 50,
                learning_rate: 0.001,
                batch_size: 32,
                conv_filters: 64,
                conv_kernel: 2,
                thresholds,
            },
            Regime::Long => Self {
                regime,
                window_len: 50,
                normalization_lookback: 50,
                architecture: ArchitectureHint::Recurrent,
                hidden_units: 150,
                epochs: 30,
                learning_rate: 0.0005,
                batch_size: 16,
                conv_filters: 0,
                conv_kernel: 0,
                thresholds,
            },
        }
    }

    /// Feature width (F), fixed by the registry
    pub fn n_features(&self) -> usize {
        feature_registry::feature_count(self.regime)
    }

    pub fn feature_names(&self) -> &'static [&'static str] {
        feature_registry::feature_names(self.regime)
    }

    pub fn target_kind(&self) -> TargetKind {
        self.regime.target_kind()
    }

    pub fn output_range(&self) -> OutputRange {
        match self.target_kind() {
            TargetKind::Direction => OutputRange::Probability,
            TargetKind::NextClose => OutputRange::Unbounded,
        }
    }

    pub fn refiner_mode(&self) -> RefinerMode {
        match self.target_kind() {
            TargetKind::Direction => RefinerMode::Classifier,
            TargetKind::NextClose => RefinerMode::Regressor,
        }
    }

    pub fn drift_mode(&self) -> DriftMode {
        DriftMode::for_regime(self.regime)
    }

    /// Rejects profiles the models cannot be built from.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_len == 0 {
            anyhow::bail!("{} profile: window_len must be > 0", self.regime);
        }
        if self.normalization_lookback == 0 {
            anyhow::bail!("{} profile: normalization_lookback must be > 0", self.regime);
        }
        if self.epochs == 0 {
            anyhow::bail!("{} profile: epochs must be > 0", self.regime);
        }
        if self.hidden_units == 0 || self.batch_size == 0 {
            anyhow::bail!(
                "{} profile: hidden_units and batch_size must be > 0",
                self.regime
            );
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            anyhow::bail!(
                "{} profile: learning_rate must be positive, got {}",
                self.regime,
                self.learning_rate
            );
        }
        if self.architecture == ArchitectureHint::ConvRecurrent
            && (self.conv_filters == 0 || self.conv_kernel == 0 || self.conv_kernel > self.window_len)
        {
            anyhow::bail!(
                "{} profile: convolution needs filters > 0 and 0 < kernel <= window_len",
                self.regime
            );
        }
        match self.thresholds {
            SignalThresholds::Probability {
                buy_above,
                sell_below,
            } if sell_below > buy_above => anyhow::bail!(
                "{} profile: sell threshold {} above buy threshold {}",
                self.regime,
                sell_below,
                buy_above
            ),
            SignalThresholds::PriceBand { band } if !(band >= 0.0) => {
                anyhow::bail!("{} profile: price band must be >= 0", self.regime)
            }
            _ => {}
        }
        Ok(())
    }
}
