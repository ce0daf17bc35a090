use crate::application::feature_engineering::regime_features::RegimeFeatureEngineer;
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::market::candle::MacroObservation;
use crate::domain::market::regime_profile::RegimeProfile;
use crate::domain::ml::dataset::{FeatureDataset, PreprocessWarning};
use crate::domain::ports::{FeatureProvider, MacroSource, PriceSource};
use tracing::{info, warn};

/// Feature Provider backed by a price source and, for the long regime, an
/// optional macro source.
pub struct EngineeredFeatureProvider {
    engineer: RegimeFeatureEngineer,
    prices: Box<dyn PriceSource>,
    macro_source: Option<Box<dyn MacroSource>>,
}

impl EngineeredFeatureProvider {
    pub fn new(profile: RegimeProfile, prices: Box<dyn PriceSource>) -> Self {
        Self {
            engineer: RegimeFeatureEngineer::new(profile),
            prices,
            macro_source: None,
        }
    }

    pub fn with_macro_source(mut self, source: Box<dyn MacroSource>) -> Self {
        self.macro_source = Some(source);
        self
    }

    pub fn profile(&self) -> &RegimeProfile {
        self.engineer.profile()
    }

    /// Loads the macro series when the regime uses one. Absence is a warning,
    /// never an error.
    fn load_macro(&self, warnings: &mut Vec<PreprocessWarning>) -> Option<Vec<MacroObservation>> {
        if !self.profile().regime.uses_macro_data() {
            return None;
        }

        let reason = match &self.macro_source {
            None => "no macro source configured".to_string(),
            Some(source) => match source.load_series() {
                Ok(series) if !series.is_empty() => return Some(series),
                Ok(_) => "macro series is empty".to_string(),
                Err(e) => e.to_string(),
            },
        };

        let warning = PreprocessWarning::MacroDataUnavailable { reason };
        warn!("{}", warning);
        warnings.push(warning);
        None
    }
}

impl FeatureProvider for EngineeredFeatureProvider {
    fn load(&self) -> PipelineResult<FeatureDataset> {
        let regime = self.profile().regime;
        let candles = self.prices.load_candles()?;
        if candles.is_empty() {
            return Err(PipelineError::no_data(format!(
                "no price data loaded for the {} regime",
                regime
            )));
        }

        let mut warnings = Vec::new();
        let macro_series = self.load_macro(&mut warnings);

        let features = self
            .engineer
            .add_features(&candles, macro_series.as_deref())?;
        if features.table.is_empty() {
            return Err(PipelineError::no_data(format!(
                "{} bars loaded but none is fully defined after feature engineering",
                candles.len()
            )));
        }

        let sequences = self.engineer.prepare_sequences(&features)?;
        if sequences.windows.is_empty() {
            return Err(PipelineError::no_data(
                "no window with a known target; need more history",
            ));
        }

        info!(
            "Prepared {} {} windows from {} bars ({} table rows)",
            sequences.windows.len(),
            regime,
            candles.len(),
            features.table.len()
        );

        Ok(FeatureDataset {
            windows: sequences.windows,
            targets: sequences.targets,
            latest: sequences.latest,
            table: features.table,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::timeframe::Regime;
    use crate::infrastructure::mock::{InMemoryMacroSource, InMemoryPriceSource, SyntheticPriceSource};

    #[test]
    fn test_empty_prices_is_no_data() {
        let provider = EngineeredFeatureProvider::new(
            RegimeProfile::for_regime(Regime::Short),
            Box::new(InMemoryPriceSource::new(Vec::new())),
        );
        assert!(matches!(provider.load(), Err(PipelineError::NoData { .. })));
    }

    #[test]
    fn test_short_history_is_no_data() {
        let provider = EngineeredFeatureProvider::new(
            RegimeProfile::for_regime(Regime::Medium),
            Box::new(SyntheticPriceSource::new(25, 1)),
        );
        assert!(matches!(provider.load(), Err(PipelineError::NoData { .. })));
    }

    #[test]
    fn test_short_dataset_shapes() {
        let provider = EngineeredFeatureProvider::new(
            RegimeProfile::for_regime(Regime::Short),
            Box::new(SyntheticPriceSource::new(200, 7)),
        );
        let dataset = provider.load().unwrap();
        assert_eq!(dataset.windows.len(), dataset.targets.len());
        assert_eq!(dataset.windows.window_len(), 10);
        assert_eq!(dataset.windows.n_features(), 4);
        assert_eq!(dataset.latest.len(), 1);
        assert!(dataset.warnings.is_empty());
    }

    #[test]
    fn test_long_without_macro_warns() {
        let provider = EngineeredFeatureProvider::new(
            RegimeProfile::for_regime(Regime::Long),
            Box::new(SyntheticPriceSource::new(400, 3)),
        )
        .with_macro_source(Box::new(InMemoryMacroSource::new(Vec::new())));
        let dataset = provider.load().unwrap();
        assert!(dataset.has_macro_warning());
        assert_eq!(dataset.windows.n_features(), 8);
    }
}
