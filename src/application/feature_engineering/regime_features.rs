use super::indicators::{Indicator, IndicatorSpec, RollingNormalizer};
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::market::candle::{Candle, MacroObservation};
use crate::domain::market::processed_table::ProcessedTable;
use crate::domain::market::regime_profile::RegimeProfile;
use crate::domain::market::timeframe::{Regime, TargetKind};
use crate::domain::ml::window::WindowBatch;
use tracing::debug;

pub const INTEREST_RATE: &str = "interest_rate";
pub const INTEREST_DIFF: &str = "interest_diff";
pub const TREND: &str = "trend";

const RAW_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Processed table plus the per-row target. The target of the newest row is
/// unknown (`None`) because it depends on the next bar.
#[derive(Debug, Clone)]
pub struct EngineeredFeatures {
    pub table: ProcessedTable,
    pub targets: Vec<Option<f64>>,
}

/// Windowed view of an engineered table
#[derive(Debug, Clone)]
pub struct Sequences {
    /// Every window whose last row has a known target
    pub windows: WindowBatch,
    pub targets: Vec<f64>,
    /// The final `window_len` rows, ending on the newest bar
    pub latest: WindowBatch,
}

/// Where a normalised column takes its raw value from
#[derive(Debug, Clone, Copy)]
enum Source {
    Raw(usize),
    Indicator(usize),
}

/// Builds the indicator and normalised columns of one regime.
///
/// short:  EMA 3/8, RSI 5; normalises OHLC
/// medium: MA 5/20, RSI 14, ATR 14; normalises OHLCV and ATR 14
/// long:   MA 50/200, RSI 20, trend flag, optional macro; normalises OHLCV, both MAs, RSI 20
#[derive(Debug, Clone)]
pub struct RegimeFeatureEngineer {
    profile: RegimeProfile,
}

impl RegimeFeatureEngineer {
    pub fn new(profile: RegimeProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &RegimeProfile {
        &self.profile
    }

    fn indicator_specs(&self) -> Vec<IndicatorSpec> {
        match self.profile.regime {
            Regime::Short => vec![
                IndicatorSpec::Ema(3),
                IndicatorSpec::Ema(8),
                IndicatorSpec::Rsi(5),
            ],
            Regime::Medium => vec![
                IndicatorSpec::Sma(5),
                IndicatorSpec::Sma(20),
                IndicatorSpec::Rsi(14),
                IndicatorSpec::Atr(14),
            ],
            Regime::Long => vec![
                IndicatorSpec::Sma(50),
                IndicatorSpec::Sma(200),
                IndicatorSpec::Rsi(20),
            ],
        }
    }

    /// Maps each `norm_*` feature to its source column.
    fn normalized_sources(&self, specs: &[IndicatorSpec]) -> PipelineResult<Vec<Source>> {
        let indicator_names: Vec<String> = specs.iter().map(IndicatorSpec::column_name).collect();
        self.profile
            .feature_names()
            .iter()
            .map(|&feature| {
                let base = feature.strip_prefix("norm_").unwrap_or(feature);
                if let Some(i) = RAW_COLUMNS.iter().position(|c| *c == base) {
                    Ok(Source::Raw(i))
                } else if let Some(i) = indicator_names.iter().position(|c| c == base) {
                    Ok(Source::Indicator(i))
                } else {
                    Err(PipelineError::invalid_shape(
                        format!("a source column for '{}'", feature),
                        format!("indicators {:?}", indicator_names),
                    ))
                }
            })
            .collect()
    }

    /// Computes indicators, macro columns and normalised features. Only rows
    /// where every column is defined are kept.
    pub fn add_features(
        &self,
        candles: &[Candle],
        macro_series: Option<&[MacroObservation]>,
    ) -> PipelineResult<EngineeredFeatures> {
        let specs = self.indicator_specs();
        let sources = self.normalized_sources(&specs)?;
        let with_macro = self.profile.regime.uses_macro_data() && macro_series.is_some();
        let with_trend = self.profile.regime == Regime::Long;

        let mut columns: Vec<String> = RAW_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(specs.iter().map(IndicatorSpec::column_name));
        if with_trend {
            columns.push(TREND.to_string());
        }
        if with_macro {
            columns.push(INTEREST_RATE.to_string());
            columns.push(INTEREST_DIFF.to_string());
        }
        columns.extend(self.profile.feature_names().iter().map(|c| c.to_string()));

        let mut indicators = specs
            .iter()
            .map(|spec| Indicator::new(*spec))
            .collect::<PipelineResult<Vec<_>>>()?;
        let mut normalizers = sources
            .iter()
            .map(|_| RollingNormalizer::new(self.profile.normalization_lookback))
            .collect::<PipelineResult<Vec<_>>>()?;

        let mut macro_cursor = MacroCursor::new(macro_series.filter(|_| with_macro));
        let mut table = ProcessedTable::new(columns);
        let mut targets = Vec::new();
        let target_kind = self.profile.target_kind();

        for (i, candle) in candles.iter().enumerate() {
            if !candle.is_finite() {
                return Err(PipelineError::invalid_input(format!(
                    "bar at {} contains non-finite values",
                    candle.timestamp
                )));
            }

            let raw = [
                candle.open,
                candle.high,
                candle.low,
                candle.close,
                candle.volume,
            ];
            let indicator_values: Vec<Option<f64>> =
                indicators.iter_mut().map(|ind| ind.next(candle)).collect();

            let normalized: Vec<Option<f64>> = sources
                .iter()
                .zip(normalizers.iter_mut())
                .map(|(source, norm)| {
                    let value = match source {
                        Source::Raw(idx) => Some(raw[*idx]),
                        Source::Indicator(idx) => indicator_values[*idx],
                    };
                    value.and_then(|v| norm.next(v))
                })
                .collect();

            let (rate, diff) = macro_cursor.advance(candle.timestamp);

            let mut row: Vec<f64> = raw.to_vec();
            let mut complete = true;
            for value in &indicator_values {
                complete &= value.is_some();
                row.push(value.unwrap_or(f64::NAN));
            }
            if with_trend {
                // MA 50 above MA 200
                let trend = match (indicator_values[0], indicator_values[1]) {
                    (Some(fast), Some(slow)) => Some(if fast > slow { 1.0 } else { 0.0 }),
                    _ => None,
                };
                complete &= trend.is_some();
                row.push(trend.unwrap_or(f64::NAN));
            }
            if with_macro {
                complete &= rate.is_some() && diff.is_some();
                row.push(rate.unwrap_or(f64::NAN));
                row.push(diff.unwrap_or(f64::NAN));
            }
            for value in &normalized {
                complete &= value.is_some();
                row.push(value.unwrap_or(f64::NAN));
            }

            if !complete {
                continue;
            }

            let target = candles.get(i + 1).map(|next| match target_kind {
                TargetKind::Direction => {
                    if next.close > candle.close {
                        1.0
                    } else {
                        0.0
                    }
                }
                TargetKind::NextClose => next.close,
            });

            table.push_row(candle.timestamp, row)?;
            targets.push(target);
        }

        debug!(
            "{} features: {} of {} bars fully defined",
            self.profile.regime,
            table.len(),
            candles.len()
        );

        Ok(EngineeredFeatures { table, targets })
    }

    /// Slides a window of `window_len` rows over the regime's feature columns.
    pub fn prepare_sequences(&self, features: &EngineeredFeatures) -> PipelineResult<Sequences> {
        let window_len = self.profile.window_len;
        let rows = features.table.select(self.profile.feature_names())?;
        if rows.len() < window_len {
            return Err(PipelineError::no_data(format!(
                "{} fully defined rows, need at least {} for one window",
                rows.len(),
                window_len
            )));
        }
        if features.targets.len() != rows.len() {
            return Err(PipelineError::invalid_shape(
                format!("{} targets", rows.len()),
                format!("{} targets", features.targets.len()),
            ));
        }

        let mut windows = Vec::new();
        let mut targets = Vec::new();
        for end in window_len..=rows.len() {
            if let Some(target) = features.targets[end - 1] {
                windows.push(rows[end - window_len..end].to_vec());
                targets.push(target);
            }
        }
        let latest = vec![rows[rows.len() - window_len..].to_vec()];

        Ok(Sequences {
            windows: WindowBatch::from_windows(&windows)?,
            targets,
            latest: WindowBatch::from_windows(&latest)?,
        })
    }
}

/// Forward-fills a dated series onto bar timestamps.
struct MacroCursor<'a> {
    series: &'a [MacroObservation],
    next: usize,
    current: Option<f64>,
    previous_row: Option<f64>,
}

impl<'a> MacroCursor<'a> {
    fn new(series: Option<&'a [MacroObservation]>) -> Self {
        Self {
            series: series.unwrap_or(&[]),
            next: 0,
            current: None,
            previous_row: None,
        }
    }

    /// Value in force at `timestamp` and its change since the previous bar.
    fn advance(&mut self, timestamp: i64) -> (Option<f64>, Option<f64>) {
        while let Some(obs) = self.series.get(self.next) {
            if obs.timestamp > timestamp {
                break;
            }
            self.current = Some(obs.value);
            self.next += 1;
        }
        let diff = match (self.current, self.previous_row) {
            (Some(now), Some(before)) => Some(now - before),
            _ => None,
        };
        self.previous_row = self.current;
        (self.current, diff)
    }
}
