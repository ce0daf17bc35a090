use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::market::candle::Candle;
use ta::indicators::{
    AverageTrueRange, ExponentialMovingAverage, Maximum, Minimum, RelativeStrengthIndex,
    SimpleMovingAverage,
};
use ta::{Close, High, Low, Next, Open, Volume};

/// Added to the min/max range so flat stretches normalise to 0 instead of NaN
pub const NORMALIZATION_EPS: f64 = 1e-6;

impl Open for Candle {
    fn open(&self) -> f64 {
        self.open
    }
}

impl High for Candle {
    fn high(&self) -> f64 {
        self.high
    }
}

impl Low for Candle {
    fn low(&self) -> f64 {
        self.low
    }
}

impl Close for Candle {
    fn close(&self) -> f64 {
        self.close
    }
}

impl Volume for Candle {
    fn volume(&self) -> f64 {
        self.volume
    }
}

fn period_error(name: &'static str, e: ta::errors::TaError) -> PipelineError {
    PipelineError::InvalidParameter {
        name,
        reason: format!("{:?}", e),
    }
}

/// Indicator kinds used by the regime feature engineers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorSpec {
    Ema(usize),
    Sma(usize),
    Rsi(usize),
    Atr(usize),
}

impl IndicatorSpec {
    pub fn column_name(&self) -> String {
        match self {
            IndicatorSpec::Ema(n) => format!("ema_{}", n),
            IndicatorSpec::Sma(n) => format!("ma_{}", n),
            IndicatorSpec::Rsi(n) => format!("rsi_{}", n),
            IndicatorSpec::Atr(n) => format!("atr_{}", n),
        }
    }

    /// Bars consumed before the indicator reports a value
    pub fn warm_up(&self) -> usize {
        match self {
            // exponential average is defined from the first bar
            IndicatorSpec::Ema(_) => 1,
            IndicatorSpec::Sma(n) | IndicatorSpec::Atr(n) => *n,
            // needs n close-to-close changes
            IndicatorSpec::Rsi(n) => n + 1,
        }
    }
}

enum Kernel {
    Ema(ExponentialMovingAverage),
    Sma(SimpleMovingAverage),
    Rsi(RelativeStrengthIndex),
    Atr(AverageTrueRange),
}

/// A `ta` indicator that yields `None` until its warm-up period has passed.
pub struct Indicator {
    spec: IndicatorSpec,
    kernel: Kernel,
    seen: usize,
}

impl Indicator {
    pub fn new(spec: IndicatorSpec) -> PipelineResult<Self> {
        let kernel = match spec {
            IndicatorSpec::Ema(n) => Kernel::Ema(
                ExponentialMovingAverage::new(n).map_err(|e| period_error("ema_period", e))?,
            ),
            IndicatorSpec::Sma(n) => Kernel::Sma(
                SimpleMovingAverage::new(n).map_err(|e| period_error("sma_period", e))?,
            ),
            IndicatorSpec::Rsi(n) => Kernel::Rsi(
                RelativeStrengthIndex::new(n).map_err(|e| period_error("rsi_period", e))?,
            ),
            IndicatorSpec::Atr(n) => Kernel::Atr(
                AverageTrueRange::new(n).map_err(|e| period_error("atr_period", e))?,
            ),
        };
        Ok(Self {
            spec,
            kernel,
            seen: 0,
        })
    }

    pub fn spec(&self) -> IndicatorSpec {
        self.spec
    }

    pub fn next(&mut self, candle: &Candle) -> Option<f64> {
        let value = match &mut self.kernel {
            Kernel::Ema(ema) => ema.next(candle.close),
            Kernel::Sma(sma) => sma.next(candle.close),
            Kernel::Rsi(rsi) => rsi.next(candle.close),
            Kernel::Atr(atr) => atr.next(candle),
        };
        self.seen += 1;
        (self.seen >= self.spec.warm_up() && value.is_finite()).then_some(value)
    }
}

/// Rolling min-max scaling: `(x - min) / (max - min + eps)` over the last
/// `lookback` observations, including the current one.
pub struct RollingNormalizer {
    lookback: usize,
    min: Minimum,
    max: Maximum,
    seen: usize,
}

impl RollingNormalizer {
    pub fn new(lookback: usize) -> PipelineResult<Self> {
        Ok(Self {
            lookback,
            min: Minimum::new(lookback).map_err(|e| period_error("normalization_lookback", e))?,
            max: Maximum::new(lookback).map_err(|e| period_error("normalization_lookback", e))?,
            seen: 0,
        })
    }

    /// Feeds one value; `None` until `lookback` values have been seen.
    pub fn next(&mut self, value: f64) -> Option<f64> {
        let lo = self.min.next(value);
        let hi = self.max.next(value);
        self.seen += 1;
        if self.seen < self.lookback {
            return None;
        }
        Some((value - lo) / (hi - lo + NORMALIZATION_EPS))
    }
}
