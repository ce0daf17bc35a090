use crate::domain::errors::PipelineResult;
use crate::domain::market::candle::{Candle, MacroObservation};
use crate::domain::ml::dataset::FeatureDataset;
use crate::domain::ml::model_kind::OutputRange;
use crate::domain::ml::training::TrainingReport;
use crate::domain::ml::window::WindowBatch;

/// Source of chronologically ordered price bars
pub trait PriceSource: Send + Sync {
    fn load_candles(&self) -> PipelineResult<Vec<Candle>>;
}

/// Source of an optional macro-economic series
pub trait MacroSource: Send + Sync {
    fn load_series(&self) -> PipelineResult<Vec<MacroObservation>>;
}

/// Produces windowed features, targets and the processed table for one regime.
pub trait FeatureProvider: Send + Sync {
    fn load(&self) -> PipelineResult<FeatureDataset>;
}

/// First-stage model over feature windows.
pub trait SequenceModel: Send + Sync {
    /// Fit on `windows` with one target per window.
    fn train(&mut self, windows: &WindowBatch, targets: &[f64]) -> PipelineResult<TrainingReport>;

    /// One estimate per window, in [0, 1] for `OutputRange::Probability`.
    fn predict(&self, windows: &WindowBatch) -> PipelineResult<Vec<f64>>;

    fn output_range(&self) -> OutputRange;

    fn name(&self) -> &str;
}
