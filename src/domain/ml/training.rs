use serde::{Deserialize, Serialize};

/// Outcome of fitting a sequence model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub epochs_run: usize,
    /// Epoch (1-based) whose weights were kept
    pub best_epoch: usize,
    pub train_loss: f64,
    /// Loss on the chronological holdout, when one was carved out
    pub validation_loss: Option<f64>,
}

/// Outcome of fitting the full two-stage pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTrainingReport {
    pub sequence: TrainingReport,
    /// In-sample loss of the refiner (log-loss or mean squared error)
    pub refiner_loss: f64,
}
