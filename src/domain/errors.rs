use thiserror::Error;

/// Errors raised by the prediction pipeline and its collaborators.
///
/// None of these are retried inside the pipeline; callers catch and report them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No data: {reason}")]
    NoData { reason: String },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    InvalidShape { expected: String, actual: String },

    #[error("Dimension mismatch: expected width {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Model not fitted: {reason}")]
    UnfittedModel { reason: String },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Model failure: {reason}")]
    Model { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn no_data(reason: impl Into<String>) -> Self {
        PipelineError::NoData {
            reason: reason.into(),
        }
    }

    pub fn invalid_shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        PipelineError::InvalidShape {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn unfitted(reason: impl Into<String>) -> Self {
        PipelineError::UnfittedModel {
            reason: reason.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        PipelineError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn model(reason: impl Into<String>) -> Self {
        PipelineError::Model {
            reason: reason.into(),
        }
    }
}
