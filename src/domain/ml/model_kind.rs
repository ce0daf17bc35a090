use serde::{Deserialize, Serialize};

/// Output range of a sequence model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputRange {
    /// Sigmoid output in [0, 1], trained with binary cross-entropy
    Probability,
    /// Linear output, trained with mean squared error
    Unbounded,
}

/// Encoder layout hint for a sequence model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitectureHint {
    /// Gated recurrent layers directly over the raw window
    Recurrent,
    /// 1-D convolution + max pooling in front of the recurrent layers
    ConvRecurrent,
}

/// Refiner objective, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinerMode {
    /// Output is the probability of the positive class
    Classifier,
    /// Output is the continuous target estimate
    Regressor,
}
