use crate::domain::market::processed_table::ProcessedTable;
use crate::domain::ml::window::WindowBatch;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Non-fatal condition raised while preparing a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreprocessWarning {
    /// Optional macro series missing; the long regime continues on price data only
    MacroDataUnavailable { reason: String },
}

impl fmt::Display for PreprocessWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessWarning::MacroDataUnavailable { reason } => {
                write!(f, "No macro data loaded ({}); proceeding with price data only", reason)
            }
        }
    }
}

/// Everything the Feature Provider hands to the pipeline.
#[derive(Debug, Clone)]
pub struct FeatureDataset {
    /// Training windows, one per known target
    pub windows: WindowBatch,
    pub targets: Vec<f64>,
    /// The most recent window, ending on the newest bar (target still unknown)
    pub latest: WindowBatch,
    pub table: ProcessedTable,
    pub warnings: Vec<PreprocessWarning>,
}

impl FeatureDataset {
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn has_macro_warning(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, PreprocessWarning::MacroDataUnavailable { .. }))
    }
}
