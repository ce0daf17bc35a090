use crate::domain::errors::{PipelineError, PipelineResult};
use ndarray::{Array2, Array3, ArrayView2, Axis, s};

/// Batch of feature windows shaped `[windows, window_len, n_features]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBatch {
    data: Array3<f64>,
}

impl WindowBatch {
    pub fn new(data: Array3<f64>) -> Self {
        Self { data }
    }

    /// Builds a batch from row-major windows. Every window must have the same
    /// length and every row the same width.
    pub fn from_windows(windows: &[Vec<Vec<f64>>]) -> PipelineResult<Self> {
        let Some(first) = windows.first() else {
            return Ok(Self::new(Array3::zeros((0, 0, 0))));
        };
        let window_len = first.len();
        let n_features = first.first().map_or(0, Vec::len);

        let mut flat = Vec::with_capacity(windows.len() * window_len * n_features);
        for (i, window) in windows.iter().enumerate() {
            if window.len() != window_len {
                return Err(PipelineError::invalid_shape(
                    format!("window length {}", window_len),
                    format!("window {} has length {}", i, window.len()),
                ));
            }
            for row in window {
                if row.len() != n_features {
                    return Err(PipelineError::invalid_shape(
                        format!("feature width {}", n_features),
                        format!("row of width {} in window {}", row.len(), i),
                    ));
                }
                flat.extend_from_slice(row);
            }
        }

        let data = Array3::from_shape_vec((windows.len(), window_len, n_features), flat)
            .map_err(|e| PipelineError::invalid_shape("rectangular windows", e.to_string()))?;
        Ok(Self::new(data))
    }

    pub fn len(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn window_len(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn n_features(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn as_array(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn window(&self, index: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), index)
    }

    /// Last feature vector of every window, `[windows, n_features]`
    pub fn last_rows(&self) -> Array2<f64> {
        let last = self.window_len().saturating_sub(1);
        self.data.slice(s![.., last, ..]).to_owned()
    }

    /// The final window as a batch of one
    pub fn latest(&self) -> Option<WindowBatch> {
        let n = self.len();
        if n == 0 {
            return None;
        }
        Some(Self::new(self.data.slice(s![n - 1..n, .., ..]).to_owned()))
    }

    /// Fails with `InvalidShape` unless the batch matches the configured schema.
    pub fn validate_schema(&self, window_len: usize, n_features: usize) -> PipelineResult<()> {
        if self.window_len() != window_len || self.n_features() != n_features {
            return Err(PipelineError::invalid_shape(
                format!("windows of {}x{}", window_len, n_features),
                format!("windows of {}x{}", self.window_len(), self.n_features()),
            ));
        }
        if self.data.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::invalid_input("window contains non-finite values"));
        }
        Ok(())
    }
}

/// Refiner input: one sequence estimate followed by the last raw feature
/// vector of the originating window. Width is always `1 + F`.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedFeatureVector {
    values: Vec<f64>,
}

impl RefinedFeatureVector {
    pub fn compose(estimate: f64, last_row: &[f64], n_features: usize) -> PipelineResult<Self> {
        let mut values = Vec::with_capacity(1 + last_row.len());
        values.push(estimate);
        values.extend_from_slice(last_row);
        Self::from_values(values, n_features)
    }

    pub fn from_values(values: Vec<f64>, n_features: usize) -> PipelineResult<Self> {
        if values.len() != 1 + n_features {
            return Err(PipelineError::DimensionMismatch {
                expected: 1 + n_features,
                actual: values.len(),
            });
        }
        Ok(Self { values })
    }

    pub fn estimate(&self) -> f64 {
        self.values[0]
    }

    pub fn features(&self) -> &[f64] {
        &self.values[1..]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// Pairs each estimate with the last row of its window.
pub fn compose_refined(
    estimates: &[f64],
    windows: &WindowBatch,
    n_features: usize,
) -> PipelineResult<Vec<RefinedFeatureVector>> {
    if estimates.len() != windows.len() {
        return Err(PipelineError::invalid_shape(
            format!("{} estimates", windows.len()),
            format!("{} estimates", estimates.len()),
        ));
    }
    let last_rows = windows.last_rows();
    estimates
        .iter()
        .zip(last_rows.rows())
        .map(|(&estimate, row)| {
            RefinedFeatureVector::compose(estimate, &row.to_vec(), n_features)
        })
        .collect()
}
