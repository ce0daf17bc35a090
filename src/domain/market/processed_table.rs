use crate::domain::errors::{PipelineError, PipelineResult};
use statrs::statistics::{Data, Distribution};

/// Chronologically indexed table of raw and engineered columns.
///
/// Every stored row is fully defined. The pipeline only reads the latest close
/// and the return volatility from it; the numeric models never see it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedTable {
    columns: Vec<String>,
    timestamps: Vec<i64>,
    rows: Vec<Vec<f64>>,
}

impl ProcessedTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            timestamps: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Appends a row. Timestamps must be strictly increasing.
    pub fn push_row(&mut self, timestamp: i64, row: Vec<f64>) -> PipelineResult<()> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::DimensionMismatch {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        if let Some(&last) = self.timestamps.last() {
            if timestamp <= last {
                return Err(PipelineError::invalid_input(format!(
                    "rows must be chronological: {} after {}",
                    timestamp, last
                )));
            }
        }
        self.timestamps.push(timestamp);
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    pub fn latest(&self, name: &str) -> Option<f64> {
        let idx = self.column_index(name)?;
        self.rows.last().map(|row| row[idx])
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.latest("close")
    }

    /// Projects the named columns, row by row, in the given order.
    pub fn select(&self, names: &[&str]) -> PipelineResult<Vec<Vec<f64>>> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name).ok_or_else(|| {
                    PipelineError::invalid_shape(
                        format!("column '{}'", name),
                        format!("columns {:?}", self.columns),
                    )
                })
            })
            .collect::<PipelineResult<Vec<usize>>>()?;

        Ok(self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect())
    }

    /// Sample standard deviation of close-to-close percentage returns, scaled
    /// to percent. Needs at least three closes.
    pub fn return_volatility(&self) -> Option<f64> {
        let closes = self.column("close")?;
        let returns: Vec<f64> = closes
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect();
        if returns.len() < 2 {
            return None;
        }
        let std_dev = Data::new(returns).std_dev()?;
        std_dev.is_finite().then_some(std_dev * 100.0)
    }
}
