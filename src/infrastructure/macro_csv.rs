use crate::domain::errors::PipelineResult;
use crate::domain::market::candle::MacroObservation;
use crate::domain::ports::MacroSource;
use chrono::NaiveDate;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::debug;

/// Reads a dated series (`date,value` with a header row), e.g. a policy rate
/// exported from FRED. Rows whose value is not a number (FRED writes `.` for
/// missing observations) are skipped.
#[derive(Debug, Clone)]
pub struct MacroCsvSource {
    path: PathBuf,
}

impl MacroCsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MacroSource for MacroCsvSource {
    fn load_series(&self) -> PipelineResult<Vec<MacroObservation>> {
        let file = File::open(&self.path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));

        let mut series = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let (Some(date), Some(value)) = (record.get(0), record.get(1)) else {
                continue;
            };
            let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
                continue;
            };
            let Some(value) = value.parse::<f64>().ok().filter(|v| v.is_finite()) else {
                continue;
            };
            let Some(midnight) = date.and_hms_opt(0, 0, 0) else {
                continue;
            };
            series.push(MacroObservation {
                timestamp: midnight.and_utc().timestamp_millis(),
                value,
            });
        }

        series.sort_by_key(|obs| obs.timestamp);
        debug!("Loaded {} macro observations from {:?}", series.len(), self.path);
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parses_and_skips_missing_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "date,value\n2023-02-01,4.57\n2023-01-01,4.33\n2023-03-01,.\n2023-04-01,4.83\n"
        )
        .unwrap();

        let series = MacroCsvSource::new(file.path()).load_series().unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].value, 4.33);
        assert_eq!(series[0].timestamp, 1672531200000);
        assert_eq!(series[2].value, 4.83);
    }

    #[test]
    fn test_header_only_is_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "date,value").unwrap();
        let series = MacroCsvSource::new(file.path()).load_series().unwrap();
        assert!(series.is_empty());
    }
}
