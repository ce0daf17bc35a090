use crate::domain::errors::PipelineResult;
use crate::domain::market::processed_table::ProcessedTable;
use crate::domain::market::timeframe::Granularity;
use chrono::DateTime;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// `<data_dir>/<granularity>/<symbol>_processed.csv`, lowercase
pub fn default_export_path(data_dir: &Path, symbol: &str, granularity: Granularity) -> PathBuf {
    data_dir
        .join(granularity.code().to_lowercase())
        .join(format!("{}_processed.csv", symbol.to_lowercase()))
}

/// Writes the table as CSV with a leading RFC 3339 `time` column.
/// Parent directories are created when missing.
pub fn write_processed_csv(table: &ProcessedTable, path: &Path) -> PipelineResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut wtr = csv::Writer::from_path(path)?;
    let mut header = vec!["time".to_string()];
    header.extend(table.columns().iter().cloned());
    wtr.write_record(&header)?;

    for (ts, row) in table.timestamps().iter().zip(table.rows()) {
        let time = DateTime::from_timestamp_millis(*ts)
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| ts.to_string());
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(time);
        record.extend(row.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;

    info!("Exported {} processed rows to {:?}", table.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("eurusd_processed.csv");

        let mut table = ProcessedTable::new(vec!["close".to_string(), "norm_close".to_string()]);
        table.push_row(1672531200000, vec![1.07, 0.5]).unwrap();
        table.push_row(1672534800000, vec![1.08, 1.0]).unwrap();
        write_processed_csv(&table, &path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "time,close,norm_close");
        assert_eq!(lines[1], "2023-01-01T00:00:00+00:00,1.07,0.5");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_default_export_path() {
        let path = default_export_path(Path::new("data"), "GBPUSD", Granularity::D1);
        assert_eq!(path, PathBuf::from("data/d1/gbpusd_processed.csv"));
    }
}
