use crate::domain::errors::PipelineResult;
use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Granularity;
use crate::domain::ports::PriceSource;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One row of a headerless Dukascopy export: `time_ms,bid,ask,volume`
#[derive(Debug, Deserialize)]
struct DukaRecord {
    time_ms: i64,
    bid: f64,
    ask: f64,
    volume: f64,
}

/// Reads bars from a Dukascopy CSV that was fetched beforehand.
///
/// OHLC is approximated from bid/ask: open is the previous bid, high/low are
/// the max/min of bid and ask, close is the bid. The first row has no
/// previous bid and is dropped.
#[derive(Debug, Clone)]
pub struct DukaCsvSource {
    path: PathBuf,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DukaCsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            start: None,
            end: None,
        }
    }

    /// Keeps rows whose UTC date lies in `[start, end]`
    pub fn with_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<data_dir>/<granularity>/<symbol>_<granularity>_raw.csv`, lowercase
    pub fn default_path(data_dir: &Path, symbol: &str, granularity: Granularity) -> PathBuf {
        let tf = granularity.code().to_lowercase();
        data_dir
            .join(&tf)
            .join(format!("{}_{}_raw.csv", symbol.to_lowercase(), tf))
    }

    fn in_range(&self, time_ms: i64) -> bool {
        let Some(date) = DateTime::from_timestamp_millis(time_ms).map(|d| d.date_naive()) else {
            return false;
        };
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

impl PriceSource for DukaCsvSource {
    fn load_candles(&self) -> PipelineResult<Vec<Candle>> {
        let file = File::open(&self.path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));

        let mut candles = Vec::new();
        let mut prev_bid: Option<f64> = None;
        let mut last_ts: Option<i64> = None;
        let mut skipped = 0usize;

        for result in rdr.deserialize::<DukaRecord>() {
            let record = result?;
            if !self.in_range(record.time_ms) {
                continue;
            }
            if ![record.bid, record.ask, record.volume]
                .iter()
                .all(|v| v.is_finite())
                || last_ts.is_some_and(|t| record.time_ms <= t)
            {
                skipped += 1;
                continue;
            }
            last_ts = Some(record.time_ms);

            if let Some(open) = prev_bid {
                candles.push(Candle {
                    timestamp: record.time_ms,
                    open,
                    high: record.bid.max(record.ask),
                    low: record.bid.min(record.ask),
                    close: record.bid,
                    volume: record.volume,
                });
            }
            prev_bid = Some(record.bid);
        }

        if skipped > 0 {
            warn!(
                "Skipped {} unusable rows in {:?} (non-finite or out of order)",
                skipped, self.path
            );
        }
        debug!("Loaded {} bars from {:?}", candles.len(), self.path);
        Ok(candles)
    }
}
