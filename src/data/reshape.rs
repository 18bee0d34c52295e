//! Reshaping of raw price records into a time-series table
//!
//! Every record becomes one row with a contiguous integer time index and
//! the constant id of the single modeled series.

use crate::api::PriceRecord;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::f64::consts::PI;
use std::sync::Arc;
use thiserror::Error;

const SECONDS_PER_DAY: i64 = 86_400;

/// Errors raised while building the table
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("No price records provided")]
    Empty,

    #[error("Not enough history: {rows} rows, need at least {required} (encoder + prediction length)")]
    InsufficientRows { rows: usize, required: usize },

    #[error("Non-finite {field} at row {index}")]
    InvalidValue { index: usize, field: &'static str },

    #[error("Invalid window: {0}")]
    InvalidWindow(String),
}

/// One row of the time-series table
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRow {
    /// Position in the series, `0..len`
    pub time_index: usize,
    /// Constant series id
    pub group_id: Arc<str>,
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// Forecast target
    pub close: f64,
    pub volume: f64,
}

impl TimeSeriesRow {
    pub fn datetime(&self) -> DateTime<Utc> {
        timestamp_to_datetime(self.timestamp)
    }

    pub fn date(&self) -> NaiveDate {
        self.datetime().date_naive()
    }

    /// Day-of-week encoding, known in advance for any future day
    pub fn day_of_week_encoding(&self) -> (f64, f64) {
        day_of_week_encoding(self.timestamp)
    }
}

/// Converts a Unix timestamp into a `DateTime`
pub fn timestamp_to_datetime(timestamp: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// `(sin, cos)` of the weekday angle for a timestamp
pub fn day_of_week_encoding(timestamp: i64) -> (f64, f64) {
    let dow = timestamp_to_datetime(timestamp)
        .weekday()
        .num_days_from_monday() as f64;
    let angle = 2.0 * PI * dow / 7.0;
    (angle.sin(), angle.cos())
}

/// Table of rows for a single series
#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    group_id: Arc<str>,
    rows: Vec<TimeSeriesRow>,
}

impl TimeSeriesTable {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn rows(&self) -> &[TimeSeriesRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&TimeSeriesRow> {
        self.rows.last()
    }

    /// Close prices in time order
    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }

    /// Timestamp of the day `offset` days after the last row
    pub fn future_timestamp(&self, offset: usize) -> Option<i64> {
        self.last()
            .map(|r| r.timestamp + offset as i64 * SECONDS_PER_DAY)
    }
}

/// Converts price records into a `TimeSeriesTable`
#[derive(Debug, Clone)]
pub struct Reshaper {
    encoder_length: usize,
    prediction_length: usize,
    group_id: String,
}

impl Reshaper {
    /// Creates a reshaper for the given window
    pub fn new(encoder_length: usize, prediction_length: usize) -> Self {
        Self {
            encoder_length,
            prediction_length,
            group_id: "series".to_string(),
        }
    }

    /// Sets the group id (e.g. `eth_usd`)
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    /// Group id for a symbol / quote currency pair
    pub fn group_id_for(symbol: &str, currency: &str) -> String {
        format!("{}_{}", symbol, currency).to_lowercase()
    }

    /// Minimum number of rows that can form one forecast window
    pub fn required_rows(&self) -> usize {
        self.encoder_length + self.prediction_length
    }

    /// Builds the table
    ///
    /// Records must be ordered oldest first. Gaps in the daily sequence are
    /// logged but not rejected.
    pub fn reshape(&self, records: &[PriceRecord]) -> Result<TimeSeriesTable, SchemaError> {
        if self.encoder_length == 0 || self.prediction_length == 0 {
            return Err(SchemaError::InvalidWindow(format!(
                "encoder_length={} prediction_length={}",
                self.encoder_length, self.prediction_length
            )));
        }
        if records.is_empty() {
            return Err(SchemaError::Empty);
        }
        if records.len() < self.required_rows() {
            return Err(SchemaError::InsufficientRows {
                rows: records.len(),
                required: self.required_rows(),
            });
        }

        let group_id: Arc<str> = Arc::from(self.group_id.as_str());
        let mut rows = Vec::with_capacity(records.len());
        let mut gaps = 0;

        for (index, record) in records.iter().enumerate() {
            check_finite(index, "open", record.open)?;
            check_finite(index, "high", record.high)?;
            check_finite(index, "low", record.low)?;
            check_finite(index, "close", record.close)?;
            check_finite(index, "volume", record.volume)?;

            if let Some(prev) = rows.last().map(|r: &TimeSeriesRow| r.timestamp) {
                if record.timestamp - prev != SECONDS_PER_DAY {
                    gaps += 1;
                }
            }

            rows.push(TimeSeriesRow {
                time_index: index,
                group_id: Arc::clone(&group_id),
                timestamp: record.timestamp,
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                volume: record.volume,
            });
        }

        if gaps > 0 {
            log::warn!(
                "{} of {} steps are not exactly one day apart; time index assumes a contiguous series",
                gaps,
                rows.len() - 1
            );
        }

        log::debug!("Reshaped {} records into group '{}'", rows.len(), group_id);

        Ok(TimeSeriesTable { group_id, rows })
    }
}

fn check_finite(index: usize, field: &'static str, value: f64) -> Result<(), SchemaError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SchemaError::InvalidValue { index, field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<PriceRecord> {
        (0..n)
            .map(|i| PriceRecord {
                timestamp: 1_600_000_000 + i as i64 * SECONDS_PER_DAY,
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.5 + i as f64,
                volume: 10.0,
            })
            .collect()
    }

    #[test]
    fn test_reshape_assigns_contiguous_index() {
        let reshaper = Reshaper::new(30, 7).with_group_id("eth_usd");
        let table = reshaper.reshape(&records(50)).unwrap();

        assert_eq!(table.len(), 50);
        assert_eq!(table.group_id(), "eth_usd");
        for (i, row) in table.rows().iter().enumerate() {
            assert_eq!(row.time_index, i);
            assert_eq!(&*row.group_id, "eth_usd");
        }
    }

    #[test]
    fn test_reshape_exact_minimum() {
        let reshaper = Reshaper::new(30, 7);
        assert!(reshaper.reshape(&records(37)).is_ok());
    }

    #[test]
    fn test_reshape_insufficient_rows() {
        let reshaper = Reshaper::new(30, 7);
        let err = reshaper.reshape(&records(36)).unwrap_err();
        assert_eq!(err, SchemaError::InsufficientRows { rows: 36, required: 37 });

        assert_eq!(reshaper.reshape(&[]).unwrap_err(), SchemaError::Empty);
    }

    #[test]
    fn test_reshape_rejects_nan() {
        let mut data = records(40);
        data[5].close = f64::NAN;
        let err = Reshaper::new(30, 7).reshape(&data).unwrap_err();
        assert_eq!(err, SchemaError::InvalidValue { index: 5, field: "close" });
    }

    #[test]
    fn test_group_id_for() {
        assert_eq!(Reshaper::group_id_for("ETH", "USD"), "eth_usd");
    }

    #[test]
    fn test_day_of_week_encoding() {
        // 2024-01-01 is a Monday
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();
        let (sin, cos) = day_of_week_encoding(monday);
        assert!(sin.abs() < 1e-12);
        assert!((cos - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_future_timestamp() {
        let table = Reshaper::new(30, 7).reshape(&records(40)).unwrap();
        let last = table.last().unwrap().timestamp;
        assert_eq!(table.future_timestamp(1), Some(last + SECONDS_PER_DAY));
    }
}
