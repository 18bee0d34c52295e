//! Forecast output in price units

use crate::data::timestamp_to_datetime;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One predicted day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Continues the table's time index: `len..len + prediction_length`
    pub time_index: usize,
    /// Unix timestamp (seconds) of the predicted day
    pub timestamp: i64,
    pub date: NaiveDate,
    /// Lowest quantile
    pub lower: f64,
    pub median: f64,
    /// Highest quantile
    pub upper: f64,
}

impl ForecastPoint {
    pub fn new(time_index: usize, timestamp: i64, lower: f64, median: f64, upper: f64) -> Self {
        Self {
            time_index,
            timestamp,
            date: timestamp_to_datetime(timestamp).date_naive(),
            lower,
            median,
            upper,
        }
    }

    pub fn interval_width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Forecast for the days after the last observed row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub group_id: String,
    /// Quantile levels, lowest first
    pub quantiles: Vec<f64>,
    /// Last observed close
    pub last_close: f64,
    pub last_date: NaiveDate,
    pub points: Vec<ForecastPoint>,
}

impl ForecastResult {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn medians(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.median).collect()
    }

    /// Median change over the horizon, in percent of the last close
    pub fn expected_change_pct(&self) -> Option<f64> {
        let last = self.points.last()?;
        if self.last_close.abs() < f64::EPSILON {
            return None;
        }
        Some((last.median - self.last_close) / self.last_close * 100.0)
    }
}
