//! # Plot Module
//!
//! History + forecast charts: a terminal chart, an SVG file and a
//! printable forecast table.

mod ascii;
mod svg;
mod table;

pub use ascii::render_ascii;
pub use svg::{render_svg, save_svg};
pub use table::{forecast_table, write_forecast_csv};

use crate::data::TimeSeriesTable;
use crate::training::ForecastResult;
use thiserror::Error;

/// Errors raised while rendering or writing charts
#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Nothing to plot: history or forecast is empty")]
    NoData,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Chart layout
#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub title: String,
    /// Columns (ASCII) or pixels (SVG)
    pub width: usize,
    /// Rows (ASCII) or pixels (SVG)
    pub height: usize,
    /// Show only the most recent N days of history
    pub history_days: Option<usize>,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: "ETH/USD: history and 7-day forecast".to_string(),
            width: 100,
            height: 20,
            history_days: Some(120),
        }
    }
}

impl ChartOptions {
    /// Terminal-sized chart of the recent history
    pub fn terminal() -> Self {
        Self::default()
    }

    /// SVG chart of the whole history
    pub fn svg() -> Self {
        Self {
            width: 960,
            height: 420,
            history_days: None,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Points shared by both renderers: history then forecast on one axis
struct ChartData {
    /// (time_index, close)
    history: Vec<(usize, f64)>,
    /// (time_index, lower, median, upper)
    forecast: Vec<(usize, f64, f64, f64)>,
    first_date: String,
    last_date: String,
    split_date: String,
}

impl ChartData {
    fn new(
        table: &TimeSeriesTable,
        forecast: &ForecastResult,
        history_days: Option<usize>,
    ) -> Result<Self, PlotError> {
        if table.is_empty() || forecast.is_empty() {
            return Err(PlotError::NoData);
        }

        let rows = table.rows();
        let skip = history_days.map_or(0, |n| rows.len().saturating_sub(n));
        let shown = &rows[skip..];

        let history = shown.iter().map(|r| (r.time_index, r.close)).collect();
        let points = forecast
            .points
            .iter()
            .map(|p| (p.time_index, p.lower, p.median, p.upper))
            .collect();

        let first_date = shown.first().map(|r| r.date().to_string()).unwrap_or_default();
        let last_date = forecast
            .points
            .last()
            .map(|p| p.date.to_string())
            .unwrap_or_default();

        Ok(Self {
            history,
            forecast: points,
            first_date,
            last_date,
            split_date: forecast.last_date.to_string(),
        })
    }

    /// Smallest and largest time index
    fn x_range(&self) -> (usize, usize) {
        let start = self.history.first().map_or(0, |p| p.0);
        let end = self.forecast.last().map_or(start, |p| p.0);
        (start, end.max(start + 1))
    }

    /// Price range covering history and the forecast bands
    fn y_range(&self) -> (f64, f64) {
        let values = self
            .history
            .iter()
            .map(|p| p.1)
            .chain(self.forecast.iter().flat_map(|p| [p.1, p.2, p.3]))
            .filter(|v| v.is_finite());

        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

        if !min.is_finite() || !max.is_finite() {
            return (0.0, 1.0);
        }
        if (max - min).abs() < 1e-10 {
            return (min - 1.0, max + 1.0);
        }
        (min, max)
    }
}
