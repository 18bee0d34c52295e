//! Forecast table and CSV export

use super::PlotError;
use crate::training::ForecastResult;
use std::path::Path;

/// Text table: last known price followed by one line per predicted day
pub fn forecast_table(forecast: &ForecastResult) -> String {
    let lower_q = forecast.quantiles.first().copied().unwrap_or(0.0);
    let upper_q = forecast.quantiles.last().copied().unwrap_or(1.0);

    let mut out = format!(
        "Last known price ({}): {:.2}\n\n",
        forecast.last_date, forecast.last_close
    );
    out.push_str(&format!(
        "{:<12} {:>12} {:>12} {:>12} {:>9}\n",
        "Date",
        format!("q{:.0}", lower_q * 100.0),
        "Median",
        format!("q{:.0}", upper_q * 100.0),
        "Change"
    ));
    out.push_str(&format!("{}\n", "-".repeat(61)));

    for point in &forecast.points {
        let change = if forecast.last_close.abs() > f64::EPSILON {
            (point.median - forecast.last_close) / forecast.last_close * 100.0
        } else {
            0.0
        };
        out.push_str(&format!(
            "{:<12} {:>12.2} {:>12.2} {:>12.2} {:>+8.2}%\n",
            point.date.to_string(),
            point.lower,
            point.median,
            point.upper,
            change
        ));
    }

    out
}

/// Writes the forecast points as CSV
/// (`time_index,timestamp,date,lower,median,upper`)
pub fn write_forecast_csv<P: AsRef<Path>>(
    path: P,
    forecast: &ForecastResult,
) -> Result<(), PlotError> {
    if forecast.is_empty() {
        return Err(PlotError::NoData);
    }

    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for point in &forecast.points {
        writer.serialize(point)?;
    }
    writer.flush()?;

    log::info!(
        "Forecast ({} rows) saved to {}",
        forecast.len(),
        path.as_ref().display()
    );
    Ok(())
}
