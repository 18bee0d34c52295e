//! Terminal chart

use super::{ChartData, ChartOptions, PlotError};
use crate::data::TimeSeriesTable;
use crate::training::ForecastResult;

const HISTORY: char = '*';
const MEDIAN: char = 'o';
const BAND: char = '-';
const LABEL_WIDTH: usize = 10;

/// Renders history (`*`), median forecast (`o`) and the quantile band (`-`)
pub fn render_ascii(
    table: &TimeSeriesTable,
    forecast: &ForecastResult,
    options: &ChartOptions,
) -> Result<String, PlotError> {
    let data = ChartData::new(table, forecast, options.history_days)?;
    let width = options.width.max(10);
    let height = options.height.max(3);

    let (x_start, x_end) = data.x_range();
    let (y_min, y_max) = data.y_range();

    let col = |time_index: usize| -> usize {
        let t = (time_index - x_start) as f64 / (x_end - x_start) as f64;
        ((t * (width - 1) as f64).round() as usize).min(width - 1)
    };
    // Row 0 is the top of the chart
    let row = |price: f64| -> usize {
        let t = ((price - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
        (height - 1) - (t * (height - 1) as f64).round() as usize
    };

    let mut grid = vec![vec![' '; width]; height];

    for &(t, close) in &data.history {
        grid[row(close)][col(t)] = HISTORY;
    }
    for &(t, lower, _, upper) in &data.forecast {
        let c = col(t);
        for r in row(upper)..=row(lower) {
            if grid[r][c] == ' ' {
                grid[r][c] = BAND;
            }
        }
    }
    for &(t, _, median, _) in &data.forecast {
        grid[row(median)][col(t)] = MEDIAN;
    }

    let mut out = String::new();
    out.push_str(&options.title);
    out.push('\n');
    out.push_str(&"=".repeat(options.title.chars().count()));
    out.push('\n');

    for (r, line) in grid.iter().enumerate() {
        let label = if r == 0 {
            format!("{:.2}", y_max)
        } else if r == height - 1 {
            format!("{:.2}", y_min)
        } else {
            String::new()
        };
        let body: String = line.iter().collect();
        out.push_str(&format!(
            "{:>lw$} |{}\n",
            label,
            body.trim_end(),
            lw = LABEL_WIDTH
        ));
    }

    out.push_str(&format!(
        "{:>lw$} +{}\n",
        "",
        "-".repeat(width),
        lw = LABEL_WIDTH
    ));

    let split_col = col(data.forecast.first().map_or(x_end, |p| p.0));
    let footer = format!(
        "{} .. {} | forecast from {} to {}",
        data.first_date,
        data.split_date,
        data.split_date,
        data.last_date
    );
    out.push_str(&format!("{:>lw$}  {}\n", "", footer, lw = LABEL_WIDTH));
    out.push_str(&format!(
        "{:>lw$}  {}^ forecast start   {} history  {} median  {} q-band\n",
        "",
        " ".repeat(split_col),
        HISTORY,
        MEDIAN,
        BAND,
        lw = LABEL_WIDTH
    ));

    Ok(out)
}
