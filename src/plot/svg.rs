//! SVG chart

use super::{ChartData, ChartOptions, PlotError};
use crate::data::TimeSeriesTable;
use crate::training::ForecastResult;
use std::fs;
use std::path::Path;

const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 40.0;

const HISTORY_COLOR: &str = "#1f77b4";
const FORECAST_COLOR: &str = "#ff7f0e";

/// Renders the chart as a standalone SVG document
pub fn render_svg(
    table: &TimeSeriesTable,
    forecast: &ForecastResult,
    options: &ChartOptions,
) -> Result<String, PlotError> {
    let data = ChartData::new(table, forecast, options.history_days)?;
    let width = options.width.max(200) as f64;
    let height = options.height.max(120) as f64;
    let plot_w = width - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = height - MARGIN_TOP - MARGIN_BOTTOM;

    let (x_start, x_end) = data.x_range();
    let (y_min, y_max) = data.y_range();

    let x = |time_index: usize| -> f64 {
        MARGIN_LEFT + (time_index - x_start) as f64 / (x_end - x_start) as f64 * plot_w
    };
    let y = |price: f64| -> f64 { MARGIN_TOP + (y_max - price) / (y_max - y_min) * plot_h };

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push('\n');
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        width, height
    ));
    svg.push('\n');
    svg.push_str(&format!(
        r#"<text x="{:.1}" y="24" font-family="sans-serif" font-size="16" text-anchor="middle">{}</text>"#,
        width / 2.0,
        escape(&options.title)
    ));
    svg.push('\n');

    // Axes
    let bottom = MARGIN_TOP + plot_h;
    svg.push_str(&format!(
        r#"<path d="M{l:.1},{t:.1} L{l:.1},{b:.1} L{r:.1},{b:.1}" stroke="black" fill="none"/>"#,
        l = MARGIN_LEFT,
        t = MARGIN_TOP,
        b = bottom,
        r = MARGIN_LEFT + plot_w
    ));
    svg.push('\n');
    for (price, anchor_y) in [(y_max, MARGIN_TOP), (y_min, bottom)] {
        svg.push_str(&format!(
            r#"<text x="{:.1}" y="{:.1}" font-family="sans-serif" font-size="11" text-anchor="end">{:.2}</text>"#,
            MARGIN_LEFT - 6.0,
            anchor_y + 4.0,
            price
        ));
        svg.push('\n');
    }
    svg.push_str(&format!(
        r#"<text x="{:.1}" y="{:.1}" font-family="sans-serif" font-size="11">{}</text>"#,
        MARGIN_LEFT,
        bottom + 18.0,
        data.first_date
    ));
    svg.push('\n');
    svg.push_str(&format!(
        r#"<text x="{:.1}" y="{:.1}" font-family="sans-serif" font-size="11" text-anchor="end">{}</text>"#,
        MARGIN_LEFT + plot_w,
        bottom + 18.0,
        data.last_date
    ));
    svg.push('\n');

    // Quantile band: upper edge forward, lower edge back
    let band: Vec<String> = data
        .forecast
        .iter()
        .map(|&(t, _, _, upper)| format!("{:.2},{:.2}", x(t), y(upper)))
        .chain(
            data.forecast
                .iter()
                .rev()
                .map(|&(t, lower, _, _)| format!("{:.2},{:.2}", x(t), y(lower))),
        )
        .collect();
    svg.push_str(&format!(
        r#"<polygon points="{}" fill="{}" fill-opacity="0.25" stroke="none"/>"#,
        band.join(" "),
        FORECAST_COLOR
    ));
    svg.push('\n');

    let history: Vec<String> = data
        .history
        .iter()
        .map(|&(t, close)| format!("{:.2},{:.2}", x(t), y(close)))
        .collect();
    svg.push_str(&format!(
        r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="1.5"/>"#,
        history.join(" "),
        HISTORY_COLOR
    ));
    svg.push('\n');

    // Median continues from the last observed close
    let median: Vec<String> = data
        .history
        .last()
        .map(|&(t, close)| format!("{:.2},{:.2}", x(t), y(close)))
        .into_iter()
        .chain(
            data.forecast
                .iter()
                .map(|&(t, _, median, _)| format!("{:.2},{:.2}", x(t), y(median))),
        )
        .collect();
    svg.push_str(&format!(
        r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2" stroke-dasharray="5,3"/>"#,
        median.join(" "),
        FORECAST_COLOR
    ));
    svg.push('\n');

    if let Some(&(t, _)) = data.history.last() {
        svg.push_str(&format!(
            r#"<line x1="{x:.2}" y1="{t:.1}" x2="{x:.2}" y2="{b:.1}" stroke="gray" stroke-dasharray="2,2"/>"#,
            x = x(t),
            t = MARGIN_TOP,
            b = bottom
        ));
        svg.push('\n');
    }

    // Legend
    let legend_x = MARGIN_LEFT + 10.0;
    for (i, (label, color)) in [("History", HISTORY_COLOR), ("Forecast (median, q-band)", FORECAST_COLOR)]
        .iter()
        .enumerate()
    {
        let ly = MARGIN_TOP + 14.0 + i as f64 * 16.0;
        svg.push_str(&format!(
            r#"<rect x="{:.1}" y="{:.1}" width="12" height="4" fill="{}"/><text x="{:.1}" y="{:.1}" font-family="sans-serif" font-size="11">{}</text>"#,
            legend_x,
            ly - 4.0,
            color,
            legend_x + 18.0,
            ly,
            label
        ));
        svg.push('\n');
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

/// Renders the chart and writes it to `path`
pub fn save_svg<P: AsRef<Path>>(
    path: P,
    table: &TimeSeriesTable,
    forecast: &ForecastResult,
    options: &ChartOptions,
) -> Result<(), PlotError> {
    let svg = render_svg(table, forecast, options)?;
    fs::write(path.as_ref(), svg)?;
    log::info!("Chart saved to {}", path.as_ref().display());
    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
