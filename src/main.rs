//! Seven-day ETH/USD forecast
//!
//! Fetches the daily history, trains the TFT, prints the forecast and
//! writes the chart.
//!
//! Usage:
//! ```bash
//! cargo run --release -- --days 2000 --encoder-length 365 --svg eth_forecast.svg
//! RUST_LOG=debug cargo run --release -- --input data/eth_usd.csv
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tft_forecast::{Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Seven-day ETH/USD forecast with a Temporal Fusion Transformer")]
struct Args {
    /// JSON config file; command-line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Asset symbol
    #[arg(long)]
    symbol: Option<String>,

    /// Quote currency
    #[arg(long)]
    currency: Option<String>,

    /// Days of history to fetch
    #[arg(long)]
    days: Option<u32>,

    /// Encoder (lookback) length in days
    #[arg(long)]
    encoder_length: Option<usize>,

    #[arg(long)]
    max_epochs: Option<usize>,

    /// Early stopping patience
    #[arg(long)]
    patience: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    /// Seed for the model weights and the training loop
    #[arg(long)]
    seed: Option<u64>,

    /// Read the history from a CSV file instead of the API
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Save the fetched history to a CSV file
    #[arg(long)]
    save_data: Option<PathBuf>,

    /// SVG chart path
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Write the forecast to a CSV file
    #[arg(long)]
    forecast_csv: Option<PathBuf>,

    /// API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Skip the terminal chart
    #[arg(long)]
    no_chart: bool,
}

impl Args {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(symbol) = self.symbol {
            config.data.symbol = symbol;
        }
        if let Some(currency) = self.currency {
            config.data.currency = currency;
        }
        if let Some(days) = self.days {
            config.data.days = days;
        }
        if let Some(encoder_length) = self.encoder_length {
            config = config.with_encoder_length(encoder_length);
        }
        if let Some(max_epochs) = self.max_epochs {
            config.training.max_epochs = max_epochs;
        }
        if let Some(patience) = self.patience {
            config.training.patience = patience;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.training.learning_rate = learning_rate;
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(base_url) = self.base_url {
            config.data.base_url = base_url;
        }
        if let Ok(api_key) = std::env::var("CRYPTOCOMPARE_API_KEY") {
            config.data.api_key = Some(api_key);
        }
        if self.input.is_some() {
            config.data.input = self.input;
        }
        if self.save_data.is_some() {
            config.data.save_data = self.save_data;
        }
        if self.svg.is_some() {
            config.output.svg = self.svg;
        }
        if self.forecast_csv.is_some() {
            config.output.forecast_csv = self.forecast_csv;
        }
        if self.no_chart {
            config.output.ascii = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    log::debug!("Config: {:?}", config);

    println!("{}", "=".repeat(60));
    println!(
        "TFT forecast: {}/{} ({} days ahead, lookback {} days)",
        config.data.symbol,
        config.data.currency,
        config.model.prediction_length,
        config.model.encoder_length
    );
    println!("{}", "=".repeat(60));

    let pipeline = Pipeline::new(config)?;
    let output = pipeline.run().await?;

    if let Some(chart) = &output.chart {
        println!("\n{}", chart);
    }
    println!("{}", output.report);

    if let Some(change) = output.forecast.expected_change_pct() {
        println!(
            "Expected change over {} days: {:+.2}%",
            output.forecast.len(),
            change
        );
    }

    if let Some(validation) = &output.trained.validation {
        println!("\nLast validation window: {}", validation.metrics);
        println!("Top encoder variables:");
        for (name, weight) in validation.interpretation.encoder_importance.top_n(3) {
            println!("  {:<18} {:.1}%", name, weight * 100.0);
        }
    }
    println!("\nTraining: {}", output.trained.history.summary());

    if let Some(path) = &pipeline.config().output.svg {
        println!("Chart: {}", path.display());
    }

    Ok(())
}
