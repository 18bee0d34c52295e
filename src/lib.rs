//! # TFT Forecast
//!
//! Seven-day ETH/USD forecasting with a Temporal Fusion Transformer on
//! daily prices from the CryptoCompare API.
//!
//! ## Modules
//!
//! - `api` - CryptoCompare daily history client
//! - `data` - Reshaping, scaling and windowing of the price history
//! - `model` - TFT architecture and quantile loss
//! - `training` - Fitting, early stopping and forecasting
//! - `plot` - Terminal and SVG charts, forecast table
//! - `pipeline` - The end-to-end run
//!
//! ## Example
//!
//! ```no_run
//! use tft_forecast::{CryptoCompareClient, Reshaper, TFTConfig, TFTModel, Trainer, TrainingConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CryptoCompareClient::new()?;
//!     let records = client.fetch_daily("ETH", "USD", 2000).await?;
//!
//!     let table = Reshaper::new(365, 7)
//!         .with_group_id(Reshaper::group_id_for("ETH", "USD"))
//!         .reshape(&records)?;
//!
//!     let model = TFTModel::new(TFTConfig::daily()).map_err(anyhow::Error::msg)?;
//!     let trained = Trainer::new(TrainingConfig::default()).train(model, &table)?;
//!
//!     for point in trained.predict(&table)?.points {
//!         println!("{}: {:.2}", point.date, point.median);
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod data;
pub mod model;
pub mod pipeline;
pub mod plot;
pub mod training;

pub use api::{CryptoCompareClient, FetchError, PriceRecord};
pub use config::{ConfigError, PipelineConfig};
pub use data::{Reshaper, SchemaError, TimeSeriesRow, TimeSeriesTable, WindowBuilder, WindowConfig};
pub use model::{QuantileLoss, QuantilePrediction, TFTConfig, TFTModel};
pub use pipeline::{Pipeline, PipelineError, PipelineOutput};
pub use plot::{ChartOptions, PlotError};
pub use training::{
    ForecastPoint, ForecastResult, TrainedModel, Trainer, TrainingConfig, TrainingError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default settings
pub mod defaults {
    pub const SYMBOL: &str = "ETH";

    pub const CURRENCY: &str = "USD";

    /// Days of history requested
    pub const DAYS: u32 = 2000;

    /// Encoder context length (one year of daily bars)
    pub const ENCODER_LENGTH: usize = 365;

    /// Prediction horizon (one week)
    pub const PREDICTION_LENGTH: usize = 7;

    pub const QUANTILES: [f64; 3] = [0.1, 0.5, 0.9];

    pub const LEARNING_RATE: f64 = 0.001;

    pub const BATCH_SIZE: usize = 128;

    pub const MAX_EPOCHS: usize = 100;

    /// Early stopping patience
    pub const PATIENCE: usize = 10;

    pub const SVG_PATH: &str = "eth_forecast.svg";
}
