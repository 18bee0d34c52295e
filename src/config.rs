//! Pipeline configuration
//!
//! Loaded from JSON; every field is optional and falls back to the
//! defaults of a one-week ETH/USD forecast.

use crate::api::DEFAULT_BASE_URL;
use crate::defaults;
use crate::model::TFTConfig;
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Where the price history comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub symbol: String,
    pub currency: String,
    /// Number of daily bars to request
    pub days: u32,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Read records from this CSV instead of the network
    pub input: Option<PathBuf>,
    /// Save fetched records to this CSV
    pub save_data: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            symbol: defaults::SYMBOL.to_string(),
            currency: defaults::CURRENCY.to_string(),
            days: defaults::DAYS,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            input: None,
            save_data: None,
        }
    }
}

/// Chart and report outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub svg: Option<PathBuf>,
    pub forecast_csv: Option<PathBuf>,
    /// Print the terminal chart
    pub ascii: bool,
    /// Days of history in the terminal chart
    pub ascii_history_days: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            svg: Some(PathBuf::from(defaults::SVG_PATH)),
            forecast_csv: None,
            ascii: true,
            ascii_history_days: 120,
        }
    }
}

/// Full configuration of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub model: TFTConfig,
    pub training: TrainingConfig,
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Loads a JSON config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Sets the encoder length (lookback) of the model
    pub fn with_encoder_length(mut self, encoder_length: usize) -> Self {
        self.model.encoder_length = encoder_length;
        self
    }

    /// Seeds both the backbone and the training loop
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.model.seed = seed;
        self.training.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data.symbol.trim().is_empty() || self.data.currency.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "symbol and currency must not be empty".to_string(),
            ));
        }
        if self.data.days == 0 {
            return Err(ConfigError::Invalid("days must be > 0".to_string()));
        }
        self.model.validate().map_err(ConfigError::Invalid)?;
        self.training.validate().map_err(ConfigError::Invalid)?;

        let required = self.model.encoder_length + self.model.prediction_length;
        if self.data.input.is_none() && (self.data.days as usize) < required {
            return Err(ConfigError::Invalid(format!(
                "days ({}) must cover encoder + prediction length ({})",
                self.data.days, required
            )));
        }
        Ok(())
    }
}
