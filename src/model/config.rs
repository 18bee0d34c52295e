//! TFT model configuration

use crate::data::{DECODER_FEATURES, ENCODER_FEATURES, STATIC_FEATURES};
use crate::defaults;
use serde::{Deserialize, Serialize};

/// Temporal Fusion Transformer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TFTConfig {
    /// Hidden layer size
    pub hidden_size: usize,

    /// Number of attention heads
    pub num_attention_heads: usize,

    /// Dropout applied to the embeddings fed to the quantile head while training
    pub dropout: f64,

    /// Number of stacked LSTM layers
    pub num_lstm_layers: usize,

    /// Encoder context length
    pub encoder_length: usize,

    /// Prediction horizon
    pub prediction_length: usize,

    /// Number of encoder features
    pub num_encoder_features: usize,

    /// Number of decoder (known future) features
    pub num_decoder_features: usize,

    /// Number of static features
    pub num_static_features: usize,

    /// Forecast quantiles
    pub quantiles: Vec<f64>,

    /// Seed for weight initialization
    pub seed: u64,
}

impl Default for TFTConfig {
    fn default() -> Self {
        Self {
            hidden_size: 32,
            num_attention_heads: 4,
            dropout: 0.3,
            num_lstm_layers: 2,
            encoder_length: defaults::ENCODER_LENGTH,
            prediction_length: defaults::PREDICTION_LENGTH,
            num_encoder_features: ENCODER_FEATURES.len(),
            num_decoder_features: DECODER_FEATURES.len(),
            num_static_features: STATIC_FEATURES.len(),
            quantiles: defaults::QUANTILES.to_vec(),
            seed: 42,
        }
    }
}

impl TFTConfig {
    /// Daily bars: one year of context, one week ahead
    pub fn daily() -> Self {
        Self::default()
    }

    /// Small model for quick runs
    pub fn small() -> Self {
        Self {
            hidden_size: 8,
            num_attention_heads: 2,
            num_lstm_layers: 1,
            ..Default::default()
        }
    }

    /// Larger model
    pub fn large() -> Self {
        Self {
            hidden_size: 64,
            num_attention_heads: 4,
            ..Default::default()
        }
    }

    /// Sets encoder and prediction lengths
    pub fn with_lengths(mut self, encoder: usize, prediction: usize) -> Self {
        self.encoder_length = encoder;
        self.prediction_length = prediction;
        self
    }

    /// Sets the quantiles
    pub fn with_quantiles(mut self, quantiles: Vec<f64>) -> Self {
        self.quantiles = quantiles;
        self
    }

    /// Sets the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of outputs per step
    pub fn output_size(&self) -> usize {
        self.quantiles.len()
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.hidden_size == 0 {
            return Err("hidden_size must be > 0".to_string());
        }
        if self.num_attention_heads == 0 {
            return Err("num_attention_heads must be > 0".to_string());
        }
        if self.hidden_size % self.num_attention_heads != 0 {
            return Err("hidden_size must be divisible by num_attention_heads".to_string());
        }
        if self.num_lstm_layers == 0 {
            return Err("num_lstm_layers must be > 0".to_string());
        }
        if self.encoder_length == 0 || self.prediction_length == 0 {
            return Err("encoder_length and prediction_length must be > 0".to_string());
        }
        let feature_counts = [
            ("num_encoder_features", self.num_encoder_features, ENCODER_FEATURES.len()),
            ("num_decoder_features", self.num_decoder_features, DECODER_FEATURES.len()),
            ("num_static_features", self.num_static_features, STATIC_FEATURES.len()),
        ];
        for (name, value, expected) in feature_counts {
            if value != expected {
                return Err(format!(
                    "{} is {}, the window builder produces {}",
                    name, value, expected
                ));
            }
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(format!("dropout {} must be in [0, 1)", self.dropout));
        }
        if self.quantiles.is_empty() {
            return Err("quantiles must not be empty".to_string());
        }
        for &q in &self.quantiles {
            if q <= 0.0 || q >= 1.0 {
                return Err(format!("quantile {} must be in (0, 1)", q));
            }
        }
        if self.quantiles.windows(2).any(|w| w[0] >= w[1]) {
            return Err("quantiles must be strictly increasing".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TFTConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.prediction_length, 7);
        assert_eq!(config.output_size(), 3);
    }

    #[test]
    fn test_config_presets() {
        assert_eq!(TFTConfig::daily().encoder_length, 365);
        assert_eq!(TFTConfig::small().hidden_size, 8);
        assert!(TFTConfig::small().validate().is_ok());
        assert_eq!(TFTConfig::large().hidden_size, 64);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = TFTConfig::default();
        config.hidden_size = 0;
        assert!(config.validate().is_err());

        let config = TFTConfig::default().with_quantiles(vec![]);
        assert!(config.validate().is_err());

        let config = TFTConfig::default().with_quantiles(vec![1.5]);
        assert!(config.validate().is_err());

        let config = TFTConfig::default().with_quantiles(vec![0.9, 0.1]);
        assert!(config.validate().is_err());

        let mut config = TFTConfig::default();
        config.hidden_size = 30;
        config.num_attention_heads = 4;
        assert!(config.validate().is_err());

        let mut config = TFTConfig::default();
        config.num_encoder_features = 5;
        assert!(config.validate().is_err());

        let mut config = TFTConfig::default();
        config.num_static_features = STATIC_FEATURES.len() + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: TFTConfig = serde_json::from_str(r#"{"hidden_size": 16}"#).unwrap();
        assert_eq!(config.hidden_size, 16);
        assert_eq!(config.encoder_length, 365);
    }
}
