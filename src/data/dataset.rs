//! Windowed samples for the TFT
//!
//! Cuts the normalized table into (encoder context, decoder horizon) pairs.

use super::{day_of_week_encoding, FeatureScaler, GroupNormalizer, SchemaError, TimeSeriesTable};
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};

/// Encoder (past) feature names
pub const ENCODER_FEATURES: [&str; 8] = [
    "open",
    "high",
    "low",
    "close",
    "volume",
    "relative_time_idx",
    "dow_sin",
    "dow_cos",
];

/// Decoder (known future) feature names
pub const DECODER_FEATURES: [&str; 3] = ["relative_time_idx", "dow_sin", "dow_cos"];

/// Static feature names
pub const STATIC_FEATURES: [&str; 3] = ["target_center", "target_scale", "encoder_length"];

const CLOSE_COLUMN: usize = 3;

/// One sample for the TFT (encoder context + decoder horizon)
#[derive(Debug, Clone)]
pub struct TFTSample {
    /// Past features, shape (encoder_length, ENCODER_FEATURES)
    pub encoder_input: Array2<f64>,

    /// Known future features, shape (prediction_length, DECODER_FEATURES)
    pub decoder_input: Array2<f64>,

    /// Normalized target over the horizon, shape (prediction_length,).
    /// Empty for forecast windows that reach past the data.
    pub target: Array1<f64>,

    /// Static features, shape (STATIC_FEATURES,)
    pub static_features: Array1<f64>,

    /// Last observed normalized close of the encoder window
    pub anchor: f64,

    /// Time index of the first encoder step
    pub time_index_start: usize,

    /// Time index of the first predicted step
    pub time_index_prediction: usize,
}

impl TFTSample {
    /// True when the sample carries a target
    pub fn has_target(&self) -> bool {
        !self.target.is_empty()
    }
}

/// Collection of samples
#[derive(Debug, Clone)]
pub struct Dataset {
    pub samples: Vec<TFTSample>,
    pub encoder_length: usize,
    pub prediction_length: usize,
}

impl Dataset {
    /// Creates an empty dataset
    pub fn new(encoder_length: usize, prediction_length: usize) -> Self {
        Self {
            samples: Vec::new(),
            encoder_length,
            prediction_length,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns a batch of samples
    pub fn get_batch(&self, start: usize, batch_size: usize) -> Vec<&TFTSample> {
        let end = (start + batch_size).min(self.samples.len());
        self.samples[start.min(end)..end].iter().collect()
    }

    /// Iterator over consecutive batches
    pub fn batches(&self, batch_size: usize) -> BatchIterator<'_> {
        BatchIterator {
            dataset: self,
            batch_size: batch_size.max(1),
            current: 0,
        }
    }
}

/// Iterator over batches
pub struct BatchIterator<'a> {
    dataset: &'a Dataset,
    batch_size: usize,
    current: usize,
}

impl<'a> Iterator for BatchIterator<'a> {
    type Item = Vec<&'a TFTSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.dataset.samples.len() {
            return None;
        }

        let batch = self.dataset.get_batch(self.current, self.batch_size);
        self.current += self.batch_size;

        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

/// Window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Encoder context length (lookback)
    pub encoder_length: usize,

    /// Prediction horizon
    pub prediction_length: usize,

    /// Step between consecutive training windows
    pub stride: usize,

    /// Number of windows at the end of the series used for validation
    pub validation_windows: usize,

    /// Apply `ln(1 + v)` to volume before scaling
    pub log_volume: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            encoder_length: 365,
            prediction_length: 7,
            stride: 1,
            validation_windows: 1,
            log_volume: true,
        }
    }
}

/// Builds samples from a table
///
/// Normalizers are fitted on the rows before the training cutoff
/// (`len - prediction_length`), so the last horizon never leaks into them.
#[derive(Debug, Clone)]
pub struct WindowBuilder<'a> {
    config: WindowConfig,
    table: &'a TimeSeriesTable,
    target_normalizer: GroupNormalizer,
    feature_scaler: FeatureScaler,
    /// Normalized [open, high, low, close, volume] per row
    values: Array2<f64>,
}

impl<'a> WindowBuilder<'a> {
    /// Fits the normalizers and prepares the normalized value matrix
    pub fn fit(table: &'a TimeSeriesTable, config: WindowConfig) -> Result<Self, SchemaError> {
        if config.encoder_length == 0 || config.prediction_length == 0 {
            return Err(SchemaError::InvalidWindow(format!(
                "encoder_length={} prediction_length={}",
                config.encoder_length, config.prediction_length
            )));
        }
        let required = config.encoder_length + config.prediction_length;
        if table.len() < required {
            return Err(SchemaError::InsufficientRows {
                rows: table.len(),
                required,
            });
        }

        let cutoff = table.len() - config.prediction_length;
        let fit_rows = &table.rows()[..cutoff];
        let target_normalizer = GroupNormalizer::fit(fit_rows);
        let feature_scaler = FeatureScaler::fit(fit_rows, config.log_volume);

        Ok(Self::with_normalizers(
            table,
            config,
            target_normalizer,
            feature_scaler,
        ))
    }

    /// Uses already fitted normalizers (e.g. from a trained model)
    pub fn with_normalizers(
        table: &'a TimeSeriesTable,
        config: WindowConfig,
        target_normalizer: GroupNormalizer,
        feature_scaler: FeatureScaler,
    ) -> Self {
        let mut values = Array2::zeros((table.len(), 5));
        for (i, row) in table.rows().iter().enumerate() {
            let [open, high, low, volume] = feature_scaler.transform(row);
            values[[i, 0]] = open;
            values[[i, 1]] = high;
            values[[i, 2]] = low;
            values[[i, CLOSE_COLUMN]] = target_normalizer.transform(row.close);
            values[[i, 4]] = volume;
        }

        Self {
            config,
            table,
            target_normalizer,
            feature_scaler,
            values,
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn target_normalizer(&self) -> &GroupNormalizer {
        &self.target_normalizer
    }

    pub fn feature_scaler(&self) -> &FeatureScaler {
        &self.feature_scaler
    }

    /// Index of the first row after the training part
    pub fn training_cutoff(&self) -> usize {
        self.table.len() - self.config.prediction_length
    }

    /// Builds the sample whose encoder starts at `start`
    ///
    /// Returns `None` when the encoder does not fit in the table. The target
    /// is filled only when the whole horizon lies inside the table.
    pub fn sample_at(&self, start: usize) -> Option<TFTSample> {
        let enc_len = self.config.encoder_length;
        let pred_len = self.config.prediction_length;
        let encoder_end = start + enc_len;
        let prediction_end = encoder_end + pred_len;

        if encoder_end > self.table.len() {
            return None;
        }

        let rows = self.table.rows();
        let mut encoder_input = Array2::zeros((enc_len, ENCODER_FEATURES.len()));
        for t in 0..enc_len {
            let row = start + t;
            for col in 0..5 {
                encoder_input[[t, col]] = self.values[[row, col]];
            }
            let (sin, cos) = rows[row].day_of_week_encoding();
            encoder_input[[t, 5]] = relative_time_idx(t as i64 - (enc_len as i64 - 1), enc_len);
            encoder_input[[t, 6]] = sin;
            encoder_input[[t, 7]] = cos;
        }

        let last_timestamp = rows[encoder_end - 1].timestamp;
        let mut decoder_input = Array2::zeros((pred_len, DECODER_FEATURES.len()));
        for t in 0..pred_len {
            let timestamp = match rows.get(encoder_end + t) {
                Some(row) => row.timestamp,
                None => last_timestamp + (t as i64 + 1) * 86_400,
            };
            let (sin, cos) = day_of_week_encoding(timestamp);
            decoder_input[[t, 0]] = relative_time_idx(t as i64 + 1, enc_len);
            decoder_input[[t, 1]] = sin;
            decoder_input[[t, 2]] = cos;
        }

        let target = if prediction_end <= self.table.len() {
            self.values
                .slice(s![encoder_end..prediction_end, CLOSE_COLUMN])
                .to_owned()
        } else {
            Array1::zeros(0)
        };

        let encoder_target = self.values.slice(s![start..encoder_end, CLOSE_COLUMN]);
        let center = encoder_target.mean().unwrap_or(0.0);
        let scale = encoder_target.std(0.0);
        let static_features = Array1::from_vec(vec![
            center,
            scale,
            enc_len as f64 / self.config.encoder_length.max(1) as f64,
        ]);

        Some(TFTSample {
            encoder_input,
            decoder_input,
            target,
            static_features,
            anchor: self.values[[encoder_end - 1, CLOSE_COLUMN]],
            time_index_start: rows[start].time_index,
            time_index_prediction: rows[encoder_end - 1].time_index + 1,
        })
    }

    /// Windows whose horizon ends at or before the training cutoff
    pub fn training_dataset(&self) -> Dataset {
        let total = self.config.encoder_length + self.config.prediction_length;
        let cutoff = self.training_cutoff();
        let mut dataset = Dataset::new(self.config.encoder_length, self.config.prediction_length);

        if cutoff >= total {
            let last_start = cutoff - total;
            let stride = self.config.stride.max(1);
            dataset.samples = (0..=last_start)
                .step_by(stride)
                .filter_map(|start| self.sample_at(start))
                .collect();
        }

        dataset
    }

    /// The last `validation_windows` windows of the full series
    ///
    /// The final one ends at the last row of the table.
    pub fn validation_dataset(&self) -> Dataset {
        let total = self.config.encoder_length + self.config.prediction_length;
        let last_start = self.table.len() - total;
        let count = self.config.validation_windows.max(1).min(last_start + 1);

        let mut dataset = Dataset::new(self.config.encoder_length, self.config.prediction_length);
        dataset.samples = (last_start + 1 - count..=last_start)
            .filter_map(|start| self.sample_at(start))
            .collect();
        dataset
    }

    /// Window over the most recent `encoder_length` rows; its horizon lies
    /// entirely in the future and it carries no target.
    pub fn forecast_sample(&self) -> Option<TFTSample> {
        let start = self.table.len().checked_sub(self.config.encoder_length)?;
        self.sample_at(start)
    }

    /// Converts a normalized target value back to price units
    pub fn denormalize(&self, value: f64) -> f64 {
        self.target_normalizer.inverse(value)
    }
}

/// Position relative to the last encoder step, scaled by the encoder length
fn relative_time_idx(offset: i64, encoder_length: usize) -> f64 {
    offset as f64 / encoder_length.max(1) as f64
}
