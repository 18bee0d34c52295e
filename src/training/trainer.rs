//! Training utilities
//!
//! Fits the quantile head of a [`TFTModel`] on windows cut from a
//! [`TimeSeriesTable`], with early stopping on the validation windows.

use super::optimizer::{clip_grad_norm, AdamW, CosineAnnealing, Optimizer};
use super::{ForecastPoint, ForecastResult};
use crate::data::{
    FeatureScaler, GroupNormalizer, SchemaError, TFTSample, TimeSeriesTable, WindowBuilder,
    WindowConfig,
};
use crate::defaults;
use crate::model::{ForecastMetrics, Interpretation, QuantileHead, TFTModel};
use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

/// Errors raised while training or predicting
#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("No training windows: the series is too short for the encoder length")]
    NoTrainingWindows,

    #[error("No validation windows")]
    NoValidationWindows,

    #[error("Training diverged at epoch {epoch}: loss is not finite")]
    Diverged { epoch: usize },

    #[error("Not enough history to predict: {rows} rows, need {required}")]
    InsufficientHistory { rows: usize, required: usize },
}

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f64,

    pub batch_size: usize,

    pub max_epochs: usize,

    /// Early stopping patience (epochs without improvement), at least 1
    pub patience: usize,

    /// Minimum validation improvement that resets the patience counter
    pub min_delta: f64,

    /// Decoupled weight decay
    pub weight_decay: f64,

    /// Gradient norm clipping
    pub gradient_clip_val: Option<f64>,

    /// Period parameter of the cosine learning-rate schedule
    pub t_max: usize,

    /// Step between consecutive training windows
    pub stride: usize,

    /// Number of windows at the end of the series used for validation
    pub validation_windows: usize,

    /// Apply `ln(1 + v)` to volume before scaling
    pub log_volume: bool,

    /// Seed for shuffling and dropout
    pub seed: u64,

    /// Log every N epochs
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: defaults::LEARNING_RATE,
            batch_size: defaults::BATCH_SIZE,
            max_epochs: defaults::MAX_EPOCHS,
            patience: defaults::PATIENCE,
            min_delta: 1e-4,
            weight_decay: 1e-5,
            gradient_clip_val: Some(0.1),
            t_max: 10,
            stride: 1,
            validation_windows: 1,
            log_volume: true,
            seed: 42,
            log_every: 10,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(format!("learning_rate {} must be > 0", self.learning_rate));
        }
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if self.max_epochs == 0 {
            return Err("max_epochs must be > 0".to_string());
        }
        if self.patience == 0 {
            return Err("patience must be > 0".to_string());
        }
        if self.stride == 0 {
            return Err("stride must be > 0".to_string());
        }
        if self.weight_decay < 0.0 || self.min_delta < 0.0 {
            return Err("weight_decay and min_delta must be >= 0".to_string());
        }
        if let Some(clip) = self.gradient_clip_val {
            if clip <= 0.0 {
                return Err(format!("gradient_clip_val {} must be > 0", clip));
            }
        }
        Ok(())
    }

    /// Window layout for a model configuration
    pub fn window_config(&self, encoder_length: usize, prediction_length: usize) -> WindowConfig {
        WindowConfig {
            encoder_length,
            prediction_length,
            stride: self.stride,
            validation_windows: self.validation_windows,
            log_volume: self.log_volume,
        }
    }
}

/// Why training ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    EarlyStopping,
    MaxEpochs,
}

/// Training history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Train loss per epoch
    pub train_loss: Vec<f64>,

    /// Validation loss per epoch
    pub val_loss: Vec<f64>,

    /// Learning rate used in each epoch
    pub learning_rates: Vec<f64>,

    pub best_val_loss: f64,

    /// 1-based epoch with the best validation loss (0 before the first epoch)
    pub best_epoch: usize,

    pub min_delta: f64,

    pub stop_reason: Option<StopReason>,

    /// Wall time in seconds
    pub training_time: f64,
}

impl Default for TrainingHistory {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl TrainingHistory {
    pub fn new(min_delta: f64) -> Self {
        Self {
            train_loss: Vec::new(),
            val_loss: Vec::new(),
            learning_rates: Vec::new(),
            best_val_loss: f64::INFINITY,
            best_epoch: 0,
            min_delta,
            stop_reason: None,
            training_time: 0.0,
        }
    }

    /// Records an epoch; returns true when the validation loss improved
    /// on the best so far by more than `min_delta`
    pub fn add_epoch(&mut self, train_loss: f64, val_loss: f64, learning_rate: f64) -> bool {
        self.train_loss.push(train_loss);
        self.val_loss.push(val_loss);
        self.learning_rates.push(learning_rate);

        let improved = val_loss < self.best_val_loss - self.min_delta;
        if improved {
            self.best_val_loss = val_loss;
            self.best_epoch = self.train_loss.len();
        }
        improved
    }

    pub fn epochs(&self) -> usize {
        self.train_loss.len()
    }

    /// Epochs since the last improvement
    pub fn epochs_without_improvement(&self) -> usize {
        self.epochs() - self.best_epoch
    }

    /// True once `patience` epochs passed without improvement
    pub fn should_stop(&self, patience: usize) -> bool {
        self.epochs() > 0 && self.epochs_without_improvement() >= patience
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "epochs: {}, best epoch: {}, best val loss: {:.6}",
            self.epochs(),
            self.best_epoch,
            self.best_val_loss
        );
        if let (Some(first), Some(last)) = (self.train_loss.first(), self.train_loss.last()) {
            out.push_str(&format!(", train loss: {:.6} -> {:.6}", first, last));
        }
        if let Some(reason) = self.stop_reason {
            out.push_str(&format!(", stopped by: {:?}", reason));
        }
        out.push_str(&format!(", time: {:.1}s", self.training_time));
        out
    }
}

/// Backbone output cached for one window
struct CachedWindow {
    embedding: Array2<f64>,
    anchor: f64,
    target: Array1<f64>,
}

impl CachedWindow {
    fn from_sample(model: &TFTModel, sample: &TFTSample) -> Self {
        Self {
            embedding: model.embed(sample),
            anchor: sample.anchor,
            target: sample.target.clone(),
        }
    }
}

/// Validation window scored in price units after training
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub metrics: ForecastMetrics,
    pub interpretation: Interpretation,
}

/// Trainer for the TFT model
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fits the model's quantile head on `table`
    ///
    /// The head with the best validation loss is restored before returning.
    pub fn train(
        &self,
        mut model: TFTModel,
        table: &TimeSeriesTable,
    ) -> Result<TrainedModel, TrainingError> {
        self.config.validate().map_err(TrainingError::InvalidConfig)?;
        model.config.validate().map_err(TrainingError::InvalidConfig)?;

        let start_time = Instant::now();
        let window_config = self
            .config
            .window_config(model.config.encoder_length, model.config.prediction_length);
        let windows = WindowBuilder::fit(table, window_config.clone())?;

        let train_data = windows.training_dataset();
        if train_data.is_empty() {
            return Err(TrainingError::NoTrainingWindows);
        }
        let val_data = windows.validation_dataset();
        if val_data.is_empty() {
            return Err(TrainingError::NoValidationWindows);
        }

        info!(
            "Training on {} windows, validating on {} (encoder {}, horizon {})",
            train_data.len(),
            val_data.len(),
            window_config.encoder_length,
            window_config.prediction_length
        );
        debug!("Training config: {:?}", self.config);

        let train_cache: Vec<CachedWindow> = train_data
            .samples
            .iter()
            .map(|s| CachedWindow::from_sample(&model, s))
            .collect();
        let val_cache: Vec<CachedWindow> = val_data
            .samples
            .iter()
            .map(|s| CachedWindow::from_sample(&model, s))
            .collect();
        debug!(
            "Cached backbone embeddings in {:.1}s",
            start_time.elapsed().as_secs_f64()
        );

        let head = QuantileHead::new(
            model.config.hidden_size,
            model.config.prediction_length,
            model.config.quantiles.len(),
        );
        model.set_head(head);

        let history = self.fit_head(&mut model, &train_cache, &val_cache, start_time)?;

        let validation = val_data
            .samples
            .last()
            .map(|sample| Self::validation_report(&model, &windows, sample));

        Ok(TrainedModel {
            model,
            target_normalizer: windows.target_normalizer().clone(),
            feature_scaler: windows.feature_scaler().clone(),
            window_config,
            history,
            validation,
        })
    }

    fn fit_head(
        &self,
        model: &mut TFTModel,
        train_cache: &[CachedWindow],
        val_cache: &[CachedWindow],
        start_time: Instant,
    ) -> Result<TrainingHistory, TrainingError> {
        let loss_fn = model.loss_fn().clone();
        let dropout = model.config.dropout;
        let mut optimizer = AdamW::new(self.config.learning_rate, self.config.weight_decay);
        let schedule = CosineAnnealing::new(self.config.learning_rate, self.config.t_max);
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut history = TrainingHistory::new(self.config.min_delta);
        let mut best_head = model.head().clone();
        let mut order: Vec<usize> = (0..train_cache.len()).collect();

        for epoch in 0..self.config.max_epochs {
            let learning_rate = schedule.learning_rate(epoch);
            optimizer.set_learning_rate(learning_rate);
            order.shuffle(&mut rng);

            let mut epoch_loss = 0.0;
            for batch in order.chunks(self.config.batch_size) {
                let head = model.head();
                let mut grad_w = Array2::zeros(head.weights.dim());
                let mut grad_b = Array2::zeros(head.horizon_bias.dim());

                for &i in batch {
                    let window = &train_cache[i];
                    let embedding = apply_dropout(&window.embedding, dropout, &mut rng);
                    let prediction = head.forward(&embedding, window.anchor);

                    epoch_loss += loss_fn.loss_single(&window.target, &prediction);
                    let grad_pred = loss_fn.gradient_single(&window.target, &prediction);
                    let (dw, db) = head.gradients(&embedding, &grad_pred);
                    grad_w += &dw;
                    grad_b += &db;
                }

                let n = batch.len() as f64;
                grad_w /= n;
                grad_b /= n;
                if let Some(max_norm) = self.config.gradient_clip_val {
                    clip_grad_norm(&mut [&mut grad_w, &mut grad_b], max_norm);
                }

                let head = model.head_mut();
                optimizer.update_weights(&mut head.weights, &grad_w);
                optimizer.update_biases(&mut head.horizon_bias, &grad_b);
            }

            let train_loss = epoch_loss / train_cache.len() as f64;
            let val_loss = Self::evaluate(model, val_cache);

            if !train_loss.is_finite() || !val_loss.is_finite() {
                warn!("Non-finite loss at epoch {}", epoch + 1);
                return Err(TrainingError::Diverged { epoch: epoch + 1 });
            }

            if history.add_epoch(train_loss, val_loss, learning_rate) {
                best_head = model.head().clone();
            }

            if epoch % self.config.log_every.max(1) == 0 {
                info!(
                    "Epoch {}/{}: train_loss={:.6}, val_loss={:.6}, lr={:.2e}",
                    epoch + 1,
                    self.config.max_epochs,
                    train_loss,
                    val_loss,
                    learning_rate
                );
            }

            if history.should_stop(self.config.patience) {
                info!(
                    "Early stopping at epoch {} (best epoch {})",
                    epoch + 1,
                    history.best_epoch
                );
                history.stop_reason = Some(StopReason::EarlyStopping);
                break;
            }
        }

        if history.stop_reason.is_none() {
            history.stop_reason = Some(StopReason::MaxEpochs);
        }
        model.set_head(best_head);

        history.training_time = start_time.elapsed().as_secs_f64();
        info!("Training finished: {}", history.summary());

        Ok(history)
    }

    /// Mean quantile loss over cached windows
    fn evaluate(model: &TFTModel, cache: &[CachedWindow]) -> f64 {
        if cache.is_empty() {
            return 0.0;
        }
        let loss_fn = model.loss_fn();
        let total: f64 = cache
            .iter()
            .map(|w| {
                let prediction = model.head().forward(&w.embedding, w.anchor);
                loss_fn.loss_single(&w.target, &prediction)
            })
            .sum();
        total / cache.len() as f64
    }

    fn validation_report(
        model: &TFTModel,
        windows: &WindowBuilder<'_>,
        sample: &TFTSample,
    ) -> ValidationReport {
        let (embedding, interpretation) = model.embed_with_interpretation(sample);
        let mut prediction = model.forward_embedded(&embedding, sample.anchor);
        prediction.sort_quantiles();

        let prices = prediction.map(|v| windows.denormalize(v));
        let actual = sample.target.mapv(|v| windows.denormalize(v));
        let metrics = ForecastMetrics::compute(&actual, &prices);
        info!("Validation window: {}", metrics);

        ValidationReport {
            metrics,
            interpretation,
        }
    }
}

/// Inverted dropout on a cached embedding
fn apply_dropout(embedding: &Array2<f64>, rate: f64, rng: &mut StdRng) -> Array2<f64> {
    if rate <= 0.0 {
        return embedding.clone();
    }
    let keep = 1.0 - rate;
    embedding.mapv(|v| if rng.gen::<f64>() < keep { v / keep } else { 0.0 })
}

/// A fitted model together with the normalizers it was trained with
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: TFTModel,
    pub target_normalizer: GroupNormalizer,
    pub feature_scaler: FeatureScaler,
    pub window_config: WindowConfig,
    pub history: TrainingHistory,
    /// Metrics on the last validation window
    pub validation: Option<ValidationReport>,
}

impl TrainedModel {
    /// Forecasts the `prediction_length` days after the last row of `table`
    ///
    /// Uses the last `encoder_length` rows as context; the decoder
    /// covariates are derived from the future calendar days.
    pub fn predict(&self, table: &TimeSeriesTable) -> Result<ForecastResult, TrainingError> {
        let required = self.window_config.encoder_length;
        let insufficient = || TrainingError::InsufficientHistory {
            rows: table.len(),
            required,
        };
        if table.len() < required {
            return Err(insufficient());
        }

        let windows = WindowBuilder::with_normalizers(
            table,
            self.window_config.clone(),
            self.target_normalizer.clone(),
            self.feature_scaler.clone(),
        );
        let sample = windows.forecast_sample().ok_or_else(insufficient)?;
        let last = table.last().ok_or_else(insufficient)?;

        let mut prediction = self.model.forward(&sample);
        prediction.sort_quantiles();
        let prices = prediction.map(|v| self.target_normalizer.inverse(v));

        let lower = prices.lower();
        let median = prices.median();
        let upper = prices.upper();

        let points = (0..self.window_config.prediction_length)
            .map(|t| {
                let timestamp = table
                    .future_timestamp(t + 1)
                    .unwrap_or(last.timestamp);
                ForecastPoint::new(
                    last.time_index + 1 + t,
                    timestamp,
                    lower[t],
                    median[t],
                    upper[t],
                )
            })
            .collect();

        Ok(ForecastResult {
            group_id: table.group_id().to_string(),
            quantiles: prices.quantiles.clone(),
            last_close: last.close,
            last_date: last.date(),
            points,
        })
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PriceRecord;
    use crate::data::Reshaper;
    use crate::model::TFTConfig;

    fn table(n: usize) -> TimeSeriesTable {
        let records: Vec<PriceRecord> = (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.1;
                PriceRecord {
                    timestamp: 1_600_000_000 + i as i64 * 86_400,
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1000.0 + (i % 5) as f64 * 10.0,
                }
            })
            .collect();
        Reshaper::new(12, 4).reshape(&records).unwrap()
    }

    fn model_config() -> TFTConfig {
        TFTConfig {
            hidden_size: 8,
            num_attention_heads: 2,
            num_lstm_layers: 1,
            encoder_length: 12,
            prediction_length: 4,
            ..Default::default()
        }
    }

    fn training_config() -> TrainingConfig {
        TrainingConfig {
            max_epochs: 15,
            batch_size: 16,
            learning_rate: 0.01,
            ..Default::default()
        }
    }

    #[test]
    fn test_training_history() {
        let mut history = TrainingHistory::new(0.0);

        assert!(history.add_epoch(1.0, 0.9, 1e-3));
        assert!(history.add_epoch(0.8, 0.7, 1e-3));
        assert!(history.add_epoch(0.6, 0.6, 1e-3));

        assert_eq!(history.epochs(), 3);
        assert_eq!(history.best_epoch, 3);
        assert!((history.best_val_loss - 0.6).abs() < 1e-10);
    }

    #[test]
    fn test_early_stopping() {
        let mut history = TrainingHistory::new(0.01);

        history.add_epoch(1.0, 0.9, 1e-3);
        history.add_epoch(0.8, 0.8, 1e-3);
        history.add_epoch(0.6, 0.7, 1e-3);
        assert!(!history.should_stop(3));

        // Improvements below min_delta do not count
        history.add_epoch(0.5, 0.695, 1e-3);
        history.add_epoch(0.4, 0.694, 1e-3);
        assert!(!history.should_stop(3));
        history.add_epoch(0.3, 0.693, 1e-3);
        assert!(history.should_stop(3));
        assert_eq!(history.best_epoch, 3);
    }

    #[test]
    fn test_training_config() {
        let config = TrainingConfig::default();

        assert_eq!(config.max_epochs, 100);
        assert_eq!(config.patience, 10);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.gradient_clip_val, Some(0.1));
        assert!(config.validate().is_ok());

        let bad = TrainingConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let no_patience = TrainingConfig {
            patience: 0,
            ..Default::default()
        };
        assert!(no_patience.validate().is_err());
    }

    #[test]
    fn test_train_and_predict() {
        let table = table(120);
        let model = TFTModel::new(model_config()).unwrap();
        let trained = Trainer::new(training_config()).train(model, &table).unwrap();

        let history = trained.history();
        assert!(history.epochs() >= 1 && history.epochs() <= 15);
        assert!(history.best_epoch >= 1);
        assert!(history.stop_reason.is_some());

        let forecast = trained.predict(&table).unwrap();
        assert_eq!(forecast.len(), 4);
        for (t, point) in forecast.points.iter().enumerate() {
            assert_eq!(point.time_index, 120 + t);
            assert!(point.lower <= point.median && point.median <= point.upper);
            assert!(point.median.is_finite());
        }
        assert!(trained.validation.is_some());
    }

    #[test]
    fn test_best_head_is_restored() {
        let table = table(150);
        let model = TFTModel::new(model_config()).unwrap();
        let trained = Trainer::new(training_config()).train(model, &table).unwrap();

        let history = trained.history();
        assert!(history.best_val_loss <= history.val_loss[0]);

        // The restored head reproduces the best validation loss
        let windows = WindowBuilder::with_normalizers(
            &table,
            trained.window_config.clone(),
            trained.target_normalizer.clone(),
            trained.feature_scaler.clone(),
        );
        let val = windows.validation_dataset();
        let loss = trained.model.compute_loss(&val.samples[0]).unwrap();
        assert!((loss - history.best_val_loss).abs() < 1e-9);
    }

    #[test]
    fn test_no_training_windows() {
        // Exactly encoder + horizon rows: only the validation window exists
        let table = table(16);
        let model = TFTModel::new(model_config()).unwrap();
        let result = Trainer::new(training_config()).train(model, &table);

        assert!(matches!(result, Err(TrainingError::NoTrainingWindows)));
    }

    #[test]
    fn test_invalid_training_config() {
        let table = table(120);
        let model = TFTModel::new(model_config()).unwrap();
        let config = TrainingConfig {
            learning_rate: 0.0,
            ..training_config()
        };

        let result = Trainer::new(config).train(model, &table);
        assert!(matches!(result, Err(TrainingError::InvalidConfig(_))));
    }

    #[test]
    fn test_predict_needs_encoder_history() {
        let table = table(120);
        let model = TFTModel::new(model_config()).unwrap();
        let trained = Trainer::new(training_config()).train(model, &table).unwrap();

        let short = self::table(16);
        let rows: Vec<PriceRecord> = short
            .rows()
            .iter()
            .take(10)
            .map(|r| PriceRecord {
                timestamp: r.timestamp,
                open: r.open,
                high: r.high,
                low: r.low,
                close: r.close,
                volume: r.volume,
            })
            .collect();
        let tiny = Reshaper::new(5, 4).reshape(&rows).unwrap();

        let result = trained.predict(&tiny);
        assert!(matches!(
            result,
            Err(TrainingError::InsufficientHistory { rows: 10, required: 12 })
        ));
    }
}
