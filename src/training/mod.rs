//! # Training Module
//!
//! Fitting the quantile head, learning-rate schedule and forecasting.

mod forecast;
mod optimizer;
mod trainer;

pub use forecast::{ForecastPoint, ForecastResult};
pub use optimizer::{clip_grad_norm, AdamW, CosineAnnealing, Optimizer};
pub use trainer::{
    StopReason, TrainedModel, Trainer, TrainingConfig, TrainingError, TrainingHistory,
    ValidationReport,
};
