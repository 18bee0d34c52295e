//! # Data Module
//!
//! Reshaping, scaling and windowing of the price history for the TFT.

mod dataset;
mod loader;
mod reshape;
mod scaler;

pub use dataset::{
    BatchIterator, Dataset, TFTSample, WindowBuilder, WindowConfig, DECODER_FEATURES,
    ENCODER_FEATURES, STATIC_FEATURES,
};
pub use loader::{load_records, save_records, StorageError, CSV_HEADER};
pub use reshape::{
    day_of_week_encoding, timestamp_to_datetime, Reshaper, SchemaError, TimeSeriesRow,
    TimeSeriesTable,
};
pub use scaler::{FeatureScaler, GroupNormalizer, StandardScaler};
