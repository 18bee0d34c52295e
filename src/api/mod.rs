//! # API Module
//!
//! Client for the CryptoCompare daily price history endpoint.

mod client;
mod types;

pub use client::{CryptoCompareClient, DEFAULT_BASE_URL, MAX_LIMIT};
pub use types::{FetchError, PriceRecord};
