//! Types for the CryptoCompare historical price API

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while fetching price history
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result of a fetch operation
pub type Result<T> = std::result::Result<T, FetchError>;

/// One daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Start of the day (Unix timestamp in seconds, UTC)
    pub timestamp: i64,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume in the quote currency
    pub volume: f64,
}

impl PriceRecord {
    /// Returns the timestamp as a `DateTime`
    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Returns the calendar day of the bar
    pub fn date(&self) -> NaiveDate {
        self.datetime().date_naive()
    }

    /// Returns the bar range (high - low)
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Returns the close-to-open return
    pub fn returns(&self) -> f64 {
        if self.open == 0.0 {
            0.0
        } else {
            (self.close - self.open) / self.open
        }
    }

    /// True when every price field is zero (days before the asset was listed)
    pub fn is_empty_bar(&self) -> bool {
        self.open == 0.0 && self.high == 0.0 && self.low == 0.0 && self.close == 0.0
    }
}

/// Top level `histoday` response
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse {
    #[serde(rename = "Response")]
    pub response: String,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "Data", default)]
    pub data: HistoData,
}

/// Payload of a successful response. Empty object on errors.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoData {
    #[serde(rename = "TimeFrom", default)]
    pub time_from: i64,
    #[serde(rename = "TimeTo", default)]
    pub time_to: i64,
    #[serde(rename = "Data", default)]
    pub bars: Vec<HistoBar>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoBar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(rename = "volumeto", default)]
    pub volume_to: f64,
}

impl From<HistoBar> for PriceRecord {
    fn from(bar: HistoBar) -> Self {
        Self {
            timestamp: bar.time,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume_to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_calculations() {
        let record = PriceRecord {
            timestamp: 1_700_000_000,
            open: 100.0,
            high: 110.0,
            low: 95.0,
            close: 105.0,
            volume: 1000.0,
        };

        assert_eq!(record.range(), 15.0);
        assert!((record.returns() - 0.05).abs() < 1e-10);
        assert_eq!(record.date(), NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
        assert!(!record.is_empty_bar());
    }

    #[test]
    fn test_parse_success_response() {
        let body = r#"{
            "Response": "Success",
            "Message": "",
            "HasWarning": false,
            "Type": 100,
            "RateLimit": {},
            "Data": {
                "Aggregated": false,
                "TimeFrom": 1700000000,
                "TimeTo": 1700086400,
                "Data": [
                    {"time": 1700000000, "high": 2.0, "low": 1.0, "open": 1.5, "volumefrom": 10.0,
                     "volumeto": 15.0, "close": 1.8, "conversionType": "direct", "conversionSymbol": ""},
                    {"time": 1700086400, "high": 2.1, "low": 1.1, "open": 1.8, "volumefrom": 11.0,
                     "volumeto": 16.0, "close": 2.0, "conversionType": "direct", "conversionSymbol": ""}
                ]
            }
        }"#;

        let response: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.response, "Success");
        assert_eq!(response.data.bars.len(), 2);

        let record = PriceRecord::from(response.data.bars.into_iter().next().unwrap());
        assert_eq!(record.volume, 15.0);
        assert_eq!(record.close, 1.8);
    }

    #[test]
    fn test_parse_error_response() {
        let body = r#"{"Response":"Error","Message":"fsym param is empty or null.","HasWarning":false,
            "Type":2,"RateLimit":{},"Data":{},"ParamWithError":"fsym"}"#;

        let response: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.response, "Error");
        assert!(response.data.bars.is_empty());
        assert!(response.message.contains("fsym"));
    }
}
