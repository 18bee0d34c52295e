//! CryptoCompare API client
//!
//! Public client for the daily price history endpoint.

use super::types::*;
use reqwest::Client;
use std::time::Duration;

/// Default public endpoint
pub const DEFAULT_BASE_URL: &str = "https://min-api.cryptocompare.com";

/// Maximum number of bars the `histoday` endpoint returns per request
pub const MAX_LIMIT: u32 = 2000;

/// Client for the CryptoCompare price history API
#[derive(Debug, Clone)]
pub struct CryptoCompareClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CryptoCompareClient {
    /// Creates a client for the public endpoint
    pub fn new() -> Result<Self> {
        Self::with_url(DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL
    pub fn with_url(base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Attaches an API key (sent as `authorization: Apikey <key>`)
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Base URL the client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches daily OHLCV bars, oldest first
    ///
    /// # Arguments
    /// * `symbol` - Asset symbol (e.g. "ETH")
    /// * `currency` - Quote currency (e.g. "USD")
    /// * `days` - Number of days of history (at most 2000 are returned)
    ///
    /// # Example
    /// ```no_run
    /// use tft_forecast::CryptoCompareClient;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = CryptoCompareClient::new().unwrap();
    ///     let records = client.fetch_daily("ETH", "USD", 2000).await.unwrap();
    ///     println!("Fetched {} days", records.len());
    /// }
    /// ```
    pub async fn fetch_daily(
        &self,
        symbol: &str,
        currency: &str,
        days: u32,
    ) -> Result<Vec<PriceRecord>> {
        if symbol.is_empty() || currency.is_empty() {
            return Err(FetchError::InvalidRequest(
                "symbol and currency must not be empty".to_string(),
            ));
        }
        if days == 0 {
            return Err(FetchError::InvalidRequest("days must be > 0".to_string()));
        }

        // The endpoint returns `limit + 1` bars
        let limit = (days - 1).min(MAX_LIMIT);
        if days - 1 > MAX_LIMIT {
            log::warn!(
                "Requested {} days, the endpoint caps a single request at {}",
                days,
                MAX_LIMIT + 1
            );
        }

        let url = format!("{}/data/v2/histoday", self.base_url);
        let limit_str = limit.to_string();
        let params = [
            ("fsym", symbol),
            ("tsym", currency),
            ("limit", limit_str.as_str()),
        ];

        log::info!("Fetching {} days of {}/{} from {}", limit + 1, symbol, currency, url);

        let mut request = self.client.get(&url).query(&params);
        if let Some(key) = &self.api_key {
            request = request.header("authorization", format!("Apikey {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        parse_histoday(&body)
    }
}

/// Parses a `histoday` body into records sorted oldest first
pub(crate) fn parse_histoday(body: &str) -> Result<Vec<PriceRecord>> {
    let response: ApiResponse = serde_json::from_str(body)?;

    if response.response != "Success" {
        return Err(FetchError::Api(if response.message.is_empty() {
            response.response
        } else {
            response.message
        }));
    }

    log::debug!(
        "Response covers {} .. {}",
        response.data.time_from,
        response.data.time_to
    );

    let mut records: Vec<PriceRecord> = response
        .data
        .bars
        .into_iter()
        .map(PriceRecord::from)
        .collect();
    records.sort_by_key(|r| r.timestamp);

    // Days before the listing come back as zero bars
    let first_real = records
        .iter()
        .position(|r| !r.is_empty_bar())
        .unwrap_or(records.len());
    if first_real > 0 {
        log::info!("Dropping {} empty leading bars", first_real);
        records.drain(..first_real);
    }

    let duplicates = records
        .windows(2)
        .filter(|w| w[0].timestamp == w[1].timestamp)
        .count();
    if duplicates > 0 {
        log::debug!("Response contains {} duplicate timestamps", duplicates);
    }

    log::info!("Fetched {} daily bars", records.len());

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64, close: f64) -> String {
        format!(
            r#"{{"time":{},"high":{},"low":{},"open":{},"volumefrom":1.0,"volumeto":2.0,"close":{}}}"#,
            time, close, close, close, close
        )
    }

    #[test]
    fn test_parse_sorts_and_drops_empty_bars() {
        let body = format!(
            r#"{{"Response":"Success","Message":"","Data":{{"TimeFrom":0,"TimeTo":0,"Data":[{},{},{},{}]}}}}"#,
            bar(86_400 * 3, 12.0),
            bar(0, 0.0),
            bar(86_400 * 2, 11.0),
            bar(86_400, 0.0),
        );

        let records = parse_histoday(&body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].close, 11.0);
        assert_eq!(records[1].close, 12.0);
    }

    #[test]
    fn test_parse_api_error() {
        let body = r#"{"Response":"Error","Message":"rate limit","Data":{}}"#;
        assert!(matches!(parse_histoday(body), Err(FetchError::Api(m)) if m == "rate limit"));
    }

    #[test]
    fn test_parse_malformed_json() {
        assert!(matches!(
            parse_histoday("<html>oops</html>"),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = CryptoCompareClient::with_url("http://localhost:1234/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:1234");
    }

    #[tokio::test]
    async fn test_rejects_empty_request() {
        let client = CryptoCompareClient::with_url("http://127.0.0.1:9").unwrap();
        let result = client.fetch_daily("", "USD", 10).await;
        assert!(matches!(result, Err(FetchError::InvalidRequest(_))));

        let result = client.fetch_daily("ETH", "USD", 0).await;
        assert!(matches!(result, Err(FetchError::InvalidRequest(_))));
    }
}
