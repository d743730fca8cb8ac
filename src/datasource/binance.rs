//! Binance USDⓈ-M futures REST client implementation.

use super::{DataSource, DataSourceError, RawFill, RawIncome};
use crate::domain::{IncomeCategory, Symbol, TimeMs, TimeWindow};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";
const RECV_WINDOW_MS: i64 = 5000;

/// Signed access to the account trade list and income history.
#[derive(Clone)]
pub struct BinanceDataSource {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl fmt::Debug for BinanceDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceDataSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BinanceDataSource {
    pub fn new(base_url: String, api_key: String, api_secret: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
        }
    }

    /// Create with the production futures API URL.
    pub fn default_url(api_key: String, api_secret: String) -> Self {
        Self::new(DEFAULT_BASE_URL.to_string(), api_key, api_secret)
    }

    fn sign(&self, query: &str) -> Result<String, DataSourceError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| DataSourceError::Other(format!("invalid API secret: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Signed GET. Only HTTP 429 is retried; every other failure is returned
    /// to the caller as-is.
    async fn signed_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<(&'static str, String)>,
    ) -> Result<T, DataSourceError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            // Timestamp is part of the signature, so re-sign on every attempt.
            let url = self
                .signed_url(path, &params, TimeMs::now())
                .map_err(backoff::Error::permanent)?;

            let response = self
                .client
                .get(&url)
                .header("X-MBX-APIKEY", &self.api_key)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::permanent(DataSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                debug!("Rate limited on {}, backing off", path);
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message,
                }));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }

    fn signed_url(
        &self,
        path: &str,
        params: &[(&'static str, String)],
        now: TimeMs,
    ) -> Result<String, DataSourceError> {
        let mut query = encode_query(params);
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={}",
            RECV_WINDOW_MS,
            now.as_ms()
        ));
        let signature = self.sign(&query)?;
        Ok(format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query, signature
        ))
    }
}

fn encode_query(params: &[(&'static str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// The exchange treats `endTime` as inclusive.
fn inclusive_end(window: &TimeWindow) -> i64 {
    window.end.as_ms() - 1
}

#[async_trait]
impl DataSource for BinanceDataSource {
    async fn fetch_fills_page(
        &self,
        symbol: &Symbol,
        window: TimeWindow,
        from_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<RawFill>, DataSourceError> {
        debug!(
            "Fetching fills for symbol={}, from_id={:?}, start={}, end={}",
            symbol, from_id, window.start, window.end
        );

        let mut params = vec![("symbol", symbol.as_str().to_string())];
        // fromId cannot be combined with a time range; the harness confines the
        // result to the window and stops once a page runs past its end.
        match from_id {
            Some(id) => params.push(("fromId", id.to_string())),
            None => {
                params.push(("startTime", window.start.as_ms().to_string()));
                params.push(("endTime", inclusive_end(&window).to_string()));
            }
        }
        params.push(("limit", limit.to_string()));

        self.signed_get("/fapi/v1/userTrades", params).await
    }

    async fn fetch_income_page(
        &self,
        window: TimeWindow,
        category: Option<&IncomeCategory>,
        income_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<RawIncome>, DataSourceError> {
        debug!(
            "Fetching income category={:?}, income_id={:?}, start={}, end={}",
            category.map(|c| c.as_wire()),
            income_id,
            window.start,
            window.end
        );

        let mut params = Vec::new();
        if let Some(category) = category {
            params.push(("incomeType", category.as_wire().to_string()));
        }
        params.push(("startTime", window.start.as_ms().to_string()));
        params.push(("endTime", inclusive_end(&window).to_string()));
        if let Some(id) = income_id {
            params.push(("incomeId", id.to_string()));
        }
        params.push(("limit", limit.to_string()));

        self.signed_get("/fapi/v1/income", params).await
    }
}
