//! Broker REST client for last-traded prices
//!
//! Thin wrapper over the broker's quote API. Construction fails with
//! `ConfigurationMissing` when credentials are absent, which callers treat
//! as the signal to fall back to synthetic data.

use super::SpotFetcher;
use crate::config::BrokerConfig;
use crate::error::MarketDataError;
use crate::instruments::Instrument;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Default request timeout for quote calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Last-traded-price response, keyed by exchange-qualified symbol
#[derive(Debug, Deserialize)]
struct LtpResponse {
    status: String,
    #[serde(default)]
    data: HashMap<String, LtpEntry>,
}

#[derive(Debug, Deserialize)]
struct LtpEntry {
    last_price: Decimal,
}

/// Authenticated client for the broker quote API
pub struct BrokerClient {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: String,
}

impl BrokerClient {
    /// Build a client from configuration; errors if credentials are absent
    pub fn from_config(config: &BrokerConfig) -> Result<Self, MarketDataError> {
        let (api_key, access_token) = config
            .credentials()
            .ok_or(MarketDataError::ConfigurationMissing)?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MarketDataError::CycleFailure(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key,
            access_token,
        })
    }

    fn auth_header(&self) -> String {
        format!("token {}:{}", self.api_key, self.access_token)
    }

    fn exchange_symbol(instrument: &Instrument) -> String {
        format!("NSE:{}", instrument.symbol)
    }
}

#[async_trait]
impl SpotFetcher for BrokerClient {
    async fn last_price(&self, instrument: &Instrument) -> Result<Decimal, MarketDataError> {
        let symbol = Self::exchange_symbol(instrument);
        let url = format!("{}/quote/ltp", self.base_url);

        tracing::debug!(symbol = %symbol, "Fetching last price");

        let response = self
            .client
            .get(&url)
            .query(&[("i", symbol.as_str())])
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| MarketDataError::transient(&instrument.symbol, e.to_string()))?;

        if !response.status().is_success() {
            return Err(MarketDataError::transient(
                &instrument.symbol,
                format!("quote API returned {}", response.status()),
            ));
        }

        let body: LtpResponse = response
            .json()
            .await
            .map_err(|e| MarketDataError::transient(&instrument.symbol, e.to_string()))?;

        if body.status != "success" {
            return Err(MarketDataError::transient(
                &instrument.symbol,
                format!("quote API status {}", body.status),
            ));
        }

        body.data
            .get(&symbol)
            .map(|entry| entry.last_price)
            .ok_or_else(|| MarketDataError::transient(&instrument.symbol, "no quote in response"))
    }
}
