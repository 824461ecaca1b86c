//! Boundary façade
//!
//! One handle over the aggregator, calculator and instrument table. Every
//! read operation returns a serializable [`ApiResponse`] envelope tagged
//! with the source that produced the data, so an HTTP layer or CLI can
//! forward results without reaching into the internals.

use crate::config::Config;
use crate::dispersion::{DispersionCalculator, DispersionResult, MAX_OTM_LEVEL};
use crate::error::MarketDataError;
use crate::instruments::{Instrument, InstrumentSet};
use crate::market::{AggregatorConfig, DataSource, MarketDataAggregator};
use crate::quotes::{BrokerClient, OptionQuoteProvider, SpotFetcher, SyntheticQuotes};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Response envelope for every boundary read
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub data_source: DataSource,
}

/// Poll loop control operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingControl {
    Start,
    Stop,
    SetInterval(u64),
}

/// Push feed control operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushControl {
    Start,
    Stop,
}

/// Top-level monitor handle
pub struct DispersionService {
    aggregator: Arc<MarketDataAggregator>,
    calculator: DispersionCalculator,
    instruments: Arc<InstrumentSet>,
}

impl DispersionService {
    /// Wire the full pipeline from configuration
    ///
    /// Without broker credentials every quote is synthetic; with them the
    /// REST client fetches spots while option premiums stay synthetic, as
    /// the broker exposes no chain endpoint on this plan.
    pub fn from_config(config: &Config) -> Self {
        let instruments = Arc::new(InstrumentSet::banknifty());
        let options = Arc::new(SyntheticQuotes::new());

        let (spots, synthetic): (Arc<dyn SpotFetcher>, bool) =
            match BrokerClient::from_config(&config.broker) {
                Ok(client) => (Arc::new(client), false),
                Err(e) => {
                    tracing::warn!(error = %e, "Broker unavailable, running on synthetic quotes");
                    (Arc::new(SyntheticQuotes::new()), true)
                }
            };

        let aggregator = MarketDataAggregator::new(
            Arc::clone(&instruments),
            AggregatorConfig::from_config(config),
            spots,
            Arc::clone(&options) as Arc<dyn OptionQuoteProvider>,
            synthetic,
        );
        let calculator = DispersionCalculator::new(
            Arc::clone(&instruments),
            config.portfolio.reference_value,
            options,
        );

        Self {
            aggregator,
            calculator,
            instruments,
        }
    }

    /// Bring the preferred quote source up
    pub async fn start(&self) {
        self.aggregator.start().await;
    }

    /// Stop all quote sources
    pub async fn stop(&self) {
        self.aggregator.stop().await;
    }

    pub fn aggregator(&self) -> &Arc<MarketDataAggregator> {
        &self.aggregator
    }

    /// Current ATM dispersion calculation, served from cache when fresh
    pub async fn dispersion_data(
        &self,
    ) -> Result<ApiResponse<DispersionResult>, MarketDataError> {
        let snapshot = self.aggregator.get_snapshot(true).await?;
        let result = self.calculator.calculate(&snapshot)?;
        Ok(self.envelope(result))
    }

    /// Dispersion calculations for OTM levels `1..=levels` (default 1, max 3)
    pub async fn otm_levels(
        &self,
        levels: Option<u32>,
    ) -> Result<ApiResponse<BTreeMap<u32, DispersionResult>>, MarketDataError> {
        let levels = levels.unwrap_or(1).clamp(1, MAX_OTM_LEVEL);
        let snapshot = self.aggregator.get_snapshot(true).await?;
        let results = self.calculator.calculate_otm_levels(&snapshot, levels).await?;
        Ok(self.envelope(results))
    }

    /// Static instrument table, index first
    pub fn constituents(&self) -> ApiResponse<Vec<Instrument>> {
        let table: Vec<Instrument> = self.instruments.all().cloned().collect();
        self.envelope(table)
    }

    /// Active quote source and whether it is synthetic
    pub fn data_source(&self) -> ApiResponse<DataSource> {
        self.envelope(self.aggregator.data_source())
    }

    /// Control the pull poller
    pub async fn control_polling(
        &self,
        control: PollingControl,
    ) -> ApiResponse<&'static str> {
        let message = match control {
            PollingControl::Start => {
                self.aggregator.start_polling();
                "polling started"
            }
            PollingControl::Stop => {
                self.aggregator.stop_polling();
                "polling stopped"
            }
            PollingControl::SetInterval(secs) => {
                self.aggregator.set_poll_interval(secs);
                "poll interval updated"
            }
        };
        self.envelope(message)
    }

    /// Control the push feed
    ///
    /// `Start` is the only path back from polling to push; a failed
    /// connect leaves the current source untouched.
    pub async fn control_push(
        &self,
        control: PushControl,
    ) -> Result<ApiResponse<&'static str>, MarketDataError> {
        let message = match control {
            PushControl::Start => {
                self.aggregator.start_push().await?;
                "push feed started"
            }
            PushControl::Stop => {
                self.aggregator.stop_push().await;
                "push feed stopped"
            }
        };
        Ok(self.envelope(message))
    }

    fn envelope<T>(&self, data: T) -> ApiResponse<T> {
        ApiResponse {
            status: "success",
            data,
            timestamp: Utc::now(),
            data_source: self.aggregator.data_source(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn service() -> DispersionService {
        DispersionService::from_config(&Config::default())
    }

    #[tokio::test]
    async fn test_synthetic_without_credentials() {
        let service = service();
        let source = service.data_source();
        assert!(source.data.synthetic);
        assert_eq!(source.data.mode, "idle");
        assert_eq!(source.status, "success");
    }

    #[tokio::test]
    async fn test_dispersion_data_envelope() {
        let service = service();
        let response = service.dispersion_data().await.unwrap();

        assert_eq!(response.status, "success");
        assert_eq!(response.data.index_leg.symbol, "BANKNIFTY");
        assert_eq!(response.data.constituent_legs.len(), 10);
        assert_eq!(response.data.portfolio_value.target, dec!(60_000_000));
    }

    #[tokio::test]
    async fn test_otm_levels_default_and_clamp() {
        let service = service();

        let default = service.otm_levels(None).await.unwrap();
        assert_eq!(default.data.keys().copied().collect::<Vec<_>>(), vec![1]);

        let clamped = service.otm_levels(Some(10)).await.unwrap();
        assert_eq!(
            clamped.data.keys().copied().collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_constituents_table() {
        let service = service();
        let response = service.constituents();
        assert_eq!(response.data.len(), 11);
        assert_eq!(response.data[0].symbol, "BANKNIFTY");
    }

    #[tokio::test]
    async fn test_polling_controls() {
        let service = service();

        let started = service.control_polling(PollingControl::Start).await;
        assert_eq!(started.data, "polling started");
        assert_eq!(service.data_source().data.mode, "polling");

        let retuned = service
            .control_polling(PollingControl::SetInterval(10))
            .await;
        assert_eq!(retuned.data, "poll interval updated");

        let stopped = service.control_polling(PollingControl::Stop).await;
        assert_eq!(stopped.data, "polling stopped");
        assert_eq!(service.data_source().data.mode, "idle");
    }

    #[tokio::test]
    async fn test_envelope_serializes() {
        let service = service();
        let response = service.dispersion_data().await.unwrap();
        let json = serde_json::to_string(&response).unwrap();

        assert!(json.contains(r#""status":"success""#));
        assert!(json.contains(r#""net_premium""#));
        assert!(json.contains(r#""data_source""#));
    }
}
