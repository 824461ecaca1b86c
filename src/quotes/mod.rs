//! Quote acquisition
//!
//! Two source strategies feed the aggregator: a WebSocket push feed
//! ([`PushFeed`]) streaming last prices into an in-memory book, and a
//! periodic pull poller ([`PullPoller`]) driving fetch-all passes. The
//! per-instrument fetch and the option chain are injected capabilities
//! ([`SpotFetcher`], [`OptionQuoteProvider`]) implemented by the broker
//! REST client and by the synthetic generator used when credentials are
//! absent.

mod broker;
mod poll;
mod push;
mod synthetic;
mod types;

pub use broker::BrokerClient;
pub use poll::PullPoller;
pub use push::PushFeed;
pub use synthetic::SyntheticQuotes;
pub use types::{atm_strike, next_monthly_expiry, Quote};

use crate::error::MarketDataError;
use crate::instruments::Instrument;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Option contract side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

/// Events emitted by an active push subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    /// At least one tick was applied to the price book
    Tick,
    /// The connection dropped; the source will not retry on its own
    Lost,
}

/// Per-instrument last-traded-price fetch
#[async_trait]
pub trait SpotFetcher: Send + Sync {
    async fn last_price(&self, instrument: &Instrument) -> Result<Decimal, MarketDataError>;
}

/// Option premium lookup for a specific strike and expiry
///
/// Injected capability: the caller substitutes the synthetic generator
/// when the provider is absent or erroring.
#[async_trait]
pub trait OptionQuoteProvider: Send + Sync {
    async fn premium(
        &self,
        instrument: &Instrument,
        spot: Decimal,
        strike: Decimal,
        kind: OptionKind,
        expiry: NaiveDate,
    ) -> Result<Decimal, MarketDataError>;
}
