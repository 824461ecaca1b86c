//! Error taxonomy for market data acquisition and calculation

use thiserror::Error;

/// Errors produced by the market data and calculation layers
///
/// None of these are fatal to the service: configuration and transient
/// failures degrade to synthetic or stale data, cycle failures leave the
/// prior cache value authoritative, and `DataIncomplete` surfaces to the
/// caller as a structured error.
#[derive(Debug, Error)]
pub enum MarketDataError {
    /// Broker credentials absent; synthetic data substitutes
    #[error("broker credentials not configured")]
    ConfigurationMissing,

    /// Single-instrument fetch failure, recovered locally as a tagged entry
    #[error("failed to fetch {symbol}: {reason}")]
    TransientFetch { symbol: String, reason: String },

    /// Index quote unobtainable; the whole refresh cycle is discarded
    #[error("refresh cycle failed: {0}")]
    CycleFailure(String),

    /// Calculation invoked on a snapshot missing its legs
    #[error("market snapshot incomplete: {0}")]
    DataIncomplete(String),

    /// Push feed dropped; aggregator fails over to polling
    #[error("push feed connection lost: {0}")]
    ConnectionLost(String),
}

impl MarketDataError {
    /// Convenience constructor for per-instrument failures
    pub fn transient(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransientFetch {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }
}
