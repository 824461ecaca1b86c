//! Market snapshot assembly and distribution
//!
//! Snapshots are immutable once published: the aggregator builds a fresh
//! `MarketSnapshot` per refresh cycle, swaps it into the short-TTL cache
//! and fans it out to subscribers. Stale holders keep valid references.

mod aggregator;
mod cache;

pub use aggregator::{
    AggregatorConfig, DataSource, FeedState, MarketDataAggregator, SnapshotCallback,
};
pub use cache::LiveDataCache;

use crate::quotes::Quote;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-constituent outcome within one snapshot
///
/// A failed fetch is an explicit marker, never a silent omission; the
/// symbol stays visible to consumers which exclude it from allocation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ConstituentEntry {
    Quote(Quote),
    Failed { reason: String },
}

impl ConstituentEntry {
    pub fn quote(&self) -> Option<&Quote> {
        match self {
            ConstituentEntry::Quote(quote) => Some(quote),
            ConstituentEntry::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConstituentEntry::Failed { .. })
    }
}

/// One internally consistent view of the whole market
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    /// Index straddle quote; absent only in degenerate snapshots built by
    /// consumers, never in published ones
    pub index: Option<Quote>,
    pub constituents: BTreeMap<String, ConstituentEntry>,
    pub captured_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Constituent quotes that fetched successfully
    pub fn valid_constituents(&self) -> impl Iterator<Item = (&str, &Quote)> {
        self.constituents
            .iter()
            .filter_map(|(symbol, entry)| entry.quote().map(|q| (symbol.as_str(), q)))
    }

    pub fn failed_count(&self) -> usize {
        self.constituents.values().filter(|e| e.is_failed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn quote(symbol: &str) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            spot: dec!(600),
            atm_strike: dec!(600),
            call_strike: dec!(600),
            put_strike: dec!(600),
            expiry: NaiveDate::from_ymd_opt(2024, 1, 25).unwrap(),
            call_premium: dec!(12),
            put_premium: dec!(11),
        }
    }

    #[test]
    fn test_valid_constituents_skip_failed() {
        let mut constituents = BTreeMap::new();
        constituents.insert(
            "SBIN".to_string(),
            ConstituentEntry::Quote(quote("SBIN")),
        );
        constituents.insert(
            "AUBANK".to_string(),
            ConstituentEntry::Failed {
                reason: "timeout".to_string(),
            },
        );

        let snapshot = MarketSnapshot {
            index: Some(quote("BANKNIFTY")),
            constituents,
            captured_at: Utc::now(),
        };

        let valid: Vec<_> = snapshot.valid_constituents().collect();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].0, "SBIN");
        assert_eq!(snapshot.failed_count(), 1);
    }

    #[test]
    fn test_failed_entry_serializes_with_status() {
        let entry = ConstituentEntry::Failed {
            reason: "timeout".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""status":"failed""#));
        assert!(json.contains("timeout"));
    }
}
