//! Calculation output types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Integer lot sizing for one snapshot
///
/// Every entry is at least one lot; constituents without a usable quote
/// are absent rather than zero-filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotAllocation {
    pub index_lots: i64,
    pub constituent_lots: BTreeMap<String, i64>,
}

/// Index straddle leg of the trade
#[derive(Debug, Clone, Serialize)]
pub struct IndexLeg {
    pub symbol: String,
    pub spot: Decimal,
    pub call_strike: Decimal,
    pub put_strike: Decimal,
    pub call_premium: Decimal,
    pub put_premium: Decimal,
    /// Call plus put premium for one unit
    pub straddle_price: Decimal,
    pub lots: i64,
    pub lot_size: u32,
    /// Total premium across the sized position
    pub premium: Decimal,
}

/// One constituent straddle leg
#[derive(Debug, Clone, Serialize)]
pub struct ConstituentLeg {
    pub symbol: String,
    pub spot: Decimal,
    /// Index weight in percent
    pub weight: Decimal,
    pub lot_size: u32,
    pub lots: i64,
    pub call_strike: Decimal,
    pub put_strike: Decimal,
    pub call_premium: Decimal,
    pub put_premium: Decimal,
    pub straddle_price: Decimal,
    pub premium: Decimal,
}

/// Cash value of the sized constituent basket against its target
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioValue {
    pub total: Decimal,
    pub target: Decimal,
    /// Per-symbol notional, spot times lot size times lots
    pub breakdown: BTreeMap<String, Decimal>,
}

/// Full dispersion calculation for one snapshot and strike level
#[derive(Debug, Clone, Serialize)]
pub struct DispersionResult {
    /// Index premium minus the sum of constituent premiums
    pub net_premium: Decimal,
    pub index_leg: IndexLeg,
    pub constituent_legs: BTreeMap<String, ConstituentLeg>,
    pub portfolio_value: PortfolioValue,
    pub captured_at: DateTime<Utc>,
}
