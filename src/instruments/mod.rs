//! Static instrument definitions
//!
//! The BankNifty index plus its ten constituent banks with exchange lot
//! sizes and index weights. Loaded once, read-only for the process
//! lifetime; callers hold the set behind an `Arc`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;

/// Whether an instrument is the index itself or one of its constituents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentRole {
    Index,
    Constituent,
}

/// A tradeable instrument with its static index metadata
#[derive(Debug, Clone, Serialize)]
pub struct Instrument {
    /// Exchange trading symbol
    pub symbol: String,
    /// Exchange instrument token used for feed subscriptions
    pub token: u32,
    /// Index weight in percent (0-100); 100 for the index itself
    pub weight: Decimal,
    /// Exchange-defined minimum contract quantity
    pub lot_size: u32,
    pub role: InstrumentRole,
}

impl Instrument {
    /// Strike interval for this instrument's option chain
    pub fn strike_interval(&self) -> Decimal {
        match self.role {
            InstrumentRole::Index => dec!(100),
            InstrumentRole::Constituent => dec!(50),
        }
    }
}

/// The index instrument plus its constituents, keyed by symbol
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentSet {
    index: Instrument,
    constituents: BTreeMap<String, Instrument>,
}

impl InstrumentSet {
    pub fn new(index: Instrument, constituents: Vec<Instrument>) -> Self {
        Self {
            index,
            constituents: constituents
                .into_iter()
                .map(|ins| (ins.symbol.clone(), ins))
                .collect(),
        }
    }

    /// The BankNifty index and its ten constituent banks
    pub fn banknifty() -> Self {
        let index = Instrument {
            symbol: "BANKNIFTY".to_string(),
            token: 260_105,
            weight: dec!(100),
            lot_size: 15,
            role: InstrumentRole::Index,
        };

        let constituent = |symbol: &str, token: u32, weight: Decimal, lot_size: u32| Instrument {
            symbol: symbol.to_string(),
            token,
            weight,
            lot_size,
            role: InstrumentRole::Constituent,
        };

        let constituents = vec![
            constituent("HDFCBANK", 341_249, dec!(28.61), 1100),
            constituent("ICICIBANK", 1_270_529, dec!(26.05), 700),
            constituent("SBIN", 779_521, dec!(9.11), 750),
            constituent("KOTAKBANK", 492_033, dec!(8.10), 400),
            constituent("AXISBANK", 54_273, dec!(7.82), 625),
            constituent("INDUSINDBK", 1_346_049, dec!(3.37), 700),
            constituent("FEDERALBNK", 1_023_553, dec!(3.25), 5000),
            constituent("IDFCFIRSTB", 7_712_001, dec!(3.11), 9275),
            constituent("BANDHANBNK", 2_263_297, dec!(2.98), 3600),
            constituent("AUBANK", 4_708_097, dec!(2.79), 1000),
        ];

        Self::new(index, constituents)
    }

    pub fn index(&self) -> &Instrument {
        &self.index
    }

    pub fn constituents(&self) -> &BTreeMap<String, Instrument> {
        &self.constituents
    }

    pub fn constituent(&self, symbol: &str) -> Option<&Instrument> {
        self.constituents.get(symbol)
    }

    /// All instruments, index first
    pub fn all(&self) -> impl Iterator<Item = &Instrument> {
        std::iter::once(&self.index).chain(self.constituents.values())
    }

    /// Feed subscription tokens for every instrument
    pub fn tokens(&self) -> Vec<u32> {
        self.all().map(|ins| ins.token).collect()
    }

    pub fn by_token(&self, token: u32) -> Option<&Instrument> {
        self.all().find(|ins| ins.token == token)
    }

    /// Sum of constituent weights; assumed ~100, not enforced
    pub fn total_weight(&self) -> Decimal {
        self.constituents.values().map(|ins| ins.weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banknifty_table() {
        let set = InstrumentSet::banknifty();
        assert_eq!(set.index().symbol, "BANKNIFTY");
        assert_eq!(set.index().lot_size, 15);
        assert_eq!(set.constituents().len(), 10);

        let hdfc = set.constituent("HDFCBANK").unwrap();
        assert_eq!(hdfc.weight, dec!(28.61));
        assert_eq!(hdfc.lot_size, 1100);
    }

    #[test]
    fn test_weights_sum_near_100() {
        let set = InstrumentSet::banknifty();
        let total = set.total_weight();
        assert!(total > dec!(94) && total < dec!(101), "total weight {total}");
    }

    #[test]
    fn test_strike_intervals() {
        let set = InstrumentSet::banknifty();
        assert_eq!(set.index().strike_interval(), dec!(100));
        assert_eq!(
            set.constituent("SBIN").unwrap().strike_interval(),
            dec!(50)
        );
    }

    #[test]
    fn test_token_lookup() {
        let set = InstrumentSet::banknifty();
        assert_eq!(set.by_token(260_105).unwrap().symbol, "BANKNIFTY");
        assert_eq!(set.by_token(779_521).unwrap().symbol, "SBIN");
        assert!(set.by_token(1).is_none());
    }

    #[test]
    fn test_all_iterates_index_first() {
        let set = InstrumentSet::banknifty();
        let first = set.all().next().unwrap();
        assert_eq!(first.role, InstrumentRole::Index);
        assert_eq!(set.tokens().len(), 11);
    }
}
