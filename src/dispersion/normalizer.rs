//! Lot normalization against the reference notional
//!
//! Sizing is re-derived from every snapshot, never carried over: the index
//! takes the full reference value, each constituent its index weight's
//! share, and both round to whole lots with a floor of one.

use super::LotAllocation;
use crate::error::MarketDataError;
use crate::instruments::InstrumentSet;
use crate::market::MarketSnapshot;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Sizes integer lot baskets against a fixed reference notional
#[derive(Debug, Clone)]
pub struct LotNormalizer {
    reference: Decimal,
}

impl LotNormalizer {
    pub fn new(reference: Decimal) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> Decimal {
        self.reference
    }

    /// Lot allocation for one snapshot
    ///
    /// Constituents with a failed or zero-spot quote are left out of the
    /// allocation entirely. A snapshot without an index quote cannot be
    /// sized at all.
    pub fn allocate(
        &self,
        instruments: &InstrumentSet,
        snapshot: &MarketSnapshot,
    ) -> Result<LotAllocation, MarketDataError> {
        let index_quote = snapshot
            .index
            .as_ref()
            .ok_or_else(|| MarketDataError::DataIncomplete("index quote missing".to_string()))?;
        if index_quote.spot <= Decimal::ZERO {
            return Err(MarketDataError::DataIncomplete(
                "index spot price is not positive".to_string(),
            ));
        }

        let index = instruments.index();
        let index_lot_value = index_quote.spot * Decimal::from(index.lot_size);
        let index_lots = round_lots(self.reference / index_lot_value);

        let mut constituent_lots = BTreeMap::new();
        for (symbol, quote) in snapshot.valid_constituents() {
            let Some(instrument) = instruments.constituent(symbol) else {
                continue;
            };
            if quote.spot <= Decimal::ZERO {
                continue;
            }
            let lot_value = quote.spot * Decimal::from(instrument.lot_size);
            let target = self.reference * instrument.weight / Decimal::ONE_HUNDRED;
            constituent_lots.insert(symbol.to_string(), round_lots(target / lot_value));
        }

        Ok(LotAllocation {
            index_lots,
            constituent_lots,
        })
    }
}

/// Round to whole lots, holding every sized position at one lot minimum
fn round_lots(value: Decimal) -> i64 {
    value.round().to_i64().unwrap_or(1).max(1)
}
