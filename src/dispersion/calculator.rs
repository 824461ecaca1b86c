//! Net premium calculation
//!
//! The trade is long the index straddle leg and short the weighted
//! constituent straddles, so net premium is the index outflow minus the
//! constituent inflow. OTM variants reprice every leg at strikes offset
//! from ATM by whole level intervals; sizing is unchanged because it
//! depends only on spots.

use super::{
    ConstituentLeg, DispersionResult, IndexLeg, LotNormalizer, PortfolioValue,
};
use crate::error::MarketDataError;
use crate::instruments::{Instrument, InstrumentSet};
use crate::market::MarketSnapshot;
use crate::quotes::{OptionKind, OptionQuoteProvider, Quote, SyntheticQuotes};
use crate::telemetry::{set_gauge, GaugeMetric};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Deepest supported out-of-the-money strike level
pub const MAX_OTM_LEVEL: u32 = 3;

/// Turns market snapshots into sized dispersion trade calculations
pub struct DispersionCalculator {
    instruments: Arc<InstrumentSet>,
    normalizer: LotNormalizer,
    options: Arc<dyn OptionQuoteProvider>,
}

impl DispersionCalculator {
    pub fn new(
        instruments: Arc<InstrumentSet>,
        reference: Decimal,
        options: Arc<dyn OptionQuoteProvider>,
    ) -> Self {
        Self {
            instruments,
            normalizer: LotNormalizer::new(reference),
            options,
        }
    }

    /// At-the-money calculation straight off the snapshot quotes
    pub fn calculate(&self, snapshot: &MarketSnapshot) -> Result<DispersionResult, MarketDataError> {
        let index_quote = self.required_index(snapshot)?;
        let constituents: BTreeMap<String, Quote> = snapshot
            .valid_constituents()
            .map(|(symbol, quote)| (symbol.to_string(), quote.clone()))
            .collect();
        self.assemble(snapshot, index_quote.clone(), constituents)
    }

    /// Calculation with every strike offset `level` intervals out of the money
    ///
    /// Calls move up, puts move down. A premium the provider cannot supply
    /// is substituted by the synthetic generator at the offset strike, so
    /// every valid snapshot leg stays in the calculation.
    pub async fn calculate_otm(
        &self,
        snapshot: &MarketSnapshot,
        level: u32,
    ) -> Result<DispersionResult, MarketDataError> {
        let level = level.clamp(1, MAX_OTM_LEVEL);
        let index_quote = self.required_index(snapshot)?;

        let index_quote = self
            .reprice(self.instruments.index(), index_quote, level)
            .await;

        let mut constituents = BTreeMap::new();
        for (symbol, quote) in snapshot.valid_constituents() {
            let Some(instrument) = self.instruments.constituent(symbol) else {
                continue;
            };
            let shifted = self.reprice(instrument, quote, level).await;
            constituents.insert(symbol.to_string(), shifted);
        }

        self.assemble(snapshot, index_quote, constituents)
    }

    /// Independent calculations for levels `1..=min(levels, 3)`
    pub async fn calculate_otm_levels(
        &self,
        snapshot: &MarketSnapshot,
        levels: u32,
    ) -> Result<BTreeMap<u32, DispersionResult>, MarketDataError> {
        let levels = levels.clamp(1, MAX_OTM_LEVEL);
        let mut results = BTreeMap::new();
        for level in 1..=levels {
            results.insert(level, self.calculate_otm(snapshot, level).await?);
        }
        Ok(results)
    }

    fn required_index<'a>(
        &self,
        snapshot: &'a MarketSnapshot,
    ) -> Result<&'a Quote, MarketDataError> {
        if snapshot.constituents.is_empty() {
            return Err(MarketDataError::DataIncomplete(
                "snapshot has no constituent entries".to_string(),
            ));
        }
        snapshot
            .index
            .as_ref()
            .ok_or_else(|| MarketDataError::DataIncomplete("index quote missing".to_string()))
    }

    /// Same quote with strikes and premiums moved `level` intervals out
    async fn reprice(&self, instrument: &Instrument, quote: &Quote, level: u32) -> Quote {
        let offset = instrument.strike_interval() * Decimal::from(level);
        let call_strike = quote.atm_strike + offset;
        let put_strike = quote.atm_strike - offset;

        let call_premium = self
            .premium_or_synthetic(instrument, quote.spot, call_strike, OptionKind::Call, quote.expiry)
            .await;
        let put_premium = self
            .premium_or_synthetic(instrument, quote.spot, put_strike, OptionKind::Put, quote.expiry)
            .await;

        Quote {
            call_strike,
            put_strike,
            call_premium,
            put_premium,
            ..quote.clone()
        }
    }

    /// Provider premium, with the synthetic generator substituting on error
    async fn premium_or_synthetic(
        &self,
        instrument: &Instrument,
        spot: Decimal,
        strike: Decimal,
        kind: OptionKind,
        expiry: chrono::NaiveDate,
    ) -> Decimal {
        match self
            .options
            .premium(instrument, spot, strike, kind, expiry)
            .await
        {
            Ok(premium) => premium,
            Err(e) => {
                tracing::debug!(
                    symbol = %instrument.symbol,
                    ?kind,
                    error = %e,
                    "Option quote failed, substituting synthetic premium"
                );
                SyntheticQuotes::premium_at(instrument, spot, strike, kind)
            }
        }
    }

    /// Size the basket and total the legs
    fn assemble(
        &self,
        snapshot: &MarketSnapshot,
        index_quote: Quote,
        constituents: BTreeMap<String, Quote>,
    ) -> Result<DispersionResult, MarketDataError> {
        let allocation = self.normalizer.allocate(&self.instruments, snapshot)?;

        let index = self.instruments.index();
        let index_straddle = index_quote.straddle_premium();
        let index_premium =
            index_straddle * Decimal::from(index.lot_size) * Decimal::from(allocation.index_lots);
        let index_leg = IndexLeg {
            symbol: index_quote.symbol.clone(),
            spot: index_quote.spot,
            call_strike: index_quote.call_strike,
            put_strike: index_quote.put_strike,
            call_premium: index_quote.call_premium,
            put_premium: index_quote.put_premium,
            straddle_price: index_straddle,
            lots: allocation.index_lots,
            lot_size: index.lot_size,
            premium: index_premium.round_dp(2),
        };

        let mut constituent_legs = BTreeMap::new();
        let mut breakdown = BTreeMap::new();
        let mut constituent_premium = Decimal::ZERO;
        let mut portfolio_total = Decimal::ZERO;

        for (symbol, quote) in &constituents {
            let Some(instrument) = self.instruments.constituent(symbol) else {
                continue;
            };
            let Some(&lots) = allocation.constituent_lots.get(symbol) else {
                continue;
            };

            let straddle = quote.straddle_premium();
            let premium = straddle * Decimal::from(instrument.lot_size) * Decimal::from(lots);
            let notional = quote.spot * Decimal::from(instrument.lot_size) * Decimal::from(lots);

            constituent_premium += premium;
            portfolio_total += notional;
            breakdown.insert(symbol.clone(), notional.round_dp(2));
            constituent_legs.insert(
                symbol.clone(),
                ConstituentLeg {
                    symbol: symbol.clone(),
                    spot: quote.spot,
                    weight: instrument.weight,
                    lot_size: instrument.lot_size,
                    lots,
                    call_strike: quote.call_strike,
                    put_strike: quote.put_strike,
                    call_premium: quote.call_premium,
                    put_premium: quote.put_premium,
                    straddle_price: straddle,
                    premium: premium.round_dp(2),
                },
            );
        }

        let net_premium = (index_premium - constituent_premium).round_dp(2);
        set_gauge(GaugeMetric::NetPremium, net_premium.to_f64().unwrap_or(0.0));
        set_gauge(
            GaugeMetric::PortfolioValue,
            portfolio_total.to_f64().unwrap_or(0.0),
        );

        Ok(DispersionResult {
            net_premium,
            index_leg,
            constituent_legs,
            portfolio_value: PortfolioValue {
                total: portfolio_total.round_dp(2),
                target: self.normalizer.reference(),
                breakdown,
            },
            captured_at: snapshot.captured_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{ConstituentEntry, MarketDataAggregator, AggregatorConfig};
    use crate::quotes::SyntheticQuotes;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    async fn synthetic_snapshot() -> Arc<MarketSnapshot> {
        let aggregator = MarketDataAggregator::new(
            Arc::new(InstrumentSet::banknifty()),
            AggregatorConfig::default(),
            Arc::new(SyntheticQuotes::new()),
            Arc::new(SyntheticQuotes::new()),
            true,
        );
        aggregator.get_snapshot(false).await.unwrap()
    }

    fn calculator() -> DispersionCalculator {
        DispersionCalculator::new(
            Arc::new(InstrumentSet::banknifty()),
            dec!(60_000_000),
            Arc::new(SyntheticQuotes::new()),
        )
    }

    #[tokio::test]
    async fn test_atm_calculation_totals() {
        let snapshot = synthetic_snapshot().await;
        let result = calculator().calculate(&snapshot).unwrap();

        let index = &result.index_leg;
        assert_eq!(index.symbol, "BANKNIFTY");
        assert_eq!(index.lots, 89);
        assert_eq!(index.lot_size, 15);
        assert_eq!(
            index.straddle_price,
            index.call_premium + index.put_premium
        );
        assert_eq!(
            index.premium,
            (index.straddle_price * dec!(15) * dec!(89)).round_dp(2)
        );

        assert_eq!(result.constituent_legs.len(), 10);
        let constituent_total: Decimal =
            result.constituent_legs.values().map(|leg| leg.premium).sum();
        assert_eq!(
            result.net_premium,
            (index.premium - constituent_total).round_dp(2)
        );
    }

    #[tokio::test]
    async fn test_portfolio_value_matches_breakdown() {
        let snapshot = synthetic_snapshot().await;
        let result = calculator().calculate(&snapshot).unwrap();

        let breakdown_total: Decimal = result.portfolio_value.breakdown.values().sum();
        assert_eq!(result.portfolio_value.total, breakdown_total.round_dp(2));
        assert_eq!(result.portfolio_value.target, dec!(60_000_000));

        let hdfc = &result.constituent_legs["HDFCBANK"];
        assert_eq!(
            result.portfolio_value.breakdown["HDFCBANK"],
            hdfc.spot * Decimal::from(hdfc.lot_size) * Decimal::from(hdfc.lots)
        );
    }

    #[tokio::test]
    async fn test_failed_constituent_drops_out_of_legs() {
        let snapshot = synthetic_snapshot().await;
        let mut snapshot = (*snapshot).clone();
        snapshot.constituents.insert(
            "SBIN".to_string(),
            ConstituentEntry::Failed {
                reason: "timeout".to_string(),
            },
        );

        let result = calculator().calculate(&snapshot).unwrap();
        assert_eq!(result.constituent_legs.len(), 9);
        assert!(!result.constituent_legs.contains_key("SBIN"));
        assert!(!result.portfolio_value.breakdown.contains_key("SBIN"));
    }

    #[tokio::test]
    async fn test_missing_index_rejected() {
        let snapshot = synthetic_snapshot().await;
        let mut snapshot = (*snapshot).clone();
        snapshot.index = None;

        let err = calculator().calculate(&snapshot).unwrap_err();
        assert!(matches!(err, MarketDataError::DataIncomplete(_)));
    }

    #[tokio::test]
    async fn test_empty_snapshot_rejected() {
        let snapshot = MarketSnapshot {
            index: None,
            constituents: BTreeMap::new(),
            captured_at: chrono::Utc::now(),
        };
        let err = calculator().calculate(&snapshot).unwrap_err();
        assert!(matches!(err, MarketDataError::DataIncomplete(_)));
    }

    #[tokio::test]
    async fn test_otm_strikes_offset_by_level() {
        let snapshot = synthetic_snapshot().await;
        let calculator = calculator();

        for level in 1..=MAX_OTM_LEVEL {
            let result = calculator.calculate_otm(&snapshot, level).await.unwrap();
            let offset = Decimal::from(level);

            let index = &result.index_leg;
            assert_eq!(index.call_strike, dec!(45000) + dec!(100) * offset);
            assert_eq!(index.put_strike, dec!(45000) - dec!(100) * offset);

            let sbin = &result.constituent_legs["SBIN"];
            assert_eq!(sbin.call_strike, dec!(600) + dec!(50) * offset);
            assert_eq!(sbin.put_strike, dec!(600) - dec!(50) * offset);
        }
    }

    #[tokio::test]
    async fn test_otm_sizing_matches_atm() {
        let snapshot = synthetic_snapshot().await;
        let calculator = calculator();

        let atm = calculator.calculate(&snapshot).unwrap();
        let otm = calculator.calculate_otm(&snapshot, 2).await.unwrap();

        assert_eq!(otm.index_leg.lots, atm.index_leg.lots);
        for (symbol, leg) in &otm.constituent_legs {
            assert_eq!(leg.lots, atm.constituent_legs[symbol].lots);
        }
    }

    #[tokio::test]
    async fn test_otm_level_clamped() {
        let snapshot = synthetic_snapshot().await;
        let calculator = calculator();

        let deep = calculator.calculate_otm(&snapshot, 9).await.unwrap();
        let max = calculator.calculate_otm(&snapshot, MAX_OTM_LEVEL).await.unwrap();
        assert_eq!(deep.index_leg.call_strike, max.index_leg.call_strike);
    }

    #[tokio::test]
    async fn test_otm_levels_map() {
        let snapshot = synthetic_snapshot().await;
        let results = calculator()
            .calculate_otm_levels(&snapshot, 3)
            .await
            .unwrap();

        assert_eq!(
            results.keys().copied().collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        // Levels are independent, not cumulative
        assert_eq!(
            results[&2].index_leg.call_strike - results[&1].index_leg.call_strike,
            dec!(100)
        );
    }

    /// Provider erroring for one symbol
    struct FlakyOptions {
        failing: &'static str,
    }

    #[async_trait]
    impl OptionQuoteProvider for FlakyOptions {
        async fn premium(
            &self,
            instrument: &Instrument,
            spot: Decimal,
            strike: Decimal,
            kind: OptionKind,
            _expiry: NaiveDate,
        ) -> Result<Decimal, MarketDataError> {
            if instrument.symbol == self.failing {
                return Err(MarketDataError::transient(&instrument.symbol, "no chain"));
            }
            Ok(SyntheticQuotes::premium_at(instrument, spot, strike, kind))
        }
    }

    fn calculator_with(options: Arc<dyn OptionQuoteProvider>) -> DispersionCalculator {
        DispersionCalculator::new(
            Arc::new(InstrumentSet::banknifty()),
            dec!(60_000_000),
            options,
        )
    }

    #[tokio::test]
    async fn test_otm_constituent_reprice_error_substitutes_synthetic() {
        let snapshot = synthetic_snapshot().await;
        let calculator = calculator_with(Arc::new(FlakyOptions { failing: "AXISBANK" }));

        let result = calculator.calculate_otm(&snapshot, 1).await.unwrap();
        assert_eq!(result.constituent_legs.len(), 10);

        // The failing symbol stays in the legs, priced off the generator at
        // the offset strikes
        let set = InstrumentSet::banknifty();
        let axis = set.constituent("AXISBANK").unwrap();
        let leg = &result.constituent_legs["AXISBANK"];
        assert_eq!(
            leg.call_premium,
            SyntheticQuotes::premium_at(axis, leg.spot, leg.call_strike, OptionKind::Call)
        );
        assert_eq!(
            leg.put_premium,
            SyntheticQuotes::premium_at(axis, leg.spot, leg.put_strike, OptionKind::Put)
        );
    }

    #[tokio::test]
    async fn test_otm_index_reprice_error_substitutes_synthetic() {
        let snapshot = synthetic_snapshot().await;
        let calculator = calculator_with(Arc::new(FlakyOptions { failing: "BANKNIFTY" }));

        // A valid snapshot must still produce a level, never DataIncomplete
        let result = calculator.calculate_otm(&snapshot, 2).await.unwrap();

        let set = InstrumentSet::banknifty();
        let index = &result.index_leg;
        assert_eq!(index.call_strike, dec!(45200));
        assert_eq!(
            index.call_premium,
            SyntheticQuotes::premium_at(set.index(), index.spot, index.call_strike, OptionKind::Call)
        );
        assert_eq!(result.constituent_legs.len(), 10);
    }
}
