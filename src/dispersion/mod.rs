//! Dispersion trade math
//!
//! [`LotNormalizer`] sizes an integer lot basket against the reference
//! notional; [`DispersionCalculator`] turns a market snapshot into a net
//! premium with full leg breakdowns, at the money or offset to an OTM
//! strike level.

mod calculator;
mod normalizer;
mod types;

pub use calculator::{DispersionCalculator, MAX_OTM_LEVEL};
pub use normalizer::LotNormalizer;
pub use types::{ConstituentLeg, DispersionResult, IndexLeg, LotAllocation, PortfolioValue};
