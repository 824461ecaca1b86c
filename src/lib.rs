//! dispersion-monitor: BankNifty dispersion trade monitor
//!
//! This library provides the core components for:
//! - Live spot prices over a broker WebSocket push feed with poll fallback
//! - A short-TTL snapshot cache shared by concurrent readers
//! - Push/poll failover orchestration via an explicit state machine
//! - Lot normalization against a fixed reference portfolio notional
//! - Net dispersion premium calculation for ATM and OTM straddle levels
//! - Synthetic quote generation when broker credentials are absent
//! - Full observability stack

pub mod cli;
pub mod config;
pub mod dispersion;
pub mod error;
pub mod instruments;
pub mod market;
pub mod quotes;
pub mod service;
pub mod telemetry;
pub mod ws;
