//! Telemetry module
//!
//! Structured logging and metric recording helpers

mod logging;
mod metrics;

pub use logging::init_logging;
pub use metrics::{incr_counter, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric};

use crate::config::TelemetryConfig;

/// Initialize all telemetry subsystems
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(&config.log_level)
}
