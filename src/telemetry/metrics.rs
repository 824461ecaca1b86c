//! Metric recording helpers

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Full snapshot refresh cycle
    SnapshotRefresh,
    /// Single spot price fetch
    SpotFetch,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Net dispersion premium of the last calculation
    NetPremium,
    /// Basket value of the last allocation
    PortfolioValue,
    /// Constituents with valid quotes in the last snapshot
    ActiveConstituents,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Push feed dropped and polling took over
    PushFailover,
    /// Refresh cycle discarded because the index quote was unavailable
    CycleFailure,
    /// Snapshot served from cache
    CacheHit,
    /// Cache stale or empty, refresh required
    CacheMiss,
}

impl LatencyMetric {
    fn name(self) -> &'static str {
        match self {
            LatencyMetric::SnapshotRefresh => "dispmon_snapshot_refresh_ms",
            LatencyMetric::SpotFetch => "dispmon_spot_fetch_ms",
        }
    }
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::NetPremium => "dispmon_net_premium",
            GaugeMetric::PortfolioValue => "dispmon_portfolio_value",
            GaugeMetric::ActiveConstituents => "dispmon_active_constituents",
        }
    }
}

impl CounterMetric {
    fn name(self) -> &'static str {
        match self {
            CounterMetric::PushFailover => "dispmon_push_failover_total",
            CounterMetric::CycleFailure => "dispmon_cycle_failure_total",
            CounterMetric::CacheHit => "dispmon_cache_hit_total",
            CounterMetric::CacheMiss => "dispmon_cache_miss_total",
        }
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    metrics::histogram!(metric.name()).record(duration.as_millis() as f64);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Increment a counter
pub fn incr_counter(metric: CounterMetric) {
    metrics::counter!(metric.name()).increment(1);
}
