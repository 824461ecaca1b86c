//! Market data orchestration
//!
//! Owns the push/poll failover state machine, the snapshot cache and the
//! subscriber fan-out. Push loss fails over to polling automatically; the
//! reverse upgrade only happens on an explicit `retry_push`, so a flapping
//! feed cannot bounce the monitor between sources.

use super::{ConstituentEntry, LiveDataCache, MarketSnapshot};
use crate::config::Config;
use crate::error::MarketDataError;
use crate::instruments::{Instrument, InstrumentSet};
use crate::quotes::{
    atm_strike, next_monthly_expiry, FeedEvent, OptionKind, OptionQuoteProvider, PullPoller,
    PushFeed, Quote, SpotFetcher, SyntheticQuotes,
};
use crate::telemetry::{incr_counter, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric};
use chrono::{NaiveDate, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

/// Push-side publications are coalesced to at most one snapshot per this
/// interval regardless of tick rate
const PUSH_PUBLISH_INTERVAL: Duration = Duration::from_secs(1);

/// Data source state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    Idle,
    PushActive,
    PollActive,
}

impl FeedState {
    /// Boundary-facing label for the active source
    pub fn label(self) -> &'static str {
        match self {
            FeedState::Idle => "idle",
            FeedState::PushActive => "websocket",
            FeedState::PollActive => "polling",
        }
    }
}

/// Where quotes are currently coming from
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DataSource {
    pub mode: &'static str,
    pub synthetic: bool,
}

/// Callback invoked on every newly published snapshot
pub type SnapshotCallback = Box<dyn Fn(Arc<MarketSnapshot>) -> anyhow::Result<()> + Send + Sync>;

/// Aggregator tuning, derived from [`Config`]
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub poll_interval: Duration,
    pub worker_pool_size: usize,
    pub fetch_timeout: Duration,
    pub cache_ttl: Duration,
    /// Push feed URL, already carrying auth query parameters if configured
    pub ws_url: String,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl AggregatorConfig {
    pub fn from_config(config: &Config) -> Self {
        let ws_url = match config.broker.credentials() {
            Some((key, token)) => format!(
                "{}?api_key={}&access_token={}",
                config.broker.ws_url, key, token
            ),
            None => config.broker.ws_url.clone(),
        };

        Self {
            poll_interval: config.polling.interval(),
            worker_pool_size: config.polling.worker_pool_size,
            fetch_timeout: config.polling.fetch_timeout(),
            cache_ttl: config.cache.ttl(),
            ws_url,
            reconnect_attempts: config.push.reconnect_attempts,
            reconnect_delay: config.push.reconnect_delay(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Orchestrates quote sources, the snapshot cache and subscriber fan-out
pub struct MarketDataAggregator {
    instruments: Arc<InstrumentSet>,
    config: AggregatorConfig,
    cache: LiveDataCache,
    spots: Arc<dyn SpotFetcher>,
    options: Arc<dyn OptionQuoteProvider>,
    push: PushFeed,
    poller: PullPoller,
    state: Mutex<FeedState>,
    subscribers: Mutex<Vec<Arc<SnapshotCallback>>>,
    fetch_pool: Arc<Semaphore>,
    push_loop: Mutex<Option<JoinHandle<()>>>,
    synthetic: bool,
}

impl MarketDataAggregator {
    /// Create an aggregator in the `Idle` state
    ///
    /// `synthetic` records that the spot source is the offline generator;
    /// it only affects reporting, not behavior.
    pub fn new(
        instruments: Arc<InstrumentSet>,
        config: AggregatorConfig,
        spots: Arc<dyn SpotFetcher>,
        options: Arc<dyn OptionQuoteProvider>,
        synthetic: bool,
    ) -> Arc<Self> {
        let push = PushFeed::new(config.ws_url.clone(), Arc::clone(&instruments));
        let poller = PullPoller::new(config.poll_interval);
        let fetch_pool = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));

        Arc::new(Self {
            instruments,
            config,
            cache: LiveDataCache::new(),
            spots,
            options,
            push,
            poller,
            state: Mutex::new(FeedState::Idle),
            subscribers: Mutex::new(Vec::new()),
            fetch_pool,
            push_loop: Mutex::new(None),
            synthetic,
        })
    }

    pub fn instruments(&self) -> &Arc<InstrumentSet> {
        &self.instruments
    }

    pub fn state(&self) -> FeedState {
        *self.state.lock().expect("state lock")
    }

    pub fn data_source(&self) -> DataSource {
        DataSource {
            mode: self.state().label(),
            synthetic: self.synthetic,
        }
    }

    fn set_state(&self, to: FeedState) {
        let mut state = self.state.lock().expect("state lock");
        if *state != to {
            tracing::info!(from = state.label(), to = to.label(), "Feed state transition");
            *state = to;
        }
    }

    /// Bring a source up: push preferred, polling as fallback
    pub async fn start(self: &Arc<Self>) {
        if self.synthetic {
            tracing::info!("No broker credentials, polling synthetic data");
            self.start_polling();
            return;
        }

        match self.start_push().await {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Push feed unavailable, starting poller");
                self.start_polling();
            }
        }
    }

    /// Connect the push feed, retrying up to the configured attempt count
    ///
    /// This is also the explicit poll-to-push upgrade path; there is no
    /// automatic one.
    pub async fn start_push(self: &Arc<Self>) -> Result<(), MarketDataError> {
        if self.state() == FeedState::PushActive {
            return Ok(());
        }

        let attempts = self.config.reconnect_attempts.max(1);
        let mut events = None;
        let mut last_error =
            MarketDataError::ConnectionLost("no connection attempts made".to_string());

        for attempt in 1..=attempts {
            match self.push.subscribe().await {
                Ok(rx) => {
                    events = Some(rx);
                    break;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Push connect attempt failed");
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(self.config.reconnect_delay).await;
                    }
                }
            }
        }

        let events = match events {
            Some(events) => events,
            None => return Err(last_error),
        };

        // Poller must be down before push starts publishing: the cache has
        // one writer per cycle
        self.poller.stop();
        self.set_state(FeedState::PushActive);

        let aggregator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            aggregator.run_push_loop(events).await;
        });
        if let Some(old) = self.push_loop.lock().expect("push loop lock").replace(handle) {
            old.abort();
        }

        Ok(())
    }

    /// Drain push events, publishing coalesced snapshots until the feed drops
    async fn run_push_loop(self: Arc<Self>, mut events: mpsc::Receiver<FeedEvent>) {
        let mut publish = tokio::time::interval(PUSH_PUBLISH_INTERVAL);
        publish.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut dirty = false;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(FeedEvent::Tick) => dirty = true,
                    Some(FeedEvent::Lost) | None => {
                        tracing::warn!("Push feed lost, failing over to polling");
                        incr_counter(CounterMetric::PushFailover);
                        self.start_polling();
                        break;
                    }
                },
                _ = publish.tick() => {
                    if dirty {
                        dirty = false;
                        if let Err(e) = self.refresh().await {
                            tracing::warn!(error = %e, "Push publish cycle failed");
                        }
                    }
                }
            }
        }
    }

    /// Start the poll loop, stopping the push session first if one is up
    pub fn start_polling(self: &Arc<Self>) {
        if self.state() == FeedState::PushActive {
            self.abort_push();
        }
        self.set_state(FeedState::PollActive);

        let aggregator = Arc::clone(self);
        self.poller.start(move || {
            let aggregator = Arc::clone(&aggregator);
            async move {
                if let Err(e) = aggregator.refresh().await {
                    tracing::warn!(error = %e, "Poll cycle failed, prior snapshot stays authoritative");
                }
            }
        });
    }

    pub fn stop_polling(&self) {
        self.poller.stop();
        if self.state() == FeedState::PollActive {
            self.set_state(FeedState::Idle);
        }
    }

    /// Retune the poll interval; takes effect on the next tick
    pub fn set_poll_interval(&self, secs: u64) {
        self.poller.set_interval(secs);
    }

    /// Gracefully stop the push session
    pub async fn stop_push(&self) {
        self.push.unsubscribe().await;
        if let Some(task) = self.push_loop.lock().expect("push loop lock").take() {
            task.abort();
        }
        if self.state() == FeedState::PushActive {
            let next = if self.poller.is_running() {
                FeedState::PollActive
            } else {
                FeedState::Idle
            };
            self.set_state(next);
        }
    }

    fn abort_push(&self) {
        self.push.abort();
        if let Some(task) = self.push_loop.lock().expect("push loop lock").take() {
            task.abort();
        }
    }

    /// Stop both sources and return to `Idle`
    pub async fn stop(&self) {
        self.push.unsubscribe().await;
        if let Some(task) = self.push_loop.lock().expect("push loop lock").take() {
            task.abort();
        }
        self.poller.stop();
        self.set_state(FeedState::Idle);
    }

    /// Register a listener for every newly published snapshot
    ///
    /// Fan-out runs on the producing path; a failing callback is logged
    /// and isolated, never blocking other subscribers or the publish.
    pub fn subscribe(&self, callback: SnapshotCallback) {
        self.subscribers
            .lock()
            .expect("subscriber lock")
            .push(Arc::new(callback));
    }

    /// Current snapshot, served from cache when fresh enough
    ///
    /// On a miss this performs one full refresh and publishes the result.
    /// Duplicate concurrent refreshes are not suppressed; callers racing a
    /// miss each pay for their own cycle.
    pub async fn get_snapshot(
        &self,
        use_cache: bool,
    ) -> Result<Arc<MarketSnapshot>, MarketDataError> {
        if use_cache {
            if let Some(snapshot) = self.cache.get(self.config.cache_ttl) {
                incr_counter(CounterMetric::CacheHit);
                return Ok(snapshot);
            }
            incr_counter(CounterMetric::CacheMiss);
        }
        self.refresh().await
    }

    /// One full refresh cycle: index plus all constituents
    ///
    /// Publishes on success. An unobtainable index quote discards the
    /// cycle with no internal retry; the prior cache value stays
    /// authoritative.
    pub(crate) async fn refresh(&self) -> Result<Arc<MarketSnapshot>, MarketDataError> {
        let started = Instant::now();
        let expiry = next_monthly_expiry(Utc::now().date_naive());
        let index = self.instruments.index();

        let index_spot = match self.spot_for(index).await {
            Ok(spot) if spot > Decimal::ZERO => spot,
            Ok(_) => {
                incr_counter(CounterMetric::CycleFailure);
                return Err(MarketDataError::CycleFailure(
                    "index spot price is zero".to_string(),
                ));
            }
            Err(e) => {
                incr_counter(CounterMetric::CycleFailure);
                return Err(MarketDataError::CycleFailure(format!(
                    "index quote unavailable: {e}"
                )));
            }
        };
        let index_quote = self.quote_for(index, index_spot, expiry).await;

        let fetches = self.instruments.constituents().values().map(|instrument| async move {
            let entry = match self.spot_for(instrument).await {
                Ok(spot) if spot > Decimal::ZERO => {
                    ConstituentEntry::Quote(self.quote_for(instrument, spot, expiry).await)
                }
                Ok(_) => ConstituentEntry::Failed {
                    reason: "zero spot price".to_string(),
                },
                Err(e) => {
                    tracing::debug!(symbol = %instrument.symbol, error = %e, "Constituent fetch failed");
                    ConstituentEntry::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            (instrument.symbol.clone(), entry)
        });
        let constituents: BTreeMap<_, _> = join_all(fetches).await.into_iter().collect();

        let snapshot = Arc::new(MarketSnapshot {
            index: Some(index_quote),
            constituents,
            captured_at: Utc::now(),
        });
        self.publish(&snapshot);
        record_latency(LatencyMetric::SnapshotRefresh, started.elapsed());
        Ok(snapshot)
    }

    /// Spot for one instrument: streamed price when push is up, otherwise
    /// a pooled fetch with a per-submission timeout
    async fn spot_for(&self, instrument: &Instrument) -> Result<Decimal, MarketDataError> {
        if self.push.is_active() {
            if let Some(spot) = self.push.current_spot(&instrument.symbol) {
                return Ok(spot);
            }
        }

        let _permit = self
            .fetch_pool
            .acquire()
            .await
            .map_err(|_| MarketDataError::transient(&instrument.symbol, "worker pool closed"))?;

        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.config.fetch_timeout,
            self.spots.last_price(instrument),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MarketDataError::transient(
                &instrument.symbol,
                format!("fetch timed out after {:?}", self.config.fetch_timeout),
            )),
        };
        record_latency(LatencyMetric::SpotFetch, started.elapsed());
        result
    }

    /// ATM straddle quote for an instrument at the given spot
    async fn quote_for(&self, instrument: &Instrument, spot: Decimal, expiry: NaiveDate) -> Quote {
        let strike = atm_strike(spot, instrument.strike_interval());
        let call_premium = self
            .premium_or_synthetic(instrument, spot, strike, OptionKind::Call, expiry)
            .await;
        let put_premium = self
            .premium_or_synthetic(instrument, spot, strike, OptionKind::Put, expiry)
            .await;

        Quote {
            symbol: instrument.symbol.clone(),
            spot,
            atm_strike: strike,
            call_strike: strike,
            put_strike: strike,
            expiry,
            call_premium,
            put_premium,
        }
    }

    async fn premium_or_synthetic(
        &self,
        instrument: &Instrument,
        spot: Decimal,
        strike: Decimal,
        kind: OptionKind,
        expiry: NaiveDate,
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

    fn publish(&self, snapshot: &Arc<MarketSnapshot>) {
        self.cache.put(Arc::clone(snapshot));

        // Invoke outside the lock so a callback may register new subscribers
        let callbacks: Vec<Arc<SnapshotCallback>> = self
            .subscribers
            .lock()
            .expect("subscriber lock")
            .iter()
            .map(Arc::clone)
            .collect();
        for (index, callback) in callbacks.iter().enumerate() {
            if let Err(e) = callback(Arc::clone(snapshot)) {
                tracing::warn!(subscriber = index, error = %e, "Snapshot subscriber failed");
            }
        }

        let valid = snapshot.constituents.len() - snapshot.failed_count();
        set_gauge(GaugeMetric::ActiveConstituents, valid as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::InstrumentRole;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Synthetic prices with failure switches for index or one symbol
    struct SwitchableSpots {
        fail_index: AtomicBool,
        fail_symbol: Mutex<Option<String>>,
    }

    impl SwitchableSpots {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail_index: AtomicBool::new(false),
                fail_symbol: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl SpotFetcher for SwitchableSpots {
        async fn last_price(&self, instrument: &Instrument) -> Result<Decimal, MarketDataError> {
            if instrument.role == InstrumentRole::Index && self.fail_index.load(Ordering::SeqCst) {
                return Err(MarketDataError::transient(&instrument.symbol, "simulated outage"));
            }
            let failing = self.fail_symbol.lock().unwrap().clone();
            if failing.as_deref() == Some(instrument.symbol.as_str()) {
                return Err(MarketDataError::transient(&instrument.symbol, "simulated outage"));
            }
            Ok(SyntheticQuotes::spot_price(&instrument.symbol))
        }
    }

    fn aggregator_with(spots: Arc<dyn SpotFetcher>) -> Arc<MarketDataAggregator> {
        let instruments = Arc::new(InstrumentSet::banknifty());
        let options = Arc::new(SyntheticQuotes::new());
        MarketDataAggregator::new(
            instruments,
            AggregatorConfig::default(),
            spots,
            options,
            true,
        )
    }

    fn aggregator() -> Arc<MarketDataAggregator> {
        aggregator_with(Arc::new(SyntheticQuotes::new()))
    }

    #[tokio::test]
    async fn test_refresh_builds_full_snapshot() {
        let agg = aggregator();
        let snapshot = agg.get_snapshot(false).await.unwrap();

        let index = snapshot.index.as_ref().unwrap();
        assert_eq!(index.symbol, "BANKNIFTY");
        assert_eq!(index.atm_strike, rust_decimal_macros::dec!(45000));
        assert_eq!(snapshot.constituents.len(), 10);
        assert_eq!(snapshot.failed_count(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_returns_published_snapshot() {
        let agg = aggregator();
        let first = agg.get_snapshot(false).await.unwrap();
        let second = agg.get_snapshot(true).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_cache_bypass_rebuilds() {
        let agg = aggregator();
        let first = agg.get_snapshot(false).await.unwrap();
        let second = agg.get_snapshot(false).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_index_failure_discards_cycle_keeps_cache() {
        let spots = SwitchableSpots::new();
        let agg = aggregator_with(Arc::clone(&spots) as Arc<dyn SpotFetcher>);

        let cached = agg.get_snapshot(false).await.unwrap();
        spots.fail_index.store(true, Ordering::SeqCst);

        let err = agg.get_snapshot(false).await.unwrap_err();
        assert!(matches!(err, MarketDataError::CycleFailure(_)));

        // Prior cache value stays authoritative
        let served = agg.get_snapshot(true).await.unwrap();
        assert!(Arc::ptr_eq(&served, &cached));
    }

    #[tokio::test]
    async fn test_constituent_failure_tagged_not_fatal() {
        let spots = SwitchableSpots::new();
        *spots.fail_symbol.lock().unwrap() = Some("SBIN".to_string());
        let agg = aggregator_with(Arc::clone(&spots) as Arc<dyn SpotFetcher>);

        let snapshot = agg.get_snapshot(false).await.unwrap();
        assert!(snapshot.constituents["SBIN"].is_failed());
        assert_eq!(snapshot.failed_count(), 1);
        assert_eq!(snapshot.valid_constituents().count(), 9);
    }

    #[tokio::test]
    async fn test_fetch_timeout_becomes_failed_entry() {
        struct SlowSpots;

        #[async_trait]
        impl SpotFetcher for SlowSpots {
            async fn last_price(&self, instrument: &Instrument) -> Result<Decimal, MarketDataError> {
                if instrument.role == InstrumentRole::Constituent {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(SyntheticQuotes::spot_price(&instrument.symbol))
            }
        }

        let instruments = Arc::new(InstrumentSet::banknifty());
        let config = AggregatorConfig {
            fetch_timeout: Duration::from_millis(50),
            ..AggregatorConfig::default()
        };
        let agg = MarketDataAggregator::new(
            instruments,
            config,
            Arc::new(SlowSpots),
            Arc::new(SyntheticQuotes::new()),
            true,
        );

        let snapshot = agg.get_snapshot(false).await.unwrap();
        assert_eq!(snapshot.failed_count(), 10);
    }

    #[tokio::test]
    async fn test_subscriber_failure_isolated() {
        let agg = aggregator();
        let delivered = Arc::new(AtomicUsize::new(0));

        agg.subscribe(Box::new(|_| anyhow::bail!("subscriber exploded")));
        let counter = Arc::clone(&delivered);
        agg.subscribe(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        agg.get_snapshot(false).await.unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscriber_may_register_another_subscriber() {
        let agg = aggregator();
        let delivered = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&delivered);
        let handle = Arc::clone(&agg);
        agg.subscribe(Box::new(move |_| {
            let counter = Arc::clone(&counter);
            handle.subscribe(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
            Ok(())
        }));

        // First publish registers the inner subscriber, second reaches it;
        // either way the registering callback must not deadlock the fan-out
        agg.get_snapshot(false).await.unwrap();
        agg.get_snapshot(false).await.unwrap();
        assert!(delivered.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_state_machine_polling_transitions() {
        let agg = aggregator();
        assert_eq!(agg.state(), FeedState::Idle);

        agg.start_polling();
        assert_eq!(agg.state(), FeedState::PollActive);
        assert_eq!(agg.data_source().mode, "polling");
        assert!(agg.data_source().synthetic);

        agg.stop_polling();
        assert_eq!(agg.state(), FeedState::Idle);
    }

    #[tokio::test]
    async fn test_start_without_credentials_polls() {
        let agg = aggregator();
        agg.start().await;
        assert_eq!(agg.state(), FeedState::PollActive);
        assert!(agg.get_snapshot(true).await.is_ok());
        agg.stop().await;
        assert_eq!(agg.state(), FeedState::Idle);
    }

    #[tokio::test]
    async fn test_push_unreachable_falls_back_to_polling() {
        let instruments = Arc::new(InstrumentSet::banknifty());
        let config = AggregatorConfig {
            ws_url: "ws://127.0.0.1:1".to_string(),
            reconnect_attempts: 1,
            reconnect_delay: Duration::from_millis(10),
            ..AggregatorConfig::default()
        };
        let agg = MarketDataAggregator::new(
            instruments,
            config,
            Arc::new(SyntheticQuotes::new()),
            Arc::new(SyntheticQuotes::new()),
            false,
        );

        agg.start().await;
        assert_eq!(agg.state(), FeedState::PollActive);
        assert!(agg.get_snapshot(false).await.is_ok());
        agg.stop().await;
    }

    #[tokio::test]
    async fn test_retry_push_fails_and_keeps_polling() {
        let instruments = Arc::new(InstrumentSet::banknifty());
        let config = AggregatorConfig {
            ws_url: "ws://127.0.0.1:1".to_string(),
            reconnect_attempts: 1,
            reconnect_delay: Duration::from_millis(10),
            ..AggregatorConfig::default()
        };
        let agg = MarketDataAggregator::new(
            instruments,
            config,
            Arc::new(SyntheticQuotes::new()),
            Arc::new(SyntheticQuotes::new()),
            false,
        );

        agg.start_polling();
        assert!(agg.start_push().await.is_err());
        // Failed upgrade leaves polling untouched
        assert_eq!(agg.state(), FeedState::PollActive);
        agg.stop().await;
    }
}
