//! Short-TTL snapshot cache
//!
//! One slot, no history. The lock is held only for the pointer swap or
//! read, never across I/O; any number of request handlers may read while
//! the producing cycle writes.

use super::MarketSnapshot;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

struct CacheSlot {
    snapshot: Arc<MarketSnapshot>,
    stored_at: Instant,
}

/// Concurrency-safe single-slot store for the latest snapshot
#[derive(Default)]
pub struct LiveDataCache {
    slot: RwLock<Option<CacheSlot>>,
}

impl LiveDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached snapshot, if one exists and is younger than `max_age`
    pub fn get(&self, max_age: Duration) -> Option<Arc<MarketSnapshot>> {
        let slot = self.slot.read().expect("cache lock");
        slot.as_ref().and_then(|entry| {
            if entry.stored_at.elapsed() < max_age {
                Some(Arc::clone(&entry.snapshot))
            } else {
                None
            }
        })
    }

    /// Atomically replace the cached snapshot and its timestamp
    pub fn put(&self, snapshot: Arc<MarketSnapshot>) {
        let mut slot = self.slot.write().expect("cache lock");
        *slot = Some(CacheSlot {
            snapshot,
            stored_at: Instant::now(),
        });
    }
}
