//! Pull poller: periodic fetch-all passes
//!
//! Owns one dedicated task that runs a caller-supplied cycle at a fixed
//! interval. The interval can be retuned while running and takes effect on
//! the next tick; each pass is bounded by the interval so a stalled cycle
//! can never back the loop up.

use crate::config::MIN_POLL_INTERVAL_SECS;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Periodic driver for fetch-all refresh passes
pub struct PullPoller {
    interval_secs: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PullPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_secs: Arc::new(AtomicU64::new(
                interval.as_secs().max(MIN_POLL_INTERVAL_SECS),
            )),
            task: Mutex::new(None),
        }
    }

    /// Start the poll loop, replacing any previous one
    ///
    /// `cycle` runs once per interval; a pass that overruns the interval is
    /// abandoned and logged.
    pub fn start<F, Fut>(&self, cycle: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let interval_secs = self.interval_secs.load(Ordering::SeqCst);
        tracing::info!(interval_secs, "Starting pull poller");

        // The loop re-reads the interval each iteration so set_interval
        // applies on the next tick
        let shared_interval = Arc::clone(&self.interval_secs);
        let handle = tokio::spawn(async move {
            loop {
                let interval =
                    Duration::from_secs(shared_interval.load(Ordering::SeqCst));
                if tokio::time::timeout(interval, cycle()).await.is_err() {
                    tracing::warn!(
                        interval_secs = interval.as_secs(),
                        "Poll pass overran its interval, abandoning"
                    );
                }
                tokio::time::sleep(interval).await;
            }
        });

        if let Some(old) = self.task.lock().expect("poller task lock").replace(handle) {
            old.abort();
        }
    }

    /// Retune the interval; applies from the next tick, clamped to minimum
    pub fn set_interval(&self, secs: u64) {
        let clamped = secs.max(MIN_POLL_INTERVAL_SECS);
        self.interval_secs.store(clamped, Ordering::SeqCst);
        tracing::info!(interval_secs = clamped, "Poll interval updated");
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.load(Ordering::SeqCst))
    }

    /// Stop the loop; the wait terminates within the current interval
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().expect("poller task lock").take() {
            task.abort();
            tracing::info!("Pull poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .expect("poller task lock")
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for PullPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
