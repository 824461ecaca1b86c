//! Push feed: streaming last prices over one WebSocket connection
//!
//! Subscribes every instrument token in last-price mode and applies tick
//! batches to an in-memory book as they arrive. On disconnect or error the
//! feed marks itself inactive and emits `FeedEvent::Lost`; it never
//! retries on its own — reconnection policy belongs to the aggregator.

use super::FeedEvent;
use crate::error::MarketDataError;
use crate::instruments::InstrumentSet;
use crate::ws::{WsClient, WsConfig, WsMessage};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Latest last-traded prices keyed by instrument token
type SpotBook = Arc<RwLock<HashMap<u32, Decimal>>>;

/// Token subscription command sent on connect and teardown
#[derive(Debug, Serialize)]
struct TokenCommand<'a> {
    a: &'a str,
    v: &'a [u32],
}

/// Streaming-mode command; serializes as `{"a":"mode","v":["ltp",[...]]}`
#[derive(Debug, Serialize)]
struct ModeCommand<'a> {
    a: &'a str,
    v: (&'a str, &'a [u32]),
}

/// Tick batch delivered by the feed
#[derive(Debug, Deserialize)]
struct TickMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    ticks: Vec<Tick>,
}

#[derive(Debug, Deserialize)]
struct Tick {
    token: u32,
    last_price: Decimal,
}

/// Streaming quote source backed by the broker WebSocket feed
pub struct PushFeed {
    ws_url: String,
    instruments: Arc<InstrumentSet>,
    book: SpotBook,
    active: Arc<AtomicBool>,
    outgoing: Mutex<Option<mpsc::Sender<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PushFeed {
    pub fn new(ws_url: impl Into<String>, instruments: Arc<InstrumentSet>) -> Self {
        Self {
            ws_url: ws_url.into(),
            instruments,
            book: Arc::new(RwLock::new(HashMap::new())),
            active: Arc::new(AtomicBool::new(false)),
            outgoing: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Connect and subscribe all instrument tokens in last-price mode
    ///
    /// Returns the event stream for this session: `Tick` per applied batch,
    /// then a final `Lost` when the connection drops.
    pub async fn subscribe(&self) -> Result<mpsc::Receiver<FeedEvent>, MarketDataError> {
        let client = WsClient::new(WsConfig::new(&self.ws_url));
        let mut session = client
            .connect()
            .await
            .map_err(|e| MarketDataError::ConnectionLost(e.to_string()))?;

        let tokens = self.instruments.tokens();
        let subscribe = serde_json::to_string(&TokenCommand {
            a: "subscribe",
            v: &tokens,
        })
        .map_err(|e| MarketDataError::ConnectionLost(e.to_string()))?;
        let mode = serde_json::to_string(&ModeCommand {
            a: "mode",
            v: ("ltp", &tokens),
        })
        .map_err(|e| MarketDataError::ConnectionLost(e.to_string()))?;
        for payload in [subscribe, mode] {
            session
                .outgoing
                .send(payload)
                .await
                .map_err(|e| MarketDataError::ConnectionLost(e.to_string()))?;
        }

        tracing::info!(tokens = tokens.len(), "Push feed subscribed");
        self.active.store(true, Ordering::SeqCst);

        let (event_tx, event_rx) = mpsc::channel(64);
        let book = Arc::clone(&self.book);
        let active = Arc::clone(&self.active);

        let handle = tokio::spawn(async move {
            while let Some(msg) = session.messages.recv().await {
                match msg {
                    WsMessage::Text(text) => {
                        if apply_ticks(&book, &text) {
                            // Coalesced by the receiver; drop the event if it lags
                            let _ = event_tx.try_send(FeedEvent::Tick);
                        }
                    }
                    WsMessage::Binary(_) => {}
                    WsMessage::Disconnected => break,
                }
            }
            active.store(false, Ordering::SeqCst);
            let _ = event_tx.send(FeedEvent::Lost).await;
        });

        *self.outgoing.lock().expect("push outgoing lock") = Some(session.outgoing);
        if let Some(old) = self
            .task
            .lock()
            .expect("push task lock")
            .replace(handle)
        {
            old.abort();
        }

        Ok(event_rx)
    }

    /// Send a best-effort unsubscribe and tear the session down
    pub async fn unsubscribe(&self) {
        let outgoing = self.outgoing.lock().expect("push outgoing lock").take();
        if let Some(tx) = outgoing {
            let tokens = self.instruments.tokens();
            let command = TokenCommand {
                a: "unsubscribe",
                v: &tokens,
            };
            if let Ok(payload) = serde_json::to_string(&command) {
                let _ = tx.send(payload).await;
            }
        }
        self.abort();
    }

    /// Tear the session down without the courtesy unsubscribe
    pub fn abort(&self) {
        self.outgoing.lock().expect("push outgoing lock").take();
        if let Some(task) = self.task.lock().expect("push task lock").take() {
            task.abort();
        }
        self.active.store(false, Ordering::SeqCst);
    }

    /// Latest streamed spot for a symbol, if a tick has arrived
    pub fn current_spot(&self, symbol: &str) -> Option<Decimal> {
        let instrument = self
            .instruments
            .all()
            .find(|ins| ins.symbol == symbol)?;
        self.book
            .read()
            .expect("push book lock")
            .get(&instrument.token)
            .copied()
    }

    /// Whether the streaming session is currently up
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Apply a tick batch to the book; returns whether anything was applied
fn apply_ticks(book: &SpotBook, text: &str) -> bool {
    let message: TickMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(_) => return false,
    };
    if message.kind != "tick" || message.ticks.is_empty() {
        return false;
    }

    let mut book = book.write().expect("push book lock");
    for tick in &message.ticks {
        book.insert(tick.token, tick.last_price);
    }
    true
}
