//! Single-shot WebSocket client

use super::types::{WsConfig, WsError, WsMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// WebSocket client for one streaming session
pub struct WsClient {
    config: WsConfig,
}

/// Handles to an established session
pub struct WsSession {
    /// Incoming frames; ends with `Disconnected`
    pub messages: mpsc::Receiver<WsMessage>,
    /// Outgoing text frames
    pub outgoing: mpsc::Sender<String>,
}

impl WsClient {
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect and start streaming
    ///
    /// Returns once the connection is established. A background task then
    /// forwards frames, answers pings, sends keepalive pings and delivers
    /// queued outgoing text. On any error or close the task emits
    /// `Disconnected` and ends; it never reconnects.
    pub async fn connect(&self) -> Result<WsSession, WsError> {
        tracing::info!(url = %self.config.url, "Connecting to WebSocket");

        let connect = connect_async(&self.config.url);
        let (ws_stream, _response) = timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| WsError::ConnectTimeout(self.config.connect_timeout))?
            .map_err(|e| WsError::ConnectFailed(e.to_string()))?;

        tracing::info!("WebSocket connected");

        let (msg_tx, msg_rx) = mpsc::channel(1024);
        let (send_tx, send_rx) = mpsc::channel(256);
        let ping_interval = self.config.ping_interval;

        tokio::spawn(async move {
            run_session(ws_stream, msg_tx, send_rx, ping_interval).await;
        });

        Ok(WsSession {
            messages: msg_rx,
            outgoing: send_tx,
        })
    }
}

async fn run_session<S>(
    ws_stream: tokio_tungstenite::WebSocketStream<S>,
    tx: mpsc::Sender<WsMessage>,
    mut send_rx: mpsc::Receiver<String>,
    ping_interval: std::time::Duration,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws_stream.split();

    let mut ping_timer = tokio::time::interval(ping_interval);
    ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick fires immediately; consume it so pings start after one interval
    ping_timer.tick().await;
    let mut waiting_for_pong = false;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if tx.send(WsMessage::Text(text)).await.is_err() {
                            tracing::debug!("Receiver dropped, closing connection");
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if tx.send(WsMessage::Binary(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if write.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        waiting_for_pong = false;
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket stream error");
                        break;
                    }
                    None => {
                        tracing::warn!("WebSocket stream ended");
                        break;
                    }
                    _ => {}
                }
            }

            msg = send_rx.recv() => {
                match msg {
                    Some(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::warn!(error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    None => {
                        // Sender dropped, close the session
                        break;
                    }
                }
            }

            _ = ping_timer.tick() => {
                if waiting_for_pong {
                    tracing::warn!("Pong timeout, dropping connection");
                    break;
                }
                if write.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
                waiting_for_pong = true;
            }
        }
    }

    let _ = tx.send(WsMessage::Disconnected).await;
}
