//! WebSocket transport with automatic reconnection

use crate::errors::FeedError;
use crate::messages::CLOSE;
use crate::transport::{Transport, TransportEvent, TransportEvents};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use services_common::{FeedConfig, ServiceError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ended {
    Shutdown,
    Lost,
    Error,
}

impl Ended {
    fn reason(self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::Lost => "lost",
            Self::Error => "error",
        }
    }
}

/// [`Transport`] over a single websocket connection
///
/// Reconnects after `reconnect_delay` until stopped. Outbound frames queued
/// while disconnected are sent once the next connection is up.
pub struct WebSocketTransport {
    url: String,
    reconnect_delay: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Transport for `config.ws_url` and the channel it reports on
    pub fn new(config: &FeedConfig) -> (Self, TransportEvents) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let transport = Self {
            url: config.ws_url.clone(),
            reconnect_delay: config.reconnect_delay(),
            events,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        };
        (transport, events_rx)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn start(&self) -> Result<(), FeedError> {
        let runtime = Handle::try_current()
            .map_err(|e| FeedError::Transport(format!("no Tokio runtime: {e}")))?;
        let Some(outbound) = self.outbound_rx.lock().take() else {
            return Err(FeedError::Transport("websocket transport already started".to_string()));
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown.lock() = Some(shutdown_tx);

        let task = runtime.spawn(connection_loop(
            self.url.clone(),
            self.reconnect_delay,
            self.events.clone(),
            outbound,
            shutdown_rx,
        ));
        *self.task.lock() = Some(task);
        Ok(())
    }

    fn send(&self, text: String) -> Result<(), FeedError> {
        self.outbound_tx
            .send(text)
            .map_err(|_| FeedError::Transport("websocket writer is gone".to_string()))
    }

    async fn stop(&self) -> bool {
        let shutdown = self.shutdown.lock().take();
        let task = self.task.lock().take();
        let (Some(shutdown), Some(task)) = (shutdown, task) else {
            return false;
        };

        // the loop may already have exited
        let _ = shutdown.send(());
        match task.await {
            Ok(()) => {
                info!(url = %self.url, "WebSocket transport stopped");
                true
            }
            Err(e) => {
                error!(url = %self.url, error = %e, "WebSocket task failed");
                false
            }
        }
    }
}

async fn connection_loop(
    url: String,
    reconnect_delay: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut reason = "initial";
    loop {
        let connected = tokio::select! {
            _ = &mut shutdown => return,
            result = connect_async(url.as_str()) => result,
        };

        let ended = match connected {
            Ok((stream, _)) => {
                info!(%url, reason, "WebSocket connected");
                let _ = events.send(TransportEvent::Reconnected(reason.to_string()));

                let (mut write, mut read) = stream.split();
                loop {
                    tokio::select! {
                        _ = &mut shutdown => {
                            let _ = write.send(Message::Close(None)).await;
                            break Ended::Shutdown;
                        }
                        Some(text) = outbound.recv() => {
                            debug!(%text, "Sending frame");
                            if let Err(e) = write.send(Message::Text(text)).await {
                                warn!(error = %e, "Failed to write frame");
                                break Ended::Error;
                            }
                        }
                        frame = read.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                let _ = events.send(TransportEvent::Message(text));
                            }
                            Some(Ok(Message::Binary(bytes))) => {
                                let text = String::from_utf8_lossy(&bytes).into_owned();
                                let _ = events.send(TransportEvent::Message(text));
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = write.send(Message::Pong(data)).await {
                                    warn!(error = %e, "Failed to answer ping");
                                    break Ended::Error;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                debug!(?frame, "Close frame received");
                                let _ = events.send(TransportEvent::Message(CLOSE.to_string()));
                                break Ended::Lost;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "WebSocket read failed");
                                break Ended::Error;
                            }
                            None => break Ended::Lost,
                        }
                    }
                }
            }
            Err(e) => {
                let err = ServiceError::ConnectionFailed(format!("{url}: {e}"));
                error!(error = %err, "WebSocket connect failed");
                Ended::Error
            }
        };

        if ended == Ended::Shutdown {
            return;
        }
        let _ = events.send(TransportEvent::Disconnected(ended.reason().to_string()));
        warn!(%url, reason = ended.reason(), delay_ms = reconnect_delay.as_millis() as u64, "Reconnecting");
        reason = ended.reason();

        tokio::select! {
            _ = &mut shutdown => return,
            () = tokio::time::sleep(reconnect_delay) => {}
        }

        // the reconnect replay re-sends every live intent
        let dropped = drain_stale(&mut outbound);
        if dropped > 0 {
            debug!(dropped, "Dropped frames queued while disconnected");
        }
    }
}

/// Discard everything queued on `outbound`, returning how many frames went
fn drain_stale(outbound: &mut mpsc::UnboundedReceiver<String>) -> usize {
    let mut dropped = 0;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}
