//! Reconnecting WebSocket push channel
//!
//! `Disconnected → Connecting → Connected → Closed → Backoff(n) → Connecting → …`
//!
//! Every state change is published on a `watch` channel (latest value) and on the
//! [`EventBus`] (full history for SSE subscribers). Inbound frames are handled strictly
//! in arrival order.

use futures::{SinkExt, StreamExt};
use kiosk_common::events::{ConnectionState, EventBus, KioskEvent};
use kiosk_common::time::{as_millis, now};
use kiosk_common::ScreenIdentity;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::{ReconnectBackoff, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP};
use super::board::{DirectiveOutcome, OverlayBoard};
use super::directive::OverlayDirective;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Push channel settings
#[derive(Debug, Clone)]
pub struct OverlayChannelConfig {
    /// `ws://` or `wss://` endpoint
    pub url: String,
    pub connect_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl OverlayChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

/// Handle to the running channel task
pub struct OverlayChannel {
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl OverlayChannel {
    /// Spawn the connection loop
    ///
    /// Directives are applied to `board` for `screen`. The loop runs until `parent`
    /// (or this channel) is cancelled.
    pub fn spawn(
        config: OverlayChannelConfig,
        screen: ScreenIdentity,
        board: OverlayBoard,
        bus: EventBus,
        parent: &CancellationToken,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = parent.child_token();

        let worker = ChannelWorker {
            config,
            screen,
            board,
            bus,
            state: state_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(worker.run());

        Self {
            state: state_rx,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that always holds the latest connection state
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop reconnecting and close the socket, waiting for the task to finish
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Overlay channel task ended abnormally");
            }
        }
    }
}

impl Drop for OverlayChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How a connected session ended
enum SessionEnd {
    Closed { clean: bool },
    Cancelled,
}

struct ChannelWorker {
    config: OverlayChannelConfig,
    screen: ScreenIdentity,
    board: OverlayBoard,
    bus: EventBus,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl ChannelWorker {
    fn publish(&self, state: ConnectionState) {
        debug!(?state, "Overlay channel state");
        self.state.send_replace(state);
        self.bus.emit_lossy(KioskEvent::ConnectionStateChanged {
            state,
            timestamp: now(),
        });
    }

    async fn run(self) {
        let mut backoff = ReconnectBackoff::new(self.config.backoff_base, self.config.backoff_cap);
        info!(url = %self.config.url, screen = %self.screen, "Overlay channel starting");

        loop {
            self.publish(ConnectionState::Connecting);

            let connect = tokio::time::timeout(
                self.config.connect_timeout,
                connect_async(self.config.url.as_str()),
            );
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = connect => result,
            };

            let end = match connected {
                Ok(Ok((socket, _response))) => {
                    info!(url = %self.config.url, "Overlay channel connected");
                    backoff.reset();
                    self.publish(ConnectionState::Connected);
                    self.session(socket).await
                }
                Ok(Err(e)) => {
                    warn!(url = %self.config.url, error = %e, "Overlay channel connect failed");
                    SessionEnd::Closed { clean: false }
                }
                Err(_) => {
                    warn!(
                        url = %self.config.url,
                        timeout_secs = self.config.connect_timeout.as_secs_f64(),
                        "Overlay channel connect timed out"
                    );
                    SessionEnd::Closed { clean: false }
                }
            };

            let SessionEnd::Closed { clean } = end else {
                break;
            };
            self.publish(ConnectionState::Closed { clean });

            let delay = backoff.next_delay();
            self.publish(ConnectionState::Backoff {
                attempt: backoff.attempt(),
                delay_ms: as_millis(delay),
            });
            info!(attempt = backoff.attempt(), delay_ms = as_millis(delay), "Overlay channel reconnecting");

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.publish(ConnectionState::Disconnected);
        info!("Overlay channel stopped");
    }

    /// Read frames until the connection ends or the channel is cancelled
    async fn session(&self, mut socket: Socket) -> SessionEnd {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = socket.close(None).await;
                    return SessionEnd::Cancelled;
                }
                frame = socket.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => self.handle_payload(&text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => self.handle_payload(&text),
                    Err(e) => warn!(error = %e, "Dropping non-UTF-8 overlay frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Overlay channel closed by server");
                    return SessionEnd::Closed { clean: true };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Overlay channel read error");
                    return SessionEnd::Closed { clean: false };
                }
                None => return SessionEnd::Closed { clean: false },
            }
        }
    }

    fn handle_payload(&self, text: &str) {
        let directive = match OverlayDirective::parse(text) {
            Ok(directive) => directive,
            Err(e) => {
                warn!(error = %e, len = text.len(), "Dropping malformed overlay directive");
                return;
            }
        };

        match self.board.apply(&directive, &self.screen) {
            DirectiveOutcome::NotAddressed => {}
            DirectiveOutcome::Applied { cleared, created } => {
                debug!(cleared, ?created, "Overlay directive applied");
            }
        }
    }
}
