/// WebSocket transport for the dashboard push channel
///
/// Drives the `closed -> connecting -> open -> closed` state machine with a fixed
/// reconnect delay, keeps the connection alive with JSON pings and feeds every
/// text frame into the [`LiveStore`](crate::shared::store::LiveStore).
use crate::error::SyncError;
use crate::shared::store::SharedStore;
use crate::shared::types::OutboundMessage;
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

/// Fixed delay between a close and the next connection attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Interval between `{"type":"ping"}` keep-alive frames
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Path the backend serves the push channel on
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Push channel connection state, mirrored into the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Connecting,
    Open,
    #[default]
    Closed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Open => "open",
            ConnectionStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// WebSocket server URL
    pub url: String,
    /// Ping interval to keep connection alive
    pub ping_interval: Duration,
    /// Reconnection delay after disconnect
    pub reconnect_delay: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws".to_string(),
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl WebSocketConfig {
    /// Create a new configuration with custom URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set ping interval
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Derive the push channel endpoint from the page (or API) address.
///
/// `https` pages connect over `wss`, anything else over `ws`. Host and port are
/// copied from the page unless `override_endpoint` supplies either `host[:port]`
/// or a complete `ws://` / `wss://` URL.
pub fn derive_endpoint(
    page_url: &Url,
    override_endpoint: Option<&str>,
    path: &str,
) -> Result<Url, SyncError> {
    let scheme = match page_url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(SyncError::Endpoint(format!(
                "unsupported page scheme `{other}` in {page_url}"
            )));
        }
    };

    if let Some(raw) = override_endpoint.map(str::trim).filter(|raw| !raw.is_empty()) {
        if raw.starts_with("ws://") || raw.starts_with("wss://") {
            return Ok(Url::parse(raw)?);
        }

        let mut url = Url::parse(&format!("{scheme}://{raw}"))?;
        if url.path().is_empty() || url.path() == "/" {
            url.set_path(path);
        }
        return Ok(url);
    }

    if page_url.host_str().is_none() {
        return Err(SyncError::Endpoint(format!("{page_url} has no host")));
    }

    let mut url = page_url.clone();
    url.set_scheme(scheme)
        .map_err(|_| SyncError::Endpoint(format!("cannot switch {page_url} to {scheme}")))?;
    url.set_path(path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// WebSocket client feeding the live state store
#[derive(Debug)]
pub struct WebSocketClient {
    config: WebSocketConfig,
    store: SharedStore,
    session: Weak<HandleInner>,
}

impl WebSocketClient {
    pub fn new(config: WebSocketConfig, store: SharedStore) -> Self {
        Self {
            config,
            store,
            session: Weak::new(),
        }
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Start the reconnect loop on the current tokio runtime.
    ///
    /// Idempotent: while a previously returned handle is alive and not shut
    /// down, that session is returned instead of spawning a second one.
    pub fn connect(&mut self) -> ConnectionHandle {
        if let Some(inner) = self.session.upgrade() {
            if !*inner.shutdown.borrow() {
                debug!(url = %self.config.url, "push channel already running");
                return ConnectionHandle { inner };
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_connection_loop(
            self.config.clone(),
            Arc::clone(&self.store),
            shutdown_rx,
            command_rx,
        ));

        let inner = Arc::new(HandleInner {
            shutdown: shutdown_tx,
            commands: command_tx,
            store: Arc::clone(&self.store),
        });
        self.session = Arc::downgrade(&inner);

        ConnectionHandle { inner }
    }
}

/// Cancellable handle to a running push channel session.
///
/// Dropping the last clone has the same effect as [`ConnectionHandle::shutdown`].
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    shutdown: watch::Sender<bool>,
    commands: mpsc::UnboundedSender<OutboundMessage>,
    store: SharedStore,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl ConnectionHandle {
    /// Close the connection and cancel any pending reconnect timer.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.send_replace(true) {
            info!("push channel shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Observe shutdown without keeping the session alive
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    /// Ask the backend to resend its `init` snapshot.
    ///
    /// Returns `false` without queueing anything unless the push channel is
    /// `open`; every new connection starts with a fresh `init` anyway.
    pub fn request_refresh(&self) -> bool {
        if self.is_shutdown() {
            return false;
        }
        let status = self.inner.store.lock().connection_status();
        if status != ConnectionStatus::Open {
            debug!(%status, "refresh not sent, push channel is not open");
            return false;
        }
        self.inner.commands.send(OutboundMessage::Refresh).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Disconnected,
    Shutdown,
}

/// Main WebSocket connection loop with auto-reconnect
async fn run_connection_loop(
    config: WebSocketConfig,
    store: SharedStore,
    mut shutdown: watch::Receiver<bool>,
    mut commands: mpsc::UnboundedReceiver<OutboundMessage>,
) {
    info!(url = %config.url, "starting push channel");

    loop {
        if *shutdown.borrow() {
            break;
        }

        store.lock().set_connection_status(ConnectionStatus::Connecting);

        let connected = tokio::select! {
            result = connect_async(config.url.as_str()) => result,
            _ = shutdown.changed() => break,
        };

        match connected {
            Ok((stream, _)) => {
                // Stale refresh requests from a previous session, dropped before
                // the handle can observe `Open` again
                while commands.try_recv().is_ok() {}

                info!(url = %config.url, "push channel open");
                store.lock().set_connection_status(ConnectionStatus::Open);

                let end = run_session(stream, &config, &store, &mut shutdown, &mut commands).await;
                if end == SessionEnd::Shutdown {
                    break;
                }
            }
            Err(error) => {
                let error = SyncError::from(error);
                warn!(url = %config.url, %error, "failed to connect push channel");
            }
        }

        store.lock().set_connection_status(ConnectionStatus::Closed);

        debug!(delay = ?config.reconnect_delay, "scheduling reconnect");
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    store.lock().set_connection_status(ConnectionStatus::Closed);
    info!(url = %config.url, "push channel stopped");
}

async fn run_session(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    config: &WebSocketConfig,
    store: &SharedStore,
    shutdown: &mut watch::Receiver<bool>,
    commands: &mut mpsc::UnboundedReceiver<OutboundMessage>,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    let mut ping = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let outbound = tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        store.lock().apply_frame(text.as_str());
                        continue;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        match std::str::from_utf8(&bytes) {
                            Ok(text) => {
                                store.lock().apply_frame(text);
                            }
                            Err(_) => debug!(len = bytes.len(), "ignoring non-UTF-8 binary frame"),
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "server closed push channel");
                        return SessionEnd::Disconnected;
                    }
                    // Protocol level ping/pong is answered by tungstenite
                    Some(Ok(_)) => continue,
                    Some(Err(error)) => {
                        warn!(error = %SyncError::from(error), "push channel error");
                        return SessionEnd::Disconnected;
                    }
                    None => {
                        info!("push channel stream ended");
                        return SessionEnd::Disconnected;
                    }
                }
            }
            _ = ping.tick() => OutboundMessage::Ping,
            command = commands.recv() => match command {
                Some(command) => command,
                None => return SessionEnd::Shutdown,
            },
            _ = shutdown.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
        };

        debug!(?outbound, "sending client frame");
        if let Err(error) = write.send(Message::text(outbound.to_json())).await {
            debug!(%error, "failed to send client frame, connection likely dead");
            return SessionEnd::Disconnected;
        }
    }
}
