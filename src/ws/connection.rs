use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::api::health::StreamHealth;
use crate::config::STREAM_SILENCE_WARN_SECS;
use crate::error::AppError;
use crate::state::SnapshotStore;
use crate::types::ConnectionStatus;
use crate::ws::messages::{parse_stream_frame, ParsedFrame};

/// How one connection attempt ended.
#[derive(Debug)]
pub enum StreamExit {
    /// Teardown was requested through the handle.
    Shutdown,
    /// The server closed the stream or it ended.
    Closed,
    /// Connect or transport failure.
    Failed(AppError),
}

/// What a single text frame did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Heartbeat,
    /// Snapshot applied with this many records.
    Applied(usize),
    Malformed,
}

/// Owns one persistent connection to the metric stream for one exchange scope.
///
/// Status transitions: `Connecting` on construction and at the start of every
/// attempt, `Connected` once the handshake completes, `Disconnected` on error,
/// close or teardown. It never reconnects on its own; see `StreamSupervisor`.
pub struct StreamConnection {
    url: String,
    store: Arc<SnapshotStore>,
    status: watch::Sender<ConnectionStatus>,
    health: Arc<StreamHealth>,
}

impl StreamConnection {
    pub fn new(url: impl Into<String>, store: Arc<SnapshotStore>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Connecting);
        Self {
            url: url.into(),
            store,
            status,
            health: Arc::new(StreamHealth::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn health(&self) -> Arc<StreamHealth> {
        Arc::clone(&self.health)
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Start a single connection attempt in the background.
    /// The returned handle reports status and is the only way to stop it.
    pub fn spawn(self) -> StreamHandle {
        self.set_status(ConnectionStatus::Connecting);
        let status = self.subscribe_status();
        let health = self.health();
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            match self.run_once(&mut shutdown_rx).await {
                StreamExit::Shutdown => info!("stream closed on request"),
                StreamExit::Closed => warn!("stream closed by server"),
                StreamExit::Failed(e) => error!("stream error: {e}"),
            }
        });

        StreamHandle {
            status,
            health,
            shutdown,
            task,
        }
    }

    /// Runs one connect → receive → disconnect cycle.
    pub(crate) async fn run_once(&self, shutdown: &mut watch::Receiver<bool>) -> StreamExit {
        self.set_status(ConnectionStatus::Connecting);
        info!(url = %self.url, "stream connecting");

        let connected = tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => {
                self.set_status(ConnectionStatus::Disconnected);
                return StreamExit::Shutdown;
            }
            res = connect_async(self.url.as_str()) => res,
        };

        let ws_stream = match connected {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                self.set_status(ConnectionStatus::Disconnected);
                return StreamExit::Failed(e.into());
            }
        };

        self.set_status(ConnectionStatus::Connected);
        info!(url = %self.url, "stream connected");

        let exit = self.receive_loop(ws_stream, shutdown).await;
        self.set_status(ConnectionStatus::Disconnected);
        exit
    }

    async fn receive_loop<S>(
        &self,
        ws_stream: tokio_tungstenite::WebSocketStream<S>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamExit
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut write, mut read) = ws_stream.split();

        let silence_limit = Duration::from_secs(STREAM_SILENCE_WARN_SECS);
        let mut silence_check = interval(silence_limit);
        silence_check.tick().await; // consume immediate first tick
        let mut last_frame = Instant::now();

        loop {
            tokio::select! {
                // Teardown wins over any frame already waiting to be read.
                biased;

                _ = wait_for_shutdown(shutdown) => {
                    let _ = write.send(Message::Close(None)).await;
                    return StreamExit::Shutdown;
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_frame = Instant::now();
                            self.handle_frame(&text);
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            last_frame = Instant::now();
                            match std::str::from_utf8(&bytes) {
                                Ok(text) => {
                                    self.handle_frame(text);
                                }
                                Err(_) => {
                                    self.health.record_frame();
                                    self.health.record_malformed();
                                    debug!(len = bytes.len(), "non-UTF-8 binary frame dropped");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return StreamExit::Failed(e.into());
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return StreamExit::Closed,
                        Some(Err(e)) => return StreamExit::Failed(e.into()),
                        Some(Ok(_)) => {}
                    }
                }

                _ = silence_check.tick() => {
                    let idle = last_frame.elapsed();
                    if idle >= silence_limit {
                        warn!(idle_secs = idle.as_secs(), url = %self.url, "stream silent, no frames received");
                    }
                }
            }
        }
    }

    /// Applies one text frame: heartbeats are ignored, snapshots replace the
    /// store, anything unparseable is counted and dropped.
    pub(crate) fn handle_frame(&self, text: &str) -> FrameOutcome {
        let started = Instant::now();
        let total_frames = self.health.record_frame();
        if total_frames % 500 == 0 {
            info!(
                frames = total_frames,
                snapshots = self.health.snapshots_applied(),
                heartbeats = self.health.heartbeats(),
                malformed = self.health.malformed_frames(),
                "[STREAM] {total_frames} frames received"
            );
        }

        match parse_stream_frame(text) {
            Some(ParsedFrame::Heartbeat) => {
                self.health.record_heartbeat();
                FrameOutcome::Heartbeat
            }
            Some(ParsedFrame::Snapshot(snapshot)) => {
                let records = snapshot.len();
                self.store.replace(snapshot);
                self.health.record_snapshot();
                self.health.apply_latency.record(started.elapsed());
                debug!(records, "snapshot applied");
                FrameOutcome::Applied(records)
            }
            None => {
                self.health.record_malformed();
                FrameOutcome::Malformed
            }
        }
    }

    fn set_status(&self, next: ConnectionStatus) {
        let prev = self.status.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "stream status changed");
        }
    }
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// Returned by `spawn`. Dropping the handle tears the connection down too.
pub struct StreamHandle {
    pub(crate) status: watch::Receiver<ConnectionStatus>,
    pub(crate) health: Arc<StreamHealth>,
    pub(crate) shutdown: watch::Sender<bool>,
    pub(crate) task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn health(&self) -> Arc<StreamHealth> {
        Arc::clone(&self.health)
    }

    /// Stop receiving and wait for the connection task to finish.
    /// No snapshot is applied after this is called.
    pub async fn close(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("stream task ended abnormally: {e}");
        }
    }
}

/// Resolves once teardown is requested or the handle is gone.
pub(crate) async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (StreamConnection, Arc<SnapshotStore>) {
        let store = SnapshotStore::new();
        let conn = StreamConnection::new("ws://127.0.0.1:9/unused", Arc::clone(&store));
        (conn, store)
    }

    #[test]
    fn starts_in_connecting() {
        let (conn, _) = connection();
        assert_eq!(conn.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn heartbeat_leaves_store_untouched() {
        let (conn, store) = connection();
        assert_eq!(conn.handle_frame(r#"{"type":"heartbeat"}"#), FrameOutcome::Heartbeat);
        assert_eq!(store.replacements(), 0);
        assert_eq!(conn.health().heartbeats(), 1);
    }

    #[test]
    fn malformed_frame_is_swallowed_and_next_frame_applies() {
        let (conn, store) = connection();
        conn.handle_frame(r#"{"exchange":"binance","metrics":[{"symbol":"BTCUSDT"}]}"#);
        assert_eq!(conn.handle_frame("{garbage"), FrameOutcome::Malformed);
        assert_eq!(store.current().records[0].symbol, "BTCUSDT");
        assert_eq!(conn.status(), ConnectionStatus::Connecting);

        let outcome = conn.handle_frame(
            r#"{"exchange":"binance","metrics":[{"symbol":"ETHUSDT"},{"symbol":"SOLUSDT"}]}"#,
        );
        assert_eq!(outcome, FrameOutcome::Applied(2));
        assert_eq!(store.current().records[0].symbol, "ETHUSDT");
        assert_eq!(conn.health().malformed_frames(), 1);
        assert_eq!(conn.health().frames_received(), 3);
    }

    #[tokio::test]
    async fn failed_connect_ends_disconnected() {
        // Port 9 (discard) is expected to refuse connections.
        let (conn, _) = connection();
        let handle = conn.spawn();
        let mut status = handle.status_receiver();
        tokio::time::timeout(Duration::from_secs(5), async {
            while *status.borrow_and_update() != ConnectionStatus::Disconnected {
                if status.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .expect("status should reach Disconnected");
        assert_eq!(handle.status(), ConnectionStatus::Disconnected);
        handle.close().await;
    }
}
