use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::RECONNECT_BACKOFF_MS;
use crate::ws::connection::{wait_for_shutdown, StreamConnection, StreamExit, StreamHandle};

/// Reconnect policy layered over a `StreamConnection`.
///
/// Each attempt is an ordinary connection cycle, so status still walks
/// `Connecting → Connected → Disconnected`; the supervisor only decides when to
/// start the next one. Backoff resets after a clean server close.
pub struct StreamSupervisor {
    connection: StreamConnection,
    backoff_ms: Vec<u64>,
}

impl StreamSupervisor {
    pub fn new(connection: StreamConnection) -> Self {
        Self {
            connection,
            backoff_ms: RECONNECT_BACKOFF_MS.to_vec(),
        }
    }

    pub fn with_backoff(mut self, backoff_ms: &[u64]) -> Self {
        self.backoff_ms = backoff_ms.to_vec();
        self
    }

    pub fn spawn(self) -> StreamHandle {
        let status = self.connection.subscribe_status();
        let health = self.connection.health();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        StreamHandle {
            status,
            health,
            shutdown,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff_idx = 0usize;

        loop {
            match self.connection.run_once(&mut shutdown).await {
                StreamExit::Shutdown => {
                    info!("stream supervisor stopped");
                    return;
                }
                StreamExit::Closed => {
                    info!("stream closed cleanly");
                    backoff_idx = 0;
                }
                StreamExit::Failed(e) => {
                    error!("stream connection error: {e}");
                }
            }

            let delay_ms = self
                .backoff_ms
                .get(backoff_idx)
                .or_else(|| self.backoff_ms.last())
                .copied()
                .unwrap_or(1_000);
            backoff_idx = (backoff_idx + 1).min(self.backoff_ms.len().saturating_sub(1));

            warn!(url = %self.connection.url(), "stream reconnecting in {delay_ms}ms");
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("stream supervisor stopped during backoff");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }
            self.connection.health().record_reconnect();
        }
    }
}
