//! Local servers for integration tests: a WebSocket metric stream and an
//! analytics HTTP API, both bound to ephemeral ports on 127.0.0.1.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Poll `check` every 10ms until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(timeout, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Await `fut` but fail the test instead of hanging.
pub async fn within<T>(timeout: Duration, fut: impl Future<Output = T>) -> T {
    match tokio::time::timeout(timeout, fut).await {
        Ok(v) => v,
        Err(_) => panic!("timed out after {timeout:?}"),
    }
}

pub fn snapshot_frame(exchange: &str, symbols: &[(&str, f64)]) -> String {
    let metrics: Vec<_> = symbols
        .iter()
        .map(|(symbol, change_5m)| json!({ "symbol": symbol, "change_5m": change_5m, "price": 100.0 }))
        .collect();
    json!({
        "type": "snapshot",
        "exchange": exchange,
        "timestamp": "2024-03-01T12:00:00Z",
        "metrics": metrics,
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Mock metric stream
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Outbound {
    Frame(String),
    Close,
}

/// Pushes whatever the test sends to every connected client.
pub struct MockStreamServer {
    pub addr: SocketAddr,
    outbound: broadcast::Sender<Outbound>,
    connections: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
}

impl MockStreamServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (outbound, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(Notify::new());

        let tx = outbound.clone();
        let count = Arc::clone(&connections);
        let stop = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        // Subscribe before the handshake so no frame sent after
                        // `connections()` ticks up can be missed.
                        let rx = tx.subscribe();
                        let count = Arc::clone(&count);
                        tokio::spawn(Self::handle_connection(stream, rx, count));
                    }
                    _ = stop.notified() => break,
                }
            }
        });

        Self {
            addr,
            outbound,
            connections,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        mut rx: broadcast::Receiver<Outbound>,
        count: Arc<AtomicUsize>,
    ) {
        let Ok(ws) = accept_async(stream).await else {
            return;
        };
        count.fetch_add(1, Ordering::SeqCst);
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                out = rx.recv() => match out {
                    Ok(Outbound::Frame(text)) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Outbound::Close) | Err(_) => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws/metrics", self.addr)
    }

    pub fn send(&self, frame: impl Into<String>) {
        let _ = self.outbound.send(Outbound::Frame(frame.into()));
    }

    /// Close every open client connection from the server side.
    pub fn close_all(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Completed WebSocket handshakes so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockStreamServer {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
        let _ = self.outbound.send(Outbound::Close);
    }
}

// ---------------------------------------------------------------------------
// Mock analytics API
// ---------------------------------------------------------------------------

pub const ANALYTICS_ENDPOINTS: [&str; 6] = [
    "summary",
    "status",
    "breakdown",
    "best-buckets",
    "best-symbols",
    "worst-symbols",
];

#[derive(Default)]
pub struct AnalyticsBehavior {
    /// Endpoints answering 500.
    pub failing: HashSet<&'static str>,
    /// Endpoints answering 200 with a body that is not JSON.
    pub garbled: HashSet<&'static str>,
    /// Endpoints that stall this long before answering, to trip client timeouts.
    pub hanging: HashMap<&'static str, Duration>,
    /// Extra latency for requests with this `window_days`.
    pub delays: HashMap<u32, Duration>,
    pub recompute_status: Option<StatusCode>,
}

struct MockAnalyticsState {
    behavior: Mutex<AnalyticsBehavior>,
    requests: AtomicUsize,
    recompute_calls: AtomicUsize,
}

pub struct MockAnalyticsServer {
    pub addr: SocketAddr,
    state: Arc<MockAnalyticsState>,
}

impl MockAnalyticsServer {
    pub async fn start(behavior: AnalyticsBehavior) -> Self {
        let state = Arc::new(MockAnalyticsState {
            behavior: Mutex::new(behavior),
            requests: AtomicUsize::new(0),
            recompute_calls: AtomicUsize::new(0),
        });
        let app = Router::new()
            .route("/api/analytics/recompute", post(recompute))
            .route("/api/analytics/:endpoint", get(collection))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/analytics", self.addr)
    }

    /// Make every endpoint in `endpoints` answer 500 from now on.
    pub fn set_failing(&self, endpoints: &[&'static str]) {
        self.state.behavior.lock().unwrap().failing = endpoints.iter().copied().collect();
    }

    pub fn set_recompute_status(&self, status: StatusCode) {
        self.state.behavior.lock().unwrap().recompute_status = Some(status);
    }

    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn recompute_calls(&self) -> usize {
        self.state.recompute_calls.load(Ordering::SeqCst)
    }
}

async fn collection(
    State(state): State<Arc<MockAnalyticsState>>,
    Path(endpoint): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let window: u32 = params.get("window_days").and_then(|w| w.parse().ok()).unwrap_or(0);
    let exchange = params.get("exchange").cloned().unwrap_or_default();

    let (delay, failing, garbled) = {
        let b = state.behavior.lock().unwrap();
        let stall = b.hanging.get(endpoint.as_str()).copied();
        (
            b.delays.get(&window).copied().max(stall),
            b.failing.contains(endpoint.as_str()),
            b.garbled.contains(endpoint.as_str()),
        )
    };
    if let Some(d) = delay {
        tokio::time::sleep(d).await;
    }
    if failing {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    if garbled {
        return (StatusCode::OK, "<html>not json</html>").into_response();
    }

    // `total_trades` echoes the window so tests can tell batches apart.
    let body = match endpoint.as_str() {
        "summary" => json!({
            "total_trades": window,
            "wins": 24,
            "losses": 16,
            "win_rate": 0.6,
            "avg_return": 0.012,
            "median_return": 0.008,
            "profit_factor": 1.8,
            "avg_hold_minutes": 42.5,
        }),
        "status" => json!({
            "last_recompute_at": "2024-03-01T11:55:00Z",
            "data_quality_rate": 0.97,
            "connected": true,
            "stale": false,
        }),
        "breakdown" => json!([
            {"grade": "A", "timeframe": "5m", "side": "long", "trades": 10, "win_rate": 0.7, "avg_return": 0.02},
            {"grade": "B", "timeframe": "1h", "side": "short", "trades": 8, "win_rate": 0.5, "avg_return": 0.001},
        ]),
        "best-buckets" => json!({"data": [
            {"bucket": "80-100", "trades": 12, "win_rate": 0.75, "avg_return": 0.025},
        ]}),
        "best-symbols" => json!([
            {"symbol": "BTCUSDT", "exchange": exchange, "trades": 9, "win_rate": 0.77, "avg_return": 0.03, "total_return": 0.27},
            {"symbol": "SOLUSDT", "exchange": exchange, "trades": 6, "win_rate": 0.66, "avg_return": 0.02, "total_return": 0.12},
        ]),
        "worst-symbols" => json!([
            {"symbol": "DOGEUSDT", "exchange": exchange, "trades": 7, "win_rate": 0.28, "avg_return": -0.02, "total_return": -0.14},
        ]),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    Json(body).into_response()
}

async fn recompute(State(state): State<Arc<MockAnalyticsState>>) -> Response {
    state.recompute_calls.fetch_add(1, Ordering::SeqCst);
    let status = state
        .behavior
        .lock()
        .unwrap()
        .recompute_status
        .unwrap_or(StatusCode::OK);
    (status, Json(json!({ "ok": status.is_success() }))).into_response()
}
