//! HTTP API served over a real listener, backed by an in-memory store and a
//! mock analytics API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{AnalyticsBehavior, MockAnalyticsServer};
use metric_screener::analytics::{AnalyticsAggregator, AnalyticsClient};
use metric_screener::api::routes::{router, ApiState};
use metric_screener::state::SnapshotStore;
use metric_screener::types::{MetricRecord, Snapshot};
use metric_screener::ws::StreamConnection;
use serde_json::{json, Value};

fn record(symbol: &str, change_5m: f64, signal: f64) -> MetricRecord {
    let mut r = MetricRecord::new("binance", symbol);
    r.price = Some(1234.5);
    r.change_5m = Some(change_5m);
    r.signal_score = Some(signal);
    r
}

async fn serve(analytics_url: String) -> (String, Arc<SnapshotStore>) {
    let store = SnapshotStore::new();
    store.replace(Snapshot {
        exchange: "binance".into(),
        timestamp: None,
        records: vec![record("BTCUSDT", 0.021, 75.0), record("ETHUSDT", -0.01, 40.0)],
    });

    // Never spawned: only its status and counters are exposed.
    let connection = StreamConnection::new("ws://127.0.0.1:9/unused", Arc::clone(&store));
    let client = AnalyticsClient::new(analytics_url, Duration::from_secs(3)).unwrap();
    let state = ApiState {
        store: Arc::clone(&store),
        stream_status: connection.subscribe_status(),
        stream_health: connection.health(),
        analytics: AnalyticsAggregator::new(client),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(state)).await;
    });
    (format!("http://{addr}"), store)
}

#[tokio::test]
async fn screener_filters_sorts_and_formats() {
    let analytics = MockAnalyticsServer::start(AnalyticsBehavior::default()).await;
    let (base, _store) = serve(analytics.base_url()).await;
    let http = reqwest::Client::new();

    let body: Value = http
        .get(format!("{base}/screener?preset=gainers-5m&min_signal=70"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 2);
    assert_eq!(body["matched"], 1);
    assert_eq!(body["rows"][0]["symbol"], "BTCUSDT");
    assert_eq!(body["rows"][0]["price"], "1235");
    assert_eq!(body["rows"][0]["change_5m"], "+2.10%");

    let all: Value = http
        .get(format!("{base}/screener?sort=symbol&dir=desc&limit=1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all["matched"], 2);
    assert_eq!(all["rows"].as_array().unwrap().len(), 1);
    assert_eq!(all["rows"][0]["symbol"], "ETHUSDT");
}

#[tokio::test]
async fn bad_screener_params_are_rejected() {
    let analytics = MockAnalyticsServer::start(AnalyticsBehavior::default()).await;
    let (base, _store) = serve(analytics.base_url()).await;

    let resp = reqwest::get(format!("{base}/screener?preset=moonshots")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = reqwest::get(format!("{base}/screener?sort=not_a_field")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_store_and_stream() {
    let analytics = MockAnalyticsServer::start(AnalyticsBehavior::default()).await;
    let (base, _store) = serve(analytics.base_url()).await;

    let body: Value = reqwest::get(format!("{base}/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body["records"], 2);
    assert_eq!(body["exchange"], "binance");
    assert_eq!(body["stream_status"], "connecting");
    assert_eq!(body["analytics_status"], "idle");
}

#[tokio::test]
async fn analytics_refresh_runs_query_and_serves_view() {
    let analytics = MockAnalyticsServer::start(AnalyticsBehavior::default()).await;
    let (base, _store) = serve(analytics.base_url()).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{base}/analytics/refresh"))
        .json(&json!({ "window_days": 90, "exchange": "bybit", "top_cohort_only": false }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "idle");
    assert_eq!(body["query"]["window_days"], 90);
    assert_eq!(body["latest"]["result"]["summary"]["total_trades"], 90);
    assert_eq!(body["data_quality"], "good");

    let view: Value = http.get(format!("{base}/analytics")).send().await.unwrap().json().await.unwrap();
    assert_eq!(view["latest"]["query"]["exchange"], "bybit");

    let latency: Value = http.get(format!("{base}/stats/latency")).send().await.unwrap().json().await.unwrap();
    assert_eq!(latency["analytics_batch"]["sample_count"], 1);
    assert_eq!(latency["frame_apply"]["sample_count"], 0);
}

#[tokio::test]
async fn failed_recompute_maps_to_bad_gateway() {
    let analytics = MockAnalyticsServer::start(AnalyticsBehavior::default()).await;
    analytics.set_recompute_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    let (base, _store) = serve(analytics.base_url()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/analytics/recompute"))
        .json(&json!({ "window_days": 30, "exchange": "all" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);
}
