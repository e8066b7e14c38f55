use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use metric_screener::analytics::{AnalyticsAggregator, AnalyticsClient, AnalyticsQuery, BatchOutcome};
use metric_screener::api::routes::{router, ApiState};
use metric_screener::config::Config;
use metric_screener::error::Result;
use metric_screener::state::SnapshotStore;
use metric_screener::ws::{StreamConnection, StreamSupervisor};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Live metric stream ---
    let store = SnapshotStore::new();
    let stream_url = cfg.stream_url_for(cfg.exchange_scope);
    info!(scope = %cfg.exchange_scope, url = %stream_url, "starting metric stream");
    let connection = StreamConnection::new(stream_url, Arc::clone(&store));
    let stream = StreamSupervisor::new(connection).spawn();

    // --- Analytics ---
    let client = AnalyticsClient::new(cfg.analytics_api_url.clone(), cfg.http_timeout())?;
    let analytics = AnalyticsAggregator::new(client);
    let refresh_every = Duration::from_secs(cfg.analytics_refresh_secs.max(1));
    tokio::spawn(analytics_refresh_loop(
        Arc::clone(&analytics),
        cfg.default_analytics_query(),
        refresh_every,
    ));

    // --- HTTP API server ---
    let api_state = ApiState {
        store: Arc::clone(&store),
        stream_status: stream.status_receiver(),
        stream_health: stream.health(),
        analytics: Arc::clone(&analytics),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {e}");
            }
            info!("shutdown requested");
        })
        .await?;

    analytics.cancel();
    stream.close().await;
    info!("stream closed, exiting");
    Ok(())
}

/// Periodic analytics refresh. Starts with the configured query, then follows
/// whatever query was requested last (e.g. through `/analytics/refresh`).
async fn analytics_refresh_loop(aggregator: Arc<AnalyticsAggregator>, initial: AnalyticsQuery, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // consume immediate first tick
    let mut query = initial;
    loop {
        match aggregator.spawn_run(query).await {
            Ok(BatchOutcome::Applied) => {}
            Ok(BatchOutcome::Failed) => warn!(%query, "scheduled analytics refresh failed"),
            Ok(BatchOutcome::Superseded) => info!(%query, "scheduled analytics refresh superseded"),
            Err(e) => error!("analytics refresh task panicked: {e}"),
        }
        ticker.tick().await;
        query = aggregator.view().query;
    }
}
