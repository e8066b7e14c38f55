use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::analytics::{AnalyticsAggregator, AnalyticsQuery, AnalyticsView, BatchOutcome, BatchStatus};
use crate::api::health::StreamHealth;
use crate::api::latency::LatencySummary;
use crate::config::DEFAULT_SCREENER_LIMIT;
use crate::error::AppError;
use crate::format::{self, QualityBucket, ScoreBucket, Tone};
use crate::screener::{screen, Direction, FilterCriteria, MetricField, Preset, SortKey, SortSpec};
use crate::state::SnapshotStore;
use crate::types::{ConnectionStatus, MetricRecord};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<SnapshotStore>,
    pub stream_status: watch::Receiver<ConnectionStatus>,
    pub stream_health: Arc<StreamHealth>,
    pub analytics: Arc<AnalyticsAggregator>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/screener", get(get_screener))
        .route("/analytics", get(get_analytics))
        .route("/analytics/refresh", post(post_analytics_refresh))
        .route("/analytics/recompute", post(post_analytics_recompute))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ScreenerQuery {
    pub q: Option<String>,
    pub preset: Option<String>,
    pub min_signal: Option<f64>,
    pub min_abs_change_5m: Option<f64>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub limit: Option<usize>,
}

impl ScreenerQuery {
    fn criteria(&self) -> Result<FilterCriteria, AppError> {
        let preset = self
            .preset
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(str::parse::<Preset>)
            .transpose()
            .map_err(AppError::InvalidParam)?;

        let mut criteria = FilterCriteria::new()
            .with_query(self.q.clone().unwrap_or_default())
            .with_preset(preset);
        if let Some(min) = self.min_signal {
            criteria = criteria.with_min(MetricField::SignalScore, min);
        }
        if let Some(min) = self.min_abs_change_5m {
            criteria = criteria.with_min(MetricField::AbsChange5m, min);
        }
        Ok(criteria)
    }

    fn sort(&self) -> Result<SortSpec, AppError> {
        let default = SortSpec::default();
        let key = match self.sort.as_deref() {
            Some(s) => s.parse::<SortKey>().map_err(AppError::InvalidParam)?,
            None => default.key,
        };
        let direction = match self.dir.as_deref() {
            Some(d) => d.parse::<Direction>().map_err(AppError::InvalidParam)?,
            None => default.direction,
        };
        Ok(SortSpec::new(key, direction))
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub stream_status: ConnectionStatus,
    pub exchange: String,
    pub records: usize,
    pub snapshot_at: Option<DateTime<Utc>>,
    pub snapshot_age_secs: Option<i64>,
    pub frames_received: u64,
    pub heartbeats: u64,
    pub snapshots_applied: u64,
    pub malformed_frames: u64,
    pub reconnects: u64,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub analytics_status: BatchStatus,
}

/// One screener row, display-ready. `raw` carries the unformatted record.
#[derive(Serialize)]
pub struct ScreenerRow {
    pub symbol: String,
    pub exchange: String,
    pub price: String,
    pub change_5m: String,
    pub change_1h: String,
    pub change_24h: String,
    pub volume_24h: String,
    pub open_interest: String,
    pub funding_rate: String,
    pub signal_score: String,
    pub score_bucket: ScoreBucket,
    pub tone_5m: Tone,
    pub raw: MetricRecord,
}

impl From<&MetricRecord> for ScreenerRow {
    fn from(r: &MetricRecord) -> Self {
        Self {
            symbol: r.symbol.clone(),
            exchange: r.exchange.clone(),
            price: format::fmt_price(r.price),
            change_5m: format::fmt_pct(r.change_5m),
            change_1h: format::fmt_pct(r.change_1h),
            change_24h: format::fmt_pct(r.change_24h),
            volume_24h: format::fmt_large(r.volume_24h),
            open_interest: format::fmt_large(r.open_interest),
            funding_rate: format::fmt_pct(r.funding_rate),
            signal_score: format::fmt_num(r.signal_score, 1),
            score_bucket: ScoreBucket::from_score(r.signal_score),
            tone_5m: Tone::from_change(r.change_5m),
            raw: r.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct ScreenerResponse {
    pub exchange: String,
    pub snapshot_at: Option<DateTime<Utc>>,
    /// Records in the snapshot before filtering.
    pub total: usize,
    /// Records that passed the filter, before `limit`.
    pub matched: usize,
    pub rows: Vec<ScreenerRow>,
}

#[derive(Serialize)]
pub struct AnalyticsResponse {
    #[serde(flatten)]
    pub view: AnalyticsView,
    pub data_quality: QualityBucket,
}

impl From<AnalyticsView> for AnalyticsResponse {
    fn from(view: AnalyticsView) -> Self {
        let rate = view
            .latest
            .as_ref()
            .and_then(|b| b.result.status.as_ref())
            .and_then(|s| s.data_quality_rate);
        Self {
            view,
            data_quality: QualityBucket::from_rate(rate),
        }
    }
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub frame_apply: LatencySummary,
    pub analytics_batch: LatencySummary,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let snapshot = state.store.current();
    let health = &state.stream_health;
    let stream_status = *state.stream_status.borrow();
    Json(HealthResponse {
        stream_status,
        exchange: snapshot.exchange.clone(),
        records: snapshot.len(),
        snapshot_at: snapshot.timestamp,
        snapshot_age_secs: snapshot.age_secs(Utc::now()),
        frames_received: health.frames_received(),
        heartbeats: health.heartbeats(),
        snapshots_applied: health.snapshots_applied(),
        malformed_frames: health.malformed_frames(),
        reconnects: health.reconnects(),
        last_frame_at: health.last_frame_at(),
        analytics_status: state.analytics.view().status,
    })
}

async fn get_screener(
    State(state): State<ApiState>,
    Query(params): Query<ScreenerQuery>,
) -> Result<Json<ScreenerResponse>, AppError> {
    let criteria = params.criteria()?;
    let sort = params.sort()?;
    let limit = params.limit.unwrap_or(DEFAULT_SCREENER_LIMIT);

    let snapshot = state.store.current();
    let visible = screen(&snapshot.records, &criteria, sort);

    Ok(Json(ScreenerResponse {
        exchange: snapshot.exchange.clone(),
        snapshot_at: snapshot.timestamp,
        total: snapshot.len(),
        matched: visible.len(),
        rows: visible.iter().take(limit).map(ScreenerRow::from).collect(),
    }))
}

async fn get_analytics(State(state): State<ApiState>) -> Json<AnalyticsResponse> {
    Json(state.analytics.view().into())
}

/// Runs on a detached task so a dropped request cannot leave the view loading.
async fn post_analytics_refresh(
    State(state): State<ApiState>,
    Json(query): Json<AnalyticsQuery>,
) -> Result<Json<AnalyticsResponse>, AppError> {
    let outcome = state
        .analytics
        .spawn_run(query)
        .await
        .map_err(|e| AppError::Analytics(format!("refresh task failed: {e}")))?;
    analytics_outcome(&state, outcome)
}

async fn post_analytics_recompute(
    State(state): State<ApiState>,
    Json(query): Json<AnalyticsQuery>,
) -> Result<Json<AnalyticsResponse>, AppError> {
    let outcome = state
        .analytics
        .spawn_recompute(query)
        .await
        .map_err(|e| AppError::Analytics(format!("recompute task failed: {e}")))?;
    analytics_outcome(&state, outcome)
}

fn analytics_outcome(state: &ApiState, outcome: BatchOutcome) -> Result<Json<AnalyticsResponse>, AppError> {
    let view = state.analytics.view();
    match outcome {
        BatchOutcome::Failed => Err(AppError::Analytics(
            view.error.unwrap_or_else(|| "analytics request failed".to_string()),
        )),
        BatchOutcome::Applied | BatchOutcome::Superseded => Ok(Json(view.into())),
    }
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    Json(LatencyResponse {
        frame_apply: state.stream_health.apply_latency.summary(),
        analytics_batch: state.analytics.latency().summary(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screener_query_builds_criteria_and_sort() {
        let params = ScreenerQuery {
            q: Some("btc".into()),
            preset: Some("gainers_5m".into()),
            min_signal: Some(70.0),
            min_abs_change_5m: Some(0.01),
            sort: Some("signal_score".into()),
            dir: Some("asc".into()),
            limit: None,
        };
        let criteria = params.criteria().unwrap();
        assert_eq!(criteria.query(), "btc");
        assert_eq!(criteria.preset(), Some(Preset::Gainers5m));
        assert_eq!(criteria.thresholds().len(), 2);
        assert_eq!(
            params.sort().unwrap(),
            SortSpec::new(SortKey::Field(MetricField::SignalScore), Direction::Asc)
        );
    }

    #[test]
    fn empty_query_uses_defaults() {
        let params = ScreenerQuery::default();
        assert_eq!(params.criteria().unwrap(), FilterCriteria::new().with_query(""));
        assert_eq!(params.sort().unwrap(), SortSpec::default());
    }

    #[test]
    fn unknown_values_are_invalid_params() {
        let bad_preset = ScreenerQuery {
            preset: Some("moonshots".into()),
            ..Default::default()
        };
        assert!(matches!(bad_preset.criteria(), Err(AppError::InvalidParam(_))));

        let bad_dir = ScreenerQuery {
            dir: Some("sideways".into()),
            ..Default::default()
        };
        assert!(matches!(bad_dir.sort(), Err(AppError::InvalidParam(_))));
    }

    #[test]
    fn rows_are_formatted() {
        let mut r = MetricRecord::new("binance", "BTCUSDT");
        r.price = Some(64_000.0);
        r.change_5m = Some(0.021);
        r.signal_score = Some(82.0);
        let row = ScreenerRow::from(&r);
        assert_eq!(row.price, "64000");
        assert_eq!(row.change_5m, "+2.10%");
        assert_eq!(row.change_1h, format::PLACEHOLDER);
        assert_eq!(row.score_bucket, ScoreBucket::Elite);
        assert_eq!(row.tone_5m, Tone::Positive);
    }
}
