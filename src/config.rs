use std::time::Duration;

use crate::analytics::{AnalyticsQuery, WindowDays};
use crate::error::{AppError, Result};
use crate::types::ExchangeScope;

pub const STREAM_URL: &str = "ws://127.0.0.1:8000/ws/metrics";
pub const ANALYTICS_API_URL: &str = "http://127.0.0.1:8000/api/analytics";

/// Reconnect backoff values in milliseconds. The last value repeats.
pub const RECONNECT_BACKOFF_MS: &[u64] = &[500, 1_000, 2_000, 5_000, 10_000];

/// Warn when an open stream has delivered nothing (not even a heartbeat) for this long.
pub const STREAM_SILENCE_WARN_SECS: u64 = 30;

/// Text payloads treated as keep-alives, either bare or as the frame's `type` field.
pub const HEARTBEAT_MARKERS: &[&str] = &["heartbeat", "ping", "keepalive"];

/// Rows returned by `/screener` when no `limit` is given.
pub const DEFAULT_SCREENER_LIMIT: usize = 200;

/// Breakpoints for presentation-only buckets. Never used by filtering.
pub mod buckets {
    /// signal_score (0–100)
    pub const SCORE_ELITE_MIN: f64 = 80.0;
    pub const SCORE_STRONG_MIN: f64 = 65.0;
    pub const SCORE_MODERATE_MIN: f64 = 50.0;

    /// data_quality_rate (0–1)
    pub const QUALITY_GOOD_MIN: f64 = 0.95;
    pub const QUALITY_FAIR_MIN: f64 = 0.80;
}

/// `Preset::HighSignal` threshold on signal_score.
pub const HIGH_SIGNAL_MIN_SCORE: f64 = 70.0;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the metric stream; the exchange scope is appended as a path segment.
    pub stream_url: String,
    pub exchange_scope: ExchangeScope,
    pub analytics_api_url: String,
    /// Seconds between background analytics refreshes (ANALYTICS_REFRESH_SECS)
    pub analytics_refresh_secs: u64,
    pub analytics_window_days: WindowDays,
    pub analytics_top_cohort_only: bool,
    pub http_timeout_secs: u64,
    pub log_level: String,
    pub api_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            stream_url: std::env::var("STREAM_URL").unwrap_or_else(|_| STREAM_URL.to_string()),
            exchange_scope: std::env::var("EXCHANGE_SCOPE")
                .unwrap_or_else(|_| "all".to_string())
                .parse::<ExchangeScope>()
                .map_err(|e| AppError::Config(format!("EXCHANGE_SCOPE: {e}")))?,
            analytics_api_url: std::env::var("ANALYTICS_API_URL")
                .unwrap_or_else(|_| ANALYTICS_API_URL.to_string()),
            analytics_refresh_secs: std::env::var("ANALYTICS_REFRESH_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    AppError::Config("ANALYTICS_REFRESH_SECS must be a whole number of seconds".to_string())
                })?,
            analytics_window_days: std::env::var("ANALYTICS_WINDOW_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<WindowDays>()
                .map_err(|e| AppError::Config(format!("ANALYTICS_WINDOW_DAYS: {e}")))?,
            analytics_top_cohort_only: std::env::var("ANALYTICS_TOP_COHORT_ONLY")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse::<u64>()
                .map_err(|_| AppError::Config("HTTP_TIMEOUT_SECS must be a whole number of seconds".to_string()))?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
        })
    }

    /// Stream endpoint for the configured exchange scope, e.g. `ws://host/ws/metrics/bybit`.
    pub fn stream_url_for(&self, scope: ExchangeScope) -> String {
        format!("{}/{}", self.stream_url.trim_end_matches('/'), scope)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// The analytics query the daemon refreshes in the background.
    pub fn default_analytics_query(&self) -> AnalyticsQuery {
        AnalyticsQuery {
            window_days: self.analytics_window_days,
            exchange: self.exchange_scope,
            top_cohort_only: self.analytics_top_cohort_only,
        }
    }
}
