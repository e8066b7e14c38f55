use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::de;
use crate::types::ExchangeScope;

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WindowDays {
    #[default]
    D30,
    D90,
}

impl WindowDays {
    pub fn days(self) -> u32 {
        match self {
            WindowDays::D30 => 30,
            WindowDays::D90 => 90,
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            WindowDays::D30 => WindowDays::D90,
            WindowDays::D90 => WindowDays::D30,
        }
    }
}

impl TryFrom<u32> for WindowDays {
    type Error = String;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        match days {
            30 => Ok(WindowDays::D30),
            90 => Ok(WindowDays::D90),
            other => Err(format!("window_days must be 30 or 90, got {other}")),
        }
    }
}

impl FromStr for WindowDays {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let days = s
            .trim()
            .trim_end_matches('d')
            .parse::<u32>()
            .map_err(|_| format!("window_days must be 30 or 90, got '{s}'"))?;
        WindowDays::try_from(days)
    }
}

impl std::fmt::Display for WindowDays {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d", self.days())
    }
}

impl Serialize for WindowDays {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(self.days())
    }
}

impl<'de> Deserialize<'de> for WindowDays {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let days = u32::deserialize(d)?;
        WindowDays::try_from(days).map_err(serde::de::Error::custom)
    }
}

/// Identity of one analytics result set. Encoded as
/// `window_days=30&exchange=all&top_cohort_only=false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalyticsQuery {
    pub window_days: WindowDays,
    pub exchange: ExchangeScope,
    #[serde(default)]
    pub top_cohort_only: bool,
}

impl std::fmt::Display for AnalyticsQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} · {}", self.window_days, self.exchange)?;
        if self.top_cohort_only {
            write!(f, " · top cohort")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Result collections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    #[serde(default, deserialize_with = "de::opt_u64")]
    pub total_trades: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_u64")]
    pub wins: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_u64")]
    pub losses: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub win_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub avg_return: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub median_return: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub profit_factor: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub avg_hold_minutes: Option<f64>,
}

/// Backend freshness block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsStatus {
    #[serde(default, deserialize_with = "de::opt_timestamp")]
    pub last_recompute_at: Option<DateTime<Utc>>,
    /// Share of evaluated signals with complete outcome data (0–1).
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub data_quality_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub connected: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub stale: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_u64")]
    pub signals_evaluated: Option<u64>,
}

/// Outcome statistics for one grade × timeframe × side cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakdownRow {
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "de::opt_u64")]
    pub trades: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub win_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub avg_return: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketRow {
    #[serde(default)]
    pub bucket: String,
    #[serde(default, deserialize_with = "de::opt_u64")]
    pub trades: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub win_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub avg_return: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolRow {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default, deserialize_with = "de::opt_u64")]
    pub trades: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub win_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub avg_return: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub total_return: Option<f64>,
}

/// Six collections fetched as one batch. A failed read leaves its slot empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsResult {
    pub summary: Option<AnalyticsSummary>,
    pub status: Option<AnalyticsStatus>,
    pub breakdown: Vec<BreakdownRow>,
    pub best_buckets: Vec<BucketRow>,
    pub best_symbols: Vec<SymbolRow>,
    pub worst_symbols: Vec<SymbolRow>,
}

// ---------------------------------------------------------------------------
// Aggregator view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    #[default]
    Idle,
    Loading,
    Error,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BatchStatus::Idle => "idle",
            BatchStatus::Loading => "loading",
            BatchStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// A committed result together with the query that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsBatch {
    pub query: AnalyticsQuery,
    pub result: AnalyticsResult,
    pub fetched_at: DateTime<Utc>,
}

/// What presentation reads from the aggregator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyticsView {
    /// Most recently requested query.
    pub query: AnalyticsQuery,
    pub status: BatchStatus,
    pub error: Option<String>,
    /// Last successful batch. Kept through later errors.
    pub latest: Option<Arc<AnalyticsBatch>>,
    #[serde(skip)]
    pub(crate) generation: u64,
}
