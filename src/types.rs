use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::de;

// ---------------------------------------------------------------------------
// MetricRecord
// ---------------------------------------------------------------------------

/// One row per monitored instrument. Identity is `(exchange, symbol)`.
///
/// Indicator values are computed upstream and carried as opaque optionals.
/// Percent-change fields are fractions (`0.021` = +2.1%).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(default)]
    pub exchange: String,
    pub symbol: String,

    #[serde(default, deserialize_with = "de::opt_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub change_1m: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub change_5m: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub change_15m: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub change_1h: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub change_4h: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub change_24h: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub volume_24h: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub market_cap: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub open_interest: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub funding_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub signal_score: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub momentum: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub rsi_14: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub volatility_1h: Option<f64>,

    #[serde(default, deserialize_with = "de::opt_bool")]
    pub cipher_b_buy: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub cipher_b_sell: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub volume_spike: Option<bool>,

    #[serde(default, deserialize_with = "de::opt_lenient")]
    pub signal_strength: Option<SignalStrength>,
    #[serde(default, deserialize_with = "de::opt_lenient")]
    pub liquidity_cohort: Option<LiquidityCohort>,
    #[serde(default, deserialize_with = "de::opt_lenient")]
    pub grade: Option<Grade>,
}

impl MetricRecord {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.exchange, &self.symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalStrength::Weak => "weak",
            SignalStrength::Moderate => "moderate",
            SignalStrength::Strong => "strong",
            SignalStrength::VeryStrong => "very_strong",
            SignalStrength::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityCohort {
    Top,
    Mid,
    Low,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for LiquidityCohort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LiquidityCohort::Top => "top",
            LiquidityCohort::Mid => "mid",
            LiquidityCohort::Low => "low",
            LiquidityCohort::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Letter grade assigned upstream to the current setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
            Grade::Unknown => "?",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The complete set of records asserted by one stream frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub exchange: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub records: Vec<MetricRecord>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Seconds since the upstream timestamp, if the frame carried one.
    pub fn age_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.timestamp.map(|ts| (now - ts).num_seconds().max(0))
    }
}

// ---------------------------------------------------------------------------
// Connection status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Exchange scope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeScope {
    #[default]
    All,
    Binance,
    Bybit,
}

impl ExchangeScope {
    pub const ALL: [ExchangeScope; 3] = [ExchangeScope::All, ExchangeScope::Binance, ExchangeScope::Bybit];

    /// Next scope in display order, wrapping around.
    pub fn next(self) -> Self {
        match self {
            ExchangeScope::All => ExchangeScope::Binance,
            ExchangeScope::Binance => ExchangeScope::Bybit,
            ExchangeScope::Bybit => ExchangeScope::All,
        }
    }
}

impl std::fmt::Display for ExchangeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExchangeScope::All => "all",
            ExchangeScope::Binance => "binance",
            ExchangeScope::Bybit => "bybit",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ExchangeScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "" => Ok(ExchangeScope::All),
            "binance" => Ok(ExchangeScope::Binance),
            "bybit" => Ok(ExchangeScope::Bybit),
            other => Err(format!("unknown exchange scope '{other}'")),
        }
    }
}
