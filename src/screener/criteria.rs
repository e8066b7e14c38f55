use std::str::FromStr;

use serde::Serialize;

use crate::config::HIGH_SIGNAL_MIN_SCORE;
use crate::types::{LiquidityCohort, MetricRecord, SignalStrength};

// ---------------------------------------------------------------------------
// MetricField: closed set of numeric fields usable for thresholds and sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    Price,
    Change1m,
    Change5m,
    Change15m,
    Change1h,
    Change4h,
    Change24h,
    /// |change_5m|, for "moved at least x either way" filters.
    AbsChange5m,
    Volume24h,
    MarketCap,
    OpenInterest,
    FundingRate,
    SignalScore,
    Momentum,
    Rsi14,
    Volatility1h,
}

impl MetricField {
    pub const ALL: [MetricField; 16] = [
        MetricField::Price,
        MetricField::Change1m,
        MetricField::Change5m,
        MetricField::Change15m,
        MetricField::Change1h,
        MetricField::Change4h,
        MetricField::Change24h,
        MetricField::AbsChange5m,
        MetricField::Volume24h,
        MetricField::MarketCap,
        MetricField::OpenInterest,
        MetricField::FundingRate,
        MetricField::SignalScore,
        MetricField::Momentum,
        MetricField::Rsi14,
        MetricField::Volatility1h,
    ];

    /// Field value, with non-finite numbers reported as absent.
    pub fn value(self, r: &MetricRecord) -> Option<f64> {
        let v = match self {
            MetricField::Price => r.price,
            MetricField::Change1m => r.change_1m,
            MetricField::Change5m => r.change_5m,
            MetricField::Change15m => r.change_15m,
            MetricField::Change1h => r.change_1h,
            MetricField::Change4h => r.change_4h,
            MetricField::Change24h => r.change_24h,
            MetricField::AbsChange5m => r.change_5m.map(f64::abs),
            MetricField::Volume24h => r.volume_24h,
            MetricField::MarketCap => r.market_cap,
            MetricField::OpenInterest => r.open_interest,
            MetricField::FundingRate => r.funding_rate,
            MetricField::SignalScore => r.signal_score,
            MetricField::Momentum => r.momentum,
            MetricField::Rsi14 => r.rsi_14,
            MetricField::Volatility1h => r.volatility_1h,
        };
        v.filter(|x| x.is_finite())
    }

    pub fn name(self) -> &'static str {
        match self {
            MetricField::Price => "price",
            MetricField::Change1m => "change_1m",
            MetricField::Change5m => "change_5m",
            MetricField::Change15m => "change_15m",
            MetricField::Change1h => "change_1h",
            MetricField::Change4h => "change_4h",
            MetricField::Change24h => "change_24h",
            MetricField::AbsChange5m => "abs_change_5m",
            MetricField::Volume24h => "volume_24h",
            MetricField::MarketCap => "market_cap",
            MetricField::OpenInterest => "open_interest",
            MetricField::FundingRate => "funding_rate",
            MetricField::SignalScore => "signal_score",
            MetricField::Momentum => "momentum",
            MetricField::Rsi14 => "rsi_14",
            MetricField::Volatility1h => "volatility_1h",
        }
    }
}

impl std::fmt::Display for MetricField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for MetricField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        MetricField::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| format!("unknown metric field '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Min(f64),
    Max(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Threshold {
    pub field: MetricField,
    pub bound: Bound,
}

impl Threshold {
    /// A record without the field never passes, whichever direction the bound points.
    pub fn matches(&self, r: &MetricRecord) -> bool {
        let Some(v) = self.field.value(r) else {
            return false;
        };
        match self.bound {
            Bound::Min(min) => v >= min,
            Bound::Max(max) => v <= max,
        }
    }
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// One-click filter shortcuts. At most one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    Gainers5m,
    Losers5m,
    Gainers1h,
    Losers1h,
    HighSignal,
    StrongSignal,
    CipherBuy,
    CipherSell,
    VolumeSpike,
    TopCohort,
}

impl Preset {
    pub const ALL: [Preset; 10] = [
        Preset::Gainers5m,
        Preset::Losers5m,
        Preset::Gainers1h,
        Preset::Losers1h,
        Preset::HighSignal,
        Preset::StrongSignal,
        Preset::CipherBuy,
        Preset::CipherSell,
        Preset::VolumeSpike,
        Preset::TopCohort,
    ];

    pub fn matches(self, r: &MetricRecord) -> bool {
        let positive = |v: Option<f64>| v.is_some_and(|x| x.is_finite() && x > 0.0);
        let negative = |v: Option<f64>| v.is_some_and(|x| x.is_finite() && x < 0.0);
        match self {
            Preset::Gainers5m => positive(r.change_5m),
            Preset::Losers5m => negative(r.change_5m),
            Preset::Gainers1h => positive(r.change_1h),
            Preset::Losers1h => negative(r.change_1h),
            Preset::HighSignal => {
                MetricField::SignalScore.value(r).is_some_and(|s| s >= HIGH_SIGNAL_MIN_SCORE)
            }
            Preset::StrongSignal => matches!(
                r.signal_strength,
                Some(SignalStrength::Strong | SignalStrength::VeryStrong)
            ),
            Preset::CipherBuy => r.cipher_b_buy == Some(true),
            Preset::CipherSell => r.cipher_b_sell == Some(true),
            Preset::VolumeSpike => r.volume_spike == Some(true),
            Preset::TopCohort => r.liquidity_cohort == Some(LiquidityCohort::Top),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Preset::Gainers5m => "gainers-5m",
            Preset::Losers5m => "losers-5m",
            Preset::Gainers1h => "gainers-1h",
            Preset::Losers1h => "losers-1h",
            Preset::HighSignal => "high-signal",
            Preset::StrongSignal => "strong-signal",
            Preset::CipherBuy => "cipher-buy",
            Preset::CipherSell => "cipher-sell",
            Preset::VolumeSpike => "volume-spike",
            Preset::TopCohort => "top-cohort",
        }
    }

    /// Next preset in the cycle `None → first → … → last → None`.
    pub fn cycle(current: Option<Preset>) -> Option<Preset> {
        match current {
            None => Some(Preset::ALL[0]),
            Some(p) => {
                let idx = Preset::ALL.iter().position(|x| *x == p).unwrap_or(0);
                Preset::ALL.get(idx + 1).copied()
            }
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    /// Accepts kebab, snake or squashed spelling: `gainers-5m`, `gainers_5m`, `gainers5m`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let squash = |x: &str| -> String {
            x.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase()
        };
        let wanted = squash(s);
        Preset::ALL
            .into_iter()
            .find(|p| squash(p.name()) == wanted)
            .ok_or_else(|| format!("unknown preset '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// FilterCriteria
// ---------------------------------------------------------------------------

/// Immutable filter description. All active predicates are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterCriteria {
    query: String,
    preset: Option<Preset>,
    thresholds: Vec<Threshold>,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_preset(mut self, preset: Option<Preset>) -> Self {
        self.preset = preset;
        self
    }

    pub fn with_min(mut self, field: MetricField, min: f64) -> Self {
        self.thresholds.push(Threshold { field, bound: Bound::Min(min) });
        self
    }

    pub fn with_max(mut self, field: MetricField, max: f64) -> Self {
        self.thresholds.push(Threshold { field, bound: Bound::Max(max) });
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn preset(&self) -> Option<Preset> {
        self.preset
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    /// Free text, then thresholds, then preset.
    pub fn matches(&self, r: &MetricRecord) -> bool {
        let needle = self.query.trim();
        if !needle.is_empty()
            && !r.symbol.to_lowercase().contains(&needle.to_lowercase())
        {
            return false;
        }
        if !self.thresholds.iter().all(|t| t.matches(r)) {
            return false;
        }
        self.preset.map_or(true, |p| p.matches(r))
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Field(MetricField),
    Symbol,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("symbol") {
            return Ok(SortKey::Symbol);
        }
        s.parse::<MetricField>().map(SortKey::Field)
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortKey::Field(field) => write!(f, "{field}"),
            SortKey::Symbol => write!(f, "symbol"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: Direction,
}

impl SortSpec {
    pub fn new(key: SortKey, direction: Direction) -> Self {
        Self { key, direction }
    }

    pub fn desc(field: MetricField) -> Self {
        Self::new(SortKey::Field(field), Direction::Desc)
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::desc(MetricField::Change5m)
    }
}
