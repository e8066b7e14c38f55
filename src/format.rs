//! Display formatting for metric and analytics values.
//!
//! Every function is total: absent and non-finite inputs render as
//! [`PLACEHOLDER`], everything else renders deterministically from the value
//! alone. Buckets are presentation hints only; filtering never reads them.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::buckets::*;

pub const PLACEHOLDER: &str = "—";

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

/// Round half away from zero to `decimals` places.
fn round_to(v: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    let scaled = v * scale;
    if !scaled.is_finite() {
        return v;
    }
    scaled.round() / scale
}

/// Round half away from zero to `decimals` places, then render with exactly that many.
fn fixed(v: f64, decimals: u32) -> String {
    let rounded = round_to(v, decimals);
    // Avoid "-0.00" for values that round to zero.
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{:.*}", decimals as usize, rounded)
}

/// Fraction as signed percentage: `0.021 → "+2.10%"`, `-0.005 → "-0.50%"`.
pub fn fmt_pct(v: Option<f64>) -> String {
    match finite(v) {
        Some(x) => {
            let pct = x * 100.0;
            if !pct.is_finite() {
                return PLACEHOLDER.to_string();
            }
            let body = fixed(pct, 2);
            if body.starts_with('-') {
                format!("{body}%")
            } else {
                format!("+{body}%")
            }
        }
        None => PLACEHOLDER.to_string(),
    }
}

fn price_decimals(mag: f64) -> u32 {
    if mag >= 1000.0 {
        0
    } else if mag >= 1.0 {
        2
    } else if mag >= 0.01 {
        4
    } else {
        6
    }
}

/// Price with precision tiered by magnitude. The tier follows the rounded
/// value, so `999.996` renders as `"1000"`.
pub fn fmt_price(v: Option<f64>) -> String {
    match finite(v) {
        Some(x) => {
            let decimals = price_decimals(x.abs());
            let decimals = price_decimals(round_to(x.abs(), decimals));
            fixed(x, decimals)
        }
        None => PLACEHOLDER.to_string(),
    }
}

/// `(divisor, suffix, decimals)`, largest first.
const LARGE_UNITS: [(f64, &str, u32); 4] = [(1e9, "B", 1), (1e6, "M", 0), (1e3, "K", 0), (1.0, "", 0)];

/// Market cap / open interest / volume: `1.2B`, `345M`, `12K`, `950`.
pub fn fmt_large(v: Option<f64>) -> String {
    match finite(v) {
        Some(x) => {
            let mag = x.abs();
            let mut idx = LARGE_UNITS
                .iter()
                .position(|(unit, _, _)| mag >= *unit)
                .unwrap_or(LARGE_UNITS.len() - 1);
            let (unit, _, decimals) = LARGE_UNITS[idx];
            // 999_999.9 rounds to 1000K; show it as 1M instead.
            if idx > 0 && round_to(mag / unit, decimals) >= 1000.0 {
                idx -= 1;
            }
            let (unit, suffix, decimals) = LARGE_UNITS[idx];
            format!("{}{suffix}", fixed(x / unit, decimals))
        }
        None => PLACEHOLDER.to_string(),
    }
}

/// Unsigned rate such as win rate or data quality: `0.953 → "95.3%"`.
pub fn fmt_rate(v: Option<f64>) -> String {
    match finite(v) {
        Some(x) => format!("{}%", fixed(x * 100.0, 1)),
        None => PLACEHOLDER.to_string(),
    }
}

/// Plain number with fixed decimals, e.g. signal score or RSI.
pub fn fmt_num(v: Option<f64>, decimals: u32) -> String {
    match finite(v) {
        Some(x) => fixed(x, decimals),
        None => PLACEHOLDER.to_string(),
    }
}

pub fn fmt_count(v: Option<u64>) -> String {
    v.map_or_else(|| PLACEHOLDER.to_string(), |n| n.to_string())
}

/// `HH:MM:SS` in UTC.
pub fn fmt_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(|| PLACEHOLDER.to_string(), |t| t.format("%H:%M:%S").to_string())
}

/// Coarse age relative to `now`: `"12s ago"`, `"4m ago"`, `"2h ago"`, `"3d ago"`.
pub fn fmt_age(ts: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(ts) = ts else {
        return PLACEHOLDER.to_string();
    };
    let secs = (now - ts).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s ago"),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

/// signal_score bucket, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBucket {
    Elite,
    Strong,
    Moderate,
    Weak,
    Unknown,
}

impl ScoreBucket {
    pub fn from_score(score: Option<f64>) -> Self {
        match finite(score) {
            Some(s) if s >= SCORE_ELITE_MIN => ScoreBucket::Elite,
            Some(s) if s >= SCORE_STRONG_MIN => ScoreBucket::Strong,
            Some(s) if s >= SCORE_MODERATE_MIN => ScoreBucket::Moderate,
            Some(_) => ScoreBucket::Weak,
            None => ScoreBucket::Unknown,
        }
    }
}

impl std::fmt::Display for ScoreBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScoreBucket::Elite => "elite",
            ScoreBucket::Strong => "strong",
            ScoreBucket::Moderate => "moderate",
            ScoreBucket::Weak => "weak",
            ScoreBucket::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Direction tint for change columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Positive,
    Negative,
    Flat,
    Muted,
}

impl Tone {
    pub fn from_change(change: Option<f64>) -> Self {
        match finite(change) {
            Some(c) if c > 0.0 => Tone::Positive,
            Some(c) if c < 0.0 => Tone::Negative,
            Some(_) => Tone::Flat,
            None => Tone::Muted,
        }
    }
}

/// Analytics data-quality bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBucket {
    Good,
    Fair,
    Poor,
    Unknown,
}

impl QualityBucket {
    pub fn from_rate(rate: Option<f64>) -> Self {
        match finite(rate) {
            Some(r) if r >= QUALITY_GOOD_MIN => QualityBucket::Good,
            Some(r) if r >= QUALITY_FAIR_MIN => QualityBucket::Fair,
            Some(_) => QualityBucket::Poor,
            None => QualityBucket::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ODD_INPUTS: [Option<f64>; 4] = [None, Some(f64::NAN), Some(f64::INFINITY), Some(f64::NEG_INFINITY)];

    #[test]
    fn every_formatter_maps_absent_and_non_finite_to_placeholder() {
        for v in ODD_INPUTS {
            assert_eq!(fmt_pct(v), PLACEHOLDER);
            assert_eq!(fmt_price(v), PLACEHOLDER);
            assert_eq!(fmt_large(v), PLACEHOLDER);
            assert_eq!(fmt_rate(v), PLACEHOLDER);
            assert_eq!(fmt_num(v, 1), PLACEHOLDER);
            assert_eq!(ScoreBucket::from_score(v), ScoreBucket::Unknown);
            assert_eq!(Tone::from_change(v), Tone::Muted);
            assert_eq!(QualityBucket::from_rate(v), QualityBucket::Unknown);
        }
        assert_eq!(fmt_count(None), PLACEHOLDER);
        assert_eq!(fmt_timestamp(None), PLACEHOLDER);
    }

    #[test]
    fn extreme_finite_values_do_not_panic() {
        for v in [f64::MAX, f64::MIN, f64::MIN_POSITIVE, -0.0, 1e-300] {
            let _ = fmt_pct(Some(v));
            let _ = fmt_price(Some(v));
            let _ = fmt_large(Some(v));
            let _ = fmt_rate(Some(v));
        }
    }

    #[test]
    fn pct_signs_and_rounds() {
        assert_eq!(fmt_pct(Some(0.021)), "+2.10%");
        assert_eq!(fmt_pct(Some(-0.01)), "-1.00%");
        assert_eq!(fmt_pct(Some(0.0)), "+0.00%");
        assert_eq!(fmt_pct(Some(-0.0)), "+0.00%");
        assert_eq!(fmt_pct(Some(0.12346)), "+12.35%");
    }

    #[test]
    fn price_tiers() {
        assert_eq!(fmt_price(Some(1234.5)), "1235");
        assert_eq!(fmt_price(Some(64000.0)), "64000");
        assert_eq!(fmt_price(Some(2.3456)), "2.35");
        assert_eq!(fmt_price(Some(1.0)), "1.00");
        assert_eq!(fmt_price(Some(0.5)), "0.5000");
        assert_eq!(fmt_price(Some(0.01)), "0.0100");
        assert_eq!(fmt_price(Some(0.00012345)), "0.000123");
        assert_eq!(fmt_price(None), PLACEHOLDER);
    }

    #[test]
    fn price_tier_follows_rounded_value() {
        assert_eq!(fmt_price(Some(999.996)), "1000");
        assert_eq!(fmt_price(Some(-999.996)), "-1000");
        assert_eq!(fmt_price(Some(0.99999)), "1.00");
        assert_eq!(fmt_price(Some(0.0099999)), "0.0100");
        assert_eq!(fmt_price(Some(999.994)), "999.99");
    }

    #[test]
    fn large_number_suffixes() {
        assert_eq!(fmt_large(Some(1_234_000_000.0)), "1.2B");
        assert_eq!(fmt_large(Some(345_600_000.0)), "346M");
        assert_eq!(fmt_large(Some(12_400.0)), "12K");
        assert_eq!(fmt_large(Some(950.0)), "950");
        assert_eq!(fmt_large(Some(-2_500_000_000.0)), "-2.5B");
    }

    #[test]
    fn large_suffix_promotes_when_rounding_reaches_1000() {
        assert_eq!(fmt_large(Some(999_999.9)), "1M");
        assert_eq!(fmt_large(Some(999_999_999.0)), "1.0B");
        assert_eq!(fmt_large(Some(999.6)), "1K");
        assert_eq!(fmt_large(Some(-999_600.0)), "-1M");
        assert_eq!(fmt_large(Some(999_400.0)), "999K");
        assert_eq!(fmt_large(Some(0.4)), "0");
    }

    #[test]
    fn rates_and_numbers() {
        assert_eq!(fmt_rate(Some(0.953)), "95.3%");
        assert_eq!(fmt_num(Some(74.56), 1), "74.6");
        assert_eq!(fmt_count(Some(42)), "42");
    }

    #[test]
    fn age_and_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(fmt_timestamp(Some(now)), "12:00:00");
        assert_eq!(fmt_age(Some(now - chrono::Duration::seconds(12)), now), "12s ago");
        assert_eq!(fmt_age(Some(now - chrono::Duration::minutes(4)), now), "4m ago");
        assert_eq!(fmt_age(Some(now - chrono::Duration::hours(2)), now), "2h ago");
        assert_eq!(fmt_age(Some(now + chrono::Duration::seconds(5)), now), "0s ago");
    }

    #[test]
    fn buckets_use_breakpoints() {
        assert_eq!(ScoreBucket::from_score(Some(80.0)), ScoreBucket::Elite);
        assert_eq!(ScoreBucket::from_score(Some(79.9)), ScoreBucket::Strong);
        assert_eq!(ScoreBucket::from_score(Some(50.0)), ScoreBucket::Moderate);
        assert_eq!(ScoreBucket::from_score(Some(10.0)), ScoreBucket::Weak);
        assert_eq!(Tone::from_change(Some(0.0)), Tone::Flat);
        assert_eq!(Tone::from_change(Some(-0.1)), Tone::Negative);
        assert_eq!(QualityBucket::from_rate(Some(0.9)), QualityBucket::Fair);
        assert_eq!(QualityBucket::from_rate(Some(0.5)), QualityBucket::Poor);
    }
}
