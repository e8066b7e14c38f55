use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::HEARTBEAT_MARKERS;
use crate::de;
use crate::types::{MetricRecord, Snapshot};

static PARSE_FAILURES: AtomicU64 = AtomicU64::new(0);

/// Raw deserializable shape covering both stream frame kinds.
/// Heartbeats carry only `type`; snapshots carry `metrics` (and usually no `type`).
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", alias = "event_type")]
    kind: Option<String>,
    exchange: Option<String>,
    #[serde(default, deserialize_with = "de::opt_timestamp")]
    timestamp: Option<DateTime<Utc>>,
    metrics: Option<Vec<MetricRecord>>,
}

#[derive(Debug)]
pub enum ParsedFrame {
    /// Keep-alive marker. Carries no data.
    Heartbeat,
    /// Full replacement for the held snapshot.
    Snapshot(Snapshot),
}

/// Parse one text frame from the metric stream.
///
/// Returns `None` for anything that is neither a heartbeat nor a snapshot:
/// invalid JSON, a record without a symbol, or an object with no `metrics`.
/// Callers drop those frames without changing state.
pub fn parse_stream_frame(raw: &str) -> Option<ParsedFrame> {
    let trimmed = raw.trim();
    if is_heartbeat_marker(trimmed.trim_matches('"')) {
        return Some(ParsedFrame::Heartbeat);
    }

    let frame = match serde_json::from_str::<RawFrame>(trimmed) {
        Ok(f) => f,
        Err(e) => {
            log_parse_failure(raw, &e.to_string());
            return None;
        }
    };

    if frame.kind.as_deref().is_some_and(is_heartbeat_marker) {
        return Some(ParsedFrame::Heartbeat);
    }

    let Some(metrics) = frame.metrics else {
        log_parse_failure(raw, "no metrics array");
        return None;
    };

    let exchange = frame.exchange.unwrap_or_default();
    Some(ParsedFrame::Snapshot(Snapshot {
        records: dedupe_records(metrics, &exchange),
        exchange,
        timestamp: frame.timestamp,
    }))
}

fn is_heartbeat_marker(s: &str) -> bool {
    HEARTBEAT_MARKERS.iter().any(|m| s.eq_ignore_ascii_case(m))
}

/// Keeps the first record per `(exchange, symbol)`, preserving delivery order.
/// Records without an exchange inherit the frame's exchange.
fn dedupe_records(metrics: Vec<MetricRecord>, exchange: &str) -> Vec<MetricRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(metrics.len());
    let mut records = Vec::with_capacity(metrics.len());
    let mut dropped = 0usize;

    for mut rec in metrics {
        if rec.exchange.is_empty() {
            rec.exchange = exchange.to_string();
        }
        if seen.insert((rec.exchange.clone(), rec.symbol.clone())) {
            records.push(rec);
        } else {
            dropped += 1;
        }
    }

    if dropped > 0 {
        debug!(dropped, exchange, "duplicate records dropped from snapshot");
    }
    records
}

fn log_parse_failure(raw: &str, reason: &str) {
    let count = PARSE_FAILURES.fetch_add(1, Ordering::Relaxed) + 1;
    if count <= 10 || count % 1000 == 0 {
        let sample: String = raw.chars().take(300).collect();
        warn!(count, reason, "[STREAM PARSE] unrecognized frame: {sample}");
    }
}
