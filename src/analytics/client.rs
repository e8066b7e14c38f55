use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::analytics::types::{
    AnalyticsQuery, AnalyticsResult, AnalyticsStatus, AnalyticsSummary, BreakdownRow, BucketRow, SymbolRow,
};
use crate::error::{AppError, Result};

/// Keys some backends wrap a collection in instead of returning it bare.
const ENVELOPE_KEYS: &[&str] = &["data", "items", "rows", "results"];

/// Read-only client for the analytics HTTP API, plus the single recompute write.
#[derive(Debug, Clone)]
pub struct AnalyticsClient {
    http: reqwest::Client,
    base_url: String,
}

impl AnalyticsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch all six collections for `query` concurrently.
    ///
    /// An endpoint that fails on its own (transport error, non-success status,
    /// undecodable body) leaves its collection empty. The batch fails only when
    /// none of the six endpoints answered.
    pub async fn fetch_batch(&self, query: &AnalyticsQuery) -> Result<AnalyticsResult> {
        let (summary, status, breakdown, best_buckets, best_symbols, worst_symbols) = tokio::join!(
            self.get_one::<AnalyticsSummary>("summary", query),
            self.get_one::<AnalyticsStatus>("status", query),
            self.get_many::<BreakdownRow>("breakdown", query),
            self.get_many::<BucketRow>("best-buckets", query),
            self.get_many::<SymbolRow>("best-symbols", query),
            self.get_many::<SymbolRow>("worst-symbols", query),
        );

        let answered = [
            summary.is_some(),
            status.is_some(),
            breakdown.is_some(),
            best_buckets.is_some(),
            best_symbols.is_some(),
            worst_symbols.is_some(),
        ];
        if !answered.contains(&true) {
            return Err(AppError::Analytics(format!(
                "all {} analytics endpoints failed",
                answered.len()
            )));
        }

        Ok(AnalyticsResult {
            summary: summary.flatten(),
            status: status.flatten(),
            breakdown: breakdown.unwrap_or_default(),
            best_buckets: best_buckets.unwrap_or_default(),
            best_symbols: best_symbols.unwrap_or_default(),
            worst_symbols: worst_symbols.unwrap_or_default(),
        })
    }

    /// Ask the backend to rebuild its outcome tables for `query`.
    pub async fn recompute(&self, query: &AnalyticsQuery) -> Result<()> {
        let url = self.url("recompute");
        let resp = self.http.post(&url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Analytics(format!(
                "recompute failed with {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        debug!(%query, "analytics recompute accepted");
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// GET one endpoint. `None` means it did not answer with a readable JSON body.
    async fn get_json(&self, path: &str, query: &AnalyticsQuery) -> Option<Value> {
        let resp = match self.http.get(self.url(path)).query(query).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(endpoint = path, "analytics request failed: {e}");
                return None;
            }
        };
        let status = resp.status();
        if !status.is_success() {
            warn!(endpoint = path, %status, "analytics endpoint returned non-success");
            return None;
        }
        match resp.json::<Value>().await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(endpoint = path, "analytics body unreadable: {e}");
                None
            }
        }
    }

    /// Outer `None` when the endpoint failed, inner `None` when its object did not decode.
    async fn get_one<T: DeserializeOwned>(&self, path: &str, query: &AnalyticsQuery) -> Option<Option<T>> {
        let body = self.get_json(path, query).await?;
        Some(decode_object(path, body))
    }

    async fn get_many<T: DeserializeOwned>(&self, path: &str, query: &AnalyticsQuery) -> Option<Vec<T>> {
        let body = self.get_json(path, query).await?;
        Some(decode_list(path, body))
    }
}

fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) => {
            for key in ENVELOPE_KEYS {
                if let Some(inner) = map.remove(*key) {
                    return inner;
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

fn decode_object<T: DeserializeOwned>(path: &str, body: Value) -> Option<T> {
    let wrapped = matches!(
        &body,
        Value::Object(map) if map.len() == 1 && ENVELOPE_KEYS.iter().any(|k| map.contains_key(*k))
    );
    let inner = if wrapped { unwrap_envelope(body) } else { body };
    if !inner.is_object() {
        warn!(endpoint = path, "analytics payload is not an object");
        return None;
    }
    match serde_json::from_value(inner) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(endpoint = path, "analytics payload did not decode: {e}");
            None
        }
    }
}

fn decode_list<T: DeserializeOwned>(path: &str, body: Value) -> Vec<T> {
    let Value::Array(items) = unwrap_envelope(body) else {
        warn!(endpoint = path, "analytics payload is not a list");
        return Vec::new();
    };
    let total = items.len();
    let rows: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if rows.len() < total {
        debug!(endpoint = path, dropped = total - rows.len(), "analytics rows skipped");
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lists_decode_bare_or_wrapped() {
        let bare: Vec<SymbolRow> = decode_list("best-symbols", json!([{"symbol": "BTCUSDT"}]));
        assert_eq!(bare.len(), 1);

        let wrapped: Vec<SymbolRow> =
            decode_list("best-symbols", json!({"data": [{"symbol": "BTCUSDT"}, {"symbol": "ETHUSDT"}]}));
        assert_eq!(wrapped.len(), 2);

        let wrong: Vec<SymbolRow> = decode_list("best-symbols", json!({"symbol": "BTCUSDT"}));
        assert!(wrong.is_empty());
    }

    #[test]
    fn objects_decode_bare_or_wrapped() {
        let bare: Option<AnalyticsSummary> = decode_object("summary", json!({"total_trades": 12, "win_rate": 0.5}));
        assert_eq!(bare.and_then(|s| s.total_trades), Some(12));

        let wrapped: Option<AnalyticsSummary> = decode_object("summary", json!({"data": {"wins": 3}}));
        assert_eq!(wrapped.and_then(|s| s.wins), Some(3));

        let list: Option<AnalyticsSummary> = decode_object("summary", json!([1, 2]));
        assert!(list.is_none());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = AnalyticsClient::new("http://localhost:8000/api/analytics/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("summary"), "http://localhost:8000/api/analytics/summary");
    }
}
