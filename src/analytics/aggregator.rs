use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analytics::client::AnalyticsClient;
use crate::analytics::types::{AnalyticsBatch, AnalyticsQuery, AnalyticsView, BatchStatus};
use crate::api::latency::LatencyStats;

/// What happened to one `run` or `recompute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The result was committed to the view.
    Applied,
    /// The request failed; the view shows `Error` and keeps the previous result.
    Failed,
    /// A newer request or `cancel` took over; nothing was committed.
    Superseded,
}

/// Fetches analytics batches and publishes them as an [`AnalyticsView`].
///
/// Every `run`/`recompute` stamps a new generation when it starts. A response
/// is committed only while its generation is still the current one, so a slow
/// answer to an older query can never overwrite a newer one.
pub struct AnalyticsAggregator {
    client: AnalyticsClient,
    view: watch::Sender<AnalyticsView>,
    latency: LatencyStats,
}

impl AnalyticsAggregator {
    pub fn new(client: AnalyticsClient) -> Arc<Self> {
        let (view, _) = watch::channel(AnalyticsView::default());
        Arc::new(Self {
            client,
            view,
            latency: LatencyStats::new(),
        })
    }

    pub fn view(&self) -> AnalyticsView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalyticsView> {
        self.view.subscribe()
    }

    /// Round-trip time of complete batches.
    pub fn latency(&self) -> &LatencyStats {
        &self.latency
    }

    /// Fetch the six collections for `query` and commit them if still current.
    pub async fn run(&self, query: AnalyticsQuery) -> BatchOutcome {
        let generation = self.begin(query);
        self.fetch_and_commit(query, generation).await
    }

    /// Trigger a backend recompute for `query`, then fetch fresh results.
    pub async fn recompute(&self, query: AnalyticsQuery) -> BatchOutcome {
        let generation = self.begin(query);
        info!(%query, "analytics recompute requested");

        if let Err(e) = self.client.recompute(&query).await {
            warn!(%query, "analytics recompute failed: {e}");
            return self.commit_error(generation, e.to_string());
        }
        if !self.is_current(generation) {
            return BatchOutcome::Superseded;
        }
        self.run(query).await
    }

    /// Invalidate whatever is in flight. A pending `Loading` goes back to `Idle`.
    pub fn cancel(&self) {
        self.view.send_if_modified(|view| {
            view.generation += 1;
            if view.status == BatchStatus::Loading {
                view.status = BatchStatus::Idle;
                true
            } else {
                false
            }
        });
        debug!("analytics batch cancelled");
    }

    /// `run` on a background task.
    pub fn spawn_run(self: &Arc<Self>, query: AnalyticsQuery) -> JoinHandle<BatchOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(query).await })
    }

    /// `recompute` on a background task.
    pub fn spawn_recompute(self: &Arc<Self>, query: AnalyticsQuery) -> JoinHandle<BatchOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.recompute(query).await })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn begin(&self, query: AnalyticsQuery) -> u64 {
        let mut generation = 0;
        self.view.send_modify(|view| {
            view.generation += 1;
            view.query = query;
            view.status = BatchStatus::Loading;
            view.error = None;
            generation = view.generation;
        });
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.view.borrow().generation == generation
    }

    async fn fetch_and_commit(&self, query: AnalyticsQuery, generation: u64) -> BatchOutcome {
        let started = Instant::now();
        let fetched = self.client.fetch_batch(&query).await;
        self.latency.record(started.elapsed());

        let result = match fetched {
            Ok(result) => result,
            Err(e) => {
                warn!(%query, "analytics batch failed: {e}");
                return self.commit_error(generation, e.to_string());
            }
        };

        let batch = Arc::new(AnalyticsBatch {
            query,
            result,
            fetched_at: Utc::now(),
        });
        let committed = self.view.send_if_modified(|view| {
            if view.generation != generation {
                return false;
            }
            view.status = BatchStatus::Idle;
            view.error = None;
            view.latest = Some(Arc::clone(&batch));
            true
        });

        if committed {
            info!(
                %query,
                breakdown = batch.result.breakdown.len(),
                best_symbols = batch.result.best_symbols.len(),
                worst_symbols = batch.result.worst_symbols.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "analytics batch applied"
            );
            BatchOutcome::Applied
        } else {
            debug!(%query, "stale analytics batch discarded");
            BatchOutcome::Superseded
        }
    }

    fn commit_error(&self, generation: u64, message: String) -> BatchOutcome {
        let committed = self.view.send_if_modified(|view| {
            if view.generation != generation {
                return false;
            }
            view.status = BatchStatus::Error;
            view.error = Some(message);
            true
        });
        if committed {
            BatchOutcome::Failed
        } else {
            BatchOutcome::Superseded
        }
    }
}
