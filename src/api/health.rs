//! Shared stream counters for the /health endpoint.
//! Updated by the stream connection task, read by the API and the TUI footer.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::api::latency::LatencyStats;

#[derive(Default)]
pub struct StreamHealth {
    frames_received: AtomicU64,
    heartbeats: AtomicU64,
    snapshots_applied: AtomicU64,
    malformed_frames: AtomicU64,
    reconnects: AtomicU64,
    /// Epoch millis of the last frame of any kind (0 = none yet).
    last_frame_at_ms: AtomicI64,
    /// Frame parse + snapshot replace time.
    pub apply_latency: LatencyStats,
}

impl StreamHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the running frame count including this one.
    pub fn record_frame(&self) -> u64 {
        self.last_frame_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.frames_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot(&self) {
        self.snapshots_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::Relaxed)
    }

    pub fn snapshots_applied(&self) -> u64 {
        self.snapshots_applied.load(Ordering::Relaxed)
    }

    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub fn last_frame_at(&self) -> Option<DateTime<Utc>> {
        match self.last_frame_at_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }
}
