//! Live crypto metric screener.
//!
//! A WebSocket stream delivers whole-universe metric snapshots per exchange scope;
//! the latest one is held in a [`state::SnapshotStore`] and screened on demand
//! through [`screener::screen`]. A separate [`analytics::AnalyticsAggregator`]
//! fetches historical signal-outcome statistics from an HTTP API.

pub mod analytics;
pub mod api;
pub mod config;
pub mod de;
pub mod error;
pub mod format;
pub mod screener;
pub mod state;
pub mod types;
pub mod ws;
