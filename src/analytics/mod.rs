pub mod aggregator;
pub mod client;
pub mod types;

pub use aggregator::{AnalyticsAggregator, BatchOutcome};
pub use client::AnalyticsClient;
pub use types::*;
