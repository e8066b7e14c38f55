pub mod criteria;
pub mod pipeline;

pub use criteria::{Bound, Direction, FilterCriteria, MetricField, Preset, SortKey, SortSpec, Threshold};
pub use pipeline::screen;
