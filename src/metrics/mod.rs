//! Metric data model and normalization rules

pub mod model;
pub mod rules;

pub use model::{DataType, Level, Metric, MetricSummary, MetricsFile, Period};
pub use rules::{extract_tags, infer_level, normalize_data_type, normalize_period};
