//! Metric records and the persisted collection

use super::rules::normalize_period;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Product surface a metric applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    #[serde(rename = "top")]
    Top,
    #[serde(rename = "item")]
    Item,
    #[serde(rename = "media")]
    Media,
    #[serde(rename = "monetization")]
    Monetization,
    #[serde(rename = "short-form")]
    ShortForm,
    #[serde(rename = "story")]
    Story,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Top,
        Level::Item,
        Level::Media,
        Level::Monetization,
        Level::ShortForm,
        Level::Story,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Top => "top",
            Level::Item => "item",
            Level::Media => "media",
            Level::Monetization => "monetization",
            Level::ShortForm => "short-form",
            Level::Story => "story",
        }
    }
}

/// Aggregation window a metric is reported over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
    Week,
    #[serde(rename = "days_28")]
    Days28,
    Month,
    Lifetime,
}

impl Period {
    pub const ALL: [Period; 5] = [
        Period::Day,
        Period::Week,
        Period::Days28,
        Period::Month,
        Period::Lifetime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Days28 => "days_28",
            Period::Month => "month",
            Period::Lifetime => "lifetime",
        }
    }
}

/// Value type reported for a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    #[serde(rename = "JSON")]
    Json,
    String,
}

impl DataType {
    pub const ALL: [DataType; 4] = [DataType::Integer, DataType::Float, DataType::Json, DataType::String];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Integer => "Integer",
            DataType::Float => "Float",
            DataType::Json => "JSON",
            DataType::String => "String",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(Level, Period, DataType);

impl FromStr for Level {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown level: {}", s)))
    }
}

impl FromStr for Period {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_period(s)
    }
}

impl FromStr for DataType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        DataType::ALL
            .into_iter()
            .find(|data_type| data_type.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown data type: {}", s)))
    }
}

/// One extracted metric definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub name: String,
    pub level: Level,
    pub description: String,
    pub periods: Vec<Period>,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
}

impl Metric {
    /// Check the record-level invariants that the type system does not already enforce
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidData("metric name cannot be empty".to_string()));
        }
        if self.name.contains('`') {
            return Err(AppError::InvalidData(format!(
                "metric name must not contain backticks: {}",
                self.name
            )));
        }
        Ok(())
    }

    pub fn summary(&self) -> MetricSummary {
        MetricSummary {
            name: self.name.clone(),
            level: self.level,
            periods: self.periods.clone(),
            data_type: self.data_type,
            deprecated: self.deprecated,
        }
    }
}

/// Projection returned by the list operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub name: String,
    pub level: Level,
    pub periods: Vec<Period>,
    pub data_type: DataType,
    pub deprecated: bool,
}

/// Versioned snapshot of all metrics; the unit of persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsFile {
    pub version: String,
    pub updated_at: DateTime<Utc>,
    pub metrics: Vec<Metric>,
}

impl MetricsFile {
    /// Validate every record, then collapse duplicate names (last occurrence wins)
    pub fn validated(mut self) -> Result<Self, AppError> {
        if self.version.trim().is_empty() {
            return Err(AppError::InvalidData("version cannot be empty".to_string()));
        }
        for (idx, metric) in self.metrics.iter().enumerate() {
            metric
                .validate()
                .map_err(|e| AppError::InvalidData(format!("metrics[{}]: {}", idx, e)))?;
        }
        self.metrics = dedupe_by_name(self.metrics);
        Ok(self)
    }
}

/// Keep only the last record for each name, preserving the relative order of survivors
pub fn dedupe_by_name(metrics: Vec<Metric>) -> Vec<Metric> {
    let mut seen = HashSet::new();
    let mut kept: Vec<Metric> = metrics
        .into_iter()
        .rev()
        .filter(|m| seen.insert(m.name.clone()))
        .collect();
    kept.reverse();
    kept
}
