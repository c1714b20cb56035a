//! Search Engine Integration
//!
//! Holds a read-only snapshot of the metrics plus a pre-normalized index of
//! their searchable fields, and answers fuzzy and exact queries over it.

use super::fuzzy::{map_spans, FuzzyMatcher};
use super::ranking::{
    combine_scores, field_norm, FieldScore, FieldWeights, SearchKey, DEFAULT_THRESHOLD,
    MIN_MATCH_CHAR_LENGTH,
};
use crate::metrics::{DataType, Level, Metric, Period};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Matched region of one field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMatch {
    pub key: &'static str,
    pub value: String,
    /// Inclusive `[start, end]` character ranges of `value` that matched
    pub indices: Vec<[usize; 2]>,
    /// Position inside an array field such as `tags`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_index: Option<usize>,
}

/// Search result with content and score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub item: Metric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<FieldMatch>>,
}

/// One searchable field value, normalized once at build time
#[derive(Debug, Clone)]
struct IndexedField {
    key: SearchKey,
    ref_index: Option<usize>,
    chars: Vec<char>,
    /// Original character range behind each entry of `chars`
    offsets: Vec<[usize; 2]>,
    norm: f64,
}

/// Fuzzy index over a metrics snapshot
pub struct MetricsIndex {
    metrics: Vec<Metric>,
    fields: Vec<Vec<IndexedField>>,
    matcher: FuzzyMatcher,
    weights: FieldWeights,
}

impl Default for MetricsIndex {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MetricsIndex {
    /// Build an index with the default weights and threshold
    pub fn new(metrics: Vec<Metric>) -> Self {
        Self::with_options(metrics, FieldWeights::default(), DEFAULT_THRESHOLD)
    }

    pub fn with_options(metrics: Vec<Metric>, weights: FieldWeights, threshold: f64) -> Self {
        let mut index = Self {
            metrics: Vec::new(),
            fields: Vec::new(),
            matcher: FuzzyMatcher::new(threshold, MIN_MATCH_CHAR_LENGTH),
            weights,
        };
        index.rebuild(metrics);
        index
    }

    /// Replace the snapshot and rebuild the index
    pub fn rebuild(&mut self, metrics: Vec<Metric>) {
        self.fields = metrics.iter().map(Self::index_metric).collect();
        self.metrics = metrics;
        debug!("Search index rebuilt over {} metrics", self.metrics.len());
    }

    fn index_metric(metric: &Metric) -> Vec<IndexedField> {
        let mut values: Vec<(SearchKey, Option<usize>, &str)> = vec![
            (SearchKey::Name, None, metric.name.as_str()),
            (SearchKey::Description, None, metric.description.as_str()),
        ];
        values.extend(
            metric
                .tags
                .iter()
                .enumerate()
                .map(|(idx, tag)| (SearchKey::Tags, Some(idx), tag.as_str())),
        );
        values.push((SearchKey::Level, None, metric.level.as_str()));

        values
            .into_iter()
            .filter(|(_, _, text)| !text.trim().is_empty())
            .map(|(key, ref_index, text)| {
                let (chars, offsets) = FuzzyMatcher::normalize_with_offsets(text);
                IndexedField {
                    key,
                    ref_index,
                    chars,
                    offsets,
                    norm: field_norm(text),
                }
            })
            .collect()
    }

    fn field_value(metric: &Metric, field: &IndexedField) -> String {
        match (field.key, field.ref_index) {
            (SearchKey::Name, _) => metric.name.clone(),
            (SearchKey::Description, _) => metric.description.clone(),
            (SearchKey::Tags, Some(idx)) => metric.tags.get(idx).cloned().unwrap_or_default(),
            (SearchKey::Tags, None) => String::new(),
            (SearchKey::Level, _) => metric.level.as_str().to_string(),
        }
    }

    /// Fuzzy search, best match first.
    ///
    /// A blank query returns the first `limit` metrics in index order, unscored.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return self
                .metrics
                .iter()
                .take(limit)
                .map(|metric| SearchResult {
                    item: metric.clone(),
                    score: None,
                    matches: None,
                })
                .collect();
        }

        let needle = FuzzyMatcher::normalize_for_matching(query);
        let mut scored: Vec<(usize, f64, Vec<FieldMatch>)> = Vec::new();

        for (idx, (metric, fields)) in self.metrics.iter().zip(&self.fields).enumerate() {
            let mut field_scores = Vec::new();
            let mut matches = Vec::new();

            for field in fields {
                if let Some(hit) = self.matcher.match_normalized(&field.chars, &needle) {
                    field_scores.push(FieldScore {
                        score: hit.score,
                        weight: self.weights.weight(field.key),
                        norm: field.norm,
                    });
                    matches.push(FieldMatch {
                        key: field.key.as_str(),
                        value: Self::field_value(metric, field),
                        indices: map_spans(&hit.indices, &field.offsets),
                        ref_index: field.ref_index,
                    });
                }
            }

            if !field_scores.is_empty() {
                scored.push((idx, combine_scores(&field_scores), matches));
            }
        }

        // Stable sort keeps index order among equal scores
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        debug!("Query '{}' matched {} metrics", query, scored.len());

        scored
            .into_iter()
            .take(limit)
            .map(|(idx, score, matches)| SearchResult {
                item: self.metrics[idx].clone(),
                score: Some(score),
                matches: Some(matches),
            })
            .collect()
    }

    /// Names of the best matches
    pub fn suggest(&self, query: &str, limit: usize) -> Vec<String> {
        self.search(query, limit)
            .into_iter()
            .map(|result| result.item.name)
            .collect()
    }

    /// Exact lookup over the snapshot; the service resolves names through the store
    #[cfg(test)]
    pub fn by_name(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn by_level(&self, level: Level) -> Vec<&Metric> {
        self.metrics.iter().filter(|m| m.level == level).collect()
    }

    pub fn by_data_type(&self, data_type: DataType) -> Vec<&Metric> {
        self.metrics.iter().filter(|m| m.data_type == data_type).collect()
    }

    /// Metrics carrying at least one of the given tags
    pub fn by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<&Metric> {
        self.metrics
            .iter()
            .filter(|m| tags.iter().any(|tag| m.tags.iter().any(|t| t == tag.as_ref())))
            .collect()
    }

    /// Metrics reported over at least one of the given periods
    pub fn by_periods(&self, periods: &[Period]) -> Vec<&Metric> {
        self.metrics
            .iter()
            .filter(|m| periods.iter().any(|p| m.periods.contains(p)))
            .collect()
    }

    /// Every distinct tag, sorted
    pub fn get_all_tags(&self) -> Vec<String> {
        self.metrics
            .iter()
            .flat_map(|m| m.tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every distinct level present, sorted by name
    pub fn get_all_levels(&self) -> Vec<String> {
        self.metrics
            .iter()
            .map(|m| m.level.as_str().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every distinct data type present, sorted by name
    pub fn get_all_data_types(&self) -> Vec<String> {
        self.metrics
            .iter()
            .map(|m| m.data_type.as_str().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.metrics.len()
    }

    #[cfg(test)]
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }
}
