//! Ranking & Scoring System
//!
//! Combines per-field fuzzy scores into one relevance score per metric.
//! Lower is better: a metric matching several fields exactly approaches 0.

use unicode_segmentation::UnicodeSegmentation;

/// Match-looseness threshold; a field matches when its error ratio is at most this
pub const DEFAULT_THRESHOLD: f64 = 0.35;

/// Shortest matched run that counts as a hit
pub const MIN_MATCH_CHAR_LENGTH: usize = 2;

/// Searchable fields of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKey {
    Name,
    Description,
    Tags,
    Level,
}

impl SearchKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKey::Name => "name",
            SearchKey::Description => "description",
            SearchKey::Tags => "tags",
            SearchKey::Level => "level",
        }
    }
}

/// Relative importance of each searchable field
#[derive(Debug, Clone)]
pub struct FieldWeights {
    pub name: f64,
    pub description: f64,
    pub tags: f64,
    pub level: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            name: 0.4,
            description: 0.3,
            tags: 0.2,
            level: 0.1,
        }
    }
}

impl FieldWeights {
    pub fn weight(&self, key: SearchKey) -> f64 {
        match key {
            SearchKey::Name => self.name,
            SearchKey::Description => self.description,
            SearchKey::Tags => self.tags,
            SearchKey::Level => self.level,
        }
    }
}

/// Field-length norm: `1 / sqrt(word count)`, rounded to three decimals.
///
/// Short fields get a norm near 1 and so a larger exponent in [`combine_scores`].
pub fn field_norm(text: &str) -> f64 {
    let words = text.unicode_words().count().max(1) as f64;
    (1000.0 / words.sqrt()).round() / 1000.0
}

/// One matched field value feeding into a metric's score
#[derive(Debug, Clone, Copy)]
pub struct FieldScore {
    pub score: f64,
    pub weight: f64,
    pub norm: f64,
}

/// Product of `max(score, EPSILON) ^ (weight * norm)` over every matched field value
pub fn combine_scores(fields: &[FieldScore]) -> f64 {
    fields.iter().fold(1.0, |total, field| {
        let base = if field.score == 0.0 { f64::EPSILON } else { field.score };
        total * base.powf(field.weight * field.norm)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights() {
        let weights = FieldWeights::default();
        let total = weights.name + weights.description + weights.tags + weights.level;
        assert!((total - 1.0).abs() < 1e-9);
        assert!(weights.weight(SearchKey::Name) > weights.weight(SearchKey::Description));
        assert!(weights.weight(SearchKey::Tags) > weights.weight(SearchKey::Level));
    }

    #[test]
    fn test_field_norm() {
        assert_eq!(field_norm("page_impressions"), 1.0);
        assert_eq!(field_norm("Total impressions of your Page"), 0.447);
        assert_eq!(field_norm(""), 1.0);
    }

    #[test]
    fn test_exact_beats_fuzzy() {
        let exact = combine_scores(&[FieldScore { score: 0.0, weight: 0.4, norm: 1.0 }]);
        let fuzzy = combine_scores(&[FieldScore { score: 0.1, weight: 0.4, norm: 1.0 }]);
        assert!(exact < fuzzy);
    }

    #[test]
    fn test_heavier_field_ranks_better() {
        let name = combine_scores(&[FieldScore { score: 0.1, weight: 0.4, norm: 1.0 }]);
        let level = combine_scores(&[FieldScore { score: 0.1, weight: 0.1, norm: 1.0 }]);
        assert!(name < level);
    }

    #[test]
    fn test_more_matched_fields_rank_better() {
        let one = combine_scores(&[FieldScore { score: 0.2, weight: 0.4, norm: 1.0 }]);
        let two = combine_scores(&[
            FieldScore { score: 0.2, weight: 0.4, norm: 1.0 },
            FieldScore { score: 0.2, weight: 0.3, norm: 0.5 },
        ]);
        assert!(two < one);
    }

    #[test]
    fn test_empty_is_one() {
        assert_eq!(combine_scores(&[]), 1.0);
    }
}
