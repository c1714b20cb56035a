//! Approximate substring matching
//!
//! Scores a needle against the best-aligned substring of a haystack using edit
//! distance, ignoring where in the haystack the alignment sits. The score is
//! `errors / needle_length`, so 0.0 is an exact occurrence and 1.0 shares nothing.

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Match result with score and matched regions
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    /// Error ratio of the best alignment (lower is better)
    pub score: f64,
    /// Inclusive `[start, end]` ranges over the normalized haystack characters.
    ///
    /// Use [`map_spans`] with the offsets from
    /// [`FuzzyMatcher::normalize_with_offsets`] to point them back at the original text.
    pub indices: Vec<[usize; 2]>,
}

/// Fuzzy matcher with a looseness threshold
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    threshold: f64,
    min_match_char_length: usize,
}

impl FuzzyMatcher {
    pub fn new(threshold: f64, min_match_char_length: usize) -> Self {
        Self {
            threshold,
            min_match_char_length: min_match_char_length.max(1),
        }
    }

    /// Normalize text for matching: NFC composition, then lower-case
    pub fn normalize_for_matching(text: &str) -> Vec<char> {
        text.nfc().flat_map(char::to_lowercase).collect()
    }

    /// Normalize like [`Self::normalize_for_matching`], also returning for each
    /// normalized character the inclusive range of original characters it came from.
    ///
    /// Grapheme clusters are normalized one at a time, so composition and
    /// case expansion never cross a cluster boundary.
    pub fn normalize_with_offsets(text: &str) -> (Vec<char>, Vec<[usize; 2]>) {
        let mut chars = Vec::new();
        let mut offsets = Vec::new();
        let mut original = 0;

        for cluster in text.graphemes(true) {
            let len = cluster.chars().count();
            let span = [original, original + len - 1];
            for c in cluster.nfc().flat_map(char::to_lowercase) {
                chars.push(c);
                offsets.push(span);
            }
            original += len;
        }

        (chars, offsets)
    }

    /// Match two raw strings
    #[cfg(test)]
    pub fn fuzzy_match(&self, haystack: &str, needle: &str) -> Option<FuzzyMatch> {
        self.match_normalized(
            &Self::normalize_for_matching(haystack),
            &Self::normalize_for_matching(needle),
        )
    }

    /// Match already-normalized character sequences
    pub fn match_normalized(&self, haystack: &[char], needle: &[char]) -> Option<FuzzyMatch> {
        if needle.is_empty() || haystack.is_empty() {
            return None;
        }

        // Every needle character past the haystack length costs one error
        let max_errors = (self.threshold * needle.len() as f64).floor() as usize;
        if needle.len() > haystack.len() + max_errors {
            return None;
        }

        let mut mask = vec![false; haystack.len()];
        let score = if Self::mark_exact(haystack, needle, &mut mask) {
            0.0
        } else {
            let errors = Self::mark_best_alignment(haystack, needle, max_errors, &mut mask)?;
            errors as f64 / needle.len() as f64
        };

        if score > self.threshold {
            return None;
        }

        let indices = self.mask_to_indices(&mask);
        if indices.is_empty() {
            return None;
        }

        Some(FuzzyMatch { score, indices })
    }

    /// Mark every exact occurrence; returns whether any was found
    fn mark_exact(haystack: &[char], needle: &[char], mask: &mut [bool]) -> bool {
        if needle.len() > haystack.len() {
            return false;
        }
        let mut found = false;
        for start in 0..=haystack.len() - needle.len() {
            if haystack[start..start + needle.len()] == *needle {
                mask[start..start + needle.len()].fill(true);
                found = true;
            }
        }
        found
    }

    /// Edit distance of `needle` against any substring of `haystack`.
    ///
    /// Marks haystack characters that align with an identical needle character
    /// on the best (earliest-ending) alignment. Returns `None` past `max_errors`.
    fn mark_best_alignment(
        haystack: &[char],
        needle: &[char],
        max_errors: usize,
        mask: &mut [bool],
    ) -> Option<usize> {
        let n = needle.len();
        let m = haystack.len();
        let width = m + 1;
        // dist[i * width + j]: cost of needle[..i] aligned to a substring ending at haystack[j]
        let mut dist = vec![0usize; (n + 1) * width];
        for i in 1..=n {
            dist[i * width] = i;
            for j in 1..=m {
                let cost = usize::from(needle[i - 1] != haystack[j - 1]);
                let diagonal = dist[(i - 1) * width + j - 1] + cost;
                let skip_needle = dist[(i - 1) * width + j] + 1;
                let skip_haystack = dist[i * width + j - 1] + 1;
                dist[i * width + j] = diagonal.min(skip_needle).min(skip_haystack);
            }
        }

        let (best_end, errors) = (1..=m)
            .map(|j| (j, dist[n * width + j]))
            .min_by_key(|&(j, d)| (d, j))?;
        if errors > max_errors {
            return None;
        }

        let (mut i, mut j) = (n, best_end);
        while i > 0 && j > 0 {
            let here = dist[i * width + j];
            let same = needle[i - 1] == haystack[j - 1];
            if same && here == dist[(i - 1) * width + j - 1] {
                mask[j - 1] = true;
                i -= 1;
                j -= 1;
            } else if !same && here == dist[(i - 1) * width + j - 1] + 1 {
                i -= 1;
                j -= 1;
            } else if here == dist[(i - 1) * width + j] + 1 {
                i -= 1;
            } else {
                j -= 1;
            }
        }

        Some(errors)
    }

    /// Collapse a character mask into runs at least `min_match_char_length` long
    fn mask_to_indices(&self, mask: &[bool]) -> Vec<[usize; 2]> {
        let mut indices = Vec::new();
        let mut start: Option<usize> = None;
        for (idx, &hit) in mask.iter().chain(std::iter::once(&false)).enumerate() {
            match (hit, start) {
                (true, None) => start = Some(idx),
                (false, Some(s)) => {
                    if idx - s >= self.min_match_char_length {
                        indices.push([s, idx - 1]);
                    }
                    start = None;
                }
                _ => {}
            }
        }
        indices
    }
}

/// Translate normalized-character spans into original-character spans
pub fn map_spans(spans: &[[usize; 2]], offsets: &[[usize; 2]]) -> Vec<[usize; 2]> {
    spans
        .iter()
        .filter_map(|&[start, end]| Some([offsets.get(start)?[0], offsets.get(end)?[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> FuzzyMatcher {
        FuzzyMatcher::new(0.35, 2)
    }

    #[test]
    fn test_exact_substring_scores_zero() {
        let m = matcher().fuzzy_match("page_impressions", "impressions").unwrap();
        assert_eq!(m.score, 0.0);
        assert_eq!(m.indices, vec![[5, 15]]);
    }

    #[test]
    fn test_exact_match_case_insensitive() {
        let m = matcher().fuzzy_match("Total Impressions", "IMPRESSIONS").unwrap();
        assert_eq!(m.score, 0.0);
    }

    #[test]
    fn test_all_occurrences_marked() {
        let m = matcher().fuzzy_match("fan fans fan", "fan").unwrap();
        assert_eq!(m.indices, vec![[0, 2], [4, 6], [9, 11]]);
    }

    #[test]
    fn test_typo_tolerated() {
        let m = matcher().fuzzy_match("page_impressions", "impresion").unwrap();
        assert!(m.score > 0.0 && m.score <= 0.35);
        assert!((m.score - 1.0 / 9.0).abs() < 1e-9);
        assert!(!m.indices.is_empty());
    }

    #[test]
    fn test_transposition_tolerated() {
        let m = matcher().fuzzy_match("page_engagement", "engaegment");
        assert!(m.is_some());
    }

    #[test]
    fn test_too_many_errors_rejected() {
        assert!(matcher().fuzzy_match("page_impressions", "xyzzy").is_none());
        assert!(matcher().fuzzy_match("hello world", "xyz").is_none());
    }

    #[test]
    fn test_threshold_controls_looseness() {
        let strict = FuzzyMatcher::new(0.0, 2);
        assert!(strict.fuzzy_match("page_impressions", "impresion").is_none());
        assert!(strict.fuzzy_match("page_impressions", "impression").is_some());
    }

    #[test]
    fn test_single_char_below_min_length() {
        assert!(matcher().fuzzy_match("page", "p").is_none());
        assert!(FuzzyMatcher::new(0.35, 1).fuzzy_match("page", "p").is_some());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(matcher().fuzzy_match("hello", "").is_none());
        assert!(matcher().fuzzy_match("", "hello").is_none());
    }

    #[test]
    fn test_unicode_normalization() {
        // decomposed e + combining acute vs precomposed
        let m = matcher().fuzzy_match("cafe\u{301} au lait", "caf\u{e9}").unwrap();
        assert_eq!(m.score, 0.0);
    }

    #[test]
    fn test_location_ignored() {
        let near = matcher().fuzzy_match("views", "views").unwrap();
        let far = matcher()
            .fuzzy_match("a very long description that eventually mentions views", "views")
            .unwrap();
        assert_eq!(near.score, far.score);
    }

    #[test]
    fn test_needle_longer_than_any_alignment() {
        let long = "impressions".repeat(50);
        assert!(matcher().fuzzy_match("page_impressions", &long).is_none());
        // Within the error budget a slightly longer needle still matches
        assert!(matcher().fuzzy_match("fans", "fanss").is_some());
    }

    #[test]
    fn test_offsets_for_decomposed_text() {
        let text = "Cafe\u{301} impressions";
        let (chars, offsets) = FuzzyMatcher::normalize_with_offsets(text);
        assert_eq!(chars.len(), text.chars().count() - 1);
        assert_eq!(chars, FuzzyMatcher::normalize_for_matching(text));

        let hit = matcher()
            .match_normalized(&chars, &FuzzyMatcher::normalize_for_matching("impressions"))
            .unwrap();
        assert_eq!(hit.indices, vec![[5, 15]]);

        let mapped = map_spans(&hit.indices, &offsets);
        assert_eq!(mapped, vec![[6, 16]]);
        let original: String = text.chars().skip(6).take(11).collect();
        assert_eq!(original, "impressions");
    }

    #[test]
    fn test_offsets_for_case_expansion() {
        // U+0130 lower-cases to two characters
        let (chars, offsets) = FuzzyMatcher::normalize_with_offsets("\u{130}x");
        assert_eq!(chars, vec!['i', '\u{307}', 'x']);
        assert_eq!(offsets, vec![[0, 0], [0, 0], [1, 1]]);
        assert_eq!(map_spans(&[[1, 2]], &offsets), vec![[0, 1]]);
    }
}
