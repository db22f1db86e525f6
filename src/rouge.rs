//! ROUGE-L scoring
//!
//! Longest-common-subsequence overlap between a reference and a generated
//! text, over normalised tokens: text is lower-cased, every character other
//! than `a-z0-9` separates tokens, and tokens longer than three characters
//! are optionally Porter-stemmed.

use rust_stemmers::{Algorithm, Stemmer};
use serde::Serialize;
use std::fmt;

/// Minimum token length (exclusive) for stemming
const STEM_MIN_LEN: usize = 3;

/// Similarity between a reference and a hypothesis
pub trait Scorer {
    /// Score in `[0, 1]`, higher is closer
    fn score(&self, reference: &str, hypothesis: &str) -> f64;
}

/// ROUGE-L precision, recall and F-measure
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RougeScore {
    pub precision: f64,
    pub recall: f64,
    pub fmeasure: f64,
}

/// ROUGE-L scorer; [`Scorer::score`] reports recall
pub struct RougeScorer {
    stemmer: Option<Stemmer>,
}

impl fmt::Debug for RougeScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RougeScorer")
            .field("use_stemmer", &self.stemmer.is_some())
            .finish()
    }
}

impl Default for RougeScorer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RougeScorer {
    #[must_use]
    pub fn new(use_stemmer: bool) -> Self {
        Self {
            stemmer: use_stemmer.then(|| Stemmer::create(Algorithm::English)),
        }
    }

    /// Normalised tokens of `text`
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let normalized: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { ' ' })
            .collect();

        normalized
            .split_whitespace()
            .map(|token| match &self.stemmer {
                Some(stemmer) if token.len() > STEM_MIN_LEN => stemmer.stem(token).into_owned(),
                _ => token.to_string(),
            })
            .collect()
    }

    /// Full ROUGE-L triple
    #[must_use]
    pub fn rouge_l(&self, reference: &str, hypothesis: &str) -> RougeScore {
        let ref_tokens = self.tokenize(reference);
        let hyp_tokens = self.tokenize(hypothesis);

        if ref_tokens.is_empty() || hyp_tokens.is_empty() {
            return RougeScore::default();
        }

        let lcs = lcs_length(&ref_tokens, &hyp_tokens);

        #[allow(clippy::cast_precision_loss)]
        let (precision, recall) = (
            lcs as f64 / hyp_tokens.len() as f64,
            lcs as f64 / ref_tokens.len() as f64,
        );

        let fmeasure = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        RougeScore {
            precision,
            recall,
            fmeasure,
        }
    }
}

impl Scorer for RougeScorer {
    fn score(&self, reference: &str, hypothesis: &str) -> f64 {
        self.rouge_l(reference, hypothesis).recall
    }
}

/// Length of the longest common subsequence of two token lists
#[must_use]
pub fn lcs_length<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    // Rolling single row of the classic dp table
    let mut row = vec![0usize; b.len() + 1];
    for x in a {
        let mut diagonal = 0;
        for (j, y) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if x == y { diagonal + 1 } else { above.max(row[j]) };
            diagonal = above;
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_tokenize_normalises() {
        let scorer = RougeScorer::new(false);
        assert_eq!(scorer.tokenize("Hello, World! It's 2024."), vec!["hello", "world", "it", "s", "2024"]);
        assert!(scorer.tokenize("?!").is_empty());
    }

    #[test]
    fn test_tokenize_stems_long_tokens_only() {
        let scorer = RougeScorer::new(true);
        assert_eq!(scorer.tokenize("running cats ran"), vec!["run", "cat", "ran"]);
        assert_eq!(scorer.tokenize("was"), vec!["was"]);
    }

    #[test]
    fn test_lcs_length() {
        assert_eq!(lcs_length(&["a", "b", "c", "d"], &["a", "c", "d"]), 3);
        assert_eq!(lcs_length(&["a", "b"], &["c"]), 0);
        assert_eq!(lcs_length::<&str>(&[], &["a"]), 0);
        assert_eq!(lcs_length(&["b", "a", "b"], &["a", "b", "b", "a"]), 2);
    }

    #[test]
    fn test_exact_match_is_one() {
        let scorer = RougeScorer::default();
        assert!((scorer.score("Yes", "yes") - 1.0).abs() < EPS);
    }

    #[test]
    fn test_recall_ignores_extra_hypothesis_tokens() {
        let scorer = RougeScorer::new(false);
        let score = scorer.rouge_l("True", "True, because the premise says so");
        assert!((score.recall - 1.0).abs() < EPS);
        assert!((score.precision - 1.0 / 6.0).abs() < EPS);
        assert!((score.fmeasure - 2.0 / 7.0).abs() < EPS);
    }

    #[test]
    fn test_partial_recall() {
        let scorer = RougeScorer::new(false);
        let score = scorer.score("the cat sat on the mat", "the cat lay on a mat");
        // lcs: the cat on mat
        assert!((score - 4.0 / 6.0).abs() < EPS);
    }

    #[test]
    fn test_empty_inputs_score_zero() {
        let scorer = RougeScorer::default();
        assert_eq!(scorer.score("", "anything"), 0.0);
        assert_eq!(scorer.score("answer", ""), 0.0);
        assert_eq!(scorer.rouge_l("...", "..."), RougeScore::default());
    }

    #[test]
    fn test_no_overlap() {
        let scorer = RougeScorer::default();
        assert_eq!(scorer.score("No", "Yes"), 0.0);
    }
}
