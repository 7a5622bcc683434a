use crate::error::AnalysisError;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Word lengths reported as individual report columns.
pub const WORD_LENGTH_BUCKETS: RangeInclusive<usize> = 3..=10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PosCounts {
    pub nouns: usize,
    pub verbs: usize,
    pub adjectives: usize,
}

/// Per-transcript linguistic summary. Recomputed on every run; cheap relative
/// to transcription, so it is never cached.
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub word_count: usize,
    pub sentence_count: usize,
    pub avg_words_per_sentence: f64,
    pub pos_counts: PosCounts,
    /// Exact word length -> count; consumers zero-fill absent buckets.
    pub word_length_distribution: BTreeMap<usize, usize>,
}

impl AnalysisResult {
    pub fn words_of_length(&self, len: usize) -> usize {
        self.word_length_distribution.get(&len).copied().unwrap_or(0)
    }
}

/// Boundary to the linguistic-analysis routine. The pipeline treats its
/// output as an opaque structured value.
pub trait Analyzer {
    fn analyze(&self, text: &str) -> Result<AnalysisResult, AnalysisError>;
}

/// Heuristic analyzer: whitespace word splitting, terminal-punctuation
/// sentence splitting, suffix-based part-of-speech guesses. Good enough for
/// comparative statistics across stories; not a real tagger.
pub struct BasicAnalyzer;

const ADJ_SUFFIXES: [&str; 8] = ["ful", "ous", "ive", "able", "ible", "ic", "less", "ish"];
const VERB_SUFFIXES: [&str; 5] = ["ing", "ed", "ize", "ise", "ify"];
const NOUN_SUFFIXES: [&str; 10] = [
    "tion", "ment", "ness", "ity", "ism", "ist", "ship", "age", "ance", "ence",
];

impl Analyzer for BasicAnalyzer {
    fn analyze(&self, text: &str) -> Result<AnalysisResult, AnalysisError> {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect();

        let word_count = words.len();
        let sentence_count = text
            .split(['.', '!', '?'])
            .filter(|s| s.chars().any(|c| c.is_alphanumeric()))
            .count();

        let avg_words_per_sentence = if sentence_count > 0 {
            word_count as f64 / sentence_count as f64
        } else {
            0.0
        };

        let mut pos_counts = PosCounts::default();
        let mut word_length_distribution = BTreeMap::new();
        for word in &words {
            let len = word.chars().count();
            if WORD_LENGTH_BUCKETS.contains(&len) {
                *word_length_distribution.entry(len).or_insert(0) += 1;
            }
            if ADJ_SUFFIXES.iter().any(|s| word.ends_with(s)) {
                pos_counts.adjectives += 1;
            } else if VERB_SUFFIXES.iter().any(|s| word.ends_with(s)) {
                pos_counts.verbs += 1;
            } else if NOUN_SUFFIXES.iter().any(|s| word.ends_with(s)) {
                pos_counts.nouns += 1;
            }
        }

        Ok(AnalysisResult {
            word_count,
            sentence_count,
            avg_words_per_sentence,
            pos_counts,
            word_length_distribution,
        })
    }
}
