//! Composite scoring: a weighted sum of normalized vector similarity and keyword overlap.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::storage::DocumentRecord;

pub const DEFAULT_SIMILARITY_WEIGHT: f32 = 0.7;
pub const DEFAULT_KEYWORD_WEIGHT: f32 = 0.3;
pub const DEFAULT_OVERFETCH_FACTOR: usize = 4;

/// How raw index scores are mapped into `[0, 1]` before weighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    /// Clamp to `[0, 1]`. Suits indexes that already report scores in that range.
    #[default]
    Clamp,
    /// Map a cosine score from `[-1, 1]` to `[0, 1]`.
    Cosine,
    /// Rescale over the candidate set so the best candidate gets 1 and the worst 0.
    MinMax,
}

impl ScoreNormalization {
    pub fn normalize(&self, raw: &[f32]) -> Vec<f32> {
        match self {
            ScoreNormalization::Clamp => raw.iter().map(|s| s.clamp(0.0, 1.0)).collect(),
            ScoreNormalization::Cosine => raw.iter().map(|s| ((s + 1.0) / 2.0).clamp(0.0, 1.0)).collect(),
            ScoreNormalization::MinMax => {
                let min = raw.iter().copied().fold(f32::INFINITY, f32::min);
                let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                if !(max - min).is_normal() {
                    // A single candidate, or all equal.
                    return vec![1.0; raw.len()];
                }
                raw.iter().map(|s| (s - min) / (max - min)).collect()
            }
        }
    }
}

/// Weights and knobs of the ranking formula
/// `score = similarity_weight * normalized_similarity + keyword_weight * keyword_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub similarity_weight: f32,
    pub keyword_weight: f32,
    /// Candidates fetched from the index per requested result, leaving room for filtering.
    pub overfetch_factor: usize,
    pub normalization: ScoreNormalization,
    /// Match file-name keywords with exact case. Tags always match ignoring case.
    pub case_sensitive: bool,
}

impl Default for RankingConfig {
    fn default() -> Self {
        RankingConfig {
            similarity_weight: DEFAULT_SIMILARITY_WEIGHT,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            normalization: ScoreNormalization::default(),
            case_sensitive: false,
        }
    }
}

impl RankingConfig {
    pub fn with_weights(similarity_weight: f32, keyword_weight: f32) -> Self {
        RankingConfig { similarity_weight, keyword_weight, ..Default::default() }
    }

    pub fn with_normalization(mut self, normalization: ScoreNormalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_overfetch_factor(mut self, factor: usize) -> Self {
        self.overfetch_factor = factor;
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, weight) in [("similarity_weight", self.similarity_weight), ("keyword_weight", self.keyword_weight)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!("{} must be a non-negative number, got {}", name, weight));
            }
        }
        if self.similarity_weight + self.keyword_weight <= 0.0 {
            return Err("at least one ranking weight must be positive".to_string());
        }
        if self.overfetch_factor == 0 {
            return Err("overfetch_factor must be at least 1".to_string());
        }
        Ok(())
    }
}

/// A search result with the parts of its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: DocumentRecord,
    /// Raw score reported by the index.
    pub similarity: f32,
    pub normalized_similarity: f32,
    pub keyword_score: f32,
    pub score: f32,
}

/// Lowercased alphanumeric runs of `text`.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    tokens(text, false)
}

/// Alphanumeric runs of `text`, lowercased unless `case_sensitive`.
pub fn tokens(text: &str, case_sensitive: bool) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| if case_sensitive { token.to_string() } else { token.to_lowercase() })
        .collect()
}

/// Fraction of distinct query tokens found in the document's file name or tags.
///
/// `query_tokens` come from [`tokens`] with the same `case_sensitive` flag. File-name tokens
/// follow that flag; tags are stored lowercased and match any casing of a query token.
pub fn keyword_score(query_tokens: &BTreeSet<String>, document: &DocumentRecord, case_sensitive: bool) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let name_tokens = tokens(document.path.name().unwrap_or_default(), case_sensitive);
    let tag_tokens: BTreeSet<String> = document.tags.iter().flat_map(|tag| tokenize(tag)).collect();
    let hits = query_tokens
        .iter()
        .filter(|t| name_tokens.contains(*t) || tag_tokens.contains(&t.to_lowercase()))
        .count();
    hits as f32 / query_tokens.len() as f32
}

/// Scores `candidates` (document and raw similarity) against `query` and returns the best
/// `top_k`, ordered by score, then most recent modification, then path.
pub fn rank(candidates: Vec<(DocumentRecord, f32)>, query: &str, config: &RankingConfig, top_k: usize) -> Vec<ScoredDocument> {
    let query_tokens = tokens(query, config.case_sensitive);
    let raw: Vec<f32> = candidates.iter().map(|(_, s)| *s).collect();
    let normalized = config.normalization.normalize(&raw);

    let mut scored: Vec<ScoredDocument> = candidates
        .into_iter()
        .zip(normalized)
        .map(|((document, similarity), normalized_similarity)| {
            let keyword_score = keyword_score(&query_tokens, &document, config.case_sensitive);
            let score = config.similarity_weight * normalized_similarity + config.keyword_weight * keyword_score;
            ScoredDocument { document, similarity, normalized_similarity, keyword_score, score }
        })
        .collect();
    scored.sort_by(compare);
    scored.truncate(top_k);
    scored
}

fn compare(a: &ScoredDocument, b: &ScoredDocument) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.document.modified_at.cmp(&a.document.modified_at))
        .then_with(|| a.document.path.cmp(&b.document.path))
}
