//! Rank fusion for combining dense and sparse result lists
//!
//! Both strategies accumulate scores in first-appearance order (dense list
//! scanned before sparse) and then apply a stable descending sort, so equal
//! fused scores keep that order and results are reproducible.

use super::Candidate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    #[error("Invalid weight configuration: weights must be non-negative and not both zero")]
    InvalidWeights,

    #[error("Invalid RRF constant {0}: must be positive")]
    InvalidRrfK(f32),

    #[error("Unknown fusion strategy '{0}', expected 'rrf' or 'weighted'")]
    UnknownStrategy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionStrategy {
    /// Reciprocal Rank Fusion
    Rrf,
    /// Min-max normalized weighted sum
    Weighted,
}

impl FromStr for FusionStrategy {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rrf" => Ok(FusionStrategy::Rrf),
            "weighted" => Ok(FusionStrategy::Weighted),
            other => Err(FusionError::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for FusionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionStrategy::Rrf => f.write_str("rrf"),
            FusionStrategy::Weighted => f.write_str("weighted"),
        }
    }
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub strategy: FusionStrategy,

    /// RRF K constant (typically 60)
    pub rrf_k: f32,

    /// Weight for dense results
    pub dense_weight: f32,

    /// Weight for sparse results
    pub sparse_weight: f32,
}

impl FusionConfig {
    pub fn new(
        strategy: FusionStrategy,
        rrf_k: f32,
        dense_weight: f32,
        sparse_weight: f32,
    ) -> Result<Self, FusionError> {
        let valid = |w: f32| w.is_finite() && w >= 0.0;
        if !valid(dense_weight) || !valid(sparse_weight) {
            return Err(FusionError::InvalidWeights);
        }
        if dense_weight == 0.0 && sparse_weight == 0.0 {
            return Err(FusionError::InvalidWeights);
        }
        if !rrf_k.is_finite() || rrf_k <= 0.0 {
            return Err(FusionError::InvalidRrfK(rrf_k));
        }

        Ok(Self {
            strategy,
            rrf_k,
            dense_weight,
            sparse_weight,
        })
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy: FusionStrategy::Rrf,
            rrf_k: 60.0,
            dense_weight: 0.5,
            sparse_weight: 0.5,
        }
    }
}

/// Fuse with the configured strategy
pub fn fuse(dense: &[Candidate], sparse: &[Candidate], config: &FusionConfig) -> Vec<Candidate> {
    match config.strategy {
        FusionStrategy::Rrf => reciprocal_rank_fusion(dense, sparse, config),
        FusionStrategy::Weighted => weighted_fusion(dense, sparse, config),
    }
}

/// Ordered score accumulator keyed by fragment id
#[derive(Default)]
struct Accumulator {
    order: Vec<Candidate>,
    positions: HashMap<String, usize>,
}

impl Accumulator {
    fn add(&mut self, fragment_id: &str, score: f32) {
        match self.positions.get(fragment_id) {
            Some(&pos) => self.order[pos].score += score,
            None => {
                self.positions
                    .insert(fragment_id.to_string(), self.order.len());
                self.order.push(Candidate::new(fragment_id, score));
            }
        }
    }

    fn into_sorted(mut self) -> Vec<Candidate> {
        self.order.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.order
    }
}

/// Each id's first occurrence in a list, with its rank
fn first_occurrences(list: &[Candidate]) -> impl Iterator<Item = (usize, &Candidate)> {
    let mut seen: HashSet<String> = HashSet::new();
    list.iter()
        .filter(move |c| seen.insert(c.fragment_id.clone()))
        .enumerate()
}

/// Apply Reciprocal Rank Fusion to combine two ranked lists
///
/// RRF formula: score(id) = sum over all rankings of: weight / (k + rank + 1)
pub fn reciprocal_rank_fusion(
    dense: &[Candidate],
    sparse: &[Candidate],
    config: &FusionConfig,
) -> Vec<Candidate> {
    let mut acc = Accumulator::default();

    for (rank, candidate) in first_occurrences(dense) {
        acc.add(
            &candidate.fragment_id,
            config.dense_weight / (config.rrf_k + rank as f32 + 1.0),
        );
    }

    for (rank, candidate) in first_occurrences(sparse) {
        acc.add(
            &candidate.fragment_id,
            config.sparse_weight / (config.rrf_k + rank as f32 + 1.0),
        );
    }

    acc.into_sorted()
}

/// Min-max normalize each list, then `dense_weight * d + sparse_weight * s`
pub fn weighted_fusion(
    dense: &[Candidate],
    sparse: &[Candidate],
    config: &FusionConfig,
) -> Vec<Candidate> {
    let dense: Vec<&Candidate> = first_occurrences(dense).map(|(_, c)| c).collect();
    let sparse: Vec<&Candidate> = first_occurrences(sparse).map(|(_, c)| c).collect();

    let dense_norm = normalize_scores(&dense.iter().map(|c| c.score).collect::<Vec<_>>());
    let sparse_norm = normalize_scores(&sparse.iter().map(|c| c.score).collect::<Vec<_>>());

    let mut acc = Accumulator::default();
    for (candidate, norm) in dense.iter().zip(dense_norm) {
        acc.add(&candidate.fragment_id, config.dense_weight * norm);
    }
    for (candidate, norm) in sparse.iter().zip(sparse_norm) {
        acc.add(&candidate.fragment_id, config.sparse_weight * norm);
    }

    acc.into_sorted()
}

/// Min-max normalize scores to `[0, 1]`; a list of equal scores maps to 1.0
pub fn normalize_scores(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if range <= f32::EPSILON {
        return vec![1.0; scores.len()];
    }

    scores.iter().map(|s| (s - min) / range).collect()
}
