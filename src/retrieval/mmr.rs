//! Maximal Marginal Relevance selection
//!
//! Greedy re-ranking over an ANN candidate pool:
//! `mmr(c) = lambda * sim(c, query) - (1 - lambda) * max sim(c, selected)`.
//! `lambda = 1` degenerates to plain top-k similarity, `lambda = 0` ignores
//! relevance after the first pick.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::index::Candidate;
use crate::retrieval::RetrievalError;

/// MMR selection parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MmrParams {
    /// Number of chunks to select
    pub k: usize,
    /// Candidate pool size fetched from the index before re-ranking
    pub fetch_k: usize,
    /// Relevance/diversity trade-off in [0, 1]
    pub lambda_mult: f32,
}

impl Default for MmrParams {
    fn default() -> Self {
        Self {
            k: 5,
            fetch_k: 20,
            lambda_mult: 0.5,
        }
    }
}

impl MmrParams {
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.k == 0 {
            return Err(RetrievalError::InvalidParameter(
                "k must be greater than 0".to_string(),
            ));
        }
        if self.fetch_k < self.k {
            return Err(RetrievalError::InvalidParameter(format!(
                "fetch_k ({}) must be at least k ({})",
                self.fetch_k, self.k
            )));
        }
        if !(0.0..=1.0).contains(&self.lambda_mult) {
            return Err(RetrievalError::InvalidParameter(format!(
                "lambda_mult must be within [0, 1], got {}",
                self.lambda_mult
            )));
        }
        Ok(())
    }
}

/// Greedily select up to `k` candidates from `pool`, balancing similarity to
/// the query against redundancy with already-selected candidates.
///
/// Returns indices into `pool` in selection order; that order is the final
/// ranking. Ties on the MMR score break toward higher raw query similarity,
/// then toward earlier pool position. A pool smaller than `k` is returned
/// whole.
pub fn mmr_select(pool: &[Candidate], k: usize, lambda_mult: f32) -> Vec<usize> {
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(pool.len()));
    let mut remaining: Vec<usize> = (0..pool.len()).collect();
    // Highest similarity of each candidate to anything already selected.
    let mut max_sim_to_selected: Vec<f32> = vec![0.0; pool.len()];

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;
        let mut best_query_sim = f32::NEG_INFINITY;

        for (pos, &candidate) in remaining.iter().enumerate() {
            let penalty = if selected.is_empty() {
                0.0
            } else {
                max_sim_to_selected[candidate]
            };
            let query_sim = pool[candidate].score;
            let score = lambda_mult * query_sim - (1.0 - lambda_mult) * penalty;

            if score > best_score || (score == best_score && query_sim > best_query_sim) {
                best_pos = pos;
                best_score = score;
                best_query_sim = query_sim;
            }
        }

        let chosen = remaining.remove(best_pos);
        selected.push(chosen);

        for &candidate in &remaining {
            let sim = cosine_similarity(&pool[candidate].vector, &pool[chosen].vector);
            if sim > max_sim_to_selected[candidate] {
                max_sim_to_selected[candidate] = sim;
            }
        }
    }

    selected
}

/// Cosine similarity between two vectors of equal length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        a.dot(&b) / denom
    }
}
