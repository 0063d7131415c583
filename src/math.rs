//! Pure vector math for similarity scoring

use crate::error::{Error, Result};

/// Dot product of two equal-length vectors.
///
/// Callers are responsible for length checks; this is the hot inner loop.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean magnitude of a vector.
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity between two vectors, in `[-1, 1]`.
///
/// Returns 0.0 when either vector has zero magnitude rather than
/// propagating a division by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::dimension_mismatch(a.len(), b.len()));
    }
    if a.is_empty() {
        return Err(Error::EmptyVector);
    }

    let mag_a = magnitude(a);
    let mag_b = magnitude(b);
    if mag_a == 0.0 || mag_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot(a, b) / (mag_a * mag_b))
}

/// Remap a cosine similarity from `[-1, 1]` to a `[0, 1]` score.
///
/// Thresholds and result ordering everywhere in the crate operate on this
/// uniform "higher is better" scale.
pub fn similarity_to_score(similarity: f32) -> f32 {
    (similarity + 1.0) / 2.0
}

/// Normalize a vector to unit magnitude.
///
/// A zero-magnitude vector is returned unchanged (no NaN).
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let mag = magnitude(v);
    if mag == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / mag).collect()
}

/// Cosine similarity of a query against every target, in target order.
pub fn batch_similarity(query: &[f32], targets: &[Vec<f32>]) -> Result<Vec<f32>> {
    targets
        .iter()
        .map(|t| cosine_similarity(query, t))
        .collect()
}

/// Top-k targets by similarity score.
///
/// Returns `(index, score)` pairs sorted descending by score, truncated to
/// `k`. The sort is stable, so ties keep original input order.
pub fn top_k_similar(query: &[f32], targets: &[Vec<f32>], k: usize) -> Result<Vec<(usize, f32)>> {
    let similarities = batch_similarity(query, targets)?;

    let mut ranked: Vec<(usize, f32)> = similarities
        .into_iter()
        .map(similarity_to_score)
        .enumerate()
        .collect();

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(k);

    Ok(ranked)
}
