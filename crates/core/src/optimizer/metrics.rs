//! Recall measurement against exact ground truth.

use crate::graph::Neighbor;
use crate::space::ObjectId;
use std::collections::HashSet;

/// Fraction of the true top-k found by an approximate search.
///
/// recall@k = |retrieved ∩ ground_truth| / min(k, |ground_truth|)
///
/// A retrieved object outside the true set still counts when its distance ties
/// the true k-th distance, since which of several equidistant objects is returned
/// is arbitrary. An empty ground truth is trivially satisfied.
pub fn recall_at_k(ground_truth: &[Neighbor], retrieved: &[Neighbor], k: usize) -> f32 {
    let k = k.min(ground_truth.len());
    if k == 0 {
        return 1.0;
    }
    let truth = &ground_truth[..k];
    let kth = truth[k - 1].distance;
    let gt_set: HashSet<ObjectId> = truth.iter().map(|n| n.id).collect();

    let found = retrieved
        .iter()
        .take(k)
        .filter(|n| gt_set.contains(&n.id) || n.distance <= kth)
        .count();
    found.min(k) as f32 / k as f32
}

/// Mean of per-query recall values. Empty input yields 0.
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
