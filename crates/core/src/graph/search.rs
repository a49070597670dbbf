//! Best-first graph search and exhaustive linear search.
//!
//! Graph search seeds a candidate min-heap from the entry points and expands the
//! closest unexpanded node until the closest candidate is farther than the
//! exploration limit `min(kth distance, radius) * (1 + epsilon)`. Tombstoned nodes
//! are never expanded or returned; unlinked (appended, unbuilt) nodes are unreachable.

use crate::config::{DEFAULT_RESULT_SIZE, DEFAULT_SEARCH_EPSILON, MIN_SEARCH_POOL};
use crate::graph::visited::VisitedSet;
use crate::graph::{Graph, Neighbor};
use crate::space::{ObjectId, ObjectSpace, Scorer};
use ordered_float::OrderedFloat;
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

thread_local! {
    /// Reused across searches on the same thread, including rayon workers during build.
    static SEARCH_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

/// Parameters of one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    /// Number of results.
    pub k: usize,
    /// Exploration slack. Larger values explore more and raise recall.
    pub epsilon: f32,
    /// Results farther than this are excluded. Negative means unbounded.
    pub radius: f32,
    /// Edges followed per expanded node. 0 follows all of them.
    pub edge_size: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_RESULT_SIZE,
            epsilon: DEFAULT_SEARCH_EPSILON,
            radius: -1.0,
            edge_size: 0,
        }
    }
}

impl SearchParams {
    pub fn new(k: usize, epsilon: f32, radius: f32) -> Self {
        Self {
            k,
            epsilon,
            radius,
            edge_size: 0,
        }
    }

    pub fn with_edge_size(mut self, edge_size: usize) -> Self {
        self.edge_size = edge_size;
        self
    }

    /// Multiplier applied to the exploration limit. NaN falls back to the default
    /// epsilon and values below -1 are clamped so the limit stays non-negative.
    fn slack(&self) -> f32 {
        let eps = if self.epsilon.is_nan() {
            DEFAULT_SEARCH_EPSILON
        } else {
            self.epsilon
        };
        1.0 + eps.max(-1.0)
    }

    fn radius(&self) -> Option<f32> {
        (self.radius >= 0.0).then_some(self.radius)
    }
}

/// Work counters for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub distance_computations: usize,
    pub expanded: usize,
}

impl SearchStats {
    pub fn accumulate(&mut self, other: &SearchStats) {
        self.distance_computations += other.distance_computations;
        self.expanded += other.expanded;
    }
}

type Entry = (OrderedFloat<f32>, ObjectId);

/// Bounded max-heap of the best `k` results, worst on top.
struct TopK {
    heap: BinaryHeap<Entry>,
    k: usize,
    radius: Option<f32>,
}

impl TopK {
    fn new(k: usize, radius: Option<f32>) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k + 1),
            k,
            radius,
        }
    }

    fn offer(&mut self, distance: f32, id: ObjectId) {
        if self.radius.is_some_and(|r| distance > r) {
            return;
        }
        self.heap.push((OrderedFloat(distance), id));
        if self.heap.len() > self.k {
            self.heap.pop();
        }
    }

    fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// Distance of the current kth result, infinite until full.
    fn kth(&self) -> f32 {
        if self.is_full() {
            self.heap.peek().map_or(f32::INFINITY, |e| e.0 .0)
        } else {
            f32::INFINITY
        }
    }

    fn into_sorted(self) -> Vec<Neighbor> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|(d, id)| Neighbor::new(id, d.0))
            .collect()
    }
}

/// Best-first search over the linked part of the graph.
///
/// Results are ordered by ascending `(distance, id)` and contain at most `k` live
/// objects. `k` is capped at the live count; the search itself explores a pool
/// of at least `MIN_SEARCH_POOL` results.
pub fn search(
    space: &ObjectSpace,
    graph: &Graph,
    scorer: &Scorer<'_>,
    params: &SearchParams,
) -> (Vec<Neighbor>, SearchStats) {
    let mut stats = SearchStats::default();
    let live = space.live_count();
    let k = params.k.min(live);
    if k == 0 || graph.entry_points().is_empty() {
        return (Vec::new(), stats);
    }
    let pool = k.max(MIN_SEARCH_POOL).min(live);
    let mut results = SEARCH_VISITED.with(|cell| {
        let mut visited = cell.borrow_mut();
        visited.ensure_capacity(space.max_id() as usize);
        visited.clear();
        search_with_visited(space, graph, scorer, params, pool, &mut visited, &mut stats)
    });
    results.truncate(k);
    (results, stats)
}

fn search_with_visited(
    space: &ObjectSpace,
    graph: &Graph,
    scorer: &Scorer<'_>,
    params: &SearchParams,
    pool: usize,
    visited: &mut VisitedSet,
    stats: &mut SearchStats,
) -> Vec<Neighbor> {
    let slack = params.slack();
    let radius = params.radius();
    let radius_limit = radius.unwrap_or(f32::INFINITY);
    let edge_limit = if params.edge_size == 0 {
        usize::MAX
    } else {
        params.edge_size
    };

    let mut candidates: BinaryHeap<Reverse<Entry>> =
        BinaryHeap::with_capacity(pool.saturating_mul(2));
    let mut results = TopK::new(pool, radius);

    for &ep in graph.entry_points() {
        if !visited.insert(ep) {
            continue;
        }
        let dist = scorer.distance(ep);
        stats.distance_computations += 1;
        candidates.push(Reverse((OrderedFloat(dist), ep)));
        if space.is_live(ep) {
            results.offer(dist, ep);
        }
    }

    // Exploration limit, refreshed whenever the result set changes
    let mut limit = results.kth().min(radius_limit) * slack;

    while let Some(Reverse((OrderedFloat(c_dist), c_id))) = candidates.pop() {
        if c_dist > limit {
            break;
        }
        stats.expanded += 1;

        for edge in graph.neighbors(c_id).iter().take(edge_limit) {
            let n = edge.id;
            if !space.is_live(n) || !visited.insert(n) {
                continue;
            }
            let dist = scorer.distance(n);
            stats.distance_computations += 1;
            if dist <= limit {
                candidates.push(Reverse((OrderedFloat(dist), n)));
                results.offer(dist, n);
                limit = results.kth().min(radius_limit) * slack;
            }
        }
    }

    results.into_sorted()
}

/// Exhaustive scan over every live object, linked or not.
pub fn linear_search(
    space: &ObjectSpace,
    scorer: &Scorer<'_>,
    k: usize,
    radius: f32,
) -> (Vec<Neighbor>, SearchStats) {
    let mut stats = SearchStats::default();
    let k = k.min(space.live_count());
    if k == 0 {
        return (Vec::new(), stats);
    }
    let mut results = TopK::new(k, (radius >= 0.0).then_some(radius));
    for id in space.live_ids() {
        let dist = scorer.distance(id);
        stats.distance_computations += 1;
        results.offer(dist, id);
    }
    (results.into_sorted(), stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;

    // ── Helpers ──────────────────────────────────────────────────────────

    /// 1-D points 0..n on a fully built line graph.
    fn line(n: usize) -> (ObjectSpace, Graph) {
        let mut space = ObjectSpace::new(&Property::new(1));
        let mut graph = Graph::new(4);
        for i in 0..n {
            let id = space.put(&[i as f32]).unwrap();
            graph.reserve_through(id);
        }
        for id in 1..=n as ObjectId {
            let mut list = Vec::new();
            if id > 1 {
                list.push(Neighbor::new(id - 1, 1.0));
            }
            if (id as usize) < n {
                list.push(Neighbor::new(id + 1, 1.0));
            }
            graph.set_neighbors(id, list);
        }
        graph.set_entry_points(vec![1]);
        (space, graph)
    }

    fn ids(results: &[Neighbor]) -> Vec<ObjectId> {
        results.iter().map(|n| n.id).collect()
    }

    // ── Graph search ─────────────────────────────────────────────────────

    #[test]
    fn test_search_walks_to_far_end() {
        let (space, graph) = line(20);
        let scorer = space.scorer(vec![19.0]);
        let (results, stats) = search(&space, &graph, &scorer, &SearchParams::new(3, 0.1, -1.0));
        assert_eq!(ids(&results), vec![20, 19, 18]);
        assert_eq!(results[0].distance, 0.0);
        assert!(stats.expanded > 0);
        assert!(stats.distance_computations >= 20);
    }

    #[test]
    fn test_search_skips_tombstoned() {
        let (mut space, graph) = line(5);
        space.remove(3).unwrap();
        let scorer = space.scorer(vec![2.0]);
        let (results, _) = search(&space, &graph, &scorer, &SearchParams::new(5, 0.1, -1.0));
        assert!(!ids(&results).contains(&3));
        // node 3 was the only bridge, so 4 and 5 are unreachable
        assert_eq!(ids(&results), vec![2, 1]);
    }

    #[test]
    fn test_search_respects_radius() {
        let (space, graph) = line(10);
        let scorer = space.scorer(vec![0.0]);
        let (results, _) = search(&space, &graph, &scorer, &SearchParams::new(10, 0.1, 2.5));
        assert_eq!(ids(&results), vec![1, 2, 3]);
    }

    #[test]
    fn test_search_ties_break_by_id() {
        let (space, graph) = line(5);
        let scorer = space.scorer(vec![2.5]);
        let (results, _) = search(&space, &graph, &scorer, &SearchParams::new(2, 0.5, -1.0));
        assert_eq!(ids(&results), vec![3, 4]);
    }

    #[test]
    fn test_search_zero_k_is_empty() {
        let (space, graph) = line(3);
        let scorer = space.scorer(vec![0.0]);
        let (results, stats) = search(&space, &graph, &scorer, &SearchParams::new(0, 0.1, -1.0));
        assert!(results.is_empty());
        assert_eq!(stats, SearchStats::default());
    }

    #[test]
    fn test_search_caps_huge_k_at_live_count() {
        let (mut space, graph) = line(5);
        space.remove(5).unwrap();
        let scorer = space.scorer(vec![0.0]);
        let (results, _) = search(&space, &graph, &scorer, &SearchParams::new(usize::MAX, 0.1, -1.0));
        assert_eq!(ids(&results), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_small_k_explores_past_greedy_dead_end() {
        // the only path to 4 runs through 3, which is farther than the start
        let mut space = ObjectSpace::new(&Property::new(1));
        for v in [5.0, 4.0, 9.0, 0.0] {
            space.put(&[v]).unwrap();
        }
        let mut graph = Graph::new(4);
        graph.set_neighbors(1, vec![Neighbor::new(2, 1.0)]);
        graph.set_neighbors(2, vec![Neighbor::new(3, 5.0)]);
        graph.set_neighbors(3, vec![Neighbor::new(4, 9.0)]);
        graph.set_neighbors(4, vec![Neighbor::new(2, 4.0)]);
        graph.set_entry_points(vec![1]);
        let scorer = space.scorer(vec![0.0]);
        let (results, _) = search(&space, &graph, &scorer, &SearchParams::new(1, 0.1, -1.0));
        assert_eq!(results, vec![Neighbor::new(4, 0.0)]);
    }

    // ── Linear search ────────────────────────────────────────────────────

    #[test]
    fn test_linear_search_scans_everything() {
        let (mut space, _) = line(6);
        space.remove(2).unwrap();
        let scorer = space.scorer(vec![1.2]);
        let (results, stats) = linear_search(&space, &scorer, 3, -1.0);
        assert_eq!(ids(&results), vec![1, 3, 4]);
        assert_eq!(stats.distance_computations, 5);
    }

    #[test]
    fn test_linear_search_caps_huge_k() {
        let (space, _) = line(3);
        let scorer = space.scorer(vec![2.0]);
        let (results, stats) = linear_search(&space, &scorer, usize::MAX, -1.0);
        assert_eq!(ids(&results), vec![3, 2, 1]);
        assert_eq!(stats.distance_computations, 3);
    }

    #[test]
    fn test_slack_handles_nan_and_large_negative() {
        assert_eq!(SearchParams::new(1, f32::NAN, -1.0).slack(), 1.0 + DEFAULT_SEARCH_EPSILON);
        assert_eq!(SearchParams::new(1, -5.0, -1.0).slack(), 0.0);
    }
}
