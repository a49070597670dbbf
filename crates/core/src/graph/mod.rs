//! Approximate k-nearest-neighbor graph over object ids.
//!
//! The graph is an arena indexed by object id (slot `id - 1`): each node owns a
//! bounded neighbor list sorted by ascending `(distance, id)`, and edges store ids
//! rather than references. Nodes appended but not yet built are present in the
//! arena with `linked = false` and are unreachable until `build` links them.

/// Entry-point selection, build, and removal repair.
pub mod build;
/// Distance metrics: Minkowski, angular, set-based, and hyperbolic.
pub mod distance;
/// Graph construction: neighbor search, bidirectional wiring, and pruning.
pub mod insert;
/// Best-first graph search and exhaustive linear search.
pub mod search;
/// Generation-based visited set for efficient graph traversal.
pub mod visited;

use crate::space::{ObjectId, ObjectSpace};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub use distance::DistanceMetric;
pub use search::{SearchParams, SearchStats};

/// An `(id, distance)` pair: a graph edge or a search result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: ObjectId,
    pub distance: f32,
}

impl Neighbor {
    pub fn new(id: ObjectId, distance: f32) -> Self {
        Self { id, distance }
    }
}

/// Ascending distance, ties broken by ascending id.
#[inline]
pub fn neighbor_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    OrderedFloat(a.distance)
        .cmp(&OrderedFloat(b.distance))
        .then(a.id.cmp(&b.id))
}

/// Neighbor lists plus the entry points that seed search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    /// Upper bound on every neighbor list (edge size for creation).
    edge_size: usize,
    neighbors: Vec<Vec<Neighbor>>,
    linked: Vec<bool>,
    entry_points: Vec<ObjectId>,
}

impl Graph {
    pub fn new(edge_size: usize) -> Self {
        Self {
            edge_size,
            neighbors: Vec::new(),
            linked: Vec::new(),
            entry_points: Vec::new(),
        }
    }

    pub fn edge_size(&self) -> usize {
        self.edge_size
    }

    /// Number of arena slots (equals the object count once appends are registered).
    pub fn slots(&self) -> usize {
        self.neighbors.len()
    }

    pub fn linked_count(&self) -> usize {
        self.linked.iter().filter(|&&l| l).count()
    }

    pub fn entry_points(&self) -> &[ObjectId] {
        &self.entry_points
    }

    /// Returns `true` once `id` has been wired into the graph.
    #[inline]
    pub fn is_linked(&self, id: ObjectId) -> bool {
        id >= 1 && self.linked.get(id as usize - 1).copied().unwrap_or(false)
    }

    /// Neighbor list of `id`, empty for unknown ids.
    #[inline]
    pub fn neighbors(&self, id: ObjectId) -> &[Neighbor] {
        if id == 0 {
            return &[];
        }
        self.neighbors
            .get(id as usize - 1)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Registers an unlinked slot for every id up to `max_id`.
    pub fn reserve_through(&mut self, max_id: ObjectId) {
        let slots = max_id as usize;
        if slots > self.neighbors.len() {
            self.neighbors.resize_with(slots, Vec::new);
            self.linked.resize(slots, false);
        }
    }

    /// Ids registered in the arena but not yet linked, ascending.
    pub fn unlinked(&self, space: &ObjectSpace) -> Vec<ObjectId> {
        space
            .live_ids()
            .filter(|&id| !self.is_linked(id))
            .collect()
    }

    /// Replaces the neighbor list of `id` and marks it linked.
    pub(crate) fn set_neighbors(&mut self, id: ObjectId, mut list: Vec<Neighbor>) {
        self.reserve_through(id);
        list.sort_unstable_by(neighbor_order);
        list.dedup_by_key(|n| n.id);
        list.truncate(self.edge_size);
        let slot = id as usize - 1;
        self.neighbors[slot] = list;
        self.linked[slot] = true;
    }

    /// Adds `edge` to the list of `id`, evicting the furthest entry past the bound.
    ///
    /// Tombstoned entries are dropped from the list first. Returns `false` if the
    /// edge was already present or was itself the one evicted.
    pub(crate) fn add_edge(&mut self, space: &ObjectSpace, id: ObjectId, edge: Neighbor) -> bool {
        let bound = self.edge_size;
        let list = &mut self.neighbors[id as usize - 1];
        list.retain(|n| space.is_live(n.id));
        if list.iter().any(|n| n.id == edge.id) {
            return false;
        }
        let pos = list.partition_point(|n| neighbor_order(n, &edge) == Ordering::Less);
        list.insert(pos, edge);
        if list.len() > bound {
            let evicted = list.pop();
            return evicted.map_or(true, |e| e.id != edge.id);
        }
        true
    }

    /// Adds `edge` to the list of `id` even when it would be the furthest entry.
    ///
    /// A full list drops its current furthest edge to make room.
    pub(crate) fn force_edge(&mut self, space: &ObjectSpace, id: ObjectId, edge: Neighbor) {
        let bound = self.edge_size;
        let list = &mut self.neighbors[id as usize - 1];
        list.retain(|n| space.is_live(n.id));
        if list.iter().any(|n| n.id == edge.id) {
            return;
        }
        if list.len() >= bound {
            list.pop();
        }
        let pos = list.partition_point(|n| neighbor_order(n, &edge) == Ordering::Less);
        list.insert(pos, edge);
    }

    /// Returns `true` if the list of `from` holds an edge to `to`.
    #[inline]
    pub fn has_edge(&self, from: ObjectId, to: ObjectId) -> bool {
        self.neighbors(from).iter().any(|n| n.id == to)
    }

    pub(crate) fn set_entry_points(&mut self, entry_points: Vec<ObjectId>) {
        self.entry_points = entry_points;
    }

    pub(crate) fn push_entry_point(&mut self, id: ObjectId) {
        if !self.entry_points.contains(&id) {
            self.entry_points.push(id);
        }
    }

    /// Replaces every neighbor list with `lists` (slot-indexed) under a new bound.
    pub(crate) fn rewire(&mut self, edge_size: usize, lists: Vec<Vec<Neighbor>>) {
        self.edge_size = edge_size;
        for (slot, mut list) in lists.into_iter().enumerate().take(self.neighbors.len()) {
            list.sort_unstable_by(neighbor_order);
            list.truncate(edge_size);
            self.neighbors[slot] = list;
        }
    }

    /// Checks internal consistency after deserialization.
    pub fn validate(&self, space: &ObjectSpace) -> Result<(), String> {
        let count = space.len();
        if self.neighbors.len() != count || self.linked.len() != count {
            return Err(format!(
                "graph slots ({} lists, {} flags) != object count {}",
                self.neighbors.len(),
                self.linked.len(),
                count
            ));
        }
        if self.edge_size == 0 {
            return Err("graph edge size is 0".to_string());
        }
        for &ep in &self.entry_points {
            if !space.exists(ep) || !self.is_linked(ep) {
                return Err(format!("entry point {ep} is not a linked object"));
            }
        }
        for (slot, list) in self.neighbors.iter().enumerate() {
            if list.len() > self.edge_size {
                return Err(format!(
                    "node {} has {} edges, bound is {}",
                    slot + 1,
                    list.len(),
                    self.edge_size
                ));
            }
            for pair in list.windows(2) {
                if neighbor_order(&pair[0], &pair[1]) != Ordering::Less {
                    return Err(format!("neighbor list of node {} is not sorted", slot + 1));
                }
            }
            for n in list {
                if !space.exists(n.id) {
                    return Err(format!(
                        "neighbor {} out of bounds (count={}) at node {}",
                        n.id,
                        count,
                        slot + 1
                    ));
                }
                if !n.distance.is_finite() || n.distance < 0.0 {
                    return Err(format!("invalid edge distance at node {}", slot + 1));
                }
            }
        }
        Ok(())
    }
}
