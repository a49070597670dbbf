//! Graph construction: neighbor search, bidirectional wiring, and pruning.
//!
//! A new node searches the linked graph for its `edge_size` nearest live neighbors
//! (with insertion slack `INSERTION_EXPLORATION_COEFFICIENT - 1`), keeps them as
//! its own edges, and offers a reverse edge to each. A neighbor whose list exceeds
//! the bound drops its furthest edge. If every reverse edge is rejected, one is
//! forced into the nearest neighbor so the new node stays reachable.

use crate::config::{INSERTION_EXPLORATION_COEFFICIENT, LINK_CHUNK_SIZE};
use crate::error::{IndexError, Result};
use crate::graph::search::{self, SearchParams};
use crate::graph::{Graph, Neighbor};
use crate::space::{ObjectId, ObjectSpace};
use rayon::prelude::*;

impl Graph {
    /// Links a single stored object into the graph.
    pub fn insert(&mut self, space: &ObjectSpace, id: ObjectId) {
        let candidates = self.find_neighbors(space, id, &[]);
        self.wire(space, id, candidates);
    }

    /// Links `ids` in ascending order, `LINK_CHUNK_SIZE` at a time.
    ///
    /// Within a chunk, neighbor searches run on `num_workers` threads against the
    /// graph as it stood before the chunk; each member is also matched exactly
    /// against the earlier members of its chunk. Wiring is sequential, so the
    /// resulting graph does not depend on the worker count.
    pub fn link_batch(
        &mut self,
        space: &ObjectSpace,
        ids: &[ObjectId],
        num_workers: usize,
    ) -> Result<()> {
        let ids: Vec<ObjectId> = ids
            .iter()
            .copied()
            .filter(|&id| space.is_live(id) && !self.is_linked(id))
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        let pool = if num_workers > 1 && ids.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(num_workers)
                .thread_name(|i| format!("graphann-link-{i}"))
                .build()
                .map_err(|e| IndexError::Internal(format!("failed to start link workers: {e}")))?;
            Some(pool)
        } else {
            None
        };

        for chunk in ids.chunks(LINK_CHUNK_SIZE) {
            let graph = &*self;
            let found: Vec<Vec<Neighbor>> = match &pool {
                Some(pool) => pool.install(|| {
                    chunk
                        .par_iter()
                        .enumerate()
                        .map(|(pos, &id)| graph.find_neighbors(space, id, &chunk[..pos]))
                        .collect()
                }),
                None => chunk
                    .iter()
                    .enumerate()
                    .map(|(pos, &id)| graph.find_neighbors(space, id, &chunk[..pos]))
                    .collect(),
            };
            for (&id, candidates) in chunk.iter().zip(found) {
                self.wire(space, id, candidates);
            }
        }
        tracing::debug!(linked = ids.len(), workers = num_workers, "Linked batch");
        Ok(())
    }

    /// Nearest live neighbors of `id`: graph search plus an exact scan of `peers`.
    fn find_neighbors(&self, space: &ObjectSpace, id: ObjectId, peers: &[ObjectId]) -> Vec<Neighbor> {
        let scorer = space.scorer_for(id);
        let params = SearchParams::new(
            self.edge_size(),
            INSERTION_EXPLORATION_COEFFICIENT - 1.0,
            -1.0,
        );
        let (mut found, _) = search::search(space, self, &scorer, &params);
        found.retain(|n| n.id != id);
        found.extend(
            peers
                .iter()
                .filter(|&&p| p != id)
                .map(|&p| Neighbor::new(p, scorer.distance(p))),
        );
        found
    }

    /// Installs `candidates` as the edges of `id` and adds the reverse edges.
    fn wire(&mut self, space: &ObjectSpace, id: ObjectId, candidates: Vec<Neighbor>) {
        self.set_neighbors(id, candidates);
        let own: Vec<Neighbor> = self.neighbors(id).to_vec();
        for edge in &own {
            self.add_edge(space, edge.id, Neighbor::new(id, edge.distance));
        }
        if !own.iter().any(|e| self.has_edge(e.id, id)) {
            if let Some(nearest) = own.first() {
                self.force_edge(space, nearest.id, Neighbor::new(id, nearest.distance));
            }
        }
        if self.entry_points().is_empty() {
            self.push_entry_point(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;

    fn grid_space(n: usize) -> ObjectSpace {
        let mut space = ObjectSpace::new(&Property::new(2));
        for i in 0..n {
            space
                .put(&[(i % 10) as f32, (i / 10) as f32])
                .unwrap();
        }
        space
    }

    #[test]
    fn test_first_node_becomes_entry_point() {
        let space = grid_space(1);
        let mut graph = Graph::new(4);
        graph.insert(&space, 1);
        assert_eq!(graph.entry_points(), &[1]);
        assert!(graph.neighbors(1).is_empty());
        assert!(graph.is_linked(1));
    }

    #[test]
    fn test_insert_wires_both_directions() {
        let space = grid_space(2);
        let mut graph = Graph::new(4);
        graph.insert(&space, 1);
        graph.insert(&space, 2);
        assert_eq!(graph.neighbors(2)[0].id, 1);
        assert_eq!(graph.neighbors(1)[0].id, 2);
        assert_eq!(graph.neighbors(1)[0].distance, 1.0);
    }

    #[test]
    fn test_rejected_node_keeps_an_incoming_edge() {
        let mut space = ObjectSpace::new(&Property::new(1));
        for v in [0.0, 1.0, 5.0] {
            space.put(&[v]).unwrap();
        }
        let mut graph = Graph::new(1);
        for id in 1..=3 {
            graph.insert(&space, id);
        }
        // 2 already holds a closer edge to 1, but must still lead to 3
        assert!(graph.has_edge(2, 3));
        assert_eq!(graph.neighbors(3)[0].id, 2);
    }

    #[test]
    fn test_lists_stay_bounded() {
        let space = grid_space(60);
        let mut graph = Graph::new(5);
        for id in 1..=60 {
            graph.insert(&space, id);
        }
        for id in 1..=60 {
            assert!(graph.neighbors(id).len() <= 5);
            assert!(graph.neighbors(id).iter().all(|n| n.id != id));
        }
        assert!(graph.validate(&space).is_ok());
    }

    #[test]
    fn test_batch_is_independent_of_worker_count() {
        let space = grid_space(150);
        let ids: Vec<ObjectId> = (1..=150).collect();

        let mut serial = Graph::new(6);
        serial.reserve_through(150);
        serial.link_batch(&space, &ids, 1).unwrap();

        let mut parallel = Graph::new(6);
        parallel.reserve_through(150);
        parallel.link_batch(&space, &ids, 4).unwrap();

        for id in 1..=150 {
            assert_eq!(serial.neighbors(id), parallel.neighbors(id));
        }
        assert_eq!(serial.linked_count(), 150);
    }

    #[test]
    fn test_batch_skips_tombstoned_and_linked() {
        let mut space = grid_space(5);
        space.remove(3).unwrap();
        let mut graph = Graph::new(4);
        graph.reserve_through(5);
        graph.insert(&space, 1);
        graph.link_batch(&space, &[1, 2, 3, 4, 5], 2).unwrap();
        assert!(!graph.is_linked(3));
        assert_eq!(graph.linked_count(), 4);
        assert!(graph.neighbors(2).iter().all(|n| n.id != 3));
    }
}
