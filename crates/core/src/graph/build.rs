//! Entry-point selection, build, and removal repair.

use crate::config::ENTRY_POINT_COUNT;
use crate::error::Result;
use crate::graph::{neighbor_order, Graph, Neighbor};
use crate::space::{ObjectId, ObjectSpace};

impl Graph {
    /// Links every pending object, then re-selects the entry points.
    pub fn build(&mut self, space: &ObjectSpace, num_workers: usize) -> Result<usize> {
        self.reserve_through(space.max_id());
        let pending = self.unlinked(space);
        self.link_batch(space, &pending, num_workers)?;
        self.refresh_entry_points(space);
        Ok(pending.len())
    }

    /// Picks up to `ENTRY_POINT_COUNT` spread-out entry points.
    ///
    /// Farthest-point sampling over the linked live objects, starting from the
    /// lowest id. Ties go to the lower id, so the choice is deterministic.
    pub fn refresh_entry_points(&mut self, space: &ObjectSpace) {
        let live: Vec<ObjectId> = space.live_ids().filter(|&id| self.is_linked(id)).collect();
        let Some(&first) = live.first() else {
            self.set_entry_points(Vec::new());
            return;
        };
        let count = ENTRY_POINT_COUNT.min(live.len());
        let mut chosen = vec![first];
        let scorer = space.scorer_for(first);
        let mut nearest: Vec<f32> = live.iter().map(|&id| scorer.distance(id)).collect();
        nearest[0] = f32::NEG_INFINITY;

        while chosen.len() < count {
            let mut best = None;
            for (i, &d) in nearest.iter().enumerate() {
                if d == f32::NEG_INFINITY {
                    continue;
                }
                if best.map_or(true, |(_, bd)| d > bd) {
                    best = Some((i, d));
                }
            }
            let Some((pick, _)) = best else { break };
            let id = live[pick];
            chosen.push(id);
            nearest[pick] = f32::NEG_INFINITY;
            let scorer = space.scorer_for(id);
            for (i, &other) in live.iter().enumerate() {
                if nearest[i] != f32::NEG_INFINITY {
                    nearest[i] = nearest[i].min(scorer.distance(other));
                }
            }
        }
        tracing::debug!(entry_points = ?chosen, "Selected entry points");
        self.set_entry_points(chosen);
    }

    /// Repairs the graph after `id` was tombstoned in `space`.
    ///
    /// Every live node that pointed at `id` drops that edge and takes the live
    /// neighbors of `id` as replacement candidates, keeping its nearest
    /// `edge_size`. A neighbor of `id` left without any incoming edge is linked
    /// from its nearest repaired node. A removed entry point is replaced by its
    /// nearest live neighbor, or by the lowest live linked id when it has none.
    pub fn on_remove(&mut self, space: &ObjectSpace, id: ObjectId) {
        let repaired = self.repair_edges(space, id);
        if repaired > 0 {
            tracing::debug!(id, repaired, "Repaired edges around removed node");
        }

        let Some(pos) = self.entry_points().iter().position(|&ep| ep == id) else {
            return;
        };
        let mut entry_points = self.entry_points().to_vec();
        entry_points.remove(pos);

        let replacement = self
            .neighbors(id)
            .iter()
            .map(|n| n.id)
            .find(|&n| space.is_live(n) && self.is_linked(n) && !entry_points.contains(&n))
            .or_else(|| {
                space
                    .live_ids()
                    .find(|&n| self.is_linked(n) && !entry_points.contains(&n))
            });
        if let Some(r) = replacement {
            entry_points.insert(pos, r);
        }
        self.set_entry_points(entry_points);
    }

    /// Bridges the in-neighbors of a removed node to its out-neighbors.
    /// Returns the number of rewritten lists.
    fn repair_edges(&mut self, space: &ObjectSpace, id: ObjectId) -> usize {
        let bridged: Vec<ObjectId> = self
            .neighbors(id)
            .iter()
            .map(|n| n.id)
            .filter(|&n| space.is_live(n) && self.is_linked(n))
            .collect();
        let referrers: Vec<ObjectId> = space
            .live_ids()
            .filter(|&u| self.has_edge(u, id))
            .collect();

        for &u in &referrers {
            let scorer = space.scorer_for(u);
            let mut list: Vec<Neighbor> = self
                .neighbors(u)
                .iter()
                .copied()
                .filter(|n| n.id != id && space.is_live(n.id))
                .collect();
            for &w in &bridged {
                if w != u && !list.iter().any(|n| n.id == w) {
                    list.push(Neighbor::new(w, scorer.distance(w)));
                }
            }
            self.set_neighbors(u, list);
        }

        let mut orphans = bridged.clone();
        for u in space.live_ids() {
            if orphans.is_empty() {
                break;
            }
            orphans.retain(|&w| !self.has_edge(u, w));
        }
        for w in orphans {
            let scorer = space.scorer_for(w);
            let anchor = referrers
                .iter()
                .chain(&bridged)
                .copied()
                .filter(|&a| a != w)
                .map(|a| Neighbor::new(a, scorer.distance(a)))
                .min_by(neighbor_order);
            if let Some(a) = anchor {
                self.force_edge(space, a.id, Neighbor::new(w, a.distance));
            }
        }
        referrers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;

    fn line_space(n: usize) -> ObjectSpace {
        let mut space = ObjectSpace::new(&Property::new(1));
        for i in 0..n {
            space.put(&[i as f32]).unwrap();
        }
        space
    }

    #[test]
    fn test_build_links_pending_and_spreads_entry_points() {
        let space = line_space(30);
        let mut graph = Graph::new(4);
        let linked = graph.build(&space, 2).unwrap();
        assert_eq!(linked, 30);
        assert_eq!(graph.linked_count(), 30);
        let eps = graph.entry_points();
        assert_eq!(eps.len(), crate::config::ENTRY_POINT_COUNT);
        assert_eq!(eps[0], 1);
        // farthest from 1 is the last point
        assert_eq!(eps[1], 30);
    }

    #[test]
    fn test_build_with_nothing_pending() {
        let space = line_space(0);
        let mut graph = Graph::new(4);
        assert_eq!(graph.build(&space, 1).unwrap(), 0);
        assert!(graph.entry_points().is_empty());
    }

    #[test]
    fn test_entry_points_capped_by_live_count() {
        let mut space = line_space(3);
        let mut graph = Graph::new(4);
        graph.build(&space, 1).unwrap();
        space.remove(2).unwrap();
        graph.refresh_entry_points(&space);
        assert_eq!(graph.entry_points(), &[1, 3]);
    }

    #[test]
    fn test_removed_entry_point_is_replaced_by_neighbor() {
        let mut space = line_space(4);
        let mut graph = Graph::new(4);
        for id in 1..=4 {
            graph.insert(&space, id);
        }
        assert_eq!(graph.entry_points(), &[1]);
        space.remove(1).unwrap();
        graph.on_remove(&space, 1);
        assert_eq!(graph.entry_points(), &[2]);
    }

    #[test]
    fn test_removal_bridges_around_the_removed_node() {
        let mut space = line_space(5);
        let mut graph = Graph::new(2);
        for id in 1..=5 {
            graph.insert(&space, id);
        }
        space.remove(3).unwrap();
        graph.on_remove(&space, 3);

        for id in [1, 2, 4, 5] {
            assert!(!graph.has_edge(id, 3), "node {id} still points at 3");
        }
        assert!(graph.validate(&space).is_ok());
        let scorer = space.scorer(vec![4.0]);
        let (results, _) = crate::graph::search::search(
            &space,
            &graph,
            &scorer,
            &crate::graph::SearchParams::new(1, 0.0, -1.0),
        );
        assert_eq!(results[0].id, 5);
    }

    #[test]
    fn test_orphaned_neighbor_gets_an_incoming_edge() {
        let mut space = line_space(5);
        let mut graph = Graph::new(2);
        graph.reserve_through(5);
        // 5 is reachable only through 2
        graph.set_neighbors(1, vec![Neighbor::new(2, 1.0), Neighbor::new(4, 3.0)]);
        graph.set_neighbors(2, vec![Neighbor::new(3, 1.0), Neighbor::new(5, 3.0)]);
        graph.set_neighbors(3, vec![Neighbor::new(4, 1.0), Neighbor::new(1, 2.0)]);
        graph.set_neighbors(4, vec![Neighbor::new(3, 1.0)]);
        graph.set_neighbors(5, vec![Neighbor::new(2, 3.0)]);
        graph.set_entry_points(vec![1]);

        space.remove(2).unwrap();
        graph.on_remove(&space, 2);
        // 1 keeps its two nearest candidates and drops 5
        let ids: Vec<_> = graph.neighbors(1).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert!(graph.has_edge(3, 5));
        assert!((1..=5).all(|u| !graph.has_edge(u, 2) || u == 2));
    }

    #[test]
    fn test_removing_last_object_empties_entry_points() {
        let mut space = line_space(1);
        let mut graph = Graph::new(4);
        graph.insert(&space, 1);
        space.remove(1).unwrap();
        graph.on_remove(&space, 1);
        assert!(graph.entry_points().is_empty());
    }
}
