//! Index aggregate: one [`Property`], one [`ObjectSpace`], one [`Graph`].
//!
//! [`Index`] is a cheap-to-clone handle around `Arc<RwLock<IndexData>>`. Searches
//! and saves take the read lock and run concurrently; insert, remove, and build
//! take the write lock. Saves are serialized through the path lock. Every
//! validation happens before the first mutation, so a failed call leaves the
//! index unchanged.

use crate::config::DEFAULT_SEARCH_EPSILON;
use crate::error::Result;
use crate::graph::search::{self, SearchParams, SearchStats};
use crate::graph::{Graph, Neighbor};
use crate::property::Property;
use crate::space::{ObjectId, ObjectSpace};
use crate::storage::persistence;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// State guarded by the index lock.
#[derive(Debug, Clone)]
pub struct IndexData {
    pub property: Property,
    pub space: ObjectSpace,
    pub graph: Graph,
}

impl IndexData {
    /// Creates empty state for a validated property.
    pub fn new(property: Property) -> Self {
        let space = ObjectSpace::new(&property);
        let graph = Graph::new(property.edge_size_for_creation);
        Self {
            property,
            space,
            graph,
        }
    }

    fn stage(&mut self, vectors: &[impl AsRef<[f32]>]) -> Result<Vec<ObjectId>> {
        for v in vectors {
            self.space.check_dimension(v.as_ref())?;
        }
        let mut ids = Vec::with_capacity(vectors.len());
        for v in vectors {
            ids.push(self.space.put(v.as_ref())?);
        }
        self.graph.reserve_through(self.space.max_id());
        Ok(ids)
    }

    /// Graph search with explicit parameters.
    pub fn search(&self, query: &[f32], params: &SearchParams) -> Result<(Vec<Neighbor>, SearchStats)> {
        let prepared = self.space.prepare_query(query)?;
        let scorer = self.space.scorer(prepared);
        Ok(search::search(&self.space, &self.graph, &scorer, params))
    }

    /// Exhaustive search over every live object.
    pub fn linear_search(&self, query: &[f32], k: usize, radius: f32) -> Result<(Vec<Neighbor>, SearchStats)> {
        let prepared = self.space.prepare_query(query)?;
        let scorer = self.space.scorer(prepared);
        Ok(search::linear_search(&self.space, &scorer, k, radius))
    }
}

/// Handle to an approximate nearest-neighbor index.
///
/// Clones share the same state, including the backing path. `close` only
/// releases this handle.
#[derive(Debug, Clone)]
pub struct Index {
    data: Arc<RwLock<IndexData>>,
    /// Directory last created at, opened from, or saved to.
    path: Arc<RwLock<Option<PathBuf>>>,
}

impl Index {
    /// Creates an empty in-memory index.
    pub fn create(property: Property) -> Result<Self> {
        property.validate()?;
        tracing::info!(
            dimension = property.dimension,
            distance = %property.distance,
            object_type = %property.object_type,
            "Created in-memory index"
        );
        Ok(Self {
            data: Arc::new(RwLock::new(IndexData::new(property))),
            path: Arc::new(RwLock::new(None)),
        })
    }

    /// Creates an empty index backed by `path` and persists it immediately.
    pub fn create_at(property: Property, path: impl AsRef<Path>) -> Result<Self> {
        property.validate()?;
        let path = path.as_ref().to_path_buf();
        let data = IndexData::new(property);
        persistence::save_index(&data, &path)?;
        tracing::info!("Created index at {:?}", path);
        Ok(Self {
            data: Arc::new(RwLock::new(data)),
            path: Arc::new(RwLock::new(Some(path))),
        })
    }

    /// Opens a persisted index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = persistence::load_index(&path)?;
        Ok(Self {
            data: Arc::new(RwLock::new(data)),
            path: Arc::new(RwLock::new(Some(path))),
        })
    }

    /// Directory this index was created at, opened from, or last saved to.
    pub fn path(&self) -> Option<PathBuf> {
        self.path.read().clone()
    }

    pub fn property(&self) -> Property {
        self.data.read().property.clone()
    }

    pub fn dimension(&self) -> usize {
        self.data.read().property.dimension
    }

    /// Stores and links one vector.
    pub fn insert(&self, vector: &[f32]) -> Result<ObjectId> {
        let mut data = self.data.write();
        let id = data.space.put(vector)?;
        let IndexData { space, graph, .. } = &mut *data;
        graph.insert(space, id);
        Ok(id)
    }

    /// Stores and links many vectors; ids are contiguous and in input order.
    ///
    /// All dimensions are checked before anything is stored. Neighbor search runs
    /// on `num_workers` threads. Entry points are re-selected afterwards.
    pub fn batch_insert<V: AsRef<[f32]>>(&self, vectors: &[V], num_workers: usize) -> Result<Vec<ObjectId>> {
        if vectors.is_empty() {
            return Ok(Vec::new());
        }
        let mut data = self.data.write();
        let ids = data.stage(vectors)?;
        let IndexData { space, graph, .. } = &mut *data;
        graph.link_batch(space, &ids, num_workers)?;
        graph.refresh_entry_points(space);
        tracing::debug!(count = ids.len(), "Batch inserted objects");
        Ok(ids)
    }

    /// Stores one vector without linking it. Unreachable by graph search until `build`.
    pub fn append(&self, vector: &[f32]) -> Result<ObjectId> {
        let mut data = self.data.write();
        let ids = data.stage(&[vector])?;
        Ok(ids[0])
    }

    /// Stores many vectors without linking them.
    pub fn batch_append<V: AsRef<[f32]>>(&self, vectors: &[V]) -> Result<Vec<ObjectId>> {
        if vectors.is_empty() {
            return Ok(Vec::new());
        }
        self.data.write().stage(vectors)
    }

    /// Links every appended object and re-selects the entry points.
    pub fn build(&self, num_workers: usize) -> Result<()> {
        let mut data = self.data.write();
        let IndexData { space, graph, .. } = &mut *data;
        let linked = graph.build(space, num_workers)?;
        tracing::info!(
            linked,
            workers = num_workers,
            entry_points = graph.entry_points().len(),
            "Built index"
        );
        Ok(())
    }

    /// Tombstones a live object.
    pub fn remove(&self, id: ObjectId) -> Result<()> {
        let mut data = self.data.write();
        let IndexData { space, graph, .. } = &mut *data;
        space.remove(id)?;
        let was_entry = graph.entry_points().contains(&id);
        graph.on_remove(space, id);
        if was_entry {
            tracing::debug!(id, entry_points = ?graph.entry_points(), "Replaced removed entry point");
        }
        Ok(())
    }

    /// Returns up to `k` live objects nearest to `query`, ascending by distance then id.
    ///
    /// `radius < 0` disables the distance cutoff.
    pub fn search(&self, query: &[f32], k: usize, epsilon: f32, radius: f32) -> Result<Vec<Neighbor>> {
        let data = self.data.read();
        let params = SearchParams::new(k, epsilon, radius)
            .with_edge_size(data.property.edge_size_for_search);
        Ok(data.search(query, &params)?.0)
    }

    /// Search with explicit parameters, also reporting the work done.
    pub fn search_with(&self, query: &[f32], params: &SearchParams) -> Result<(Vec<Neighbor>, SearchStats)> {
        self.data.read().search(query, params)
    }

    /// Search tuned for a target recall using the optimizer's coefficients.
    ///
    /// Without coefficients, falls back to the default epsilon and the property's
    /// edge size for search.
    pub fn search_by_accuracy(&self, query: &[f32], k: usize, accuracy: f32) -> Result<Vec<Neighbor>> {
        let data = self.data.read();
        let (edge_size, epsilon) = match &data.property.search_coefficients {
            Some(c) => c.parameters_for(accuracy),
            None => (data.property.edge_size_for_search, DEFAULT_SEARCH_EPSILON),
        };
        let params = SearchParams::new(k, epsilon, -1.0).with_edge_size(edge_size);
        Ok(data.search(query, &params)?.0)
    }

    /// Exhaustive search, including appended but unbuilt objects.
    pub fn linear_search(&self, query: &[f32], k: usize, radius: f32) -> Result<Vec<Neighbor>> {
        Ok(self.data.read().linear_search(query, k, radius)?.0)
    }

    /// Decoded stored vector (after encoding loss).
    pub fn get_object(&self, id: ObjectId) -> Result<Vec<f32>> {
        self.data.read().space.get(id)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.data.read().space.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn removed_count(&self) -> usize {
        self.data.read().space.removed_count()
    }

    /// Number of appended objects not yet linked by `build`.
    pub fn pending_count(&self) -> usize {
        let data = self.data.read();
        data.graph.unlinked(&data.space).len()
    }

    /// Persists the index into `path`, which becomes its backing path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut backing = self.path.write();
        let data = self.data.read();
        persistence::save_index(&data, path)?;
        *backing = Some(path.to_path_buf());
        Ok(())
    }

    /// Releases this handle.
    pub fn close(self) {
        tracing::debug!(path = ?self.path(), "Closed index handle");
    }
}
