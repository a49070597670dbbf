//! Typed vector storage keyed by dense object ids.
//!
//! Ids start at 1 and grow monotonically; removal only sets a tombstone, so an id is
//! never reused while the index is open. Vectors are encoded into a single contiguous
//! [`Arena`] (slot `id - 1`), mirroring the struct-of-arrays layout of the graph.

/// Element encodings: float32, float16, and clamped uint8.
pub mod encoding;

use crate::error::{IndexError, Result};
use crate::graph::distance::{DistanceMetric, Kernel};
use crate::property::Property;
use encoding::{Arena, Element};
use serde::{Deserialize, Serialize};

/// Object id. 0 is never assigned.
pub type ObjectId = u32;

/// Distance from one fixed query to any stored object.
///
/// Built once per query; the metric kernel and element encoding are resolved at
/// construction, so [`distance`](Scorer::distance) is a single indirect call.
pub struct Scorer<'a> {
    score: Box<dyn Fn(ObjectId) -> f32 + Send + Sync + 'a>,
}

impl Scorer<'_> {
    #[inline]
    pub fn distance(&self, id: ObjectId) -> f32 {
        (self.score)(id)
    }
}

fn bind<'a, T: Element>(
    data: &'a [T],
    dimension: usize,
    kernel: Kernel<T>,
    query: Vec<f32>,
) -> Box<dyn Fn(ObjectId) -> f32 + Send + Sync + 'a> {
    Box::new(move |id: ObjectId| {
        let start = (id as usize - 1) * dimension;
        kernel(&query, &data[start..start + dimension])
    })
}

/// Scales finite components to unit length. Zero vectors are returned unchanged.
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm_sq: f64 = vector
        .iter()
        .filter(|x| x.is_finite())
        .map(|&x| (x as f64) * (x as f64))
        .sum();
    if norm_sq == 0.0 || !norm_sq.is_finite() {
        return vector.to_vec();
    }
    let inv = 1.0 / norm_sq.sqrt();
    vector
        .iter()
        .map(|&x| if x.is_finite() { (x as f64 * inv) as f32 } else { x })
        .collect()
}

/// Mapping id → encoded vector + tombstone flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSpace {
    dimension: usize,
    metric: DistanceMetric,
    arena: Arena,
    /// Tombstones, indexed by slot (`id - 1`).
    removed: Vec<bool>,
}

impl ObjectSpace {
    /// Creates an empty space for the given property.
    pub fn new(property: &Property) -> Self {
        Self {
            dimension: property.dimension,
            metric: property.distance,
            arena: Arena::new(property.object_type),
            removed: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Number of ids ever assigned (live + removed).
    pub fn len(&self) -> usize {
        self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.removed.iter().filter(|&&r| !r).count()
    }

    /// Number of tombstoned objects.
    pub fn removed_count(&self) -> usize {
        self.removed.iter().filter(|&&r| r).count()
    }

    /// Largest id assigned so far (0 when empty).
    pub fn max_id(&self) -> ObjectId {
        self.removed.len() as ObjectId
    }

    /// Returns `true` if `id` was assigned at some point.
    #[inline]
    pub fn exists(&self, id: ObjectId) -> bool {
        id >= 1 && (id as usize) <= self.removed.len()
    }

    /// Returns `true` if `id` exists and is not tombstoned.
    #[inline]
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.exists(id) && !self.removed[id as usize - 1]
    }

    /// Iterates live ids in ascending order.
    pub fn live_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.removed
            .iter()
            .enumerate()
            .filter(|(_, &r)| !r)
            .map(|(slot, _)| slot as ObjectId + 1)
    }

    /// Fails with `InvalidDimension` unless `vector.len() == dimension`.
    pub fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(IndexError::dimension(self.dimension, vector.len()));
        }
        Ok(())
    }

    /// Stores a vector and returns its new id.
    pub fn put(&mut self, vector: &[f32]) -> Result<ObjectId> {
        self.check_dimension(vector)?;
        if self.removed.len() >= ObjectId::MAX as usize {
            return Err(IndexError::Internal("object id space exhausted".to_string()));
        }
        if self.metric.normalizes() {
            self.arena.push(&normalize(vector));
        } else {
            self.arena.push(vector);
        }
        self.removed.push(false);
        Ok(self.max_id())
    }

    /// Returns the decoded vector of a live object.
    pub fn get(&self, id: ObjectId) -> Result<Vec<f32>> {
        if !self.is_live(id) {
            return Err(IndexError::missing_object(id));
        }
        Ok(self.decode(id))
    }

    /// Decodes any assigned object, live or removed. Caller checks `exists`.
    pub(crate) fn decode(&self, id: ObjectId) -> Vec<f32> {
        self.arena
            .decode((id as usize - 1) * self.dimension, self.dimension)
    }

    /// Tombstones a live object.
    pub fn remove(&mut self, id: ObjectId) -> Result<()> {
        if !self.is_live(id) {
            return Err(IndexError::missing_object(id));
        }
        self.removed[id as usize - 1] = true;
        Ok(())
    }

    /// Validates the query dimension and applies write-time normalization.
    pub fn prepare_query(&self, query: &[f32]) -> Result<Vec<f32>> {
        self.check_dimension(query)?;
        if self.metric.normalizes() {
            Ok(normalize(query))
        } else {
            Ok(query.to_vec())
        }
    }

    /// Builds a scorer for an already prepared query.
    pub fn scorer(&self, prepared: Vec<f32>) -> Scorer<'_> {
        let dim = self.dimension;
        let score = match &self.arena {
            Arena::Float(data) => bind(data, dim, self.metric.kernel::<f32>(), prepared),
            Arena::Float16(data) => bind(data, dim, self.metric.kernel::<half::f16>(), prepared),
            Arena::Integer(data) => bind(data, dim, self.metric.kernel::<u8>(), prepared),
        };
        Scorer { score }
    }

    /// Builds a scorer measuring distances from a stored object.
    pub fn scorer_for(&self, id: ObjectId) -> Scorer<'_> {
        self.scorer(self.decode(id))
    }

    /// Checks internal consistency after deserialization.
    pub fn validate(&self, property: &Property) -> std::result::Result<(), String> {
        if self.dimension != property.dimension {
            return Err(format!(
                "object dimension {} != property dimension {}",
                self.dimension, property.dimension
            ));
        }
        if self.metric != property.distance {
            return Err(format!(
                "object metric {} != property metric {}",
                self.metric, property.distance
            ));
        }
        if self.arena.object_type() != property.object_type {
            return Err(format!(
                "object encoding {} != property encoding {}",
                self.arena.object_type(),
                property.object_type
            ));
        }
        if self.arena.components() != self.removed.len() * self.dimension {
            return Err(format!(
                "arena length {} != count({}) * dimension({})",
                self.arena.components(),
                self.removed.len(),
                self.dimension
            ));
        }
        Ok(())
    }
}
