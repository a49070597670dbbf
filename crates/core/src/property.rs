//! Immutable per-index metadata.
//!
//! A [`Property`] fixes the dimension, edge sizes, element encoding, and distance
//! metric of an index. It is validated once at creation and every later operation
//! is checked against it.

use crate::config;
use crate::error::{IndexError, Result};
use crate::graph::distance::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element encoding used by the object space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    /// 32-bit floats, stored as given.
    Float,
    /// IEEE half precision, round-to-nearest.
    Float16,
    /// Unsigned 8-bit integers, clamp-and-round.
    Integer,
}

impl ObjectType {
    /// Stable integer code used by bindings.
    pub fn code(self) -> i32 {
        match self {
            ObjectType::Float => 1,
            ObjectType::Float16 => 2,
            ObjectType::Integer => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Float => "float",
            ObjectType::Float16 => "float16",
            ObjectType::Integer => "integer",
        }
    }
}

impl TryFrom<i32> for ObjectType {
    type Error = IndexError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            1 => Ok(ObjectType::Float),
            2 => Ok(ObjectType::Float16),
            3 => Ok(ObjectType::Integer),
            other => Err(IndexError::InvalidProperty(format!(
                "unknown object type code {other}"
            ))),
        }
    }
}

impl FromStr for ObjectType {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "float" | "f" | "float32" => Ok(ObjectType::Float),
            "float16" | "h" | "half" => Ok(ObjectType::Float16),
            "integer" | "c" | "uint8" => Ok(ObjectType::Integer),
            other => Err(IndexError::InvalidProperty(format!(
                "unknown object type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One end of the accuracy/cost curve chosen by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoefficientAnchor {
    /// Measured recall at this setting.
    pub accuracy: f32,
    /// Edge size for search (0 = all edges).
    pub edge_size: usize,
    pub epsilon: f32,
}

/// Search-cost model written by `adjust_search_coefficients`.
///
/// Maps a requested accuracy to search parameters by interpolating between a
/// cheap low-accuracy anchor and an expensive high-accuracy anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchCoefficients {
    pub low: CoefficientAnchor,
    pub high: CoefficientAnchor,
}

impl SearchCoefficients {
    /// Returns `(edge_size, epsilon)` for the requested accuracy.
    ///
    /// Accuracies outside `[low.accuracy, high.accuracy]` clamp to the nearest anchor.
    pub fn parameters_for(&self, accuracy: f32) -> (usize, f32) {
        let (low, high) = (self.low, self.high);
        if !accuracy.is_finite() || accuracy <= low.accuracy {
            return (low.edge_size, low.epsilon);
        }
        if accuracy >= high.accuracy || high.accuracy <= low.accuracy {
            return (high.edge_size, high.epsilon);
        }
        let t = (accuracy - low.accuracy) / (high.accuracy - low.accuracy);
        let epsilon = low.epsilon + t * (high.epsilon - low.epsilon);
        // 0 means "all edges", which is the most expensive setting
        let edge_size = match (low.edge_size, high.edge_size) {
            (0, _) | (_, 0) => 0,
            (l, h) => (l as f32 + t * (h as f32 - l as f32)).round() as usize,
        };
        (edge_size, epsilon)
    }
}

/// Index metadata, set once at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Length of every stored vector and query.
    pub dimension: usize,
    /// Upper bound on each node's neighbor list.
    pub edge_size_for_creation: usize,
    /// Edges followed per node at search time (0 = all).
    pub edge_size_for_search: usize,
    pub object_type: ObjectType,
    pub distance: DistanceMetric,
    /// Present once the optimizer has tuned this index.
    #[serde(default)]
    pub search_coefficients: Option<SearchCoefficients>,
}

impl Property {
    /// Creates a property with the default edge sizes, float encoding, and L2 distance.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            edge_size_for_creation: config::DEFAULT_EDGE_SIZE_FOR_CREATION,
            edge_size_for_search: config::DEFAULT_EDGE_SIZE_FOR_SEARCH,
            object_type: ObjectType::Float,
            distance: DistanceMetric::L2,
            search_coefficients: None,
        }
    }

    pub fn with_edge_size_for_creation(mut self, edge_size: usize) -> Self {
        self.edge_size_for_creation = edge_size;
        self
    }

    pub fn with_edge_size_for_search(mut self, edge_size: usize) -> Self {
        self.edge_size_for_search = edge_size;
        self
    }

    pub fn with_object_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = object_type;
        self
    }

    pub fn with_distance(mut self, distance: DistanceMetric) -> Self {
        self.distance = distance;
        self
    }

    /// Checks every field against the configured limits.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 || self.dimension > config::MAX_DIMENSION {
            return Err(IndexError::InvalidProperty(format!(
                "dimension must be in 1..={}, got {}",
                config::MAX_DIMENSION,
                self.dimension
            )));
        }
        if self.edge_size_for_creation == 0 || self.edge_size_for_creation > config::MAX_EDGE_SIZE
        {
            return Err(IndexError::InvalidProperty(format!(
                "edge_size_for_creation must be in 1..={}, got {}",
                config::MAX_EDGE_SIZE,
                self.edge_size_for_creation
            )));
        }
        if self.edge_size_for_search > config::MAX_EDGE_SIZE {
            return Err(IndexError::InvalidProperty(format!(
                "edge_size_for_search must be at most {}, got {}",
                config::MAX_EDGE_SIZE,
                self.edge_size_for_search
            )));
        }
        if self.distance == DistanceMetric::Lorentz && self.dimension < 2 {
            return Err(IndexError::InvalidProperty(
                "lorentz distance needs at least 2 dimensions".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = Property::new(4);
        assert_eq!(p.edge_size_for_creation, 10);
        assert_eq!(p.edge_size_for_search, 40);
        assert_eq!(p.object_type, ObjectType::Float);
        assert_eq!(p.distance, DistanceMetric::L2);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_dimension() {
        let err = Property::new(0).validate().unwrap_err();
        assert!(matches!(err, IndexError::InvalidProperty(_)));
    }

    #[test]
    fn test_validate_rejects_zero_creation_edges() {
        let p = Property::new(3).with_edge_size_for_creation(0);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_lorentz_needs_two_dimensions() {
        let p = Property::new(1).with_distance(DistanceMetric::Lorentz);
        assert!(p.validate().is_err());
        let p = Property::new(2).with_distance(DistanceMetric::Lorentz);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_object_type_codes() {
        for t in [ObjectType::Float, ObjectType::Float16, ObjectType::Integer] {
            assert_eq!(ObjectType::try_from(t.code()).unwrap(), t);
            assert_eq!(t.name().parse::<ObjectType>().unwrap(), t);
        }
        assert!(ObjectType::try_from(0).is_err());
        assert!("double".parse::<ObjectType>().is_err());
    }

    #[test]
    fn test_coefficients_interpolate_and_clamp() {
        let c = SearchCoefficients {
            low: CoefficientAnchor {
                accuracy: 0.4,
                edge_size: 10,
                epsilon: 0.0,
            },
            high: CoefficientAnchor {
                accuracy: 0.8,
                edge_size: 30,
                epsilon: 0.2,
            },
        };
        assert_eq!(c.parameters_for(0.1), (10, 0.0));
        assert_eq!(c.parameters_for(0.95), (30, 0.2));
        let (edges, eps) = c.parameters_for(0.6);
        assert_eq!(edges, 20);
        assert!((eps - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_property_json_round_trip() {
        let p = Property::new(8)
            .with_object_type(ObjectType::Float16)
            .with_distance(DistanceMetric::Cosine);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"float16\""));
        let back: Property = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
