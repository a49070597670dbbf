//! # graphann-core
//!
//! Embeddable approximate nearest neighbor index built on a bounded k-nearest-neighbor
//! graph, with typed vector storage, a family of distance metrics, directory-based
//! persistence, and an offline optimizer that tunes search parameters for a target
//! recall band.
//!
//! This is the core library crate with zero async dependencies, suitable for
//! embedding directly in Rust or behind other language bindings.
//!
//! ```no_run
//! use graphann_core::{Index, Property};
//!
//! let index = Index::create(Property::new(3))?;
//! index.insert(&[1.0, 2.0, 3.0])?;
//! let results = index.search(&[1.0, 2.0, 3.0], 1, 0.1, -1.0)?;
//! assert_eq!(results[0].id, 1);
//! # Ok::<(), graphann_core::IndexError>(())
//! ```

/// Global configuration constants: limits, defaults, and on-disk names.
pub mod config;
/// Error type shared by every fallible operation.
pub mod error;
/// Neighbor graph: arena, search, construction, and distance metrics.
pub mod graph;
/// Index aggregate root and its concurrency discipline.
pub mod index;
/// Offline optimizer: graph reconstruction and search-coefficient tuning.
pub mod optimizer;
/// Per-index metadata: dimension, edge sizes, object type, distance.
pub mod property;
/// Typed vector storage with tombstones.
pub mod space;
/// Directory-based persistence.
pub mod storage;

pub use error::{IndexError, Result};
pub use graph::{DistanceMetric, Neighbor, SearchParams, SearchStats};
pub use index::Index;
pub use optimizer::{OptimizationReport, Optimizer, OptimizerConfig};
pub use property::{ObjectType, Property, SearchCoefficients};
pub use space::ObjectId;
