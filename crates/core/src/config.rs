//! Global configuration constants for graphann.
//!
//! All tuning defaults, input validation limits, and on-disk names are defined here.
//! These are compile-time constants; per-index runtime configuration lives in
//! [`Property`](crate::property::Property) and per-run optimizer settings in
//! [`OptimizerConfig`](crate::optimizer::OptimizerConfig).

/// Default maximum neighbor-list length used while building the graph.
///
/// Every node keeps at most this many edges. Higher values improve recall but
/// increase memory and insertion time.
pub const DEFAULT_EDGE_SIZE_FOR_CREATION: usize = 10;

/// Default number of edges followed per node during search (0 = all edges).
pub const DEFAULT_EDGE_SIZE_FOR_SEARCH: usize = 40;

/// Exploration coefficient used when searching for the neighbors of a new node.
///
/// The insertion search runs with `epsilon = INSERTION_EXPLORATION_COEFFICIENT - 1`.
pub const INSERTION_EXPLORATION_COEFFICIENT: f32 = 1.1;

/// Default relative slack for query-time search.
pub const DEFAULT_SEARCH_EPSILON: f32 = 0.1;

/// Smallest result pool graph search explores with.
///
/// Queries with a smaller `k` still explore this many results and are truncated
/// afterwards, so `k = 1` does not degrade into a greedy walk.
pub const MIN_SEARCH_POOL: usize = 16;

/// Default number of results returned when a caller does not specify `k`.
pub const DEFAULT_RESULT_SIZE: usize = 20;

/// Maximum allowed vector dimension.
pub const MAX_DIMENSION: usize = 65_536;

/// Maximum neighbor-list bound accepted in a property.
pub const MAX_EDGE_SIZE: usize = 4_096;

/// Number of entry points chosen by `build`.
pub const ENTRY_POINT_COUNT: usize = 8;

/// Number of pending objects linked per batch step.
///
/// Neighbor searches inside one chunk run in parallel against the graph as it was
/// before the chunk; members of the same chunk are matched against each other exactly.
pub const LINK_CHUNK_SIZE: usize = 64;

/// Version written to `property.json`. Bumped on incompatible layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// File holding the serialized [`Property`](crate::property::Property).
pub const PROPERTY_FILE: &str = "property.json";

/// File holding the serialized object space.
pub const OBJECTS_FILE: &str = "objects.bin";

/// File holding the serialized graph.
pub const GRAPH_FILE: &str = "graph.bin";

/// Footer magic for the object file (precedes the CRC32).
pub const OBJECTS_MAGIC: &[u8; 4] = b"GOB1";

/// Footer magic for the graph file (precedes the CRC32).
pub const GRAPH_MAGIC: &[u8; 4] = b"GGR1";

/// Candidate epsilons evaluated by the optimizer, cheapest first.
pub const OPTIMIZER_EPSILONS: &[f32] = &[0.0, 0.02, 0.05, 0.1, 0.15, 0.2, 0.3, 0.5, 0.8, 1.2];

/// Candidate edge sizes for search evaluated by the optimizer (0 = all edges).
pub const OPTIMIZER_EDGE_SIZES: &[usize] = &[5, 10, 20, 40, 80, 0];
