//! Storage layer: directory-based persistence of an index.
//!
//! An index directory holds a JSON property file plus checksummed bincode files
//! for the object space and the graph, each replaced atomically on save.

/// Disk persistence: save/load with atomic writes and CRC32 footers.
pub mod persistence;

pub use persistence::{load_index, load_property, save_index, save_property};
