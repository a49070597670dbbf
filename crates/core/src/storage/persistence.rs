//! Disk persistence for indexes.
//!
//! An index directory holds three files:
//!
//! - `property.json`: format version and [`Property`], human-readable;
//! - `objects.bin`: the bincode-encoded object space;
//! - `graph.bin`: the bincode-encoded graph.
//!
//! Each binary file carries a footer `[magic 4 bytes][CRC32 BE]`. All files are
//! written to temporaries first and renamed into place only after every write
//! succeeded, so a failed save leaves the previous state untouched.

use crate::config::{
    FORMAT_VERSION, GRAPH_FILE, GRAPH_MAGIC, OBJECTS_FILE, OBJECTS_MAGIC, PROPERTY_FILE,
};
use crate::error::{IndexError, Result};
use crate::graph::Graph;
use crate::index::IndexData;
use crate::property::Property;
use crate::space::ObjectSpace;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize)]
struct PropertyFile {
    version: u32,
    property: Property,
}

/// Appends `[magic][CRC32 BE]` to a bincode payload.
fn seal(payload: Vec<u8>, magic: &[u8; 4]) -> Vec<u8> {
    let crc = crc32fast::hash(&payload);
    let mut output = payload;
    output.reserve(8);
    output.extend_from_slice(magic);
    output.extend_from_slice(&crc.to_be_bytes());
    output
}

/// Verifies the footer and returns the payload.
fn unseal<'a>(raw: &'a [u8], magic: &[u8; 4], path: &Path) -> Result<&'a [u8]> {
    if raw.len() < 8 || &raw[raw.len() - 8..raw.len() - 4] != magic {
        return Err(IndexError::CorruptFormat(format!(
            "{path:?} is missing its checksum footer"
        )));
    }
    let payload = &raw[..raw.len() - 8];
    let stored_crc = u32::from_be_bytes([
        raw[raw.len() - 4],
        raw[raw.len() - 3],
        raw[raw.len() - 2],
        raw[raw.len() - 1],
    ]);
    let computed_crc = crc32fast::hash(payload);
    if computed_crc != stored_crc {
        return Err(IndexError::CorruptFormat(format!(
            "CRC32 mismatch in {path:?}: expected {stored_crc:#010x}, got {computed_crc:#010x}"
        )));
    }
    tracing::debug!("CRC32 verified for {:?}: {:#010x}", path, stored_crc);
    Ok(payload)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes every `(path, bytes)` pair to a temporary, then renames all of them.
fn write_atomic(files: &[(PathBuf, Vec<u8>)]) -> Result<()> {
    let mut written = Vec::with_capacity(files.len());
    for (path, bytes) in files {
        let tmp = tmp_path(path);
        if let Err(e) = fs::write(&tmp, bytes) {
            for t in &written {
                let _ = fs::remove_file(t);
            }
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        written.push(tmp);
    }
    for ((path, _), tmp) in files.iter().zip(&written) {
        fs::rename(tmp, path)?;
    }
    Ok(())
}

fn encode_property(property: &Property) -> Result<Vec<u8>> {
    let file = PropertyFile {
        version: FORMAT_VERSION,
        property: property.clone(),
    };
    serde_json::to_vec_pretty(&file)
        .map_err(|e| IndexError::Internal(format!("failed to encode property: {e}")))
}

/// Saves the full index state into `dir`, creating it if needed.
pub fn save_index(data: &IndexData, dir: &Path) -> Result<()> {
    let objects = bincode::serialize(&data.space)
        .map_err(|e| IndexError::Internal(format!("failed to encode objects: {e}")))?;
    let graph = bincode::serialize(&data.graph)
        .map_err(|e| IndexError::Internal(format!("failed to encode graph: {e}")))?;
    let (objects_len, graph_len) = (objects.len(), graph.len());

    fs::create_dir_all(dir)?;
    write_atomic(&[
        (dir.join(OBJECTS_FILE), seal(objects, OBJECTS_MAGIC)),
        (dir.join(GRAPH_FILE), seal(graph, GRAPH_MAGIC)),
        (dir.join(PROPERTY_FILE), encode_property(&data.property)?),
    ])?;

    tracing::info!(
        "Saved index to {:?} ({} objects, {} + {} bytes)",
        dir,
        data.space.len(),
        objects_len,
        graph_len
    );
    Ok(())
}

/// Rewrites only the property file of an existing index directory.
pub fn save_property(property: &Property, dir: &Path) -> Result<()> {
    let path = dir.join(PROPERTY_FILE);
    if !path.is_file() {
        return Err(IndexError::NotFound(format!("no index at {dir:?}")));
    }
    write_atomic(&[(path, encode_property(property)?)])
}

/// Reads and validates `property.json` of an index directory.
pub fn load_property(dir: &Path) -> Result<Property> {
    let path = dir.join(PROPERTY_FILE);
    if !dir.is_dir() || !path.is_file() {
        return Err(IndexError::NotFound(format!("no index at {dir:?}")));
    }
    let raw = fs::read(&path)?;
    let file: PropertyFile = serde_json::from_slice(&raw)
        .map_err(|e| IndexError::CorruptFormat(format!("{path:?}: {e}")))?;
    if file.version != FORMAT_VERSION {
        return Err(IndexError::CorruptFormat(format!(
            "{path:?}: unsupported format version {} (expected {FORMAT_VERSION})",
            file.version
        )));
    }
    file.property
        .validate()
        .map_err(|e| IndexError::CorruptFormat(format!("{path:?}: {e}")))?;
    Ok(file.property)
}

fn read_sealed(path: &Path, magic: &[u8; 4]) -> Result<Vec<u8>> {
    let raw = fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            IndexError::CorruptFormat(format!("{path:?} is missing"))
        }
        _ => IndexError::Io(e),
    })?;
    Ok(unseal(&raw, magic, path)?.to_vec())
}

/// Loads and validates a full index from `dir`.
pub fn load_index(dir: &Path) -> Result<IndexData> {
    let property = load_property(dir)?;

    let objects_path = dir.join(OBJECTS_FILE);
    let payload = read_sealed(&objects_path, OBJECTS_MAGIC)?;
    let space: ObjectSpace = bincode::deserialize(&payload)
        .map_err(|e| IndexError::CorruptFormat(format!("{objects_path:?}: {e}")))?;
    space.validate(&property).map_err(|e| {
        IndexError::CorruptFormat(format!("object validation failed: {e}"))
    })?;

    let graph_path = dir.join(GRAPH_FILE);
    let payload = read_sealed(&graph_path, GRAPH_MAGIC)?;
    let graph: Graph = bincode::deserialize(&payload)
        .map_err(|e| IndexError::CorruptFormat(format!("{graph_path:?}: {e}")))?;
    graph
        .validate(&space)
        .map_err(|e| IndexError::CorruptFormat(format!("graph validation failed: {e}")))?;

    tracing::info!(
        "Loaded index from {:?} ({} objects, {} removed)",
        dir,
        space.len(),
        space.removed_count()
    );
    Ok(IndexData {
        property,
        space,
        graph,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexData {
        let property = Property::new(2).with_edge_size_for_creation(4);
        let mut space = ObjectSpace::new(&property);
        let mut graph = Graph::new(property.edge_size_for_creation);
        for i in 0..10 {
            let id = space.put(&[i as f32, 1.0]).unwrap();
            graph.insert(&space, id);
        }
        IndexData {
            property,
            space,
            graph,
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample();
        save_index(&data, dir.path()).unwrap();
        let loaded = load_index(dir.path()).unwrap();
        assert_eq!(loaded.property, data.property);
        assert_eq!(loaded.space.len(), 10);
        assert_eq!(loaded.graph.neighbors(3), data.graph.neighbors(3));
        assert!(!dir.path().join("graph.bin.tmp").exists());
    }

    #[test]
    fn test_flipped_byte_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        save_index(&sample(), dir.path()).unwrap();
        let path = dir.path().join(GRAPH_FILE);
        let mut raw = fs::read(&path).unwrap();
        raw[0] ^= 0xFF;
        fs::write(&path, &raw).unwrap();
        assert!(matches!(
            load_index(dir.path()),
            Err(IndexError::CorruptFormat(_))
        ));
    }

    #[test]
    fn test_missing_footer_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        save_index(&sample(), dir.path()).unwrap();
        let path = dir.path().join(OBJECTS_FILE);
        let raw = fs::read(&path).unwrap();
        fs::write(&path, &raw[..raw.len() - 8]).unwrap();
        assert!(matches!(
            load_index(dir.path()),
            Err(IndexError::CorruptFormat(_))
        ));
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            load_index(&missing),
            Err(IndexError::NotFound(_))
        ));
    }

    #[test]
    fn test_bad_version_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        save_index(&sample(), dir.path()).unwrap();
        let path = dir.path().join(PROPERTY_FILE);
        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.replace("\"version\": 1", "\"version\": 99")).unwrap();
        assert!(matches!(
            load_property(dir.path()),
            Err(IndexError::CorruptFormat(_))
        ));
    }

    #[test]
    fn test_save_property_requires_existing_index() {
        let dir = tempfile::tempdir().unwrap();
        let p = Property::new(3);
        assert!(matches!(
            save_property(&p, dir.path()),
            Err(IndexError::NotFound(_))
        ));
    }
}
