//! Binary map files.
//!
//! # File Format
//!
//! Little-endian throughout:
//!
//! ```text
//! node_count:i32
//!   uid:i32 checkpoint:u8 timestamp:i64 label_len:i32 label:[u8] pdf0:f64 pdf1:f64
//! edge_count:i32
//!   blob_len:u32 evidence:[u8] reverse:u8 motion_type:i32 start_id:i32 end_id:i32
//! ```
//!
//! A missing label is written with `label_len = 0`. Open edge endpoints are
//! written as `-1`. The evidence blob is opaque to the graph.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::features::Evidence;

use super::node::Node;
use super::place_graph::PlaceGraph;
use super::types::{MotionType, NodeId};

/// Labels longer than this are rejected as corrupt.
const MAX_LABEL_LEN: i32 = 1 << 16;

/// Evidence blobs longer than this are rejected as corrupt.
const MAX_BLOB_LEN: u32 = 1 << 30;

impl PlaceGraph {
    /// Save the graph atomically.
    ///
    /// The map is written to a temporary file next to `path` and renamed
    /// over it, so a failed save leaves the previous file untouched.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            self.write_to(&mut writer)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::info!(
            path = %path.display(),
            nodes = self.node_count(),
            edges = self.edge_count(),
            "saved map"
        );
        Ok(())
    }

    /// Load a graph saved with [`PlaceGraph::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let graph = Self::read_from(&mut reader)?;
        tracing::info!(
            path = %path.display(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "loaded map"
        );
        Ok(graph)
    }

    /// Serialize into any writer.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&count_to_i32(self.node_count())?.to_le_bytes())?;
        for node in self.nodes() {
            w.write_all(&id_to_i32(Some(node.id))?.to_le_bytes())?;
            w.write_all(&[node.checkpoint as u8])?;
            w.write_all(&node.timestamp.to_le_bytes())?;
            let label = node.label.as_deref().unwrap_or("").as_bytes();
            w.write_all(&count_to_i32(label.len())?.to_le_bytes())?;
            w.write_all(label)?;
            w.write_all(&node.pdf0.to_le_bytes())?;
            w.write_all(&node.pdf1.to_le_bytes())?;
        }

        w.write_all(&count_to_i32(self.edge_count())?.to_le_bytes())?;
        for edge in self.edges() {
            let blob = edge.evidence.to_blob()?;
            let blob_len = u32::try_from(blob.len())
                .map_err(|_| Error::MalformedInput("evidence blob too large".to_string()))?;
            w.write_all(&blob_len.to_le_bytes())?;
            w.write_all(&blob)?;
            w.write_all(&[edge.reverse as u8])?;
            w.write_all(&edge.motion.to_i32().to_le_bytes())?;
            w.write_all(&id_to_i32(edge.start)?.to_le_bytes())?;
            w.write_all(&id_to_i32(edge.end)?.to_le_bytes())?;
        }
        Ok(())
    }

    /// Deserialize from any reader.
    ///
    /// Edges referencing unknown places are dropped with a warning; the rest
    /// of the map still loads.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut graph = PlaceGraph::new();

        let node_count = read_count(r, "node")?;
        for _ in 0..node_count {
            let uid = read_i32(r)?;
            let id = match i32_to_id(uid) {
                Some(id) => id,
                None => {
                    return Err(Error::MalformedInput(format!("invalid node id {}", uid)));
                }
            };
            let checkpoint = read_u8(r)? != 0;
            let timestamp = read_i64(r)?;
            let label_len = read_i32(r)?;
            if !(0..=MAX_LABEL_LEN).contains(&label_len) {
                return Err(Error::MalformedInput(format!(
                    "invalid label length {}",
                    label_len
                )));
            }
            let mut label = vec![0u8; label_len as usize];
            r.read_exact(&mut label).map_err(truncated)?;
            let label = String::from_utf8(label)
                .map_err(|_| Error::MalformedInput(format!("label of {} is not UTF-8", id)))?;

            let mut node = Node::new(id, timestamp, checkpoint);
            node.label = (!label.is_empty()).then_some(label);
            node.pdf0 = read_f64(r)?;
            node.pdf1 = read_f64(r)?;
            graph.insert_node(node)?;
        }

        let edge_count = read_count(r, "edge")?;
        let mut dropped = 0;
        for _ in 0..edge_count {
            let blob_len = u32::from_le_bytes(read_array(r)?);
            if blob_len > MAX_BLOB_LEN {
                return Err(Error::MalformedInput(format!(
                    "invalid evidence length {}",
                    blob_len
                )));
            }
            let mut blob = vec![0u8; blob_len as usize];
            r.read_exact(&mut blob).map_err(truncated)?;
            let evidence = Evidence::from_blob(&blob)?;
            let reverse = read_u8(r)? != 0;
            let motion = MotionType::from_i32(read_i32(r)?);
            let start = read_i32(r)?;
            let end = read_i32(r)?;

            let endpoints = resolve(&graph, start).zip(resolve(&graph, end));
            let Some((start, end)) = endpoints else {
                let err = Error::GraphInconsistency(format!(
                    "edge {} -> {} references a missing place",
                    start, end
                ));
                tracing::warn!("{}, dropping edge", err);
                dropped += 1;
                continue;
            };
            graph.add_edge(start, end, motion, reverse, evidence)?;
        }
        if dropped > 0 {
            tracing::warn!(dropped, "dropped inconsistent edges while loading map");
        }
        Ok(graph)
    }
}

/// `Some(endpoint)` when the wire id is -1 or a known place, `None` otherwise.
fn resolve(graph: &PlaceGraph, raw: i32) -> Option<Option<NodeId>> {
    if raw == -1 {
        return Some(None);
    }
    let id = i32_to_id(raw)?;
    graph.contains_node(id).then_some(Some(id))
}

fn i32_to_id(raw: i32) -> Option<NodeId> {
    u32::try_from(raw).ok().map(NodeId::new)
}

fn id_to_i32(id: Option<NodeId>) -> Result<i32> {
    match id {
        None => Ok(-1),
        Some(id) => i32::try_from(id.0)
            .map_err(|_| Error::MalformedInput(format!("{} does not fit the map format", id))),
    }
}

fn count_to_i32(n: usize) -> Result<i32> {
    i32::try_from(n).map_err(|_| Error::MalformedInput(format!("count {} too large", n)))
}

fn truncated(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::MalformedInput("map file is truncated".to_string())
    } else {
        Error::Io(e)
    }
}

fn read_array<const N: usize, R: Read>(r: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(truncated)?;
    Ok(buf)
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    Ok(read_array::<1, _>(r)?[0])
}

fn read_i32<R: Read>(r: &mut R) -> Result<i32> {
    Ok(i32::from_le_bytes(read_array(r)?))
}

fn read_i64<R: Read>(r: &mut R) -> Result<i64> {
    Ok(i64::from_le_bytes(read_array(r)?))
}

fn read_f64<R: Read>(r: &mut R) -> Result<f64> {
    Ok(f64::from_le_bytes(read_array(r)?))
}

fn read_count<R: Read>(r: &mut R, what: &str) -> Result<usize> {
    let n = read_i32(r)?;
    usize::try_from(n).map_err(|_| Error::MalformedInput(format!("negative {} count {}", what, n)))
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use super::*;
    use crate::features::FeatureSet;

    fn random_graph(n: usize, seed: u64) -> PlaceGraph {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut g = PlaceGraph::new();
        let ids: Vec<NodeId> = (0..n)
            .map(|i| g.add_node(i as i64 * 500_000, rng.gen_bool(0.1)))
            .collect();
        for &id in &ids {
            if rng.gen_bool(0.3) {
                g.node_mut(id).unwrap().label = Some(format!("place-{}", rng.gen_range(0..1000)));
            }
        }
        for _ in 0..n * 2 {
            let a = ids[rng.gen_range(0..n)];
            let b = if rng.gen_bool(0.1) {
                None
            } else {
                Some(ids[rng.gen_range(0..n)])
            };
            let features = FeatureSet::from_descriptors(2, &[vec![rng.r#gen(), rng.r#gen()]]).unwrap();
            g.add_edge(
                Some(a),
                b,
                MotionType::from_i32(rng.gen_range(0..5)),
                rng.gen_bool(0.5),
                Evidence::from_features(features),
            )
            .unwrap();
        }
        g
    }

    type Summary = (
        Vec<(NodeId, Option<String>, bool, i64)>,
        Vec<(Option<NodeId>, Option<NodeId>, MotionType, bool)>,
    );

    fn summary(g: &PlaceGraph) -> Summary {
        (
            g.nodes()
                .map(|n| (n.id, n.label.clone(), n.checkpoint, n.timestamp))
                .collect(),
            g.edges()
                .map(|e| (e.start, e.end, e.motion, e.reverse))
                .collect(),
        )
    }

    #[test]
    fn test_round_trip_sizes() {
        for (n, seed) in [(0usize, 1u64), (1, 2), (1000, 3)] {
            let g = random_graph(n, seed);
            let mut buf = Vec::new();
            g.write_to(&mut buf).unwrap();
            let loaded = PlaceGraph::read_from(&mut buf.as_slice()).unwrap();
            assert_eq!(summary(&loaded), summary(&g), "n = {}", n);
            let evidence: Vec<&Evidence> = g.edges().map(|e| &e.evidence).collect();
            let loaded_evidence: Vec<&Evidence> = loaded.edges().map(|e| &e.evidence).collect();
            assert_eq!(evidence, loaded_evidence);
        }
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.bin");
        let g = random_graph(20, 7);
        g.save(&path).unwrap();
        // overwrite in place
        g.save(&path).unwrap();
        let loaded = PlaceGraph::load(&path).unwrap();
        assert_eq!(summary(&loaded), summary(&g));
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("map.bin");
        let err = PlaceGraph::new().save(&path).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_truncated_input() {
        let g = random_graph(5, 11);
        let mut buf = Vec::new();
        g.write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        let err = PlaceGraph::read_from(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn test_dangling_edge_is_dropped() {
        let mut g = PlaceGraph::new();
        let a = g.add_node(0, false);
        let b = g.add_node(0, false);
        g.add_edge(Some(a), Some(b), MotionType::Forward, false, Evidence::default())
            .unwrap();
        g.add_edge(Some(b), Some(a), MotionType::Forward, true, Evidence::default())
            .unwrap();
        let mut buf = Vec::new();
        g.write_to(&mut buf).unwrap();

        // rewrite the last end_id (b -> a) to a place that does not exist
        let len = buf.len();
        buf[len - 4..].copy_from_slice(&99i32.to_le_bytes());

        let loaded = PlaceGraph::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.edge_count(), 1);
        assert!(loaded.find_edge(a, Some(b)).is_some());
    }

    #[test]
    fn test_ids_resume_after_load() {
        let mut g = PlaceGraph::new();
        g.add_node(0, false);
        g.add_node(0, false);
        let mut buf = Vec::new();
        g.write_to(&mut buf).unwrap();
        let mut loaded = PlaceGraph::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.add_node(0, false), NodeId::new(2));
    }
}
