//! Binary snapshot format for the HNSW graph.
//!
//! ```text
//! header:
//!   magic            u32 le   0x484E_5357 ("HNSW" in ASCII-ish bytes)
//!   version          u32 le
//!   dimension        u32 le
//!   metric           u32 le   DistanceMetric::to_wire()
//!   m                u32 le
//!   ef_construction  u32 le
//!   ef_search        u32 le
//!   level_mult       f32 le
//!   node_count       u32 le   number of *live* node records that follow
//!   entry_point      u32 le   u32::MAX means "none"
//!   max_level        u32 le
//! node_count * node:
//!   id               u64 le
//!   level            u32 le
//!   dimension        u32 le
//!   data             dimension * f32 le
//!   (level + 1) * level:
//!     neighbor_count u32 le
//!     neighbor_count * u32 le   remapped slot indices (see below)
//! ```
//!
//! Tombstoned slots are never written: the table only has meaning as a live
//! set of nodes, so a save/load round trip also compacts it, renumbering
//! slots to `0..node_count` in iteration order. Neighbor references and the
//! entry point are remapped through the same old-slot-to-new-slot table
//! built during the write pass.

use std::io::{Read, Write};

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};

use super::{HnswIndex, Node};

/// Magic number identifying an HNSW snapshot file.
pub const MAGIC: u32 = 0x484E_5357;
const VERSION: u32 = 1;
const NO_ENTRY_POINT: u32 = u32::MAX;

impl HnswIndex {
    /// Serializes the live portion of the graph to `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileIo`] if writing fails.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        let state = self.state.read();
        let live: Vec<(u32, &Node)> = state
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(slot, n)| n.as_ref().map(|node| (slot as u32, node)))
            .collect();

        let mut remap = vec![NO_ENTRY_POINT; state.nodes.len()];
        for (new_slot, (old_slot, _)) in live.iter().enumerate() {
            remap[*old_slot as usize] = new_slot as u32;
        }

        writer.write_all(&MAGIC.to_le_bytes())?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(self.dimension as u32).to_le_bytes())?;
        writer.write_all(&self.metric.to_wire().to_le_bytes())?;
        writer.write_all(&(self.m as u32).to_le_bytes())?;
        writer.write_all(&(self.ef_construction as u32).to_le_bytes())?;
        writer.write_all(&(self.ef_search as u32).to_le_bytes())?;
        writer.write_all(&self.level_mult.to_le_bytes())?;
        writer.write_all(&(live.len() as u32).to_le_bytes())?;
        let entry_point_wire = state
            .entry_point
            .map_or(NO_ENTRY_POINT, |ep| remap[ep as usize]);
        writer.write_all(&entry_point_wire.to_le_bytes())?;
        writer.write_all(&(state.max_level as u32).to_le_bytes())?;

        for (_, node) in &live {
            writer.write_all(&node.id.to_le_bytes())?;
            writer.write_all(&(node.level as u32).to_le_bytes())?;
            writer.write_all(&(node.data.len() as u32).to_le_bytes())?;
            for &x in &node.data {
                writer.write_all(&x.to_le_bytes())?;
            }
            for level_neighbors in &node.neighbors {
                let remapped: Vec<u32> = level_neighbors
                    .iter()
                    .filter_map(|&old| {
                        let r = remap[old as usize];
                        (r != NO_ENTRY_POINT).then_some(r)
                    })
                    .collect();
                writer.write_all(&(remapped.len() as u32).to_le_bytes())?;
                for n in remapped {
                    writer.write_all(&n.to_le_bytes())?;
                }
            }
        }

        Ok(())
    }

    /// Reads a snapshot previously written by [`HnswIndex::save`]. Every
    /// construction parameter — dimension, metric, `m`, `ef_construction`,
    /// `ef_search`, `level_mult` — comes from the file itself, since it
    /// describes data already on disk; a caller has no way to override it,
    /// so a later insert never runs against connectivity targets the
    /// existing graph wasn't built for.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatabaseCorrupt`] if the magic number, version, or
    /// any record is malformed, or [`Error::FileIo`] if reading fails.
    pub fn load<R: Read>(reader: &mut R) -> Result<Self> {
        let magic = read_u32(reader)?;
        if magic != MAGIC {
            return Err(Error::DatabaseCorrupt(format!(
                "bad HNSW snapshot magic: {magic:#010x}"
            )));
        }
        let version = read_u32(reader)?;
        if version != VERSION {
            return Err(Error::DatabaseCorrupt(format!(
                "unsupported HNSW snapshot version: {version}"
            )));
        }
        let dimension = read_u32(reader)? as usize;
        let metric = DistanceMetric::from_wire(read_u32(reader)?).ok_or_else(|| {
            Error::DatabaseCorrupt("unrecognized similarity metric in snapshot".to_string())
        })?;
        let m = read_u32(reader)? as usize;
        let ef_construction = read_u32(reader)? as usize;
        let ef_search = read_u32(reader)? as usize;
        let level_mult = read_f32(reader)?;
        let node_count = read_u32(reader)? as usize;
        let entry_point_wire = read_u32(reader)?;
        let max_level = read_u32(reader)? as usize;

        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let id = read_u64(reader)?;
            let level = read_u32(reader)? as usize;
            let node_dimension = read_u32(reader)? as usize;
            if node_dimension != dimension {
                return Err(Error::DatabaseCorrupt(format!(
                    "node {id} has dimension {node_dimension}, expected {dimension}"
                )));
            }
            let mut data = Vec::with_capacity(node_dimension);
            for _ in 0..node_dimension {
                data.push(read_f32(reader)?);
            }
            let mut neighbors = Vec::with_capacity(level + 1);
            for _ in 0..=level {
                let count = read_u32(reader)? as usize;
                let mut level_neighbors = Vec::with_capacity(count);
                for _ in 0..count {
                    level_neighbors.push(read_u32(reader)?);
                }
                neighbors.push(level_neighbors);
            }
            nodes.push(Some(Node {
                id,
                level,
                data,
                neighbors,
            }));
        }

        for node in nodes.iter().flatten() {
            for level_neighbors in &node.neighbors {
                for &target in level_neighbors {
                    if target as usize >= nodes.len() {
                        return Err(Error::DatabaseCorrupt(format!(
                            "neighbor slot {target} out of range for {} nodes",
                            nodes.len()
                        )));
                    }
                }
            }
        }

        let entry_point = if entry_point_wire == NO_ENTRY_POINT {
            None
        } else {
            if entry_point_wire as usize >= nodes.len() {
                return Err(Error::DatabaseCorrupt(
                    "entry point out of range in snapshot".to_string(),
                ));
            }
            Some(entry_point_wire)
        };

        let tuning = crate::config::HnswTuning {
            m,
            ef_construction,
            ef_search,
            level_mult,
        };
        let index = Self::new(dimension, metric, tuning);
        {
            let mut state = index.state.write();
            state.nodes = nodes;
            state.entry_point = entry_point;
            state.max_level = max_level;
            state.checksum = index.compute_checksum(&state);
        }
        Ok(index)
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f32<R: Read>(reader: &mut R) -> Result<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HnswTuning;

    #[test]
    fn save_then_load_round_trips_search_results() {
        let idx = HnswIndex::new(4, DistanceMetric::Cosine, HnswTuning::default());
        for i in 1..=50u64 {
            idx.insert(i, &[i as f32, 1.0, 0.0, 0.0]).unwrap();
        }
        let before = idx.search(&[25.0, 1.0, 0.0, 0.0], 5, 20).unwrap();

        let mut buf = Vec::new();
        idx.save(&mut buf).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let loaded = HnswIndex::load(&mut cursor).unwrap();
        let after = loaded.search(&[25.0, 1.0, 0.0, 0.0], 5, 20).unwrap();

        assert_eq!(before, after);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn load_rejects_bad_magic() {
        let mut buf = vec![0u8; 64];
        buf[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let err = HnswIndex::load(&mut cursor).unwrap_err();
        assert_eq!(err.code(), "database-corrupt");
    }

    #[test]
    fn load_restores_persisted_tuning_instead_of_caller_defaults() {
        let tuning = HnswTuning {
            m: 32,
            ef_construction: 64,
            ef_search: 24,
            level_mult: 0.5,
        };
        let idx = HnswIndex::new(4, DistanceMetric::Cosine, tuning);
        for i in 1..=5u64 {
            idx.insert(i, &[i as f32, 1.0, 0.0, 0.0]).unwrap();
        }

        let mut buf = Vec::new();
        idx.save(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let loaded = HnswIndex::load(&mut cursor).unwrap();

        assert_eq!(loaded.m, 32);
        assert_eq!(loaded.ef_construction, 64);
        assert_eq!(loaded.ef_search, 24);
        assert!((loaded.level_mult - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn save_then_load_drops_tombstones_and_renumbers_slots() {
        let idx = HnswIndex::new(2, DistanceMetric::Cosine, HnswTuning::default());
        for i in 1..=10u64 {
            idx.insert(i, &[i as f32, 0.0]).unwrap();
        }
        idx.remove(3).unwrap();
        idx.remove(7).unwrap();

        let mut buf = Vec::new();
        idx.save(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let loaded = HnswIndex::load(&mut cursor).unwrap();

        assert_eq!(loaded.stats().node_count, 8);
        assert_eq!(loaded.stats().live_count, 8);
        assert!(loaded.validate().is_ok());
    }
}
