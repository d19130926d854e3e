use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use unnamed_entity::{entity_id, EntityId, EntityVec};

mod trace;

pub use trace::{Trace, TRACE_NODE_LIMIT};

entity_id! {
    pub id CellId u32;
    pub id NetId u32;
}

#[derive(Debug, thiserror::Error)]
pub enum DesignError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
    #[error("design checkpoint produced no design")]
    MissingCheckpoint,
}

/// A routing node: a wire within one tile.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct NodeRef {
    pub tile: String,
    pub wire: String,
}

impl NodeRef {
    pub fn new(tile: impl Into<String>, wire: impl Into<String>) -> NodeRef {
        NodeRef {
            tile: tile.into(),
            wire: wire.into(),
        }
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tile, self.wire)
    }
}

/// A placed leaf cell.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub name: String,
    pub tile: String,
    pub site: String,
    pub bel: String,
    pub kind: String,
}

/// One programmed PIP of a net's route.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Pip {
    pub tile: String,
    pub input: String,
    pub output: String,
    #[serde(default)]
    pub bidir: bool,
}

/// A routed sink: the cell reached when the net arrives at `node`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SinkPin {
    pub cell: String,
    pub node: NodeRef,
}

/// A routed net: its PIPs, the inter-tile wire links joining them, and
/// its sink pins.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Net {
    pub name: String,
    pub pips: Vec<Pip>,
    #[serde(default)]
    pub conns: Vec<(NodeRef, NodeRef)>,
    #[serde(default)]
    pub sinks: Vec<SinkPin>,
}

#[derive(Debug, Default)]
struct Indexes {
    cell_at: HashMap<(String, String, String), CellId>,
    // tile -> site -> bel -> cell
    sites: HashMap<String, BTreeMap<String, BTreeMap<String, CellId>>>,
    pip_net: HashMap<(String, String, String), NetId>,
    node_net: HashMap<NodeRef, NetId>,
    net_edges: Vec<HashMap<NodeRef, Vec<NodeRef>>>,
    net_sinks: Vec<HashMap<NodeRef, Vec<CellId>>>,
}

/// A placed-and-routed design as consumed by fault evaluation. The dcp
/// reader backends all produce this one shape; see `DesignSource`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Design {
    pub part: String,
    pub cells: EntityVec<CellId, Cell>,
    pub nets: EntityVec<NetId, Net>,
    #[serde(skip)]
    index: Indexes,
}

impl Design {
    /// Rebuilds the lookup tables after the flat lists change (or after
    /// deserialization, which skips them).
    pub fn post_deserialize(&mut self) {
        let mut index = Indexes::default();
        for (cid, cell) in self.cells.iter() {
            index.cell_at.insert(
                (cell.tile.clone(), cell.site.clone(), cell.bel.clone()),
                cid,
            );
            index
                .sites
                .entry(cell.tile.clone())
                .or_default()
                .entry(cell.site.clone())
                .or_default()
                .insert(cell.bel.clone(), cid);
        }
        for (nid, net) in self.nets.iter() {
            let mut edges: HashMap<NodeRef, Vec<NodeRef>> = HashMap::new();
            let mut sinks: HashMap<NodeRef, Vec<CellId>> = HashMap::new();
            for pip in &net.pips {
                let input = NodeRef::new(&pip.tile, &pip.input);
                let output = NodeRef::new(&pip.tile, &pip.output);
                index
                    .pip_net
                    .entry((pip.tile.clone(), pip.input.clone(), pip.output.clone()))
                    .or_insert(nid);
                index.node_net.entry(input.clone()).or_insert(nid);
                index.node_net.entry(output.clone()).or_insert(nid);
                edges.entry(input).or_default().push(output);
            }
            for (from, to) in &net.conns {
                index.node_net.entry(from.clone()).or_insert(nid);
                index.node_net.entry(to.clone()).or_insert(nid);
                edges.entry(from.clone()).or_default().push(to.clone());
            }
            for sink in &net.sinks {
                index.node_net.entry(sink.node.clone()).or_insert(nid);
                if let Some(cid) = self
                    .cells
                    .iter()
                    .find(|(_, c)| c.name == sink.cell)
                    .map(|(cid, _)| cid)
                {
                    sinks.entry(sink.node.clone()).or_default().push(cid);
                }
            }
            index.net_edges.push(edges);
            index.net_sinks.push(sinks);
        }
        self.index = index;
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Design, DesignError> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|source| DesignError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut design: Design = serde_json::from_reader(std::io::BufReader::new(f))
            .map_err(|source| DesignError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        design.post_deserialize();
        Ok(design)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Design, DesignError> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|source| DesignError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cf = zstd::stream::Decoder::new(f).map_err(|source| DesignError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut design: Design =
            bincode::deserialize_from(cf).map_err(|source| DesignError::Snapshot {
                path: path.to_path_buf(),
                source,
            })?;
        design.post_deserialize();
        Ok(design)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), DesignError> {
        let path = path.as_ref();
        let f = File::create(path).map_err(|source| DesignError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cf = zstd::stream::Encoder::new(f, 9).map_err(|source| DesignError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        bincode::serialize_into(&mut cf, self).map_err(|source| DesignError::Snapshot {
            path: path.to_path_buf(),
            source,
        })?;
        cf.finish().map_err(|source| DesignError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    pub fn cell(&self, cell: CellId) -> &Cell {
        &self.cells[cell]
    }

    pub fn net(&self, net: NetId) -> &Net {
        &self.nets[net]
    }

    pub fn cell_at(&self, tile: &str, site: &str, bel: &str) -> Option<&Cell> {
        self.index
            .cell_at
            .get(&(tile.to_string(), site.to_string(), bel.to_string()))
            .map(|&cid| &self.cells[cid])
    }

    /// The sites of a tile that hold any cells, with their occupied BELs.
    pub fn sites_in_tile(
        &self,
        tile: &str,
    ) -> Option<&BTreeMap<String, BTreeMap<String, CellId>>> {
        self.index.sites.get(tile)
    }

    /// The net routed through the given PIP, if any.
    pub fn net_through_pip(&self, tile: &str, input: &str, output: &str) -> Option<NetId> {
        self.index
            .pip_net
            .get(&(tile.to_string(), input.to_string(), output.to_string()))
            .copied()
    }

    /// The net whose route reaches the given node, if any.
    pub fn net_driving_node(&self, tile: &str, wire: &str) -> Option<NetId> {
        self.index
            .node_net
            .get(&NodeRef::new(tile, wire))
            .copied()
    }

    fn net_edges(&self, net: NetId) -> &HashMap<NodeRef, Vec<NodeRef>> {
        &self.index.net_edges[net.to_idx()]
    }

    fn net_node_sinks(&self, net: NetId) -> &HashMap<NodeRef, Vec<CellId>> {
        &self.index.net_sinks[net.to_idx()]
    }
}

/// A producer of `Design`s. The dcp reader backends (EDA-tool pipe or
/// native) and the file reader below all satisfy this; providers share no
/// state.
pub trait DesignSource {
    fn load(&mut self) -> Result<Design, DesignError>;
}

/// Reads a design dumped to disk: `.json` interchange form, anything else
/// is treated as a zstd-compressed bincode snapshot.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> FileSource {
        FileSource { path: path.into() }
    }
}

impl DesignSource for FileSource {
    fn load(&mut self) -> Result<Design, DesignError> {
        let design = if self.path.extension().is_some_and(|e| e == "json") {
            Design::from_json_file(&self.path)?
        } else {
            Design::from_file(&self.path)?
        };
        if design.cells.is_empty() && design.nets.is_empty() {
            return Err(DesignError::MissingCheckpoint);
        }
        Ok(design)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_design() -> Design {
        let mut design = Design {
            part: "xc7a35tcsg324-1".to_string(),
            ..Design::default()
        };
        design.cells.push(Cell {
            name: "u0/ff_a".to_string(),
            tile: "CLBLM_L_X2Y0".to_string(),
            site: "SLICE_X2Y0".to_string(),
            bel: "AFF".to_string(),
            kind: "FDRE".to_string(),
        });
        design.cells.push(Cell {
            name: "u0/lut_b".to_string(),
            tile: "CLBLM_L_X3Y0".to_string(),
            site: "SLICE_X4Y0".to_string(),
            bel: "A6LUT".to_string(),
            kind: "LUT6".to_string(),
        });
        design.nets.push(Net {
            name: "u0/net_q".to_string(),
            pips: vec![
                Pip {
                    tile: "INT_L_X0Y0".to_string(),
                    input: "LOGIC_OUTS0".to_string(),
                    output: "EE2BEG0".to_string(),
                    bidir: false,
                },
                Pip {
                    tile: "INT_L_X1Y0".to_string(),
                    input: "EE2END0".to_string(),
                    output: "IMUX_L4".to_string(),
                    bidir: false,
                },
                Pip {
                    tile: "INT_L_X1Y0".to_string(),
                    input: "EE2END0".to_string(),
                    output: "EE2BEG0".to_string(),
                    bidir: false,
                },
                Pip {
                    tile: "INT_L_X2Y0".to_string(),
                    input: "EE2END0".to_string(),
                    output: "IMUX_L10".to_string(),
                    bidir: false,
                },
            ],
            conns: vec![
                (
                    NodeRef::new("INT_L_X0Y0", "EE2BEG0"),
                    NodeRef::new("INT_L_X1Y0", "EE2END0"),
                ),
                (
                    NodeRef::new("INT_L_X1Y0", "EE2BEG0"),
                    NodeRef::new("INT_L_X2Y0", "EE2END0"),
                ),
                (
                    NodeRef::new("INT_L_X1Y0", "IMUX_L4"),
                    NodeRef::new("CLBLM_L_X2Y0", "CLBLM_L_A3".to_string()),
                ),
                (
                    NodeRef::new("INT_L_X2Y0", "IMUX_L10"),
                    NodeRef::new("CLBLM_L_X3Y0", "CLBLM_L_A1".to_string()),
                ),
            ],
            sinks: vec![
                SinkPin {
                    cell: "u0/ff_a".to_string(),
                    node: NodeRef::new("CLBLM_L_X2Y0", "CLBLM_L_A3"),
                },
                SinkPin {
                    cell: "u0/lut_b".to_string(),
                    node: NodeRef::new("CLBLM_L_X3Y0", "CLBLM_L_A1"),
                },
            ],
        });
        design.post_deserialize();
        design
    }

    #[test]
    fn indexes() {
        let design = sample_design();
        assert_eq!(
            design
                .cell_at("CLBLM_L_X2Y0", "SLICE_X2Y0", "AFF")
                .map(|c| c.name.as_str()),
            Some("u0/ff_a")
        );
        assert!(design.cell_at("CLBLM_L_X2Y0", "SLICE_X2Y0", "BFF").is_none());

        let nid = design
            .net_through_pip("INT_L_X0Y0", "LOGIC_OUTS0", "EE2BEG0")
            .unwrap();
        assert_eq!(design.net(nid).name, "u0/net_q");
        assert!(design
            .net_through_pip("INT_L_X0Y0", "EE2BEG0", "LOGIC_OUTS0")
            .is_none());

        assert_eq!(
            design.net_driving_node("INT_L_X1Y0", "EE2END0"),
            Some(nid)
        );
        assert_eq!(design.net_driving_node("INT_L_X1Y0", "WW2END0"), None);

        let sites = design.sites_in_tile("CLBLM_L_X3Y0").unwrap();
        assert!(sites["SLICE_X4Y0"].contains_key("A6LUT"));
    }

    #[test]
    fn json_roundtrip() {
        let design = sample_design();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design.json");
        let f = File::create(&path).unwrap();
        serde_json::to_writer_pretty(f, &design).unwrap();

        let mut source = FileSource::new(&path);
        let loaded = source.load().unwrap();
        assert_eq!(loaded.part, design.part);
        assert_eq!(loaded.cells.len(), 2);
        assert!(loaded
            .net_through_pip("INT_L_X2Y0", "EE2END0", "IMUX_L10")
            .is_some());
    }

    #[test]
    fn snapshot_roundtrip() {
        let design = sample_design();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design.dsn");
        design.to_file(&path).unwrap();
        let loaded = Design::from_file(&path).unwrap();
        assert_eq!(loaded.nets.len(), 1);
        assert_eq!(
            loaded.net_driving_node("INT_L_X0Y0", "LOGIC_OUTS0"),
            Some(NetId::from_idx(0))
        );
    }

    #[test]
    fn empty_design_is_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, r#"{"part": "xc7a35tcsg324-1", "cells": [], "nets": []}"#)
            .unwrap();
        assert!(matches!(
            FileSource::new(&path).load(),
            Err(DesignError::MissingCheckpoint)
        ));
    }
}
