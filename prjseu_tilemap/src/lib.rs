use prjseu_bitstream::{BitCoord, Bitstream};
use prjseu_xray::{BitsSegment, Database, MuxBitRole, TileBit, TileTypeDb, TileTypeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use unnamed_entity::{entity_id, EntityVec};

entity_id! {
    pub id TileId u32;
}

/// One instantiated tile of the part, bound to its configuration
/// segments. Holds indices into the device database, not back-pointers.
#[derive(Debug, Clone)]
pub struct TileInst {
    pub name: String,
    pub tile_type: TileTypeId,
    pub segments: Vec<BitsSegment>,
}

#[derive(Debug, Clone, Copy)]
struct FrameRef {
    tile: TileId,
    seg: usize,
}

/// What a bitstream coordinate configures.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Resource {
    /// Selection bit of an interconnect routing mux.
    MuxBit {
        tile: TileId,
        sink: String,
        role: MuxBitRole,
    },
    /// Named functional bit of a site (LUT init bits and the like). A bit
    /// may serve several database functions; all are listed.
    SiteBit { tile: TileId, functions: Vec<String> },
    /// Configuration bit of a defined tile with no modeled role.
    Other { tile: TileId },
    /// Listed frame, but no tile claims the bit. Candidate tiles whose
    /// segment covers the frame/word are reported for context.
    Unknown { candidates: Vec<TileId> },
    /// Frame address not listed for the part.
    Undefined,
}

/// State of one routing mux under some bit view.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum MuxState {
    Active(String),
    Inactive,
    Conflicted(Vec<String>),
}

/// A readable view of configuration memory. The persistent map reads the
/// bitstream directly; flip overlays toggle a set of coordinates on top.
pub trait BitView {
    fn bit(&self, coord: BitCoord) -> bool;
}

/// The part's tiles bound to a parsed bitstream: reverse frame index,
/// coordinate classification, and routing-mux state. Immutable once
/// built; fault overlays are separate `FlipView`s.
pub struct TileMap<'a> {
    pub db: &'a Database,
    pub bits: &'a Bitstream,
    tiles: EntityVec<TileId, TileInst>,
    by_name: HashMap<String, TileId>,
    frame_tiles: HashMap<u32, Vec<FrameRef>>,
}

impl<'a> TileMap<'a> {
    pub fn new(db: &'a Database, bits: &'a Bitstream) -> TileMap<'a> {
        let mut tiles = EntityVec::new();
        let mut by_name = HashMap::new();
        let mut frame_tiles: HashMap<u32, Vec<FrameRef>> = HashMap::new();
        for (name, info) in &db.grid.tiles {
            let (tile_type, _) = db
                .tile_types
                .get(&info.tile_type)
                .expect("grid tile type missing from database");
            let tid = tiles.push(TileInst {
                name: name.clone(),
                tile_type,
                segments: info.segments.clone(),
            });
            by_name.insert(name.clone(), tid);
            for (si, seg) in tiles[tid].segments.iter().enumerate() {
                for frame in seg.base_addr..seg.base_addr + seg.frames {
                    frame_tiles
                        .entry(frame)
                        .or_default()
                        .push(FrameRef { tile: tid, seg: si });
                }
            }
        }
        TileMap {
            db,
            bits,
            tiles,
            by_name,
            frame_tiles,
        }
    }

    pub fn tile(&self, tile: TileId) -> &TileInst {
        &self.tiles[tile]
    }

    pub fn tile_by_name(&self, name: &str) -> Option<TileId> {
        self.by_name.get(name).copied()
    }

    pub fn tile_type_db(&self, tile: TileId) -> &TileTypeDb {
        &self.db.tile_types[self.tiles[tile].tile_type]
    }

    /// A frame is defined when the configuration stream wrote it and the
    /// device database lists its address for the part.
    pub fn is_defined_frame(&self, frame: u32) -> bool {
        self.bits.frame_written(frame) && self.db.frames.is_listed_frame(frame)
    }

    /// Converts a tile-local bit to its bitstream coordinate. Uses the
    /// first segment that can hold the bit.
    pub fn coord_of(&self, tile: TileId, tb: TileBit) -> Option<BitCoord> {
        for seg in &self.tiles[tile].segments {
            if tb.frame < seg.frames && tb.bit < seg.words * 32 {
                return Some(BitCoord {
                    frame: seg.base_addr + tb.frame,
                    word: (seg.word_offset + tb.bit / 32) as u8,
                    bit: (tb.bit % 32) as u8,
                });
            }
        }
        None
    }

    /// Converts a bitstream coordinate to a bit local to the given tile,
    /// if one of its segments covers the coordinate.
    pub fn tile_bit_at(&self, tile: TileId, coord: BitCoord) -> Option<TileBit> {
        for seg in &self.tiles[tile].segments {
            if seg.contains_frame(coord.frame) && seg.contains_word(coord.word as u32) {
                return Some(self.tile_bit_of(seg, coord));
            }
        }
        None
    }

    /// Converts a bitstream coordinate to a bit local to the given
    /// segment.
    fn tile_bit_of(&self, seg: &BitsSegment, coord: BitCoord) -> TileBit {
        TileBit {
            frame: coord.frame - seg.base_addr,
            bit: coord.bit as u32 + 32 * (coord.word as u32 - seg.word_offset),
        }
    }

    /// Resolves a bitstream coordinate to the resource it configures.
    pub fn resource_at(&self, coord: BitCoord) -> Resource {
        if !self.db.frames.is_listed_frame(coord.frame) {
            return Resource::Undefined;
        }
        let mut candidates = Vec::new();
        if let Some(refs) = self.frame_tiles.get(&coord.frame) {
            for fr in refs {
                let seg = &self.tiles[fr.tile].segments[fr.seg];
                if !seg.contains_word(coord.word as u32) {
                    continue;
                }
                candidates.push((fr.tile, self.tile_bit_of(seg, coord)));
            }
        }
        for &(tid, tb) in &candidates {
            let ttdb = self.tile_type_db(tid);
            if ttdb.is_interconnect() {
                if let Some((mux, role)) = ttdb.mux_of_bit(tb) {
                    return Resource::MuxBit {
                        tile: tid,
                        sink: mux.sink.clone(),
                        role,
                    };
                }
            } else if let Some(functions) = ttdb.bit_functions.get(&tb) {
                return Resource::SiteBit {
                    tile: tid,
                    functions: functions.clone(),
                };
            }
            if ttdb.config_bits.contains(&tb) {
                return Resource::Other { tile: tid };
            }
        }
        Resource::Unknown {
            candidates: candidates.into_iter().map(|(t, _)| t).collect(),
        }
    }

    /// The inputs of a mux whose bit rules are all satisfied under the
    /// given view.
    pub fn connected_inputs(
        &self,
        tile: TileId,
        sink: &str,
        view: &impl BitView,
    ) -> BTreeSet<String> {
        let ttdb = self.tile_type_db(tile);
        let mut connected = BTreeSet::new();
        let Some(mux) = ttdb.muxes.get(sink) else {
            return connected;
        };
        for (src, rules) in &mux.inputs {
            let active = rules.iter().all(|rule| {
                let value = self
                    .coord_of(tile, rule.bit)
                    .map(|c| view.bit(c))
                    .unwrap_or(false);
                rule.matches(value)
            });
            if active {
                connected.insert(src.clone());
            }
        }
        connected
    }

    pub fn mux_state_with(&self, tile: TileId, sink: &str, view: &impl BitView) -> MuxState {
        let connected = self.connected_inputs(tile, sink, view);
        match connected.len() {
            0 => MuxState::Inactive,
            1 => MuxState::Active(connected.into_iter().next().unwrap()),
            _ => MuxState::Conflicted(connected.into_iter().collect()),
        }
    }

    /// Baseline mux state, straight from the bitstream.
    pub fn mux_state(&self, tile: TileId, sink: &str) -> MuxState {
        self.mux_state_with(tile, sink, &Baseline { bits: self.bits })
    }

    pub fn baseline(&self) -> Baseline<'_> {
        Baseline { bits: self.bits }
    }

    /// Shadow view with the group's coordinates toggled; the map itself
    /// is left untouched.
    pub fn with_flips(&self, group: impl IntoIterator<Item = BitCoord>) -> FlipView<'_, 'a> {
        FlipView {
            map: self,
            flips: group.into_iter().collect(),
        }
    }
}

/// The unmodified bitstream as a bit view.
pub struct Baseline<'a> {
    bits: &'a Bitstream,
}

impl BitView for Baseline<'_> {
    fn bit(&self, coord: BitCoord) -> bool {
        self.bits.get(coord)
    }
}

/// Overlay view with a bit group's coordinates toggled.
pub struct FlipView<'m, 'a> {
    map: &'m TileMap<'a>,
    flips: BTreeSet<BitCoord>,
}

impl BitView for FlipView<'_, '_> {
    fn bit(&self, coord: BitCoord) -> bool {
        self.map.bits.get(coord) ^ self.flips.contains(&coord)
    }
}

impl FlipView<'_, '_> {
    pub fn mux_state(&self, tile: TileId, sink: &str) -> MuxState {
        self.map.mux_state_with(tile, sink, self)
    }

    pub fn connected_inputs(&self, tile: TileId, sink: &str) -> BTreeSet<String> {
        self.map.connected_inputs(tile, sink, self)
    }

    pub fn flips(&self) -> &BTreeSet<BitCoord> {
        &self.flips
    }
}
