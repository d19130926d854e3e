use crate::{FrameSegment, TileBit, XrayError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// One configuration-bit condition of a PIP or functional-bit entry.
/// `inv` entries require the bit to be 0 for the entry to be active.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BitRule {
    pub bit: TileBit,
    pub inv: bool,
}

impl BitRule {
    pub fn matches(&self, value: bool) -> bool {
        value != self.inv
    }
}

impl std::str::FromStr for BitRule {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        let (inv, s) = match s.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        Ok(BitRule {
            bit: s.parse()?,
            inv,
        })
    }
}

/// Known switchbox mux families, named `<row bits>-<inputs>` as in the
/// upstream documentation. The tuple is the rule-occurrence count that
/// identifies a row bit and a column bit respectively.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum MuxKind {
    M5x24,
    M2x20,
    M2x18,
    M5x16,
    M2x12,
}

impl MuxKind {
    fn for_inputs(num: usize) -> Option<MuxKind> {
        match num {
            24 => Some(MuxKind::M5x24),
            20 => Some(MuxKind::M2x20),
            18 => Some(MuxKind::M2x18),
            16 => Some(MuxKind::M5x16),
            12 => Some(MuxKind::M2x12),
            _ => None,
        }
    }

    fn occurrence_counts(self) -> (usize, usize) {
        match self {
            MuxKind::M5x24 => (4, 24),
            MuxKind::M2x20 => (5, 4),
            MuxKind::M2x18 => (6, 3),
            MuxKind::M5x16 => (4, 16),
            MuxKind::M2x12 => (4, 3),
        }
    }
}

impl std::fmt::Display for MuxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MuxKind::M5x24 => "5-24",
            MuxKind::M2x20 => "2-20",
            MuxKind::M2x18 => "2-18",
            MuxKind::M5x16 => "5-16",
            MuxKind::M2x12 => "2-12",
        })
    }
}

/// A switchbox routing mux: the full input table of one sink node, plus
/// the row/column partition of its selection bits. The partition stays
/// empty for shapes outside the family table; such bits are reported as
/// unsupported rather than guessed at.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RoutingMux {
    pub sink: String,
    pub kind: Option<MuxKind>,
    pub inputs: BTreeMap<String, Vec<BitRule>>,
    pub row_bits: BTreeSet<TileBit>,
    pub col_bits: BTreeSet<TileBit>,
}

impl RoutingMux {
    fn derive(sink: String, inputs: BTreeMap<String, Vec<BitRule>>) -> RoutingMux {
        let mut counts: BTreeMap<TileBit, usize> = BTreeMap::new();
        for rules in inputs.values() {
            for rule in rules {
                *counts.entry(rule.bit).or_default() += 1;
            }
        }
        let kind = MuxKind::for_inputs(inputs.len());
        let mut row_bits = BTreeSet::new();
        let mut col_bits = BTreeSet::new();
        if let Some(kind) = kind {
            let (row_num, col_num) = kind.occurrence_counts();
            for (&bit, &count) in &counts {
                if count == col_num {
                    col_bits.insert(bit);
                } else if count == row_num {
                    row_bits.insert(bit);
                }
            }
        }
        RoutingMux {
            sink,
            kind,
            inputs,
            row_bits,
            col_bits,
        }
    }

    /// All selection bits of the mux, row and column alike.
    pub fn selection_bits(&self) -> impl Iterator<Item = TileBit> + '_ {
        self.row_bits.iter().chain(self.col_bits.iter()).copied()
    }
}

/// Pseudo-PIP classes from the `ppips_*.db` files: `default` entries
/// conduct when the whole mux is unprogrammed, `always` entries always
/// conduct, `hint` entries are informational.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum PseudoPipKind {
    Default,
    Always,
    Hint,
}

/// Per-tile-type bit semantics from `segbits_<type>.db`; for interconnect
/// types also the routing-mux tables and pseudo-PIPs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TileTypeDb {
    pub name: String,
    pub config_bits: BTreeSet<TileBit>,
    /// Named functional bits, keyed by the dotted tag with the tile-type
    /// prefix removed (e.g. `SLICEM_X0.ALUT.INIT[00]`).
    pub functions: BTreeMap<String, Vec<BitRule>>,
    pub muxes: BTreeMap<String, RoutingMux>,
    pub ppips: BTreeMap<String, BTreeMap<String, PseudoPipKind>>,
    /// Reverse map from a bit to the functions that use it.
    pub bit_functions: BTreeMap<TileBit, Vec<String>>,
}

impl TileTypeDb {
    pub fn is_interconnect(&self) -> bool {
        matches!(self.name.as_str(), "INT_L" | "INT_R")
    }

    pub fn segment(&self) -> FrameSegment {
        if self.config_bits.is_empty() {
            return FrameSegment::EMPTY;
        }
        let frames = self.config_bits.iter().map(|b| b.frame).max().unwrap() + 1;
        let bits = self.config_bits.iter().map(|b| b.bit).max().unwrap() + 1;
        FrameSegment {
            frames,
            words: bits.div_ceil(32),
        }
    }

    /// Finds the mux a selection bit belongs to, with its role.
    pub fn mux_of_bit(&self, bit: TileBit) -> Option<(&RoutingMux, MuxBitRole)> {
        for mux in self.muxes.values() {
            if mux.row_bits.contains(&bit) {
                return Some((mux, MuxBitRole::Row));
            }
            if mux.col_bits.contains(&bit) {
                return Some((mux, MuxBitRole::Column));
            }
        }
        None
    }

    pub fn load(fam_dir: &Path, tile_type: &str) -> Result<TileTypeDb, XrayError> {
        let mut db = TileTypeDb {
            name: tile_type.to_string(),
            ..TileTypeDb::default()
        };
        let lower = tile_type.to_lowercase();
        let segbits = fam_dir.join(format!("segbits_{lower}.db"));
        if segbits.exists() {
            db.parse_segbits(&segbits)?;
        }
        if db.is_interconnect() {
            let ppips = fam_dir.join(format!("ppips_{lower}.db"));
            if ppips.exists() {
                db.parse_ppips(&ppips)?;
            }
        }
        db.bit_functions = db
            .functions
            .iter()
            .flat_map(|(tag, rules)| rules.iter().map(move |r| (r.bit, tag.clone())))
            .fold(BTreeMap::new(), |mut acc: BTreeMap<TileBit, Vec<String>>, (bit, tag)| {
                acc.entry(bit).or_default().push(tag);
                acc
            });
        Ok(db)
    }

    fn parse_segbits(&mut self, path: &Path) -> Result<(), XrayError> {
        let text = std::fs::read_to_string(path).map_err(|source| XrayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_int = self.is_interconnect();
        let mut pips: BTreeMap<String, BTreeMap<String, Vec<BitRule>>> = BTreeMap::new();
        for (lno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let malformed = || XrayError::Malformed {
                path: path.to_path_buf(),
                line: lno + 1,
            };
            let mut fields = line.split_whitespace();
            let tag = fields.next().ok_or_else(malformed)?;
            let rules = fields
                .map(|f| f.parse::<BitRule>().map_err(|()| malformed()))
                .collect::<Result<Vec<BitRule>, _>>()?;
            for rule in &rules {
                self.config_bits.insert(rule.bit);
            }
            let mut segs = tag.split('.');
            let head = segs.next().ok_or_else(malformed)?;
            if head != self.name {
                return Err(malformed());
            }
            let segs: Vec<&str> = segs.collect();
            if is_int && segs.len() >= 2 {
                let sink = segs[0].to_string();
                let src = segs[1..].join(".");
                pips.entry(sink).or_default().insert(src, rules);
            } else {
                if segs.is_empty() {
                    return Err(malformed());
                }
                self.functions.insert(segs.join("."), rules);
            }
        }
        for (sink, inputs) in pips {
            self.muxes
                .insert(sink.clone(), RoutingMux::derive(sink, inputs));
        }
        Ok(())
    }

    fn parse_ppips(&mut self, path: &Path) -> Result<(), XrayError> {
        let text = std::fs::read_to_string(path).map_err(|source| XrayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        for (lno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let malformed = || XrayError::Malformed {
                path: path.to_path_buf(),
                line: lno + 1,
            };
            let (tag, kind) = line.split_once(' ').ok_or_else(malformed)?;
            let kind = match kind.trim() {
                "default" => PseudoPipKind::Default,
                "always" => PseudoPipKind::Always,
                "hint" => PseudoPipKind::Hint,
                _ => return Err(malformed()),
            };
            let mut segs = tag.split('.');
            let head = segs.next().ok_or_else(malformed)?;
            if head != self.name {
                return Err(malformed());
            }
            let sink = segs.next().ok_or_else(malformed)?.to_string();
            let src = segs.collect::<Vec<_>>().join(".");
            if src.is_empty() {
                return Err(malformed());
            }
            self.ppips.entry(sink).or_default().insert(src, kind);
        }
        Ok(())
    }
}

/// Role of a selection bit inside its mux encoding.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum MuxBitRole {
    Row,
    Column,
}

impl std::fmt::Display for MuxBitRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MuxBitRole::Row => "Row Bit",
            MuxBitRole::Column => "Column Bit",
        })
    }
}
