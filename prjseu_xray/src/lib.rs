use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use unnamed_entity::{entity_id, EntityMap};

mod part;
mod segbits;
mod tilegrid;

pub use part::PartFrames;
pub use segbits::{BitRule, MuxBitRole, MuxKind, PseudoPipKind, RoutingMux, TileTypeDb};
pub use tilegrid::{BitsSegment, TileGrid, TileInfo};

entity_id! {
    pub id TileTypeId u16;
}

#[derive(Debug, thiserror::Error)]
pub enum XrayError {
    #[error("unsupported part {0}")]
    UnsupportedPart(String),
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
    #[error("{path}:{line}: malformed database entry")]
    Malformed { path: PathBuf, line: usize },
}

/// A configuration bit position local to one tile: minor frame within the
/// tile's segment, and bit offset counted across the segment's words.
/// Matches the `FF_BB` notation of the segbits databases.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct TileBit {
    pub frame: u32,
    pub bit: u32,
}

impl std::fmt::Display for TileBit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}_{:02}", self.frame, self.bit)
    }
}

impl std::str::FromStr for TileBit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        let (frame, bit) = s.split_once('_').ok_or(())?;
        Ok(TileBit {
            frame: frame.parse().map_err(|_| ())?,
            bit: bit.parse().map_err(|_| ())?,
        })
    }
}

/// Shape of a tile type's configuration region. Empty for routing-only
/// overlay types that carry no configuration bits.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct FrameSegment {
    pub frames: u32,
    pub words: u32,
}

impl FrameSegment {
    pub const EMPTY: FrameSegment = FrameSegment { frames: 0, words: 0 };

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// Project X-Ray database for one part: tile grid, per-tile-type bit
/// semantics, and the part's frame address list.
#[derive(Debug)]
pub struct Database {
    pub part: String,
    pub family: &'static str,
    pub fabric: String,
    pub grid: TileGrid,
    pub tile_types: EntityMap<TileTypeId, String, TileTypeDb>,
    pub frames: PartFrames,
}

fn family_of(part: &str) -> Result<&'static str, XrayError> {
    for (prefix, family) in [
        ("xc7a", "artix7"),
        ("xc7k", "kintex7"),
        ("xc7s", "spartan7"),
        ("xc7z", "zynq7"),
    ] {
        if part.starts_with(prefix) {
            return Ok(family);
        }
    }
    Err(XrayError::UnsupportedPart(part.to_string()))
}

/// Derives the fabric directory name from a full part name. Artix and
/// Kintex fabrics include the trailing size letter (`xc7a100t`); Spartan
/// and Zynq fabrics stop at the first non-digit (`xc7z010`). The xc7a35t
/// die shares the xc7a50t fabric.
fn fabric_of(part: &str, family: &str) -> String {
    let mut fabric = part[..4].to_string();
    for c in part[4..].chars() {
        let numeric = c.is_ascii_digit();
        if !numeric && matches!(family, "spartan7" | "zynq7") {
            break;
        }
        fabric.push(c);
        if !numeric {
            break;
        }
    }
    if fabric == "xc7a35t" {
        fabric = "xc7a50t".to_string();
    }
    fabric
}

impl Database {
    pub fn open(root: impl AsRef<Path>, part: &str) -> Result<Database, XrayError> {
        let root = root.as_ref();
        let family = family_of(part)?;
        let fabric = fabric_of(part, family);
        let fam_dir = root.join(family);
        let grid = TileGrid::from_file(fam_dir.join(&fabric).join("tilegrid.json"))?;
        let frames = PartFrames::from_file(fam_dir.join(part).join("part.json"))?;
        let mut tile_types = EntityMap::new();
        for info in grid.tiles.values() {
            if tile_types.get(&info.tile_type).is_none() {
                let db = TileTypeDb::load(&fam_dir, &info.tile_type)?;
                tile_types.insert(info.tile_type.clone(), db);
            }
        }
        Ok(Database {
            part: part.to_string(),
            family,
            fabric,
            grid,
            tile_types,
            frames,
        })
    }

    pub fn tile_type(&self, name: &str) -> Option<&TileTypeDb> {
        self.tile_types.get(name).map(|(_, db)| db)
    }

    /// Iterates the part's tiles as `(name, type, x, y)`.
    pub fn grid(&self) -> impl Iterator<Item = (&str, &str, u32, u32)> {
        self.grid.tiles.iter().map(|(name, info)| {
            (
                name.as_str(),
                info.tile_type.as_str(),
                info.grid_x,
                info.grid_y,
            )
        })
    }

    pub fn segment(&self, tile_type: &str) -> FrameSegment {
        match self.tile_type(tile_type) {
            Some(db) => db.segment(),
            None => FrameSegment::EMPTY,
        }
    }
}
