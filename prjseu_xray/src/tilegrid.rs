use crate::XrayError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// Tile families whose segments overlap their neighbours'; the upstream
// databases carry them but their bits belong to the primary tile.
const EXCLUDED_TILES: &[&str] = &["_UTURN", "MONITOR_BOT", "_SING"];

/// One configuration-bus region of a tile, as listed in `tilegrid.json`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct BitsSegment {
    pub base_addr: u32,
    pub frames: u32,
    pub word_offset: u32,
    pub words: u32,
}

impl BitsSegment {
    pub fn contains_frame(&self, frame: u32) -> bool {
        frame >= self.base_addr && frame < self.base_addr + self.frames
    }

    pub fn contains_word(&self, word: u32) -> bool {
        word >= self.word_offset && word < self.word_offset + self.words
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TileInfo {
    pub tile_type: String,
    pub grid_x: u32,
    pub grid_y: u32,
    pub segments: Vec<BitsSegment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TileGrid {
    pub tiles: BTreeMap<String, TileInfo>,
}

#[derive(Deserialize)]
struct RawSegment {
    baseaddr: String,
    frames: u32,
    offset: u32,
    words: u32,
}

#[derive(Deserialize)]
struct RawTile {
    #[serde(default)]
    bits: BTreeMap<String, RawSegment>,
    grid_x: u32,
    grid_y: u32,
    #[serde(rename = "type")]
    tile_type: String,
}

impl TileGrid {
    pub fn from_file(path: impl AsRef<Path>) -> Result<TileGrid, XrayError> {
        let path = path.as_ref();
        let f = std::fs::File::open(path).map_err(|source| XrayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: BTreeMap<String, RawTile> =
            serde_json::from_reader(std::io::BufReader::new(f)).map_err(|source| {
                XrayError::Json {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        let mut tiles = BTreeMap::new();
        for (name, tile) in raw {
            if EXCLUDED_TILES.iter().any(|seg| name.contains(seg)) {
                continue;
            }
            let mut segments = Vec::new();
            for seg in tile.bits.values() {
                let hex = seg.baseaddr.trim_start_matches("0x");
                let base_addr =
                    u32::from_str_radix(hex, 16).map_err(|_| XrayError::Malformed {
                        path: path.to_path_buf(),
                        line: 0,
                    })?;
                segments.push(BitsSegment {
                    base_addr,
                    frames: seg.frames,
                    word_offset: seg.offset,
                    words: seg.words,
                });
            }
            tiles.insert(
                name,
                TileInfo {
                    tile_type: tile.tile_type,
                    grid_x: tile.grid_x,
                    grid_y: tile.grid_y,
                    segments,
                },
            );
        }
        Ok(TileGrid { tiles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "CLBLM_L_X86Y103": {
            "bits": {
                "CLB_IO_CLK": {
                    "baseaddr": "0x00402B00",
                    "frames": 36,
                    "offset": 6,
                    "words": 2
                }
            },
            "grid_x": 90,
            "grid_y": 47,
            "type": "CLBLM_L"
        },
        "INT_R_X73Y188": {
            "bits": {
                "CLB_IO_CLK": {
                    "baseaddr": "0x00002480",
                    "frames": 26,
                    "offset": 76,
                    "words": 2
                }
            },
            "grid_x": 77,
            "grid_y": 12,
            "type": "INT_R"
        },
        "INT_R_X73Y188_UTURN": {
            "bits": {},
            "grid_x": 77,
            "grid_y": 12,
            "type": "INT_R_UTURN"
        },
        "NULL_X0Y0": {
            "grid_x": 0,
            "grid_y": 0,
            "type": "NULL"
        }
    }"#;

    #[test]
    fn parse_tilegrid() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        let grid = TileGrid::from_file(f.path()).unwrap();
        assert_eq!(grid.tiles.len(), 3);
        assert!(!grid.tiles.contains_key("INT_R_X73Y188_UTURN"));
        let clb = &grid.tiles["CLBLM_L_X86Y103"];
        assert_eq!(clb.tile_type, "CLBLM_L");
        assert_eq!(
            clb.segments,
            vec![BitsSegment {
                base_addr: 0x00402b00,
                frames: 36,
                word_offset: 6,
                words: 2,
            }]
        );
        let null = &grid.tiles["NULL_X0Y0"];
        assert!(null.segments.is_empty());
    }
}
