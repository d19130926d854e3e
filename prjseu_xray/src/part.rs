use crate::XrayError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

// 7-Series frame address fields:
//   [6:0]   minor
//   [16:7]  column
//   [21:17] row
//   [22]    half (0 = top, 1 = bottom)
//   [25:23] bus (CLB_IO_CLK / BLOCK_RAM / CFG_CLB)
const MINOR_SHIFT: u32 = 0;
const COLUMN_SHIFT: u32 = 7;
const ROW_SHIFT: u32 = 17;
const HALF_SHIFT: u32 = 22;
const BUS_SHIFT: u32 = 23;

fn bus_code(name: &str) -> Option<u32> {
    match name {
        "CLB_IO_CLK" => Some(0),
        "BLOCK_RAM" => Some(1),
        "CFG_CLB" => Some(2),
        _ => None,
    }
}

/// The ordered list of frame addresses configured on a part, from
/// `part.json`. A frame address absent from this list is undefined for
/// the part.
#[derive(Debug, Clone, Default)]
pub struct PartFrames {
    pub idcode: Option<u32>,
    frames: Vec<u32>,
    index: HashMap<u32, usize>,
}

#[derive(Deserialize)]
struct RawColumn {
    frame_count: u32,
}

#[derive(Deserialize)]
struct RawBus {
    configuration_columns: BTreeMap<String, RawColumn>,
}

#[derive(Deserialize)]
struct RawRow {
    configuration_buses: BTreeMap<String, RawBus>,
}

#[derive(Deserialize)]
struct RawHalf {
    rows: BTreeMap<String, RawRow>,
}

#[derive(Deserialize)]
struct RawPart {
    global_clock_regions: BTreeMap<String, RawHalf>,
    #[serde(default)]
    idcode: Option<u32>,
}

impl PartFrames {
    /// Builds a frame list directly from addresses; used by tools that
    /// synthesize parts rather than reading `part.json`.
    pub fn from_addresses(idcode: Option<u32>, mut frames: Vec<u32>) -> PartFrames {
        frames.sort_unstable();
        frames.dedup();
        let index = frames.iter().enumerate().map(|(i, &f)| (f, i)).collect();
        PartFrames {
            idcode,
            frames,
            index,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<PartFrames, XrayError> {
        let path = path.as_ref();
        let f = std::fs::File::open(path).map_err(|source| XrayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawPart =
            serde_json::from_reader(std::io::BufReader::new(f)).map_err(|source| {
                XrayError::Json {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        let malformed = || XrayError::Malformed {
            path: path.to_path_buf(),
            line: 0,
        };
        let mut frames = Vec::new();
        for (half_name, half) in &raw.global_clock_regions {
            let half_bit = match half_name.as_str() {
                "top" => 0,
                "bottom" => 1,
                _ => return Err(malformed()),
            };
            for (row_name, row) in &half.rows {
                let row_num: u32 = row_name.parse().map_err(|_| malformed())?;
                for (bus_name, bus) in &row.configuration_buses {
                    let bus_num = bus_code(bus_name).ok_or_else(malformed)?;
                    for (col_name, col) in &bus.configuration_columns {
                        let col_num: u32 = col_name.parse().map_err(|_| malformed())?;
                        for minor in 0..col.frame_count {
                            frames.push(
                                minor << MINOR_SHIFT
                                    | col_num << COLUMN_SHIFT
                                    | row_num << ROW_SHIFT
                                    | half_bit << HALF_SHIFT
                                    | bus_num << BUS_SHIFT,
                            );
                        }
                    }
                }
            }
        }
        frames.sort_unstable();
        frames.dedup();
        let index = frames.iter().enumerate().map(|(i, &f)| (f, i)).collect();
        Ok(PartFrames {
            idcode: raw.idcode,
            frames,
            index,
        })
    }

    /// Frame addresses in ascending order.
    pub fn frames(&self) -> &[u32] {
        &self.frames
    }

    pub fn is_listed_frame(&self, addr: u32) -> bool {
        self.index.contains_key(&addr)
    }

    pub fn frame_index(&self, addr: u32) -> Option<usize> {
        self.index.get(&addr).copied()
    }

    /// The row/half field of a frame address; the configuration stream
    /// inserts two pad frames wherever consecutive frames differ here.
    pub fn clock_row_of(addr: u32) -> u32 {
        (addr >> ROW_SHIFT) & 0x3f
    }
}
