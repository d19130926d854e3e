use bitvec::vec::BitVec;
use enum_map::EnumMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod packet;
mod parse;

pub use packet::{Packet, PacketParser, Reg};
pub use parse::{parse, read_header, BitHeader};

/// Words per 7-Series configuration frame.
pub const FRAME_WORDS: usize = 101;

/// Word index carrying the horizontal clock row bits.
pub const HCLK_WORD: usize = 50;
/// Bits `0..=12` of the HCLK word belong to the clock row, not to tiles.
pub const HCLK_BITS: u8 = 13;

#[derive(Debug, thiserror::Error)]
pub enum BitstreamError {
    #[error("malformed bitstream: {0}")]
    Malformed(String),
    #[error("malformed bits listing at line {line}: {text:?}")]
    MalformedBits { line: usize, text: String },
    #[error("frame address {0:#010x} not listed for the part")]
    UnlistedFrame(u32),
}

/// A single configuration-memory bit address: frame, word within frame,
/// bit within word. Rendered as `bit_<frame:08x>_<word:03>_<bit:02>`.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct BitCoord {
    pub frame: u32,
    pub word: u8,
    pub bit: u8,
}

impl std::fmt::Display for BitCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bit_{:08x}_{:03}_{:02}", self.frame, self.word, self.bit)
    }
}

impl std::str::FromStr for BitCoord {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        let rest = s.strip_prefix("bit_").ok_or(())?;
        let mut fields = rest.split('_');
        let frame = fields.next().ok_or(())?;
        let word = fields.next().ok_or(())?;
        let bit = fields.next().ok_or(())?;
        if fields.next().is_some() {
            return Err(());
        }
        Ok(BitCoord {
            frame: u32::from_str_radix(frame, 16).map_err(|_| ())?,
            word: word.parse().map_err(|_| ())?,
            bit: bit.parse().map_err(|_| ())?,
        })
    }
}

impl BitCoord {
    /// Builds a coordinate from the string triple used by fault-bit lists:
    /// hex frame, decimal word, decimal bit.
    pub fn from_fields(frame: &str, word: &str, bit: &str) -> Option<BitCoord> {
        Some(BitCoord {
            frame: u32::from_str_radix(frame, 16).ok()?,
            word: word.parse().ok()?,
            bit: bit.parse().ok()?,
        })
    }
}

/// Decoded configuration memory: the set of frames written by the stream,
/// each a 101-word bit image, plus the register file observed on the way.
#[derive(Debug, Clone)]
pub struct Bitstream {
    pub part_name: Option<String>,
    pub regs: EnumMap<Reg, Option<u32>>,
    frames: BTreeMap<u32, BitVec>,
}

impl Default for Bitstream {
    fn default() -> Self {
        Bitstream {
            part_name: None,
            regs: EnumMap::default(),
            frames: BTreeMap::new(),
        }
    }
}

impl Bitstream {
    pub fn idcode(&self) -> Option<u32> {
        self.regs[Reg::Idcode]
    }

    pub fn get(&self, coord: BitCoord) -> bool {
        match self.frames.get(&coord.frame) {
            Some(frame) => {
                let pos = coord.word as usize * 32 + coord.bit as usize;
                pos < frame.len() && frame[pos]
            }
            None => false,
        }
    }

    /// Whether the configuration stream wrote this frame at all (even if
    /// every bit in it is zero).
    pub fn frame_written(&self, frame: u32) -> bool {
        self.frames.contains_key(&frame)
    }

    pub fn frame_mut(&mut self, addr: u32) -> &mut BitVec {
        self.frames
            .entry(addr)
            .or_insert_with(|| BitVec::repeat(false, FRAME_WORDS * 32))
    }

    pub fn set(&mut self, coord: BitCoord, value: bool) {
        let pos = coord.word as usize * 32 + coord.bit as usize;
        self.frame_mut(coord.frame).set(pos, value);
    }

    /// All set bits in ascending `(frame, word, bit)` order.
    pub fn set_bits(&self) -> impl Iterator<Item = BitCoord> + '_ {
        self.frames.iter().flat_map(|(&frame, data)| {
            data.iter_ones().map(move |pos| BitCoord {
                frame,
                word: (pos / 32) as u8,
                bit: (pos % 32) as u8,
            })
        })
    }

    /// Parses the textual `.bits` form: one `bit_xxxxxxxx_www_bb` line per
    /// set bit. Carries no part name or IDCODE.
    pub fn from_bits_text(text: &str) -> Result<Bitstream, BitstreamError> {
        let mut bs = Bitstream::default();
        for (lno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let coord: BitCoord = line.parse().map_err(|()| BitstreamError::MalformedBits {
                line: lno + 1,
                text: line.to_string(),
            })?;
            bs.set(coord, true);
        }
        Ok(bs)
    }

    /// Re-encodes the decoded set-bit list as `.bits` lines, sorted
    /// ascending.
    pub fn to_bits_lines(&self) -> Vec<String> {
        self.set_bits().map(|c| c.to_string()).collect()
    }
}
