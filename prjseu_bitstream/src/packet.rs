use crate::BitstreamError;
use arrayref::array_ref;
use enum_map::Enum;
use serde::{Deserialize, Serialize};

/// 7-Series configuration registers (UG470 table 5-23).
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Enum, Serialize, Deserialize,
)]
pub enum Reg {
    Crc,
    Far,
    Fdri,
    Fdro,
    Cmd,
    Ctl0,
    Mask,
    Stat,
    Lout,
    Cor0,
    Mfwr,
    Cbc,
    Idcode,
    Axss,
    Cor1,
    Wbstar,
    Timer,
    Bootsts,
    Ctl1,
    Bspi,
}

impl Reg {
    fn from_addr(addr: u32) -> Option<Reg> {
        match addr {
            0 => Some(Reg::Crc),
            1 => Some(Reg::Far),
            2 => Some(Reg::Fdri),
            3 => Some(Reg::Fdro),
            4 => Some(Reg::Cmd),
            5 => Some(Reg::Ctl0),
            6 => Some(Reg::Mask),
            7 => Some(Reg::Stat),
            8 => Some(Reg::Lout),
            9 => Some(Reg::Cor0),
            0xa => Some(Reg::Mfwr),
            0xb => Some(Reg::Cbc),
            0xc => Some(Reg::Idcode),
            0xd => Some(Reg::Axss),
            0xe => Some(Reg::Cor1),
            0x10 => Some(Reg::Wbstar),
            0x11 => Some(Reg::Timer),
            0x16 => Some(Reg::Bootsts),
            0x18 => Some(Reg::Ctl1),
            0x1f => Some(Reg::Bspi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Packet<'a> {
    // unsynced
    DummyWord,
    WidthDetect,
    SyncWord,
    // synced
    Nop,
    Type1Read { reg: Reg, count: usize },
    Type1Write { reg: Reg, data: &'a [u8] },
    Type2Write { reg: Reg, data: &'a [u8] },
}

/// Word-aligned packet iterator over the configuration stream. Words
/// before the sync word are passed through as dummy/width-detect markers;
/// unknown pre-sync words are tolerated as padding.
#[derive(Debug, Clone)]
pub struct PacketParser<'a> {
    data: &'a [u8],
    pos: usize,
    sync: bool,
    last_reg: Option<Reg>,
}

impl<'a> PacketParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        PacketParser {
            data,
            pos: 0,
            sync: false,
            last_reg: None,
        }
    }

    pub fn peek(&self) -> Option<Result<Packet<'a>, BitstreamError>> {
        self.clone().next()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    fn take_words(&mut self, count: usize) -> Result<&'a [u8], BitstreamError> {
        let start = self.pos;
        let end = start + count * 4;
        if end > self.data.len() {
            return Err(BitstreamError::Malformed(format!(
                "packet payload of {count} words runs past end of stream"
            )));
        }
        self.pos = end;
        Ok(&self.data[start..end])
    }
}

impl<'a> Iterator for PacketParser<'a> {
    type Item = Result<Packet<'a>, BitstreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + 4 > self.data.len() {
            return None;
        }
        let ph = u32::from_be_bytes(*array_ref!(self.data, self.pos, 4));
        self.pos += 4;
        if !self.sync {
            return Some(Ok(match ph {
                0xffffffff => Packet::DummyWord,
                0x000000bb | 0x11220044 => Packet::WidthDetect,
                0xaa995566 => {
                    self.sync = true;
                    Packet::SyncWord
                }
                // header remnants or bus-width padding
                _ => Packet::DummyWord,
            }));
        }
        Some(match ph >> 29 {
            // type 1
            0b001 => {
                let op = (ph >> 27) & 3;
                let addr = (ph >> 13) & 0x3fff;
                let count = (ph & 0x7ff) as usize;
                match op {
                    0 => Ok(Packet::Nop),
                    1 => {
                        let reg = match Reg::from_addr(addr) {
                            Some(reg) => reg,
                            None => {
                                return Some(Err(BitstreamError::Malformed(format!(
                                    "read from unknown register {addr:#x}"
                                ))))
                            }
                        };
                        self.last_reg = Some(reg);
                        Ok(Packet::Type1Read { reg, count })
                    }
                    2 => {
                        let reg = match Reg::from_addr(addr) {
                            Some(reg) => reg,
                            None => {
                                return Some(Err(BitstreamError::Malformed(format!(
                                    "write to unknown register {addr:#x}"
                                ))))
                            }
                        };
                        self.last_reg = Some(reg);
                        match self.take_words(count) {
                            Ok(data) => Ok(Packet::Type1Write { reg, data }),
                            Err(e) => Err(e),
                        }
                    }
                    _ => Err(BitstreamError::Malformed(format!(
                        "unknown type 1 opcode in packet header {ph:#010x}"
                    ))),
                }
            }
            // type 2: payload for the register of the preceding type 1
            0b010 => {
                let count = (ph & 0x07ff_ffff) as usize;
                let reg = match self.last_reg {
                    Some(reg) => reg,
                    None => {
                        return Some(Err(BitstreamError::Malformed(
                            "type 2 packet without preceding type 1".to_string(),
                        )))
                    }
                };
                match self.take_words(count) {
                    Ok(data) => Ok(Packet::Type2Write { reg, data }),
                    Err(e) => Err(e),
                }
            }
            _ => Err(BitstreamError::Malformed(format!(
                "unknown packet header {ph:#010x}"
            ))),
        })
    }
}
