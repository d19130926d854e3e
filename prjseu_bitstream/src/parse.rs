use crate::packet::{Packet, PacketParser, Reg};
use crate::{Bitstream, BitstreamError, FRAME_WORDS, HCLK_BITS, HCLK_WORD};
use arrayref::array_ref;
use prjseu_xray::PartFrames;

/// Metadata fields of a `.bit` container header. Raw `.bin` streams have
/// no header; all fields stay empty and the stream starts at offset 0.
#[derive(Debug, Clone, Default)]
pub struct BitHeader {
    pub design: Option<String>,
    pub part: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub stream_start: usize,
}

const BIT_MAGIC: [u8; 9] = [0x0f, 0xf0, 0x0f, 0xf0, 0x0f, 0xf0, 0x0f, 0xf0, 0x00];

fn header_string(data: &[u8], pos: &mut usize) -> Result<String, BitstreamError> {
    if *pos + 2 > data.len() {
        return Err(BitstreamError::Malformed("truncated header field".to_string()));
    }
    let len = u16::from_be_bytes(*array_ref!(data, *pos, 2)) as usize;
    *pos += 2;
    if *pos + len > data.len() {
        return Err(BitstreamError::Malformed("truncated header field".to_string()));
    }
    let raw = &data[*pos..*pos + len];
    *pos += len;
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    Ok(String::from_utf8_lossy(raw).into_owned())
}

/// Part names stored in 7-Series headers omit the vendor prefix and speed
/// grade (`7a35tcsg324`); normalize to the full form used by the device
/// database.
fn normalize_part(name: &str) -> String {
    if name.starts_with('7') {
        format!("xc{name}-1")
    } else {
        name.to_string()
    }
}

/// Reads the `.bit` container header, if present.
pub fn read_header(data: &[u8]) -> Result<BitHeader, BitstreamError> {
    if data.len() < 13
        || u16::from_be_bytes(*array_ref!(data, 0, 2)) != 9
        || data[2..11] != BIT_MAGIC
    {
        return Ok(BitHeader::default());
    }
    let mut header = BitHeader::default();
    let mut pos = 13;
    loop {
        if pos >= data.len() {
            return Err(BitstreamError::Malformed(
                "header ends without a data record".to_string(),
            ));
        }
        let key = data[pos];
        pos += 1;
        match key {
            b'a' => header.design = Some(header_string(data, &mut pos)?),
            b'b' => header.part = Some(normalize_part(&header_string(data, &mut pos)?)),
            b'c' => header.date = Some(header_string(data, &mut pos)?),
            b'd' => header.time = Some(header_string(data, &mut pos)?),
            b'e' => {
                if pos + 4 > data.len() {
                    return Err(BitstreamError::Malformed(
                        "truncated header length record".to_string(),
                    ));
                }
                pos += 4;
                header.stream_start = pos;
                return Ok(header);
            }
            _ => {
                return Err(BitstreamError::Malformed(format!(
                    "unknown header record {key:#04x}"
                )))
            }
        }
    }
}

fn fill_frames(
    bs: &mut Bitstream,
    part: &PartFrames,
    cur: &mut Option<usize>,
    data: &[u8],
) -> Result<(), BitstreamError> {
    if data.len() % 4 != 0 {
        return Err(BitstreamError::Malformed(
            "FDRI payload is not word aligned".to_string(),
        ));
    }
    let list = part.frames();
    let mut idx = match *cur {
        Some(idx) => idx,
        None => {
            return Err(BitstreamError::Malformed(
                "FDRI write without a preceding FAR write".to_string(),
            ))
        }
    };
    let nwords = data.len() / 4;
    let word = |i: usize| u32::from_be_bytes(*array_ref!(data, i * 4, 4));
    let mut pos = 0;
    while pos + FRAME_WORDS <= nwords && idx < list.len() {
        // two pad frames are inserted whenever the clock row changes
        if pos > 0
            && idx > 0
            && PartFrames::clock_row_of(list[idx - 1]) != PartFrames::clock_row_of(list[idx])
        {
            pos += 2 * FRAME_WORDS;
            if pos + FRAME_WORDS > nwords {
                break;
            }
        }
        let frame = bs.frame_mut(list[idx]);
        for w in 0..FRAME_WORDS {
            let mut val = word(pos + w);
            if w == HCLK_WORD {
                val &= !((1u32 << HCLK_BITS) - 1);
            }
            for b in 0..32 {
                frame.set(w * 32 + b, (val >> b) & 1 != 0);
            }
        }
        idx += 1;
        pos += FRAME_WORDS;
    }
    *cur = Some(idx);
    Ok(())
}

/// Parses a 7-Series configuration stream (with or without the `.bit`
/// container header) against the part's frame list.
pub fn parse(data: &[u8], part: &PartFrames) -> Result<Bitstream, BitstreamError> {
    let header = read_header(data)?;
    let mut bs = Bitstream {
        part_name: header.part.clone(),
        ..Bitstream::default()
    };
    let mut parser = PacketParser::new(&data[header.stream_start..]);
    let mut synced = false;
    let mut cur_frame: Option<usize> = None;
    while let Some(packet) = parser.next() {
        match packet? {
            Packet::SyncWord => synced = true,
            Packet::DummyWord | Packet::WidthDetect | Packet::Nop => (),
            Packet::Type1Read { .. } => (),
            Packet::Type1Write { reg: Reg::Fdri, data }
            | Packet::Type2Write { reg: Reg::Fdri, data } => {
                fill_frames(&mut bs, part, &mut cur_frame, data)?;
            }
            Packet::Type1Write { reg: Reg::Far, data } if data.len() == 4 => {
                let addr = u32::from_be_bytes(*array_ref!(data, 0, 4));
                match part.frame_index(addr) {
                    Some(idx) => cur_frame = Some(idx),
                    // the final FAR write points past the fabric
                    None => cur_frame = None,
                }
            }
            Packet::Type1Write { reg, data } if data.len() == 4 => {
                bs.regs[reg] = Some(u32::from_be_bytes(*array_ref!(data, 0, 4)));
            }
            Packet::Type1Write { .. } | Packet::Type2Write { .. } => (),
        }
    }
    if !synced {
        return Err(BitstreamError::Malformed(
            "no sync word in configuration stream".to_string(),
        ));
    }
    Ok(bs)
}
