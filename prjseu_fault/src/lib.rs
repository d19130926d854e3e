use prjseu_bitstream::BitCoord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod eval;
pub mod report;
mod stats;

pub use eval::{Evaluator, GroupReport};
pub use stats::Statistics;

#[derive(Debug, thiserror::Error)]
pub enum FaultError {
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
    #[error("{path}: bit group {group}: malformed bit entry {entry:?}")]
    MalformedBit {
        path: PathBuf,
        group: usize,
        entry: String,
    },
}

/// Parses a fault-bit list: a JSON array of bit groups, each an array of
/// `[frame_hex, word_dec, bit_dec]` string triples. Groups keep input
/// order and are numbered from 1 by the caller.
pub fn parse_fault_bits(path: impl AsRef<Path>) -> Result<Vec<Vec<BitCoord>>, FaultError> {
    let path = path.as_ref();
    let f = std::fs::File::open(path).map_err(|source| FaultError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: Vec<Vec<[String; 3]>> = serde_json::from_reader(std::io::BufReader::new(f))
        .map_err(|source| FaultError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    let mut groups = Vec::with_capacity(raw.len());
    for (gi, group) in raw.iter().enumerate() {
        let mut bits = Vec::with_capacity(group.len());
        for [frame, word, bit] in group {
            let coord = BitCoord::from_fields(frame, word, bit).ok_or_else(|| {
                FaultError::MalformedBit {
                    path: path.to_path_buf(),
                    group: gi + 1,
                    entry: format!("{frame} {word} {bit}"),
                }
            })?;
            bits.push(coord);
        }
        groups.push(bits);
    }
    Ok(groups)
}

/// Flip direction of a fault bit, from its current bitstream value.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum Direction {
    /// 0 -> 1
    DrivenHigh,
    /// 1 -> 0
    DrivenLow,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::DrivenHigh => "0->1",
            Direction::DrivenLow => "1->0",
        })
    }
}

/// Coarse classification of a fault bit.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum BitClass {
    Routing,
    Clb,
    Unsupported,
    Unknown,
    Undefined,
}

/// Reasons a defined bit produces no design failure.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ErrorlessReason {
    NoFailureFound,
    NoCellPlaced,
}

impl std::fmt::Display for ErrorlessReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorlessReason::NoFailureFound => {
                "Not able to find any failures caused by this fault"
            }
            ErrorlessReason::NoCellPlaced => "No instanced resource found for this bit",
        })
    }
}

/// The evaluated effect of one fault bit.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Fault {
    /// A site configuration bit of a placed resource was altered.
    ClbAltered { bit_name: String, cells: Vec<String> },
    /// Routing disturbance: nets opened and/or shorted. Entries are
    /// display names, sorted ascending, `Unconnected Node(x)` for nodes
    /// with no net.
    Routing {
        opens: Vec<String>,
        shorts: Vec<String>,
    },
    Errorless { reason: ErrorlessReason },
    /// Unsupported / unknown / undefined bits carry no evaluation.
    Unevaluated,
}

impl Fault {
    pub fn is_significant(&self) -> bool {
        matches!(self, Fault::ClbAltered { .. } | Fault::Routing { .. })
    }
}

/// Cells found in one candidate tile of an unknown bit.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandidateTile {
    pub tile: String,
    /// `(site.bel, cell)` pairs, sorted.
    pub cells: Vec<(String, String)>,
}

/// Everything known about one evaluated fault bit, in report order.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub coord: BitCoord,
    pub direction: Direction,
    pub class: BitClass,
    pub tile: Option<String>,
    /// Dash-joined physical function descriptions, one per database
    /// function claiming the bit.
    pub functions: Vec<String>,
    pub design_name: Option<String>,
    pub fault: Fault,
    /// `<in>-><out> (activated|deactivated)` entries; routing bits only.
    pub affected_pips: Vec<String>,
    pub affected_resources: Vec<String>,
    /// Candidate tiles of an unknown bit.
    pub candidates: Vec<CandidateTile>,
    pub trace_truncated: bool,
}

impl FaultRecord {
    pub fn is_significant(&self) -> bool {
        self.fault.is_significant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_bit_list() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"[[["00402b22","007","15"]],[["2483","77","14"],["00002486","077","14"]]]"#)
            .unwrap();
        let groups = parse_fault_bits(f.path()).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], vec!["bit_00402b22_007_15".parse().unwrap()]);
        // short fields are zero-filled by numeric parsing
        assert_eq!(
            groups[1],
            vec![
                "bit_00002483_077_14".parse().unwrap(),
                "bit_00002486_077_14".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn parse_bit_list_rejects_bad_fields() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"[[["00402b2x","007","15"]]]"#).unwrap();
        assert!(matches!(
            parse_fault_bits(f.path()),
            Err(FaultError::MalformedBit { group: 1, .. })
        ));
    }

    #[test]
    fn parse_bit_list_rejects_bad_shape() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"[[["00402b22","007"]]]"#).unwrap();
        assert!(matches!(
            parse_fault_bits(f.path()),
            Err(FaultError::Json { .. })
        ));
    }
}
