use crate::{BitClass, Direction, Fault, FaultRecord};
use serde::Serialize;

/// Aggregate counters for a run (or one bit group). Child entries print a
/// percentage of their parent (`Bit Groups` or `Fault Bits`).
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct Statistics {
    pub bit_groups: u64,
    pub bit_groups_with_errors: u64,
    pub fault_bits: u64,
    pub routing_bits: u64,
    pub clb_bits: u64,
    pub unsupported_bits: u64,
    pub unknown_bits: u64,
    pub errorless_bits: u64,
    pub undefined_bits: u64,
    pub driven_high: u64,
    pub driven_low: u64,
    pub found_errors: u64,
    pub pip_open_errors: u64,
    pub pip_short_errors: u64,
    pub clb_altered_errors: u64,
}

fn percent(n: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        n as f64 / total as f64 * 100.0
    }
}

impl Statistics {
    pub fn from_group(records: &[FaultRecord]) -> Statistics {
        let mut stats = Statistics {
            bit_groups: 1,
            ..Statistics::default()
        };
        for rec in records {
            stats.fault_bits += 1;
            match rec.class {
                BitClass::Routing => stats.routing_bits += 1,
                BitClass::Clb => stats.clb_bits += 1,
                BitClass::Unsupported => stats.unsupported_bits += 1,
                BitClass::Unknown => stats.unknown_bits += 1,
                BitClass::Undefined => stats.undefined_bits += 1,
            }
            match rec.direction {
                Direction::DrivenHigh => stats.driven_high += 1,
                Direction::DrivenLow => stats.driven_low += 1,
            }
            match &rec.fault {
                Fault::ClbAltered { .. } => {
                    stats.clb_altered_errors += 1;
                    stats.found_errors += 1;
                }
                Fault::Routing { opens, shorts } => {
                    stats.pip_open_errors += opens.len() as u64;
                    if !shorts.is_empty() {
                        stats.pip_short_errors += 1;
                    }
                    stats.found_errors += 1;
                }
                Fault::Errorless { .. } => stats.errorless_bits += 1,
                Fault::Unevaluated => (),
            }
        }
        if stats.found_errors > 0 {
            stats.bit_groups_with_errors = 1;
        }
        stats
    }

    pub fn update(&mut self, other: &Statistics) {
        self.bit_groups += other.bit_groups;
        self.bit_groups_with_errors += other.bit_groups_with_errors;
        self.fault_bits += other.fault_bits;
        self.routing_bits += other.routing_bits;
        self.clb_bits += other.clb_bits;
        self.unsupported_bits += other.unsupported_bits;
        self.unknown_bits += other.unknown_bits;
        self.errorless_bits += other.errorless_bits;
        self.undefined_bits += other.undefined_bits;
        self.driven_high += other.driven_high;
        self.driven_low += other.driven_low;
        self.found_errors += other.found_errors;
        self.pip_open_errors += other.pip_open_errors;
        self.pip_short_errors += other.pip_short_errors;
        self.clb_altered_errors += other.clb_altered_errors;
    }

    /// Errors counted for a group trailer: structural error records,
    /// with opens counted per opened net.
    pub fn errors_found(&self) -> u64 {
        self.pip_open_errors + self.pip_short_errors + self.clb_altered_errors
    }

    pub fn error_rate(&self) -> f64 {
        percent(self.errors_found(), self.fault_bits)
    }
}

impl std::fmt::Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rows: [(&str, u64); 15] = [
            ("Bit Groups", self.bit_groups),
            ("Bit Groups w/ Errors", self.bit_groups_with_errors),
            ("Fault Bits", self.fault_bits),
            ("Routing Fault Bits", self.routing_bits),
            ("CLB Fault Bits", self.clb_bits),
            ("Unsupported Fault Bits", self.unsupported_bits),
            ("Unknown Fault Bits", self.unknown_bits),
            ("Errorless Fault Bits", self.errorless_bits),
            ("Undefined Fault Bits", self.undefined_bits),
            ("Bits Driven High", self.driven_high),
            ("Bits Driven Low", self.driven_low),
            ("Found Errors", self.found_errors),
            ("PIP Open Errors", self.pip_open_errors),
            ("PIP Short Errors", self.pip_short_errors),
            ("CLB Altered Bit Errors", self.clb_altered_errors),
        ];
        for (name, value) in rows {
            if matches!(name, "Fault Bits" | "Found Errors") {
                writeln!(f)?;
            }
            match name {
                "Bit Groups" | "Fault Bits" => writeln!(f, "{name}: {value}")?,
                "Bit Groups w/ Errors" => writeln!(
                    f,
                    "{name}: {value} ({:.2}%)",
                    percent(value, self.bit_groups)
                )?,
                _ => writeln!(
                    f,
                    "{name}: {value} ({:.2}%)",
                    percent(value, self.fault_bits)
                )?,
            }
        }
        Ok(())
    }
}
