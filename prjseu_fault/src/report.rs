//! Textual fault report, one banner-delimited block per bit group, with
//! the statistics footer at the end of the run.

use crate::{BitClass, Fault, FaultRecord, GroupReport, Statistics};
use itertools::Itertools;
use std::io::{self, Write};
use std::path::Path;

fn heavy_divider() -> String {
    "=".repeat(70)
}

fn soft_divider() -> String {
    "-".repeat(30)
}

fn subst_const_nets(text: &str) -> String {
    text.replace("GLOBAL_LOGIC0", "<const0>")
        .replace("GLOBAL_LOGIC1", "<const1>")
}

fn failure_text(rec: &FaultRecord) -> String {
    match &rec.fault {
        Fault::ClbAltered { bit_name, .. } => format!(
            "{bit_name} bit altered for {}",
            rec.design_name.as_deref().unwrap_or("NA")
        ),
        Fault::Routing { opens, shorts } => {
            let mut parts = Vec::new();
            if !opens.is_empty() {
                parts.push(format!("Opens created for net(s): {}", opens.iter().join(", ")));
            }
            if !shorts.is_empty() {
                parts.push(format!(
                    "Shorts formed between net(s): {}",
                    shorts.iter().join(", ")
                ));
            }
            subst_const_nets(&parts.join("; "))
        }
        Fault::Errorless { reason } => reason.to_string(),
        Fault::Unevaluated => "fault evaluation not yet supported for this bit".to_string(),
    }
}

fn tile_type_of(tile: &str) -> &str {
    match tile.find("_X") {
        Some(pos) => &tile[..pos],
        None => tile,
    }
}

/// Nets referenced by a routing failure, cleaned for selection commands:
/// placeholders dropped, markers stripped, global logic renamed.
fn selectable_nets(rec: &FaultRecord) -> Vec<String> {
    let Fault::Routing { opens, shorts } = &rec.fault else {
        return vec![];
    };
    opens
        .iter()
        .chain(shorts.iter())
        .filter(|n| !n.starts_with("Unconnected Node("))
        .map(|n| subst_const_nets(n.trim_end_matches(" (initially connected)")))
        .sorted()
        .dedup()
        .collect()
}

fn write_tcl_cmds<W: Write>(out: &mut W, rec: &FaultRecord) -> io::Result<()> {
    writeln!(out, "\n\tVivado Tcl Commands:")?;
    if matches!(rec.fault, Fault::Routing { .. }) {
        let tile = rec.tile.as_deref().unwrap_or("NA");
        if rec.class == BitClass::Routing && !rec.affected_pips.is_empty() {
            let pips = rec
                .affected_pips
                .iter()
                .map(|pip| {
                    let head = pip.split(" (").next().unwrap_or(pip.as_str());
                    format!("{tile}/{}.{head}", tile_type_of(tile))
                })
                .sorted()
                .join(" ");
            writeln!(out, "\t\tselect_objects [get_pips {{{pips}}}]")?;
        }
        let nets = selectable_nets(rec);
        if !nets.is_empty() {
            writeln!(out, "\t\tselect_objects [get_nets {{{}}}]", nets.join(" "))?;
        }
    }
    if !rec.affected_resources.is_empty() {
        writeln!(
            out,
            "\t\tselect_objects [get_cells {{{}}}]",
            rec.affected_resources.iter().sorted().join(" ")
        )?;
    }
    writeln!(out)?;
    Ok(())
}

fn write_significant<W: Write>(out: &mut W, records: &[&FaultRecord]) -> io::Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    writeln!(out, "Significant Bits:\n{}", soft_divider())?;
    for rec in records {
        writeln!(out, "{} ({})", rec.coord, rec.direction)?;
        let tile = rec.tile.as_deref().unwrap_or("NA");
        if rec.functions.len() > 1 {
            writeln!(out, "\tBit Functions:")?;
            for fctn in &rec.functions {
                writeln!(out, "\t\t{tile} - {fctn}")?;
            }
        } else {
            let fctn = rec.functions.first().map(String::as_str).unwrap_or("NA");
            writeln!(out, "\t{tile} - {fctn}")?;
        }
        writeln!(
            out,
            "\tResource Design Name: {}",
            rec.design_name.as_deref().unwrap_or("NA")
        )?;
        writeln!(out, "\t{}", failure_text(rec))?;
        if rec.class == BitClass::Routing {
            writeln!(out, "\tAffected PIPs:")?;
            if rec.affected_pips.is_empty() {
                writeln!(out, "\t\tNA")?;
            }
            for pip in &rec.affected_pips {
                writeln!(out, "\t\t{pip}")?;
            }
        }
        writeln!(out, "\tAffected Resources:")?;
        if rec.affected_resources.is_empty() {
            writeln!(out, "\t\tNo affected resources found")?;
        }
        for rsrc in rec.affected_resources.iter().sorted() {
            writeln!(out, "\t\t{rsrc}")?;
        }
        if rec.trace_truncated {
            writeln!(
                out,
                "\n\tNote: downstream trace stopped at the node limit; the listed\n\tresources are partial"
            )?;
        }
        write_tcl_cmds(out, rec)?;
    }
    Ok(())
}

fn write_undefined<W: Write>(out: &mut W, records: &[&FaultRecord]) -> io::Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    writeln!(out, "Undefined Bits:\n{}", soft_divider())?;
    for rec in records {
        writeln!(out, "{} ({})", rec.coord, rec.direction)?;
        writeln!(out, "\tPotential Affected Resources:")?;
        if rec.candidates.is_empty() {
            writeln!(out, "\t\tNo potential tiles found")?;
        }
        for cand in rec.candidates.iter().sorted_by_key(|c| &c.tile) {
            writeln!(out, "\t\t{}:", cand.tile)?;
            if cand.cells.is_empty() {
                writeln!(out, "\t\t\tNo resources found for this tile")?;
            }
            for (bel, cell) in cand.cells.iter().sorted() {
                writeln!(out, "\t\t\t{bel}: {cell}")?;
            }
        }
    }
    writeln!(out)?;
    Ok(())
}

fn write_errorless<W: Write>(out: &mut W, records: &[&FaultRecord]) -> io::Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    writeln!(out, "Errorless Bits:\n{}", soft_divider())?;
    for rec in records {
        writeln!(
            out,
            "{} ({}): {} - {} - {}",
            rec.coord,
            rec.direction,
            rec.tile.as_deref().unwrap_or("NA"),
            rec.functions.first().map(String::as_str).unwrap_or("NA"),
            rec.design_name.as_deref().unwrap_or("NA"),
        )?;
        writeln!(out, "\t{}", failure_text(rec))?;
    }
    writeln!(out)?;
    Ok(())
}

/// Writes every bit group block and returns the accumulated statistics.
pub fn write_fault_report<W: Write>(
    out: &mut W,
    groups: &[GroupReport],
) -> io::Result<Statistics> {
    let mut total = Statistics::default();
    for group in groups {
        if group.records.is_empty() {
            continue;
        }
        writeln!(out, "{}", heavy_divider())?;
        writeln!(out, "{}Bit Group {}", " ".repeat(29), group.index)?;
        writeln!(out, "{}\n", heavy_divider())?;

        let significant: Vec<&FaultRecord> = group
            .records
            .iter()
            .filter(|r| r.is_significant())
            .collect();
        let undefined: Vec<&FaultRecord> = group
            .records
            .iter()
            .filter(|r| matches!(r.class, BitClass::Undefined | BitClass::Unknown))
            .collect();
        let errorless: Vec<&FaultRecord> = group
            .records
            .iter()
            .filter(|r| {
                !r.is_significant()
                    && !matches!(r.class, BitClass::Undefined | BitClass::Unknown)
            })
            .collect();

        write_significant(out, &significant)?;
        write_undefined(out, &undefined)?;
        write_errorless(out, &errorless)?;

        let stats = group.stats();
        writeln!(out, "Bits: {}", stats.fault_bits)?;
        writeln!(
            out,
            "Errors Found: {} ({:.2}%)\n",
            stats.errors_found(),
            stats.error_rate()
        )?;
        total.update(&stats);
    }
    Ok(total)
}

fn write_centered<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    let offset = 35usize.saturating_sub(text.len() / 2);
    writeln!(out, "{}{text}", " ".repeat(offset))
}

/// Appends the run footer: the modeled design, the query backend, the
/// elapsed time, and the statistics table.
pub fn write_stat_footer<W: Write>(
    out: &mut W,
    design_file: &Path,
    provider: &str,
    elapsed_secs: f64,
    stats: &Statistics,
) -> io::Result<()> {
    let design_name = design_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    writeln!(out, "\n{}", heavy_divider())?;
    write_centered(out, &format!("Design modeled: {design_name}"))?;
    write_centered(out, &format!("Design query used: {provider}"))?;
    writeln!(
        out,
        "\t\t\t\tTotal time elapsed: {elapsed_secs:.2} sec\t({} min)",
        (elapsed_secs / 60.0) as u64
    )?;
    writeln!(out, "{}\n", "-".repeat(70))?;
    write!(out, "{stats}")?;
    Ok(())
}
