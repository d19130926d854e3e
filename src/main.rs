use clap::Parser;
use prjseu_bitstream::Bitstream;
use prjseu_design::{DesignSource, FileSource};
use prjseu_fault::report::{write_fault_report, write_stat_footer};
use prjseu_fault::{parse_fault_bits, Evaluator};
use prjseu_tilemap::TileMap;
use prjseu_xray::{Database, XrayError};
use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Parser)]
#[command(
    name = "prjseu",
    about = "Analyze configuration-bit upsets against a routed 7-Series design."
)]
struct Args {
    /// Bitstream of the design (.bit), or a pre-decoded set-bit listing (.bits)
    bitstream: PathBuf,
    /// Routed design dump (.json interchange form or compiled snapshot)
    design: PathBuf,
    /// JSON list of fault bit groups
    fault_bits: PathBuf,
    /// Project X-Ray database root
    #[arg(long, default_value = "database/prjxray-db")]
    db: PathBuf,
    /// Part name; required for .bits input, overrides the bitstream header otherwise
    #[arg(long)]
    part: Option<String>,
    /// Report output path (default: <fault_bits stem>_fault_report.txt)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn default_out(fault_bits: &Path) -> PathBuf {
    let stem = fault_bits
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bits".to_string());
    fault_bits.with_file_name(format!("{stem}_fault_report.txt"))
}

fn load_inputs(args: &Args) -> Result<(Database, Bitstream), Box<dyn Error>> {
    if args.bitstream.extension().is_some_and(|e| e == "bits") {
        let text = std::fs::read_to_string(&args.bitstream)?;
        let part = args
            .part
            .clone()
            .ok_or("--part is required with a .bits input")?;
        println!("Loading device database...");
        let db = Database::open(&args.db, &part)?;
        let bits = Bitstream::from_bits_text(&text)?;
        Ok((db, bits))
    } else {
        let data = std::fs::read(&args.bitstream)?;
        let header = prjseu_bitstream::read_header(&data)?;
        let part = args
            .part
            .clone()
            .or(header.part)
            .ok_or("bitstream carries no part name; pass --part")?;
        println!("Loading device database...");
        let db = Database::open(&args.db, &part)?;
        let bits = prjseu_bitstream::parse(&data, &db.frames)?;
        if let (Some(stream_id), Some(db_id)) = (bits.idcode(), db.frames.idcode) {
            if stream_id != db_id {
                return Err(XrayError::UnsupportedPart(format!(
                    "bitstream IDCODE {stream_id:#010x} does not match {part}"
                ))
                .into());
            }
        }
        Ok((db, bits))
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let t_start = Instant::now();

    println!("Reading in design bits...");
    let (db, bits) = load_inputs(&args)?;

    println!("Generating design query...");
    let design = FileSource::new(&args.design).load()?;

    println!("Parsing fault bit list...");
    let groups = parse_fault_bits(&args.fault_bits)?;

    println!("Binding tiles to the bitstream...");
    let map = TileMap::new(&db, &bits);

    println!("Analyzing fault bit groups...");
    let ev = Evaluator::new(&map, &design);
    let reports = ev.run(&groups, None);

    let out_path = args.out.clone().unwrap_or_else(|| default_out(&args.fault_bits));
    println!("Writing fault report to {}...", out_path.display());
    let mut out = BufWriter::new(File::create(&out_path)?);
    let stats = write_fault_report(&mut out, &reports)?;
    write_stat_footer(
        &mut out,
        &args.design,
        "file reader",
        t_start.elapsed().as_secs_f64(),
        &stats,
    )?;
    out.flush()?;
    Ok(())
}
