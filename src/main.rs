use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};

use vspace_core::{build_adapter, build_process_maps, export_virtual_memory_elf, walk, DumpReader};

#[derive(Parser, Debug)]
#[command(name = "vspace-reconstruct")]
#[command(version, about = "Reconstructs per-process virtual address spaces from a physical memory dump")]
struct Args {
    /// Physical-memory dump in ELF format
    dump_elf: PathBuf,

    /// JSON array of per-process MMU register snapshots
    mmu_snapshot_json: PathBuf,

    /// Directory for process.{index}.elf outputs
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Increase log verbosity (stacks with RUST_LOG)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    quiet: u8,
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose, args.quiet);

    if let Err(err) = run(&args) {
        for cause in err.chain() {
            error!("Error: {cause}");
        }
        for cause in err.chain().skip(1) {
            debug!("Caused by: {cause}");
        }
        std::process::exit(1);
    }
}

fn init_logger(verbose: u8, quiet: u8) {
    let default_level = match verbose as i16 - quiet as i16 {
        ..=-1 => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::builder()
        .parse_env(env_logger::Env::new().filter_or("RUST_LOG", default_level))
        .format_timestamp(None)
        .init();
}

fn run(args: &Args) -> Result<()> {
    let dump = DumpReader::open(&args.dump_elf)
        .with_context(|| format!("failed to open dump {}", args.dump_elf.display()))?;

    let snapshot_bytes = std::fs::read(&args.mmu_snapshot_json)
        .with_context(|| format!("failed to read {}", args.mmu_snapshot_json.display()))?;
    let snapshots: Vec<HashMap<String, u64>> = serde_json::from_slice(&snapshot_bytes)
        .with_context(|| format!("failed to parse {}", args.mmu_snapshot_json.display()))?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create output directory {}", args.out_dir.display()))?;

    info!("loaded {} process snapshot(s) from {}", snapshots.len(), args.mmu_snapshot_json.display());

    for (idx, registers) in snapshots.iter().enumerate() {
        if let Err(err) = process_one(&dump, registers, idx, &args.out_dir) {
            error!("process {idx}: {err:#}");
        }
    }

    Ok(())
}

fn process_one(
    dump: &DumpReader,
    registers: &HashMap<String, u64>,
    idx: usize,
    out_dir: &std::path::Path,
) -> Result<()> {
    let (adapter, table_addr) = build_adapter(dump.machine(), registers)
        .context("failed to select an architecture adapter")?;

    let (mapping, reverse_mapping) = walk(dump, &adapter, table_addr);
    let walk_result = build_process_maps(dump, &mapping, &reverse_mapping)
        .context("walk produced no exportable mappings")?;

    info!(
        "process {idx}: {} mapping(s), {} page(s) dropped (unresolvable offset), {} kernel-only page(s) excluded",
        walk_result.mapped_pages, walk_result.dropped_unresolvable, walk_result.kernel_excluded
    );
    if walk_result.v2o.is_empty() {
        warn!("process {idx}: no virtually-contiguous runs translated to a file offset");
    }

    let out_path = out_dir.join(format!("process.{idx}.elf"));
    export_virtual_memory_elf(dump, dump.machine(), &mapping, &out_path)
        .with_context(|| format!("failed to write {}", out_path.display()))?;

    info!("process {idx}: wrote {}", out_path.display());
    Ok(())
}
