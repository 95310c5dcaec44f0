//! gtdump - inspect a gridtrack checkpoint directory
//!
//! Usage: gtdump <checkpoint_dir>

use anyhow::Result;
use clap::Parser;
use gridtrack_core::CheckpointStore;
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gtdump")]
#[command(about = "Summarize the analysis state stored in a checkpoint directory", long_about = None)]
struct Args {
    /// Checkpoint directory written by gridtrack
    dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Off
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let store = CheckpointStore::new(&args.dir);
    let Some(state) = store.load()? else {
        anyhow::bail!("No checkpoint found in {}", args.dir.display());
    };

    let assigned = state.ident_v.iter().filter(|id| id.is_some()).count();
    let identities: BTreeSet<u32> = state.ident_v.iter().flatten().copied().collect();
    let duration = match (state.times.first(), state.times.last()) {
        (Some(first), Some(last)) => last - first,
        _ => 0.0,
    };
    let (fund_min, fund_max) = state.fund_v.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), &f| (lo.min(f), hi.max(f)),
    );

    let mut report = serde_json::json!({
        "checkpoint_dir": args.dir.display().to_string(),
        "detections": state.len(),
        "time_bins": state.times.len(),
        "duration_seconds": duration,
        "assigned": assigned,
        "identities": identities.len(),
    });
    if !state.is_empty() {
        report["fundamental_min_hz"] = fund_min.into();
        report["fundamental_max_hz"] = fund_max.into();
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
