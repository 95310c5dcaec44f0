//! gridtrack - extract and track fundamental frequencies in a recording
//!
//! Usage: gridtrack <recording.wav | recording_dir>

use anyhow::{Context, Result};
use clap::Parser;
use gridtrack_cli::{output, progress::TerminalProgress};
use gridtrack_core::{analyze_recording, AnalysisConfig, RunOptions};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "gridtrack")]
#[command(about = "Extract and track fundamental frequencies in electrode-grid recordings", long_about = None)]
struct Args {
    /// Recording file, or a directory whose first .wav file is analyzed
    path: PathBuf,

    /// Configuration file (default: gridtrack.toml next to the recording)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force the threaded per-time-bin extraction path
    #[arg(long)]
    cpu: bool,

    /// Worker thread count for the threaded path (default: cores minus one)
    #[arg(long)]
    threads: Option<usize>,

    /// Discard pre-analyzed data and redo all stages
    #[arg(short, long)]
    renew: bool,

    /// Do not retain fine/sparse spectrogram products
    #[arg(short, long)]
    nosave: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let recording = resolve_recording(&args.path)?;
    let save_dir = output_dir_for(&recording)?;

    let recording_dir = recording.parent().unwrap_or_else(|| Path::new("."));
    let cfg = AnalysisConfig::load_or_default(args.config.as_deref(), recording_dir)?;

    let opts = RunOptions {
        cpu_only: args.cpu,
        renew: args.renew,
        nosave: args.nosave,
        threads: args.threads,
    };

    log::info!("Analyzing: {}", recording.display());
    let summary = analyze_recording(
        &recording,
        &save_dir,
        &cfg,
        &opts,
        Box::new(TerminalProgress::new()),
    )?;

    output::print_run_report(&recording, &save_dir, &summary);
    Ok(())
}

/// Accept a file directly, or pick the first .wav file of a directory
fn resolve_recording(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if path.is_dir() {
        let mut wavs: Vec<PathBuf> = std::fs::read_dir(path)
            .with_context(|| format!("Failed to read directory {}", path.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.extension()
                    .map_or(false, |ext| ext.eq_ignore_ascii_case("wav"))
            })
            .collect();
        wavs.sort();
        return wavs
            .into_iter()
            .next()
            .with_context(|| format!("No .wav files in {}", path.display()));
    }
    anyhow::bail!("Recording not found: {}", path.display());
}

/// Analysis products live in a sibling folder named after the recording
fn output_dir_for(recording: &Path) -> Result<PathBuf> {
    let stem = recording
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Recording has no usable file name: {}", recording.display()))?;
    let parent = recording
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(parent.join(format!("{stem}_gridtrack")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_dir_sits_next_to_the_recording() {
        let dir = output_dir_for(Path::new("/data/rec_2024/grid1.wav")).unwrap();
        assert_eq!(dir, PathBuf::from("/data/rec_2024/grid1_gridtrack"));
    }

    #[test]
    fn directory_input_picks_the_first_wav() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.wav"), b"").unwrap();
        std::fs::write(dir.path().join("a.wav"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let picked = resolve_recording(dir.path()).unwrap();
        assert_eq!(picked.file_name().unwrap(), "a.wav");
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_recording(dir.path()).is_err());
    }
}
