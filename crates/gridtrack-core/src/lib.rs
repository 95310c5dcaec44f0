//! Gridtrack Core - Electrode-Grid Recording Analysis Library
//!
//! This crate turns long multi-channel electrode-grid recordings into
//! per-time-bin fundamental frequency detections and links them across
//! time into continuous identities: snippet iteration over the raw
//! samples, a windowed spectrogram engine, harmonic-group extraction
//! (threaded or batched), state accumulation, checkpointing and the
//! pipeline orchestration on top.

pub mod checkpoint;
pub mod config;
pub mod extract;
pub mod harmonics;
pub mod pipeline;
pub mod progress;
pub mod snippet;
pub mod source;
pub mod spectrogram;
pub mod state;
pub mod tracking;

pub use checkpoint::CheckpointStore;
pub use config::AnalysisConfig;
pub use extract::{select_strategy, BatchedExtractor, Detection, ExtractionStrategy, ThreadedExtractor};
pub use pipeline::{Pipeline, RunSummary, Stage};
pub use progress::{NullProgress, ProgressSink};
pub use snippet::{snippets, Snippet};
pub use source::{DataSource, SliceSource, WavSource};
pub use spectrogram::Spectrogram;
pub use state::PipelineState;
pub use tracking::{ContinuityTracker, Tracker};

use anyhow::Result;
use std::path::Path;

/// Run the full analysis for one recording
///
/// Wires a WAV data source, spectrogram engine, extraction strategy and
/// tracker into a [`Pipeline`] and runs whatever stages the checkpoint
/// in `save_dir` still requires.
pub fn analyze_recording(
    audio_path: &Path,
    save_dir: &Path,
    cfg: &AnalysisConfig,
    opts: &RunOptions,
    progress: Box<dyn ProgressSink>,
) -> Result<RunSummary> {
    let source = WavSource::open(audio_path)?;
    let channels = cfg
        .data
        .channel_limit
        .map_or(source.channels(), |limit| limit.min(source.channels()));

    let mut spec = Spectrogram::from_config(source.rate(), channels, &cfg.spectrogram)?;
    if opts.nosave {
        spec.keep_fine = false;
        spec.keep_sparse = false;
    }

    let strategy = select_strategy(opts.cpu_only, opts.threads)?;
    let store = CheckpointStore::new(save_dir);

    let mut pipeline = Pipeline::new(
        source,
        spec,
        strategy,
        Box::new(ContinuityTracker),
        store,
        cfg.clone(),
        progress,
        opts.renew,
    )?;

    pipeline.run()
}

/// Options controlling one analysis run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Force the per-time-bin threaded extraction path
    pub cpu_only: bool,
    /// Discard any pre-analyzed data and redo all stages
    pub renew: bool,
    /// Do not retain fine/sparse spectrogram products
    pub nosave: bool,
    /// Worker thread count override (default: cores minus one)
    pub threads: Option<usize>,
}
