//! Extraction strategies
//!
//! Turn one snippet's spectral data into fundamental-frequency
//! detections. Two interchangeable implementations share the same
//! output contract: a per-time-bin threaded path fanning out across a
//! persistent worker pool, and a batched path handing the whole snippet
//! to the detector in one call. The orchestrator never needs to know
//! which one it drives.

use crate::config::HarmonicConfig;
use crate::harmonics::{self, HarmonicGroup};
use crate::spectrogram::SnippetSpectra;
use anyhow::{Context, Result};
use rayon::prelude::*;

/// One fundamental-frequency finding at one local time bin
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Fundamental frequency (Hz)
    pub freq: f64,
    /// Local time-bin index within the snippet
    pub local_bin: usize,
    /// Per-channel power at the detection's frequency bin
    pub signature: Vec<f32>,
}

/// Turns snippet spectra into detections
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extract detections for every local time bin, in bin order
    fn extract(
        &self,
        spectra: &SnippetSpectra<'_>,
        cfg: &HarmonicConfig,
    ) -> Result<Vec<Detection>>;
}

/// Select the extraction path once at construction time
///
/// The batched path is the default; `cpu_only` forces the threaded
/// per-time-bin path.
pub fn select_strategy(
    cpu_only: bool,
    threads: Option<usize>,
) -> Result<Box<dyn ExtractionStrategy>> {
    let strategy: Box<dyn ExtractionStrategy> = if cpu_only {
        Box::new(ThreadedExtractor::new(threads)?)
    } else {
        Box::new(BatchedExtractor)
    };
    log::info!("Extraction strategy: {}", strategy.name());
    Ok(strategy)
}

/// Detections of one time bin, derived from its harmonic groups
fn detections_for_bin(
    spectra: &SnippetSpectra<'_>,
    t: usize,
    groups: &[HarmonicGroup],
) -> Vec<Detection> {
    groups
        .iter()
        .map(|g| {
            let fbin = spectra.nearest_bin(g.fundamental);
            Detection {
                freq: g.fundamental,
                local_bin: t,
                signature: spectra.signature(fbin, t),
            }
        })
        .collect()
}

/// Per-time-bin extraction over a persistent worker pool
///
/// The pool is created once per run and reused across snippets; each
/// snippet is one bounded parallel map over its time bins. Results are
/// re-assembled by bin index, so the concatenated list is independent
/// of worker scheduling.
pub struct ThreadedExtractor {
    pool: rayon::ThreadPool,
}

impl ThreadedExtractor {
    /// Build with an explicit worker count, or cores minus one
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let default = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1);
        let threads = threads.unwrap_or(default).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("Failed to build extraction worker pool")?;
        log::debug!("Threaded extraction with {threads} workers");
        Ok(Self { pool })
    }
}

impl ExtractionStrategy for ThreadedExtractor {
    fn name(&self) -> &'static str {
        "threaded"
    }

    fn extract(
        &self,
        spectra: &SnippetSpectra<'_>,
        cfg: &HarmonicConfig,
    ) -> Result<Vec<Detection>> {
        let per_bin: Vec<Vec<Detection>> = self.pool.install(|| {
            (0..spectra.time_bins)
                .into_par_iter()
                .map(|t| {
                    let column = spectra.sum_column(t);
                    let groups = harmonics::harmonic_groups(spectra.freqs, &column, cfg);
                    detections_for_bin(spectra, t, &groups)
                })
                .collect()
        });
        Ok(per_bin.into_iter().flatten().collect())
    }
}

/// Whole-snippet batched extraction
///
/// One detector call covers all time bins; no host-side scheduling per
/// bin.
pub struct BatchedExtractor;

impl ExtractionStrategy for BatchedExtractor {
    fn name(&self) -> &'static str {
        "batched"
    }

    fn extract(
        &self,
        spectra: &SnippetSpectra<'_>,
        cfg: &HarmonicConfig,
    ) -> Result<Vec<Detection>> {
        let columns: Vec<Vec<f32>> = (0..spectra.time_bins)
            .map(|t| spectra.sum_column(t))
            .collect();
        let per_bin = harmonics::harmonic_groups_batched(spectra.freqs, &columns, cfg);

        Ok(per_bin
            .iter()
            .enumerate()
            .flat_map(|(t, groups)| detections_for_bin(spectra, t, groups))
            .collect())
    }
}
