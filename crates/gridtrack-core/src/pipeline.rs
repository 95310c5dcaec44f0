//! Pipeline orchestration
//!
//! Decides which stages a recording still needs by inspecting the
//! checkpoint, then drives the snippet loop: read a block, spectrogram
//! it, extract detections, append them to the accumulated state. After
//! extraction the state is persisted and tracking assigns identities.

use crate::checkpoint::CheckpointStore;
use crate::config::AnalysisConfig;
use crate::extract::ExtractionStrategy;
use crate::progress::ProgressSink;
use crate::snippet::snippets;
use crate::source::DataSource;
use crate::spectrogram::Spectrogram;
use crate::state::PipelineState;
use crate::tracking::Tracker;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;

/// What a recording still needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No usable checkpoint: extract detections, then track
    Extraction,
    /// Detections exist but none carries an identity
    Tracking,
    /// Detections exist and identities are assigned
    Done,
}

/// Outcome of one [`Pipeline::run`]
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Stage the run started from
    pub initial_stage: Stage,
    pub extraction_ran: bool,
    pub tracking_ran: bool,
    /// Total accumulated detections
    pub detections: usize,
    /// Length of the global time axis
    pub time_bins: usize,
    /// Distinct identities after tracking
    pub identities: usize,
    pub elapsed_secs: f64,
}

/// Drives one recording through its remaining stages
pub struct Pipeline<S: DataSource> {
    source: S,
    spec: Spectrogram,
    strategy: Box<dyn ExtractionStrategy>,
    tracker: Box<dyn Tracker>,
    store: CheckpointStore,
    cfg: AnalysisConfig,
    progress: Box<dyn ProgressSink>,
    state: PipelineState,
    stage: Stage,
    channels: usize,
}

impl<S: DataSource> Pipeline<S> {
    /// Assemble a pipeline and decide its starting stage
    ///
    /// With `renew` any existing checkpoint is ignored and all stages
    /// run again. Otherwise: no checkpoint starts at extraction, a
    /// checkpoint without identities starts at tracking, and one with
    /// identities needs nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        spec: Spectrogram,
        strategy: Box<dyn ExtractionStrategy>,
        tracker: Box<dyn Tracker>,
        store: CheckpointStore,
        cfg: AnalysisConfig,
        progress: Box<dyn ProgressSink>,
        renew: bool,
    ) -> Result<Self> {
        let (state, stage) = if renew {
            log::info!("Renew requested, discarding any pre-analyzed data");
            (PipelineState::new(), Stage::Extraction)
        } else {
            match store.load()? {
                None => {
                    log::info!("No pre-analyzed data found, starting extraction");
                    (PipelineState::new(), Stage::Extraction)
                }
                Some(state) if !state.any_assigned() => {
                    log::info!("Found detections without identities, starting tracking");
                    (state, Stage::Tracking)
                }
                Some(state) => {
                    log::info!("Recording is fully analyzed");
                    (state, Stage::Done)
                }
            }
        };

        let channels = cfg
            .data
            .channel_limit
            .map_or(source.channels(), |limit| limit.min(source.channels()));

        Ok(Self {
            source,
            spec,
            strategy,
            tracker,
            store,
            cfg,
            progress,
            state,
            stage,
            channels,
        })
    }

    /// Stage the next [`run`](Self::run) would start from
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Run every stage the recording still needs
    pub fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let initial_stage = self.stage;
        let mut extraction_ran = false;
        let mut tracking_ran = false;

        if self.stage == Stage::Extraction {
            self.run_extraction()?;
            extraction_ran = true;
        }
        if self.stage == Stage::Tracking {
            self.run_tracking()?;
            tracking_ran = true;
        }

        let identities: BTreeSet<u32> = self.state.ident_v.iter().flatten().copied().collect();
        Ok(RunSummary {
            initial_stage,
            extraction_ran,
            tracking_ran,
            detections: self.state.len(),
            time_bins: self.state.times.len(),
            identities: identities.len(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    fn run_extraction(&mut self) -> Result<()> {
        let size = self.spec.snippet_size();
        let overlap = self.spec.snippet_overlap();
        let iter = snippets(self.source.frames(), size, overlap)
            .context("Cannot window the recording into snippets")?;
        let total = iter.count_hint();
        log::info!(
            "Extraction: {} snippets of {} samples ({} overlap), {} channels",
            total,
            size,
            overlap,
            self.channels
        );

        self.spec.set_output_dir(self.store.dir());
        self.progress.begin(total as u64);
        let rate = self.source.rate();

        for snip in iter {
            let snippet_start = Instant::now();
            self.spec.final_snippet = snip.is_final;

            let mut block = self.source.read_block(snip.start, snip.len)?;
            block.truncate(self.channels);

            let offset = self.spec.times().len();
            self.spec
                .process_snippet(&block, snip.start as f64 / rate)?;
            let spec_done = Instant::now();

            let detections = self
                .strategy
                .extract(&self.spec.snapshot(), &self.cfg.harmonics)?;
            self.state
                .append(&detections, offset, self.spec.times().len())?;

            log::debug!(
                "Snippet {}: {} detections, spectrogram {:.2}s, extraction {:.2}s",
                self.spec.snippets_done(),
                detections.len(),
                (spec_done - snippet_start).as_secs_f64(),
                spec_done.elapsed().as_secs_f64()
            );
            self.progress.advance();
        }
        self.progress.finish();

        self.state.times = self.spec.times().to_vec();
        // State persists once per extraction pass; an interrupted run
        // redoes every snippet.
        self.store.save(&self.state, self.channels)?;
        self.spec.save()?;
        self.stage = Stage::Tracking;
        Ok(())
    }

    fn run_tracking(&mut self) -> Result<()> {
        log::info!(
            "Tracking {} detections with the {} tracker",
            self.state.len(),
            self.tracker.name()
        );
        let labels = self.tracker.track(&self.state, &self.cfg.tracking)?;
        self.state.replace_identities(labels)?;
        self.store.save(&self.state, self.channels)?;
        self.stage = Stage::Done;
        Ok(())
    }
}
