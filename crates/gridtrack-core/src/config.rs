//! Typed analysis configuration
//!
//! One named section per analysis stage, loaded from TOML. Unknown keys
//! are rejected at load time rather than silently accepted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name searched next to the recording
pub const CONFIG_FILE_NAME: &str = "gridtrack.toml";

/// Top-level configuration, one section per processing stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AnalysisConfig {
    pub data: DataConfig,
    pub spectrogram: SpectrogramConfig,
    pub harmonics: HarmonicConfig,
    pub tracking: TrackingConfig,
}

/// Data acquisition parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DataConfig {
    /// Restrict analysis to the first N channels (all channels if absent)
    pub channel_limit: Option<usize>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { channel_limit: None }
    }
}

/// Spectrogram and snippet windowing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SpectrogramConfig {
    /// Snippet length in seconds of raw signal per processing window
    pub snippet_seconds: f64,
    /// Fraction of the snippet shared with the following snippet
    pub snippet_overlap_frac: f64,
    /// FFT length in samples
    pub nfft: usize,
    /// Overlap fraction between consecutive FFT frames
    pub overlap_frac: f64,
    /// Retain the full summed spectrogram on disk
    pub keep_fine: bool,
    /// Retain a decimated spectrogram for plotting
    pub keep_sparse: bool,
    /// Frequency decimation stride of the sparse spectrogram
    pub sparse_stride: usize,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            snippet_seconds: 30.0,
            snippet_overlap_frac: 0.05,
            nfft: 1 << 15,
            overlap_frac: 0.9,
            keep_fine: true,
            keep_sparse: true,
            sparse_stride: 8,
        }
    }
}

/// Harmonic-group detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HarmonicConfig {
    /// Lowest accepted fundamental frequency (Hz)
    pub min_freq: f64,
    /// Highest accepted fundamental frequency (Hz)
    pub max_freq: f64,
    /// Peaks must exceed the column noise floor by this many dB
    pub peak_threshold_db: f64,
    /// Half width of the frequency max filter, in bins
    pub max_filter_bins: usize,
    /// Relative tolerance when matching a peak to a harmonic multiple
    pub harmonic_tolerance: f64,
    /// Highest harmonic multiple considered during grouping
    pub max_harmonics: usize,
    /// Minimum number of peaks for a valid group
    pub min_group_size: usize,
}

impl Default for HarmonicConfig {
    fn default() -> Self {
        Self {
            min_freq: 250.0,
            max_freq: 1200.0,
            peak_threshold_db: 10.0,
            max_filter_bins: 5,
            harmonic_tolerance: 0.02,
            max_harmonics: 5,
            min_group_size: 1,
        }
    }
}

/// Identity tracking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrackingConfig {
    /// Largest frequency jump (Hz) allowed between linked detections
    pub freq_tolerance: f64,
    /// Largest time gap (seconds) a trajectory may bridge
    pub max_dt: f64,
    /// Weight of signature distance relative to frequency distance
    pub signature_weight: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            freq_tolerance: 2.5,
            max_dt: 10.0,
            signature_weight: 0.5,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AnalysisConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, or search near the recording, or fall
    /// back to defaults
    ///
    /// The search looks for `gridtrack.toml` in the recording folder and
    /// its parent, in that order.
    pub fn load_or_default(explicit: Option<&Path>, recording_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(found) = Self::find_config(recording_dir) {
            log::info!("Config file from: {}", found.display());
            return Self::load(&found);
        }
        log::info!("No config file found, using defaults.");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    fn find_config(recording_dir: &Path) -> Option<PathBuf> {
        let mut candidates = vec![recording_dir.join(CONFIG_FILE_NAME)];
        if let Some(parent) = recording_dir.parent() {
            candidates.push(parent.join(CONFIG_FILE_NAME));
        }
        candidates.into_iter().find(|p| p.is_file())
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let s = &self.spectrogram;
        if s.snippet_seconds <= 0.0 {
            anyhow::bail!("snippet_seconds must be > 0");
        }
        if !(0.0..1.0).contains(&s.snippet_overlap_frac) {
            anyhow::bail!("snippet_overlap_frac must be in [0, 1)");
        }
        if s.nfft == 0 || !s.nfft.is_power_of_two() {
            anyhow::bail!("nfft must be a power of two");
        }
        if !(0.0..1.0).contains(&s.overlap_frac) {
            anyhow::bail!("overlap_frac must be in [0, 1)");
        }
        if s.sparse_stride == 0 {
            anyhow::bail!("sparse_stride must be > 0");
        }

        let h = &self.harmonics;
        if h.min_freq >= h.max_freq {
            anyhow::bail!("min_freq must be < max_freq");
        }
        if h.max_harmonics == 0 || h.min_group_size == 0 {
            anyhow::bail!("max_harmonics and min_group_size must be > 0");
        }
        if h.min_group_size > h.max_harmonics {
            anyhow::bail!("min_group_size must not exceed max_harmonics");
        }

        let t = &self.tracking;
        if t.freq_tolerance <= 0.0 || t.max_dt <= 0.0 {
            anyhow::bail!("freq_tolerance and max_dt must be > 0");
        }
        Ok(())
    }
}
