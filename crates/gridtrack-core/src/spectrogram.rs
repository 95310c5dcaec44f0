//! Windowed spectrogram engine
//!
//! Consumes one snippet of multi-channel samples at a time and maintains
//! the per-channel power spectra of the current snippet, the summed
//! cross-channel spectrum, the frequency axis and the growing global
//! time axis. Optionally retains a full ("fine") and a decimated
//! ("sparse") summed spectrogram for later inspection.

use crate::config::SpectrogramConfig;
use anyhow::{Context, Result};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Split an FFT length into hop and overlap
///
/// `overlap_frac` is the fraction of each FFT frame shared with the
/// next one. The hop is always at least one sample.
pub fn step_and_overlap(nfft: usize, overlap_frac: f64) -> (usize, usize) {
    let noverlap = ((nfft as f64) * overlap_frac).round() as usize;
    let noverlap = noverlap.min(nfft - 1);
    (nfft - noverlap, noverlap)
}

/// Largest snippet length not exceeding `len` that frames evenly
///
/// A snippet of the returned length produces FFT frames at offsets
/// `0, hop, 2*hop, ...` with the last frame ending exactly at the
/// snippet end.
pub fn aligned_snippet_len(len: usize, hop: usize, nfft: usize) -> usize {
    if len < nfft {
        return len;
    }
    nfft + ((len - nfft) / hop) * hop
}

/// Read-only view of one snippet's spectral data
///
/// Handed to the extraction strategies; workers never touch the live
/// engine buffers through anything but this snapshot.
pub struct SnippetSpectra<'a> {
    /// Frequency axis (Hz), uniform spacing
    pub freqs: &'a [f64],
    /// Summed cross-channel power, indexed `[freq][time]`
    pub sum: &'a [Vec<f32>],
    /// Per-channel power, indexed `[channel][freq][time]`
    pub spec: &'a [Vec<Vec<f32>>],
    /// Number of local time bins in this snippet
    pub time_bins: usize,
}

impl SnippetSpectra<'_> {
    /// Summed power column of one local time bin
    pub fn sum_column(&self, t: usize) -> Vec<f32> {
        self.sum.iter().map(|row| row[t]).collect()
    }

    /// Per-channel power at one frequency bin and local time bin
    pub fn signature(&self, fbin: usize, t: usize) -> Vec<f32> {
        self.spec.iter().map(|ch| ch[fbin][t]).collect()
    }

    /// Index of the frequency-axis bin nearest to `freq`
    pub fn nearest_bin(&self, freq: f64) -> usize {
        let df = self.freqs[1] - self.freqs[0];
        ((freq / df).round() as usize).min(self.freqs.len() - 1)
    }
}

/// Streaming spectrogram engine
pub struct Spectrogram {
    rate: f64,
    nfft: usize,
    hop: usize,
    channels: usize,
    snippet_size: usize,
    snippet_overlap: usize,

    /// Set by the orchestrator before the last snippet so the framing
    /// does not leave trailing frames for a window that never comes.
    pub final_snippet: bool,
    /// Retain the full summed spectrogram on disk
    pub keep_fine: bool,
    /// Retain a decimated summed spectrogram in memory
    pub keep_sparse: bool,

    snippets_done: usize,
    times: Vec<f64>,
    snippet_times: Vec<f64>,
    freqs: Vec<f64>,
    spec: Vec<Vec<Vec<f32>>>,
    sum_spec: Vec<Vec<f32>>,

    sparse_stride: usize,
    sparse_freqs: Vec<f64>,
    sparse_times: Vec<f64>,
    sparse_spec: Vec<Vec<f32>>,

    out_dir: Option<PathBuf>,
    fine_writer: Option<BufWriter<File>>,
    fine_rows: u64,

    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    win_sq_sum: f32,
}

impl Spectrogram {
    /// Build an engine with explicit window sizes, all in samples
    pub fn new(
        rate: f64,
        channels: usize,
        nfft: usize,
        hop: usize,
        snippet_size: usize,
        snippet_overlap: usize,
        cfg: &SpectrogramConfig,
    ) -> Result<Self> {
        if channels == 0 {
            anyhow::bail!("Spectrogram needs at least one channel");
        }
        if snippet_size < nfft {
            anyhow::bail!(
                "snippet size ({snippet_size}) must be at least one FFT length ({nfft})"
            );
        }
        if snippet_overlap >= snippet_size {
            anyhow::bail!("snippet overlap must be smaller than the snippet size");
        }

        let n_bins = nfft / 2 + 1;
        let freqs = (0..n_bins).map(|k| k as f64 * rate / nfft as f64).collect();

        let window = hann_window(nfft);
        let win_sq_sum = window.iter().map(|w| w * w).sum();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(nfft);

        Ok(Self {
            rate,
            nfft,
            hop,
            channels,
            snippet_size,
            snippet_overlap,
            final_snippet: false,
            keep_fine: cfg.keep_fine,
            keep_sparse: cfg.keep_sparse,
            snippets_done: 0,
            times: Vec::new(),
            snippet_times: Vec::new(),
            freqs,
            spec: Vec::new(),
            sum_spec: Vec::new(),
            sparse_stride: cfg.sparse_stride,
            sparse_freqs: (0..n_bins)
                .step_by(cfg.sparse_stride)
                .map(|k| k as f64 * rate / nfft as f64)
                .collect(),
            sparse_times: Vec::new(),
            sparse_spec: Vec::new(),
            out_dir: None,
            fine_writer: None,
            fine_rows: 0,
            fft,
            window,
            win_sq_sum,
        })
    }

    /// Build an engine from configuration, deriving aligned sizes
    ///
    /// The snippet length is rounded down so FFT frames tile it evenly,
    /// and the snippet overlap is rounded up so the step between
    /// snippets is a whole number of hops. Both adjustments keep the
    /// global time axis gap- and duplicate-free.
    pub fn from_config(rate: f64, channels: usize, cfg: &SpectrogramConfig) -> Result<Self> {
        let (hop, noverlap) = step_and_overlap(cfg.nfft, cfg.overlap_frac);

        let requested = (cfg.snippet_seconds * rate) as usize;
        let snippet_size = aligned_snippet_len(requested, hop, cfg.nfft);
        if snippet_size < cfg.nfft {
            anyhow::bail!(
                "snippet_seconds ({}) yields fewer samples than one FFT ({})",
                cfg.snippet_seconds,
                cfg.nfft
            );
        }

        let mut overlap = ((cfg.snippet_overlap_frac * snippet_size as f64) as usize).max(noverlap);
        let rem = (snippet_size - overlap) % hop;
        if rem != 0 {
            overlap += hop - rem;
        }
        if overlap >= snippet_size {
            anyhow::bail!("snippet_overlap_frac leaves no forward step between snippets");
        }

        log::debug!(
            "Spectrogram framing: nfft {}, hop {}, snippet {} samples, overlap {} samples",
            cfg.nfft,
            hop,
            snippet_size,
            overlap
        );

        Self::new(rate, channels, cfg.nfft, hop, snippet_size, overlap, cfg)
    }

    /// Snippet length in samples
    pub fn snippet_size(&self) -> usize {
        self.snippet_size
    }

    /// Overlap between consecutive snippets in samples
    pub fn snippet_overlap(&self) -> usize {
        self.snippet_overlap
    }

    /// Number of snippets processed so far
    pub fn snippets_done(&self) -> usize {
        self.snippets_done
    }

    /// Global time axis (seconds), one value per produced time bin
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Local time axis of the most recent snippet
    pub fn snippet_times(&self) -> &[f64] {
        &self.snippet_times
    }

    /// Frequency axis (Hz)
    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    /// Summed cross-channel power of the current snippet, `[freq][time]`
    pub fn sum_spec(&self) -> &[Vec<f32>] {
        &self.sum_spec
    }

    /// Directory used for retained spectrogram products
    pub fn set_output_dir(&mut self, dir: &Path) {
        self.out_dir = Some(dir.to_path_buf());
    }

    /// Read-only snapshot of the current snippet's spectral data
    pub fn snapshot(&self) -> SnippetSpectra<'_> {
        SnippetSpectra {
            freqs: &self.freqs,
            sum: &self.sum_spec,
            spec: &self.spec,
            time_bins: self.snippet_times.len(),
        }
    }

    /// Compute the spectrogram of one snippet
    ///
    /// `block` is channel-major raw data, `t0` the time of the snippet's
    /// first sample. For non-final snippets, frames starting inside the
    /// trailing snippet overlap are left to the next snippet, which
    /// recomputes them from its own leading samples.
    pub fn process_snippet(&mut self, block: &[Vec<f32>], t0: f64) -> Result<()> {
        if block.len() != self.channels {
            anyhow::bail!(
                "Snippet has {} channels, engine expects {}",
                block.len(),
                self.channels
            );
        }
        let len = block[0].len();
        if block.iter().any(|c| c.len() != len) {
            anyhow::bail!("Snippet channels have unequal lengths");
        }
        if len < self.nfft {
            anyhow::bail!("Snippet shorter than one FFT length");
        }

        let keep_limit = if self.final_snippet {
            len
        } else {
            len - self.snippet_overlap
        };
        let starts: Vec<usize> = (0..)
            .map(|k| k * self.hop)
            .take_while(|s| s + self.nfft <= len && *s < keep_limit)
            .collect();
        let n_frames = starts.len();
        let n_bins = self.freqs.len();

        self.snippet_times = starts
            .iter()
            .map(|s| t0 + (*s + self.nfft / 2) as f64 / self.rate)
            .collect();
        if let (Some(last), Some(first)) = (self.times.last(), self.snippet_times.first()) {
            if first <= last {
                anyhow::bail!("Snippet time axis is not strictly increasing");
            }
        }

        self.spec = vec![vec![vec![0.0; n_frames]; n_bins]; self.channels];
        self.sum_spec = vec![vec![0.0; n_frames]; n_bins];

        let scale = 2.0 / self.win_sq_sum;
        let mut frame = vec![Complex::new(0.0f32, 0.0); self.nfft];

        for (ch, samples) in block.iter().enumerate() {
            for (t, &start) in starts.iter().enumerate() {
                for (i, value) in frame.iter_mut().enumerate() {
                    *value = Complex::new(samples[start + i] * self.window[i], 0.0);
                }
                self.fft.process(&mut frame);

                for (f, row) in self.spec[ch].iter_mut().enumerate() {
                    let power = frame[f].norm_sqr() * scale;
                    row[t] = power;
                    self.sum_spec[f][t] += power;
                }
            }
        }

        self.times.extend_from_slice(&self.snippet_times);

        if self.keep_sparse {
            for t in 0..n_frames {
                self.sparse_times.push(self.snippet_times[t]);
                self.sparse_spec.push(
                    (0..n_bins)
                        .step_by(self.sparse_stride)
                        .map(|f| self.sum_spec[f][t])
                        .collect(),
                );
            }
        }
        if self.keep_fine {
            self.append_fine_rows(n_frames, n_bins)?;
        }

        self.snippets_done += 1;
        Ok(())
    }

    /// Append the snippet's summed columns to the raw fine-spec file
    fn append_fine_rows(&mut self, n_frames: usize, n_bins: usize) -> Result<()> {
        let Some(dir) = &self.out_dir else {
            return Ok(());
        };
        if self.fine_writer.is_none() {
            std::fs::create_dir_all(dir)?;
            let path = dir.join("fine_spec.raw");
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            self.fine_writer = Some(BufWriter::new(file));
        }
        let Some(writer) = self.fine_writer.as_mut() else {
            return Ok(());
        };
        for t in 0..n_frames {
            for f in 0..n_bins {
                writer.write_all(&self.sum_spec[f][t].to_le_bytes())?;
            }
        }
        self.fine_rows += n_frames as u64;
        Ok(())
    }

    /// Persist retained spectrogram products
    ///
    /// Writes the sparse spectrogram arrays, flushes the fine-spec file
    /// and records the axis shapes in `spectrogram_meta.json`. A no-op
    /// when no output directory was set.
    pub fn save(&mut self) -> Result<()> {
        let Some(dir) = self.out_dir.clone() else {
            log::debug!("No output directory set, skipping spectrogram save");
            return Ok(());
        };
        std::fs::create_dir_all(&dir)?;

        if self.keep_sparse {
            gridtrack_store::write_f64(&dir.join("sparse_times.gtv"), &self.sparse_times)?;
            gridtrack_store::write_f64(&dir.join("sparse_freqs.gtv"), &self.sparse_freqs)?;
            gridtrack_store::write_f32_matrix(&dir.join("sparse_spec.gtv"), &self.sparse_spec)?;
        }
        if let Some(writer) = self.fine_writer.as_mut() {
            writer.flush()?;
        }

        let meta = serde_json::json!({
            "rate": self.rate,
            "nfft": self.nfft,
            "hop": self.hop,
            "channels": self.channels,
            "freq_bins": self.freqs.len(),
            "fine_rows": self.fine_rows,
            "time_bins": self.times.len(),
        });
        std::fs::write(
            dir.join("spectrogram_meta.json"),
            serde_json::to_string_pretty(&meta)?,
        )?;
        Ok(())
    }
}

/// Hann window of the given length
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = i as f32 / (size - 1) as f32;
            0.5 * (1.0 - (2.0 * PI * x).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(freq: f64, rate: f64, len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * std::f64::consts::PI * freq * i as f64 / rate).sin() as f32)
            .collect()
    }

    fn test_cfg() -> SpectrogramConfig {
        SpectrogramConfig {
            keep_fine: false,
            keep_sparse: false,
            ..SpectrogramConfig::default()
        }
    }

    #[test]
    fn hann_window_shape() {
        let window = hann_window(512);
        assert_eq!(window.len(), 512);
        assert!(window[0].abs() < 0.001);
        assert!((window[256] - 1.0).abs() < 0.001);
    }

    #[test]
    fn step_and_overlap_splits_nfft() {
        let (hop, noverlap) = step_and_overlap(1024, 0.5);
        assert_eq!(hop, 512);
        assert_eq!(noverlap, 512);

        let (hop, _) = step_and_overlap(1024, 0.999);
        assert!(hop >= 1);
    }

    #[test]
    fn aligned_len_tiles_evenly() {
        let len = aligned_snippet_len(4100, 512, 1024);
        assert_eq!(len, 4096);
        assert_eq!((len - 1024) % 512, 0);
    }

    #[test]
    fn sine_peak_lands_on_expected_bin() {
        let rate = 20_000.0;
        let mut spec = Spectrogram::new(rate, 1, 1024, 512, 4096, 512, &test_cfg()).unwrap();
        spec.final_snippet = true;

        let samples = sine(300.0, rate, 4096, 1.0);
        spec.process_snippet(&[samples], 0.0).unwrap();

        let snap = spec.snapshot();
        assert!(snap.time_bins > 0);
        let column = snap.sum_column(0);
        let peak_bin = column
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        let bin_width = rate / 1024.0;
        assert_relative_eq!(snap.freqs[peak_bin], 300.0, epsilon = bin_width);
    }

    #[test]
    fn non_final_snippet_leaves_overlap_frames() {
        let rate = 20_000.0;
        let mut spec = Spectrogram::new(rate, 1, 1024, 512, 4096, 512, &test_cfg()).unwrap();

        let samples = sine(300.0, rate, 4096, 1.0);
        spec.process_snippet(&[samples.clone()], 0.0).unwrap();
        // frames at 0, 512, ..., 3072: start < 4096 - 512
        assert_eq!(spec.snippet_times().len(), 7);

        spec.final_snippet = true;
        let t0 = (4096.0 - 512.0) / rate;
        spec.process_snippet(&[samples], t0).unwrap();
        assert_eq!(spec.snippet_times().len(), 7);

        // global axis strictly increasing across the boundary
        let times = spec.times();
        assert_eq!(times.len(), 14);
        for pair in times.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn sum_spec_adds_channels() {
        let rate = 20_000.0;
        let mut spec = Spectrogram::new(rate, 2, 1024, 512, 4096, 512, &test_cfg()).unwrap();
        spec.final_snippet = true;

        let ch0 = sine(300.0, rate, 4096, 1.0);
        let ch1 = sine(300.0, rate, 4096, 1.0);
        spec.process_snippet(&[ch0, ch1], 0.0).unwrap();

        let snap = spec.snapshot();
        let fbin = snap.nearest_bin(300.0);
        let sig = snap.signature(fbin, 0);
        assert_eq!(sig.len(), 2);
        assert_relative_eq!(
            snap.sum[fbin][0],
            sig[0] + sig[1],
            max_relative = 1e-5
        );
    }

    #[test]
    fn channel_mismatch_is_rejected() {
        let mut spec =
            Spectrogram::new(20_000.0, 2, 1024, 512, 4096, 512, &test_cfg()).unwrap();
        let err = spec.process_snippet(&[vec![0.0; 4096]], 0.0);
        assert!(err.is_err());
    }
}
