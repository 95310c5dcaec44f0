//! Raw data sources
//!
//! A [`DataSource`] provides the sample stream of one electrode-grid
//! recording: its rate, channel count, total length, and block-wise
//! reads so a multi-hour file never has to fit in memory at once.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// A multi-channel sample stream with random block access
pub trait DataSource {
    /// Sample rate in Hz
    fn rate(&self) -> f64;

    /// Number of channels
    fn channels(&self) -> usize;

    /// Total number of sample frames
    fn frames(&self) -> usize;

    /// Read `len` frames starting at frame `start`, channel-major
    ///
    /// The returned vector holds one `Vec<f32>` of length `len` per
    /// channel. Reading past the end of the stream is an error.
    fn read_block(&mut self, start: usize, len: usize) -> Result<Vec<Vec<f32>>>;
}

/// WAV-backed data source with seek-based block reads
pub struct WavSource {
    reader: hound::WavReader<BufReader<File>>,
    rate: f64,
    channels: usize,
    frames: usize,
    norm: f32,
    float_format: bool,
}

impl WavSource {
    /// Open a WAV file
    pub fn open(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        let frames = reader.duration() as usize;

        let (norm, float_format) = match spec.sample_format {
            hound::SampleFormat::Float => (1.0, true),
            hound::SampleFormat::Int => ((1i64 << (spec.bits_per_sample - 1)) as f32, false),
        };

        log::info!(
            "Opened {}: {} channels, {} frames @ {} Hz",
            path.display(),
            channels,
            frames,
            spec.sample_rate
        );

        Ok(Self {
            reader,
            rate: spec.sample_rate as f64,
            channels,
            frames,
            norm,
            float_format,
        })
    }
}

impl DataSource for WavSource {
    fn rate(&self) -> f64 {
        self.rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn frames(&self) -> usize {
        self.frames
    }

    fn read_block(&mut self, start: usize, len: usize) -> Result<Vec<Vec<f32>>> {
        if start + len > self.frames {
            anyhow::bail!(
                "Block [{}, {}) exceeds recording length {}",
                start,
                start + len,
                self.frames
            );
        }

        self.reader
            .seek(start as u32)
            .with_context(|| format!("Failed to seek to frame {start}"))?;

        let mut block = vec![Vec::with_capacity(len); self.channels];
        let total = len * self.channels;

        if self.float_format {
            for (i, sample) in self.reader.samples::<f32>().take(total).enumerate() {
                block[i % self.channels].push(sample?);
            }
        } else {
            for (i, sample) in self.reader.samples::<i32>().take(total).enumerate() {
                block[i % self.channels].push(sample? as f32 / self.norm);
            }
        }

        if block[self.channels - 1].len() != len {
            anyhow::bail!("Short read at frame {start}: WAV data truncated");
        }
        Ok(block)
    }
}

/// In-memory data source, channel-major
///
/// Used for synthetic signals in tests and small recordings.
pub struct SliceSource {
    channels: Vec<Vec<f32>>,
    rate: f64,
}

impl SliceSource {
    /// Build from channel-major sample data
    ///
    /// All channels must have the same length and there must be at least
    /// one channel.
    pub fn new(channels: Vec<Vec<f32>>, rate: f64) -> Result<Self> {
        let Some(first) = channels.first() else {
            anyhow::bail!("SliceSource needs at least one channel");
        };
        let frames = first.len();
        if channels.iter().any(|c| c.len() != frames) {
            anyhow::bail!("All channels must have the same length");
        }
        Ok(Self { channels, rate })
    }
}

impl DataSource for SliceSource {
    fn rate(&self) -> f64 {
        self.rate
    }

    fn channels(&self) -> usize {
        self.channels.len()
    }

    fn frames(&self) -> usize {
        self.channels[0].len()
    }

    fn read_block(&mut self, start: usize, len: usize) -> Result<Vec<Vec<f32>>> {
        if start + len > self.frames() {
            anyhow::bail!(
                "Block [{}, {}) exceeds recording length {}",
                start,
                start + len,
                self.frames()
            );
        }
        Ok(self
            .channels
            .iter()
            .map(|c| c[start..start + len].to_vec())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_source_block_reads() {
        let mut src = SliceSource::new(
            vec![vec![0.0, 1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0, 7.0]],
            1000.0,
        )
        .unwrap();

        assert_eq!(src.channels(), 2);
        assert_eq!(src.frames(), 4);

        let block = src.read_block(1, 2).unwrap();
        assert_eq!(block[0], vec![1.0, 2.0]);
        assert_eq!(block[1], vec![5.0, 6.0]);

        assert!(src.read_block(3, 2).is_err());
    }

    #[test]
    fn slice_source_rejects_ragged_channels() {
        assert!(SliceSource::new(vec![vec![0.0; 4], vec![0.0; 3]], 1000.0).is_err());
    }

    #[test]
    fn wav_source_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two_channel.wav");

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 1000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..100i16 {
            writer.write_sample(i).unwrap();
            writer.write_sample(-i).unwrap();
        }
        writer.finalize().unwrap();

        let mut src = WavSource::open(&path).unwrap();
        assert_eq!(src.channels(), 2);
        assert_eq!(src.frames(), 100);
        assert_eq!(src.rate(), 1000.0);

        let block = src.read_block(10, 4).unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block[0].len(), 4);
        // 16-bit normalization
        assert!((block[0][0] - 10.0 / 32768.0).abs() < 1e-9);
        assert!((block[1][0] + 10.0 / 32768.0).abs() < 1e-9);

        // seeking backwards works too
        let block = src.read_block(0, 2).unwrap();
        assert_eq!(block[0][0], 0.0);
    }
}
