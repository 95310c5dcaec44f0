//! Accumulated pipeline state
//!
//! Four parallel sequences — fundamentals, global time-bin indices,
//! per-channel signatures and identity labels — plus the global time
//! axis. The sequences have equal length at every observable point.

use crate::extract::Detection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by state mutation
#[derive(Debug, Error)]
pub enum StateError {
    #[error("time-bin index {idx} is out of range (time axis has {times_len} bins)")]
    IndexOutOfRange { idx: u64, times_len: usize },

    #[error("identity sequence length mismatch: state has {expected} detections, got {got}")]
    LengthMismatch { expected: usize, got: usize },
}

/// The accumulated result of all processed snippets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    /// Fundamental frequency of each detection (Hz)
    pub fund_v: Vec<f64>,
    /// Global time-bin index of each detection
    pub idx_v: Vec<u64>,
    /// Per-channel power signature of each detection
    pub sign_v: Vec<Vec<f32>>,
    /// Identity label of each detection, `None` until tracking ran
    pub ident_v: Vec<Option<u32>>,
    /// Global time axis (seconds), one value per time bin
    pub times: Vec<f64>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accumulated detections
    pub fn len(&self) -> usize {
        self.fund_v.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fund_v.is_empty()
    }

    /// True when tracking has assigned at least one identity
    pub fn any_assigned(&self) -> bool {
        self.ident_v.iter().any(|id| id.is_some())
    }

    /// Append one snippet's detections
    ///
    /// Local time-bin indices are remapped by `global_offset`, the count
    /// of global time bins recorded before this snippet. `times_len` is
    /// the length of the global time axis after the snippet was
    /// processed; every remapped index must fall below it. Appending
    /// invalidates any previous tracking result, so the whole identity
    /// sequence is reset to unassigned.
    pub fn append(
        &mut self,
        detections: &[Detection],
        global_offset: usize,
        times_len: usize,
    ) -> Result<(), StateError> {
        // Validate up front so a failed append leaves no partial rows
        for d in detections {
            let idx = (global_offset + d.local_bin) as u64;
            if idx >= times_len as u64 {
                return Err(StateError::IndexOutOfRange { idx, times_len });
            }
        }
        for d in detections {
            self.fund_v.push(d.freq);
            self.idx_v.push((global_offset + d.local_bin) as u64);
            self.sign_v.push(d.signature.clone());
        }
        self.ident_v = vec![None; self.fund_v.len()];
        Ok(())
    }

    /// Overwrite the identity sequence with one label per detection
    ///
    /// The other sequences are untouched; the length must match exactly.
    pub fn replace_identities(&mut self, labels: Vec<Option<u32>>) -> Result<(), StateError> {
        if labels.len() != self.len() {
            return Err(StateError::LengthMismatch {
                expected: self.len(),
                got: labels.len(),
            });
        }
        self.ident_v = labels;
        Ok(())
    }
}
