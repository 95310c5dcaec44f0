//! Checkpoint persistence
//!
//! One directory per recording holds the five state arrays plus a small
//! manifest. A save always serializes the full state; a load either
//! finds all five arrays or none — anything in between is an error the
//! caller must resolve explicitly (typically with `--renew`).

use crate::state::PipelineState;
use chrono::Utc;
use gridtrack_store::StoreError;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FUND_FILE: &str = "fund_v.gtv";
const IDX_FILE: &str = "idx_v.gtv";
const SIGN_FILE: &str = "sign_v.gtv";
const IDENT_FILE: &str = "ident_v.gtv";
const TIMES_FILE: &str = "times.gtv";

const STATE_FILES: [&str; 5] = [FUND_FILE, IDX_FILE, SIGN_FILE, IDENT_FILE, TIMES_FILE];

/// Sentinel for an unassigned identity in the on-disk i64 array
const UNASSIGNED: i64 = -1;

/// Errors raised while saving or loading checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(
        "partial checkpoint in {dir}: found {present:?} but missing {missing:?}; \
         re-run with --renew to discard it"
    )]
    Partial {
        dir: PathBuf,
        present: Vec<&'static str>,
        missing: Vec<&'static str>,
    },

    #[error("checkpoint arrays have inconsistent lengths ({0} vs {1})")]
    Inconsistent(usize, usize),

    #[error("invalid identity label {0} in checkpoint")]
    BadIdentity(i64),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Persists and reloads [`PipelineState`] in one directory
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Checkpoint directory, also the final output location
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize the full state
    pub fn save(&self, state: &PipelineState, channels: usize) -> Result<(), CheckpointError> {
        std::fs::create_dir_all(&self.dir)?;

        gridtrack_store::write_f64(&self.dir.join(FUND_FILE), &state.fund_v)?;
        gridtrack_store::write_u64(&self.dir.join(IDX_FILE), &state.idx_v)?;
        gridtrack_store::write_f32_matrix(&self.dir.join(SIGN_FILE), &state.sign_v)?;
        let idents: Vec<i64> = state
            .ident_v
            .iter()
            .map(|id| id.map_or(UNASSIGNED, |v| v as i64))
            .collect();
        gridtrack_store::write_i64(&self.dir.join(IDENT_FILE), &idents)?;
        gridtrack_store::write_f64(&self.dir.join(TIMES_FILE), &state.times)?;

        let manifest = serde_json::json!({
            "format_version": gridtrack_store::VERSION,
            "created_at": Utc::now().to_rfc3339(),
            "detections": state.len(),
            "time_bins": state.times.len(),
            "channels": channels,
        });
        std::fs::write(
            self.dir.join("manifest.json"),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        log::info!(
            "Saved checkpoint: {} detections, {} time bins -> {}",
            state.len(),
            state.times.len(),
            self.dir.display()
        );
        Ok(())
    }

    /// Load a previously saved state
    ///
    /// `Ok(None)` when no checkpoint exists. A partial set of arrays is
    /// an error, never silently treated as absent.
    pub fn load(&self) -> Result<Option<PipelineState>, CheckpointError> {
        let (present, missing): (Vec<&'static str>, Vec<&'static str>) = STATE_FILES
            .into_iter()
            .partition(|f| self.dir.join(f).is_file());

        if present.is_empty() {
            return Ok(None);
        }
        if !missing.is_empty() {
            return Err(CheckpointError::Partial {
                dir: self.dir.clone(),
                present,
                missing,
            });
        }

        let fund_v = gridtrack_store::read_f64(&self.dir.join(FUND_FILE))?;
        let idx_v = gridtrack_store::read_u64(&self.dir.join(IDX_FILE))?;
        let sign_v = gridtrack_store::read_f32_matrix(&self.dir.join(SIGN_FILE))?;
        let idents = gridtrack_store::read_i64(&self.dir.join(IDENT_FILE))?;
        let times = gridtrack_store::read_f64(&self.dir.join(TIMES_FILE))?;

        for (name, len) in [
            (IDX_FILE, idx_v.len()),
            (SIGN_FILE, sign_v.len()),
            (IDENT_FILE, idents.len()),
        ] {
            if len != fund_v.len() {
                log::error!("{name} length {} does not match fund_v", len);
                return Err(CheckpointError::Inconsistent(fund_v.len(), len));
            }
        }

        let ident_v = idents
            .into_iter()
            .map(|v| match v {
                UNASSIGNED => Ok(None),
                v if v >= 0 && v <= u32::MAX as i64 => Ok(Some(v as u32)),
                v => Err(CheckpointError::BadIdentity(v)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "Loading pre-analyzed data: {} detections from {}",
            fund_v.len(),
            self.dir.display()
        );
        Ok(Some(PipelineState {
            fund_v,
            idx_v,
            sign_v,
            ident_v,
            times,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> PipelineState {
        PipelineState {
            fund_v: vec![300.5, 620.25, 301.0],
            idx_v: vec![0, 0, 1],
            sign_v: vec![vec![0.5, 0.1], vec![0.2, 0.9], vec![0.6, 0.1]],
            ident_v: vec![Some(0), Some(1), None],
            times: vec![0.0256, 0.0512],
        }
    }

    #[test]
    fn round_trip_is_value_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        let state = sample_state();
        store.save(&state, 2).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded.fund_v, state.fund_v);
        assert_eq!(loaded.idx_v, state.idx_v);
        assert_eq!(loaded.sign_v, state.sign_v);
        assert_eq!(loaded.ident_v, state.ident_v);
        assert_eq!(loaded.times, state.times);
    }

    #[test]
    fn empty_directory_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("not_yet_created"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn partial_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(&sample_state(), 2).unwrap();

        std::fs::remove_file(dir.path().join(IDENT_FILE)).unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, CheckpointError::Partial { .. }));
    }

    #[test]
    fn save_overwrites_completely() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        store.save(&sample_state(), 2).unwrap();
        let mut smaller = sample_state();
        smaller.fund_v.truncate(1);
        smaller.idx_v.truncate(1);
        smaller.sign_v.truncate(1);
        smaller.ident_v.truncate(1);
        store.save(&smaller, 2).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
