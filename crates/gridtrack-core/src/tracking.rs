//! Identity tracking
//!
//! Links detections across time bins into persistent identities. The
//! built-in tracker is a greedy continuity matcher: it walks the time
//! axis in order, keeps a set of active tracks, and links each
//! detection to the cheapest compatible track, combining frequency
//! distance with spatial-signature distance. Detections no track can
//! absorb seed new identities, so every detection ends up labeled.

use crate::config::TrackingConfig;
use crate::state::PipelineState;
use anyhow::{bail, Result};

/// Assigns an identity label to every detection
pub trait Tracker: Send {
    fn name(&self) -> &'static str;

    /// Compute one label per detection, in detection order
    fn track(&self, state: &PipelineState, cfg: &TrackingConfig) -> Result<Vec<Option<u32>>>;
}

/// Greedy frequency/signature continuity tracker
pub struct ContinuityTracker;

struct Track {
    id: u32,
    freq: f64,
    last_seen: f64,
    signature: Vec<f32>,
}

impl Tracker for ContinuityTracker {
    fn name(&self) -> &'static str {
        "continuity"
    }

    fn track(&self, state: &PipelineState, cfg: &TrackingConfig) -> Result<Vec<Option<u32>>> {
        if let Some(&idx) = state.idx_v.iter().find(|&&i| i >= state.times.len() as u64) {
            bail!(
                "detection references time bin {idx} but the time axis has {} bins",
                state.times.len()
            );
        }

        // Detections sorted by time bin; appends already produce this
        // order, the sort only guards reloaded data.
        let mut order: Vec<usize> = (0..state.len()).collect();
        order.sort_by_key(|&i| state.idx_v[i]);

        let mut labels = vec![None; state.len()];
        let mut active: Vec<Track> = Vec::new();
        let mut next_id: u32 = 0;

        let mut bin_start = 0;
        while bin_start < order.len() {
            let bin = state.idx_v[order[bin_start]];
            let bin_end = bin_start
                + order[bin_start..]
                    .iter()
                    .take_while(|&&i| state.idx_v[i] == bin)
                    .count();
            let now = state.times[bin as usize];

            active.retain(|t| now - t.last_seen <= cfg.max_dt);

            // One detection per track per time bin
            let mut claimed = vec![false; active.len()];
            for &i in &order[bin_start..bin_end] {
                let freq = state.fund_v[i];
                let sig = &state.sign_v[i];

                let mut best: Option<(usize, f64)> = None;
                for (k, t) in active.iter().enumerate() {
                    if claimed[k] {
                        continue;
                    }
                    let df = (freq - t.freq).abs();
                    if df > cfg.freq_tolerance {
                        continue;
                    }
                    let cost = df / cfg.freq_tolerance
                        + cfg.signature_weight * signature_distance(sig, &t.signature);
                    if best.map_or(true, |(_, c)| cost < c) {
                        best = Some((k, cost));
                    }
                }

                let id = match best {
                    Some((k, _)) => {
                        claimed[k] = true;
                        let t = &mut active[k];
                        t.freq = freq;
                        t.last_seen = now;
                        t.signature = sig.clone();
                        t.id
                    }
                    None => {
                        let id = next_id;
                        next_id += 1;
                        active.push(Track {
                            id,
                            freq,
                            last_seen: now,
                            signature: sig.clone(),
                        });
                        claimed.push(true);
                        id
                    }
                };
                labels[i] = Some(id);
            }

            bin_start = bin_end;
        }

        log::info!(
            "Tracking linked {} detections into {} identities",
            state.len(),
            next_id
        );
        Ok(labels)
    }
}

/// Cosine distance between two per-channel power signatures
///
/// Zero for identical spatial patterns regardless of overall loudness;
/// approaches one as the patterns decorrelate.
fn signature_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        dot += x as f64 * y as f64;
        na += x as f64 * x as f64;
        nb += y as f64 * y as f64;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na.sqrt() * nb.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Detection;

    fn cfg() -> TrackingConfig {
        TrackingConfig {
            freq_tolerance: 2.5,
            max_dt: 10.0,
            signature_weight: 0.5,
        }
    }

    fn state_from(rows: &[(f64, usize, Vec<f32>)], times: Vec<f64>) -> PipelineState {
        let mut state = PipelineState::new();
        let detections: Vec<Detection> = rows
            .iter()
            .map(|(freq, bin, sig)| Detection {
                freq: *freq,
                local_bin: *bin,
                signature: sig.clone(),
            })
            .collect();
        state.append(&detections, 0, times.len()).unwrap();
        state.times = times;
        state
    }

    #[test]
    fn stable_tones_keep_their_identity() {
        let rows: Vec<(f64, usize, Vec<f32>)> = (0..20)
            .flat_map(|bin| {
                vec![
                    (300.0 + 0.1 * bin as f64, bin, vec![1.0, 0.1]),
                    (620.0, bin, vec![0.1, 1.0]),
                ]
            })
            .collect();
        let times: Vec<f64> = (0..20).map(|i| i as f64 * 0.0256).collect();
        let state = state_from(&rows, times);

        let labels = ContinuityTracker.track(&state, &cfg()).unwrap();
        assert!(labels.iter().all(|l| l.is_some()));

        let low: Vec<u32> = labels.iter().step_by(2).map(|l| l.unwrap()).collect();
        let high: Vec<u32> = labels.iter().skip(1).step_by(2).map(|l| l.unwrap()).collect();
        assert!(low.iter().all(|&id| id == low[0]));
        assert!(high.iter().all(|&id| id == high[0]));
        assert_ne!(low[0], high[0]);
    }

    #[test]
    fn long_silence_breaks_a_track() {
        let rows = vec![
            (300.0, 0, vec![1.0, 0.1]),
            (300.0, 1, vec![1.0, 0.1]),
            // gap of 15 s exceeds max_dt
            (300.0, 3, vec![1.0, 0.1]),
        ];
        let state = state_from(&rows, vec![0.0, 1.0, 12.0, 16.0]);

        let labels = ContinuityTracker.track(&state, &cfg()).unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_ne!(labels[1], labels[2]);
    }

    #[test]
    fn signatures_disambiguate_crossing_frequencies() {
        // Two sources at nearly the same frequency, told apart only by
        // which channels carry their power.
        let rows = vec![
            (400.0, 0, vec![1.0, 0.0]),
            (401.0, 0, vec![0.0, 1.0]),
            (401.0, 1, vec![0.0, 1.0]),
            (400.5, 1, vec![1.0, 0.0]),
        ];
        let state = state_from(&rows, vec![0.0, 0.1]);

        let labels = ContinuityTracker.track(&state, &cfg()).unwrap();
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[0], labels[3]);
        assert_ne!(labels[0], labels[1]);
    }

    #[test]
    fn one_track_claims_at_most_one_detection_per_bin() {
        let rows = vec![
            (500.0, 0, vec![1.0, 1.0]),
            (500.4, 1, vec![1.0, 1.0]),
            (500.6, 1, vec![1.0, 1.0]),
        ];
        let state = state_from(&rows, vec![0.0, 0.1]);

        let labels = ContinuityTracker.track(&state, &cfg()).unwrap();
        assert!(labels.iter().all(|l| l.is_some()));
        assert_ne!(labels[1], labels[2]);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut state = state_from(&[(300.0, 0, vec![1.0])], vec![0.0]);
        state.times.clear();
        assert!(ContinuityTracker.track(&state, &cfg()).is_err());
    }

    #[test]
    fn empty_state_tracks_to_nothing() {
        let state = PipelineState::new();
        let labels = ContinuityTracker.track(&state, &cfg()).unwrap();
        assert!(labels.is_empty());
    }
}
