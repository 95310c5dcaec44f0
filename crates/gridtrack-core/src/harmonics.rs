//! Harmonic-group detection
//!
//! Finds spectral peaks in one summed-power column, groups peaks that
//! sit at near-integer multiples of a candidate fundamental, and reduces
//! each group to a representative fundamental frequency. Peak picking
//! uses a frequency-direction max filter so window sidelobes next to a
//! strong carrier never count as peaks of their own.

use crate::config::HarmonicConfig;

/// One spectral peak inside a harmonic group
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Interpolated peak frequency (Hz)
    pub freq: f64,
    /// Peak power (linear)
    pub power: f64,
    /// Harmonic multiple this peak was matched to (1 = fundamental)
    pub harmonic: usize,
}

/// A cluster of harmonically related peaks
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonicGroup {
    /// Representative fundamental frequency (Hz)
    pub fundamental: f64,
    pub peaks: Vec<Peak>,
}

/// Reduce a group to its representative fundamental
///
/// Power-weighted mean of each peak's frequency divided by its harmonic
/// multiple.
pub fn fundamental_freq(group: &HarmonicGroup) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for p in &group.peaks {
        weighted += p.freq / p.harmonic as f64 * p.power;
        total += p.power;
    }
    if total > 0.0 {
        weighted / total
    } else {
        group.fundamental
    }
}

/// Detect harmonic groups in one time bin's summed spectrum
pub fn harmonic_groups(freqs: &[f64], power: &[f32], cfg: &HarmonicConfig) -> Vec<HarmonicGroup> {
    let peaks = detect_peaks(freqs, power, cfg);
    group_peaks(peaks, cfg)
}

/// Detect harmonic groups for a whole snippet in one batched call
///
/// `columns` holds one summed-power column per local time bin. Returns
/// one group list per column, in time-bin order.
pub fn harmonic_groups_batched(
    freqs: &[f64],
    columns: &[Vec<f32>],
    cfg: &HarmonicConfig,
) -> Vec<Vec<HarmonicGroup>> {
    columns
        .iter()
        .map(|column| harmonic_groups(freqs, column, cfg))
        .collect()
}

/// A raw spectral peak before grouping
#[derive(Debug, Clone, Copy)]
struct RawPeak {
    freq: f64,
    power: f64,
}

/// Pick spectral peaks above an adaptive threshold
///
/// A bin is a peak when it equals the max-filtered spectrum at its
/// position and exceeds the column's median power by
/// `peak_threshold_db`. Peak frequencies are refined by quadratic
/// interpolation on log power.
fn detect_peaks(freqs: &[f64], power: &[f32], cfg: &HarmonicConfig) -> Vec<RawPeak> {
    let n = power.len();
    if n < 3 || freqs.len() != n {
        return Vec::new();
    }

    // Noise floor from the median of the column
    let mut sorted: Vec<f32> = power.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let floor = sorted[n / 2].max(f32::MIN_POSITIVE);
    let threshold = floor as f64 * 10f64.powf(cfg.peak_threshold_db / 10.0);

    // Search only where a harmonic of an accepted fundamental can live
    let f_hi = cfg.max_freq * cfg.max_harmonics as f64;
    let half = cfg.max_filter_bins;

    let mut peaks = Vec::new();
    for i in 1..n - 1 {
        if freqs[i] < cfg.min_freq || freqs[i] > f_hi {
            continue;
        }
        let p = power[i];
        if (p as f64) < threshold {
            continue;
        }

        let lo = i.saturating_sub(half);
        let hi = (i + half + 1).min(n);
        let window_max = power[lo..hi].iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        if p < window_max {
            continue;
        }
        // Flat-top ties resolve to the leftmost bin
        if power[lo..i].iter().any(|&q| q == p) {
            continue;
        }

        peaks.push(RawPeak {
            freq: interpolate_peak(freqs, power, i),
            power: p as f64,
        });
    }
    peaks
}

/// Quadratic interpolation of the true peak position
///
/// Fits a parabola through the log powers of the peak bin and its two
/// neighbors; the vertex offset is clamped to half a bin.
fn interpolate_peak(freqs: &[f64], power: &[f32], i: usize) -> f64 {
    let df = freqs[1] - freqs[0];
    let eps = f32::MIN_POSITIVE;
    let l = (power[i - 1].max(eps) as f64).ln();
    let c = (power[i].max(eps) as f64).ln();
    let r = (power[i + 1].max(eps) as f64).ln();

    let denom = l - 2.0 * c + r;
    if denom.abs() < 1e-12 {
        return freqs[i];
    }
    let offset = (0.5 * (l - r) / denom).clamp(-0.5, 0.5);
    freqs[i] + offset * df
}

/// Greedily group peaks at near-integer multiples of a fundamental
///
/// Candidates are tried from low to high frequency; peaks claimed by a
/// group are not reused, so the strongest low fundamental wins its
/// harmonics.
fn group_peaks(peaks: Vec<RawPeak>, cfg: &HarmonicConfig) -> Vec<HarmonicGroup> {
    let mut used = vec![false; peaks.len()];
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| {
        peaks[a]
            .freq
            .partial_cmp(&peaks[b].freq)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut groups = Vec::new();
    for &i in &order {
        if used[i] {
            continue;
        }
        let f0 = peaks[i].freq;
        if f0 < cfg.min_freq || f0 > cfg.max_freq {
            continue;
        }

        let mut members = vec![Peak {
            freq: f0,
            power: peaks[i].power,
            harmonic: 1,
        }];
        let mut member_idx = vec![i];

        for harmonic in 2..=cfg.max_harmonics {
            let target = f0 * harmonic as f64;
            let tolerance = target * cfg.harmonic_tolerance;

            let mut best: Option<(usize, f64)> = None;
            for &j in &order {
                if used[j] || j == i {
                    continue;
                }
                let dist = (peaks[j].freq - target).abs();
                if dist <= tolerance && best.map_or(true, |(_, d)| dist < d) {
                    best = Some((j, dist));
                }
            }
            if let Some((j, _)) = best {
                members.push(Peak {
                    freq: peaks[j].freq,
                    power: peaks[j].power,
                    harmonic,
                });
                member_idx.push(j);
            }
        }

        if members.len() < cfg.min_group_size {
            continue;
        }
        for j in member_idx {
            used[j] = true;
        }
        let mut group = HarmonicGroup {
            fundamental: f0,
            peaks: members,
        };
        group.fundamental = fundamental_freq(&group);
        groups.push(group);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn axis(n: usize, df: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 * df).collect()
    }

    /// Spectrum with gaussian-ish bumps at the given (freq, power) pairs
    fn spectrum(freqs: &[f64], bumps: &[(f64, f64)]) -> Vec<f32> {
        freqs
            .iter()
            .map(|&f| {
                let mut p = 1e-9;
                for &(bf, bp) in bumps {
                    let d = (f - bf) / (freqs[1] - freqs[0]);
                    p += bp * (-d * d).exp();
                }
                p as f32
            })
            .collect()
    }

    fn cfg() -> HarmonicConfig {
        HarmonicConfig {
            min_freq: 100.0,
            max_freq: 1000.0,
            ..HarmonicConfig::default()
        }
    }

    #[test]
    fn single_tone_is_one_group() {
        let freqs = axis(512, 10.0);
        let power = spectrum(&freqs, &[(300.0, 1.0)]);

        let groups = harmonic_groups(&freqs, &power, &cfg());
        assert_eq!(groups.len(), 1);
        assert_relative_eq!(groups[0].fundamental, 300.0, epsilon = 10.0);
    }

    #[test]
    fn harmonic_stack_collapses_to_fundamental() {
        let freqs = axis(512, 10.0);
        let power = spectrum(&freqs, &[(400.0, 1.0), (800.0, 0.5), (1200.0, 0.25)]);

        let groups = harmonic_groups(&freqs, &power, &cfg());
        assert_eq!(groups.len(), 1);
        let g = &groups[0];
        assert_eq!(g.peaks.len(), 3);
        assert_relative_eq!(g.fundamental, 400.0, epsilon = 10.0);
        // harmonics are claimed, so they never seed their own group
        assert!(g.peaks.iter().any(|p| p.harmonic == 3));
    }

    #[test]
    fn two_sources_stay_separate() {
        let freqs = axis(512, 10.0);
        let power = spectrum(&freqs, &[(300.0, 1.0), (620.0, 0.8)]);

        let groups = harmonic_groups(&freqs, &power, &cfg());
        assert_eq!(groups.len(), 2);
        assert_relative_eq!(groups[0].fundamental, 300.0, epsilon = 10.0);
        assert_relative_eq!(groups[1].fundamental, 620.0, epsilon = 10.0);
    }

    #[test]
    fn fundamentals_outside_range_are_dropped() {
        let freqs = axis(512, 10.0);
        let power = spectrum(&freqs, &[(50.0, 1.0), (2000.0, 1.0)]);

        let groups = harmonic_groups(&freqs, &power, &cfg());
        assert!(groups.is_empty());
    }

    #[test]
    fn quiet_column_yields_nothing() {
        let freqs = axis(512, 10.0);
        let power = vec![1e-9f32; 512];

        assert!(harmonic_groups(&freqs, &power, &cfg()).is_empty());
    }

    #[test]
    fn batched_matches_per_bin_calls() {
        let freqs = axis(512, 10.0);
        let c0 = spectrum(&freqs, &[(300.0, 1.0)]);
        let c1 = spectrum(&freqs, &[(620.0, 1.0)]);
        let columns = vec![c0.clone(), c1.clone()];

        let batched = harmonic_groups_batched(&freqs, &columns, &cfg());
        assert_eq!(batched[0], harmonic_groups(&freqs, &c0, &cfg()));
        assert_eq!(batched[1], harmonic_groups(&freqs, &c1, &cfg()));
    }

    #[test]
    fn interpolation_refines_off_bin_peaks() {
        let freqs = axis(512, 10.0);
        // true peak between bins 30 and 31
        let power = spectrum(&freqs, &[(304.0, 1.0)]);

        let groups = harmonic_groups(&freqs, &power, &cfg());
        assert_eq!(groups.len(), 1);
        assert_relative_eq!(groups[0].fundamental, 304.0, epsilon = 3.0);
    }
}
