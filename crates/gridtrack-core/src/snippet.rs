//! Snippet iteration over a recording
//!
//! Partitions an arbitrarily long recording into bounded, overlapping
//! processing windows. Windows are never padded: a leftover tail shorter
//! than one snippet is discarded, which truncates at most one snippet
//! step of signal at the end of the recording.

use anyhow::Result;

/// One bounded window of raw samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snippet {
    /// Start sample offset into the recording
    pub start: usize,
    /// Window length in samples
    pub len: usize,
    /// No further snippet follows this one
    ///
    /// Forwarded to the spectrogram engine so its FFT framing does not
    /// expect a following window.
    pub is_final: bool,
}

/// Iterator over the snippets of a recording
#[derive(Debug, Clone)]
pub struct SnippetIter {
    total: usize,
    size: usize,
    step: usize,
    next_start: usize,
}

/// Build a snippet iterator over `total` samples
///
/// Windows are `[i, i + size)` with step `size - overlap`. Requires
/// `size > 0` and `overlap < size`.
pub fn snippets(total: usize, size: usize, overlap: usize) -> Result<SnippetIter> {
    if size == 0 {
        anyhow::bail!("snippet size must be > 0");
    }
    if overlap >= size {
        anyhow::bail!("snippet overlap ({overlap}) must be smaller than snippet size ({size})");
    }
    Ok(SnippetIter {
        total,
        size,
        step: size - overlap,
        next_start: 0,
    })
}

impl SnippetIter {
    /// Number of snippets this iterator will produce
    pub fn count_hint(&self) -> usize {
        if self.total < self.size {
            0
        } else {
            (self.total - self.size) / self.step + 1
        }
    }
}

impl Iterator for SnippetIter {
    type Item = Snippet;

    fn next(&mut self) -> Option<Snippet> {
        let start = self.next_start;
        if start + self.size > self.total {
            return None;
        }
        self.next_start = start + self.step;
        Some(Snippet {
            start,
            len: self.size,
            is_final: self.next_start + self.size > self.total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_stay_in_bounds_and_final_is_last() {
        let all: Vec<Snippet> = snippets(40_000, 4096, 512).unwrap().collect();

        assert!(!all.is_empty());
        for s in &all {
            assert!(s.start + s.len <= 40_000);
            assert_eq!(s.len, 4096);
        }
        for pair in all.windows(2) {
            assert_eq!(pair[1].start - pair[0].start, 4096 - 512);
            assert!(!pair[0].is_final);
        }
        assert!(all.last().unwrap().is_final);
    }

    #[test]
    fn tail_shorter_than_snippet_is_discarded() {
        // 1000 samples, size 300, step 200: windows at 0, 200, 400, 600;
        // 800 + 300 > 1000 so the tail is dropped.
        let all: Vec<Snippet> = snippets(1000, 300, 100).unwrap().collect();
        assert_eq!(all.len(), 4);
        assert_eq!(all.last().unwrap().start, 600);
    }

    #[test]
    fn exact_fit_single_window() {
        let all: Vec<Snippet> = snippets(4096, 4096, 0).unwrap().collect();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_final);
    }

    #[test]
    fn recording_shorter_than_snippet_yields_nothing() {
        let iter = snippets(100, 4096, 512).unwrap();
        assert_eq!(iter.count_hint(), 0);
        assert_eq!(iter.count(), 0);
    }

    #[test]
    fn count_hint_matches_iteration() {
        for (total, size, overlap) in [(40_000, 4096, 512), (1000, 300, 100), (4096, 4096, 0)] {
            let iter = snippets(total, size, overlap).unwrap();
            assert_eq!(iter.count_hint(), iter.clone().count());
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(snippets(1000, 0, 0).is_err());
        assert!(snippets(1000, 100, 100).is_err());
        assert!(snippets(1000, 100, 200).is_err());
    }
}
