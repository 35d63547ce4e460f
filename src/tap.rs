// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{collections::VecDeque, time::Duration, time::Instant};

use tracing::debug;

use crate::tempo;

/// A pause longer than this starts a new tap sequence.
pub const DEFAULT_TAP_TIMEOUT: Duration = Duration::from_secs(3);

/// The number of taps that contribute to an estimate.
pub const DEFAULT_TAP_WINDOW: usize = 4;

/// Turns a series of taps into a tempo. Only the most recent taps count, and a
/// long pause throws the history away.
#[derive(Debug)]
pub struct TapTempo {
    /// Timestamps of the retained taps, oldest first.
    history: VecDeque<Instant>,
    timeout: Duration,
    window: usize,
}

impl TapTempo {
    /// Creates an estimator with the given idle timeout and window size. The window
    /// always holds at least two taps.
    pub fn new(timeout: Duration, window: usize) -> TapTempo {
        let window = window.max(2);
        TapTempo {
            history: VecDeque::with_capacity(window),
            timeout,
            window,
        }
    }

    /// Records a tap. Returns the estimated tempo once at least two taps are known.
    pub fn record_tap(&mut self, now: Instant) -> Option<f64> {
        if let Some(last) = self.history.back() {
            // checked_duration_since guards against a clock that went backwards.
            match now.checked_duration_since(*last) {
                Some(gap) if gap <= self.timeout => {}
                _ => {
                    debug!(taps = self.history.len(), "Tap sequence expired.");
                    self.history.clear();
                }
            }
        }

        self.history.push_back(now);
        while self.history.len() > self.window {
            self.history.pop_front();
        }

        self.estimate()
    }

    /// Averages the intervals between the retained taps.
    fn estimate(&self) -> Option<f64> {
        let first = self.history.front()?;
        let last = self.history.back()?;
        let intervals = self.history.len().checked_sub(1).filter(|n| *n > 0)?;

        // The mean of consecutive intervals telescopes to the overall span.
        let average = last.duration_since(*first).as_secs_f64() / intervals as f64;
        if average <= 0.0 {
            return None;
        }

        tempo::clamp_bpm(60.0 / average)
    }

    /// Forgets all taps.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Returns the number of retained taps.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns true if no taps are retained.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl Default for TapTempo {
    fn default() -> Self {
        TapTempo::new(DEFAULT_TAP_TIMEOUT, DEFAULT_TAP_WINDOW)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn at(start: Instant, secs: f64) -> Instant {
        start + Duration::from_secs_f64(secs)
    }

    fn assert_bpm(expected: f64, actual: Option<f64>) {
        let actual = actual.expect("expected an estimate");
        assert!(
            (expected - actual).abs() < 1e-6,
            "expected {} BPM, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_steady_taps() {
        let start = Instant::now();
        let mut tap = TapTempo::default();

        assert_eq!(None, tap.record_tap(start));
        assert_bpm(120.0, tap.record_tap(at(start, 0.5)));
        assert_bpm(120.0, tap.record_tap(at(start, 1.0)));
        assert_bpm(120.0, tap.record_tap(at(start, 1.5)));
        assert_eq!(4, tap.len());
    }

    #[test]
    fn test_window_drops_oldest() {
        let start = Instant::now();
        let mut tap = TapTempo::default();

        // One slow interval followed by fast ones.
        tap.record_tap(start);
        tap.record_tap(at(start, 1.0));
        tap.record_tap(at(start, 1.5));
        assert_bpm(90.0, tap.record_tap(at(start, 2.0)));
        // The slow interval falls out of the window.
        assert_bpm(120.0, tap.record_tap(at(start, 2.5)));
        assert_eq!(4, tap.len());
    }

    #[test]
    fn test_timeout_restarts() {
        let start = Instant::now();
        let mut tap = TapTempo::default();

        tap.record_tap(start);
        assert_bpm(120.0, tap.record_tap(at(start, 0.5)));

        // Exactly the timeout still counts as the same sequence, which drags the
        // estimate down to the slowest tempo.
        assert_bpm(tempo::MIN_BPM, tap.record_tap(at(start, 3.5)));
        assert_eq!(3, tap.len());

        assert_eq!(None, tap.record_tap(at(start, 6.6)));
        assert_eq!(1, tap.len());
        assert_bpm(60.0, tap.record_tap(at(start, 7.6)));
    }

    #[test]
    fn test_clamped() {
        let start = Instant::now();
        let mut tap = TapTempo::default();

        tap.record_tap(start);
        assert_bpm(tempo::MAX_BPM, tap.record_tap(at(start, 0.05)));

        tap.reset();
        assert!(tap.is_empty());
        tap.record_tap(start);
        assert_bpm(tempo::MIN_BPM, tap.record_tap(at(start, 2.9)));
    }

    #[test]
    fn test_degenerate_timestamps() {
        let start = Instant::now();
        let mut tap = TapTempo::default();

        tap.record_tap(at(start, 1.0));
        assert_eq!(None, tap.record_tap(at(start, 1.0)));

        // Going backwards starts over.
        assert_eq!(None, tap.record_tap(start));
        assert_eq!(1, tap.len());
    }
}
