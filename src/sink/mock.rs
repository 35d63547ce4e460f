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
use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::accent::AccentLevel;

use super::{SinkError, SoundSink};

/// How many beats the mock sink remembers.
const HISTORY_LIMIT: usize = 1024;

/// A beat received by the mock sink.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Played {
    pub level: AccentLevel,
    pub at: Instant,
}

/// A mock sink. Doesn't make any sound, but remembers what it was asked to play.
#[derive(Clone)]
pub struct Sink {
    name: String,
    played: Arc<Mutex<VecDeque<Played>>>,
    failing: Arc<AtomicBool>,
}

impl Sink {
    /// Gets the given mock sink.
    pub fn get(name: &str) -> Sink {
        Sink {
            name: name.to_string(),
            played: Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT))),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the beats played so far, oldest first.
    pub fn played(&self) -> Vec<Played> {
        self.played.lock().iter().copied().collect()
    }

    /// Returns the levels played so far, oldest first.
    pub fn levels(&self) -> Vec<AccentLevel> {
        self.played.lock().iter().map(|played| played.level).collect()
    }

    /// Returns the number of beats played so far.
    pub fn count(&self) -> usize {
        self.played.lock().len()
    }

    /// Forgets every recorded beat.
    pub fn clear(&self) {
        self.played.lock().clear();
    }

    /// Makes every following play fail as if the device were busy.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

impl SoundSink for Sink {
    fn play(&self, level: AccentLevel) -> Result<(), SinkError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(SinkError::Busy);
        }

        debug!(sink = self.name, level = level.symbol(), "Playing click (mock).");
        let mut played = self.played.lock();
        if played.len() == HISTORY_LIMIT {
            played.pop_front();
        }
        played.push_back(Played {
            level,
            at: Instant::now(),
        });
        Ok(())
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
