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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::ConfigError;

/// Default priority for the scheduler thread.
const DEFAULT_THREAD_PRIORITY: u8 = 70;

/// How long before a deadline the scheduler stops sleeping and starts spinning.
const DEFAULT_SPIN_THRESHOLD: Duration = Duration::from_millis(2);

/// A YAML representation of the scheduler thread configuration.
#[derive(Deserialize, Clone, Default)]
pub struct Scheduler {
    /// Crossplatform thread priority, 0-99.
    thread_priority: Option<u8>,

    /// Whether to attempt realtime (SCHED_FIFO) scheduling on unix.
    realtime: Option<bool>,

    /// How close to a deadline to switch from sleeping to spinning, e.g. "2ms".
    spin_threshold: Option<String>,
}

impl Scheduler {
    /// Returns the scheduler thread priority. METRONOME_THREAD_PRIORITY overrides the file.
    pub fn thread_priority(&self) -> u8 {
        std::env::var("METRONOME_THREAD_PRIORITY")
            .ok()
            .and_then(|value| value.parse::<u8>().ok())
            .or(self.thread_priority)
            .unwrap_or(DEFAULT_THREAD_PRIORITY)
            .min(99)
    }

    /// Returns whether realtime scheduling should be attempted. Enabled unless
    /// configured off or METRONOME_DISABLE_RT is set.
    pub fn realtime(&self) -> bool {
        !env_flag("METRONOME_DISABLE_RT") && self.realtime.unwrap_or(true)
    }

    /// Returns the spin threshold.
    pub fn spin_threshold(&self) -> Result<Duration, ConfigError> {
        match &self.spin_threshold {
            Some(spin_threshold) => Ok(DurationString::from_string(spin_threshold.clone())
                .map_err(|e| ConfigError::invalid("scheduler.spin_threshold", e))?
                .into()),
            None => Ok(DEFAULT_SPIN_THRESHOLD),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}
