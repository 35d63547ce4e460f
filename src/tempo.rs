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

/// The slowest supported tempo.
pub const MIN_BPM: f64 = 40.0;

/// The fastest supported tempo.
pub const MAX_BPM: f64 = 240.0;

/// The tempo used when nothing else is configured.
pub const DEFAULT_BPM: f64 = 120.0;

/// Clamps the tempo to the supported range. Returns None for NaN or infinite values.
pub fn clamp_bpm(bpm: f64) -> Option<f64> {
    bpm.is_finite().then(|| bpm.clamp(MIN_BPM, MAX_BPM))
}

/// Returns the time between beats at the given tempo.
pub fn interval(bpm: f64) -> Duration {
    Duration::from_secs_f64(60.0 / bpm.clamp(MIN_BPM, MAX_BPM))
}
