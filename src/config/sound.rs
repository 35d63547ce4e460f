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
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::accent::AccentLevel;

/// The device name that selects the host's default output.
pub const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_VOLUME: f32 = 1.0;
const DEFAULT_VOICES: usize = 4;

/// A YAML representation of the sound output configuration.
#[derive(Deserialize, Clone, Default)]
pub struct Sound {
    /// The output device. "default" uses the system default, names starting with
    /// "mock" use a silent mock sink.
    device: Option<String>,

    /// Output sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// Master volume from 0.0 to 1.0 (default: 1.0).
    volume: Option<f32>,

    /// How many clicks may sound at once (default: 4).
    voices: Option<usize>,

    /// Optional WAV samples per accent level.
    #[serde(default)]
    pub(super) samples: Samples,
}

impl Sound {
    /// Creates a sound configuration for the given device with defaults otherwise.
    pub fn new(device: &str) -> Sound {
        Sound {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Returns the device name.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
            .filter(|rate| *rate > 0)
            .unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the master volume, clamped to 0.0..=1.0.
    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(DEFAULT_VOLUME).clamp(0.0, 1.0)
    }

    /// Returns the voice pool size. Always at least 1.
    pub fn voices(&self) -> usize {
        self.voices.unwrap_or(DEFAULT_VOICES).max(1)
    }

    /// Returns the sample overrides.
    pub fn samples(&self) -> &Samples {
        &self.samples
    }
}

/// Paths to WAV files used instead of the synthesized clicks.
#[derive(Deserialize, Clone, Default)]
pub struct Samples {
    forte: Option<PathBuf>,
    mezzo_forte: Option<PathBuf>,
    piano: Option<PathBuf>,
}

impl Samples {
    pub fn new(
        forte: Option<PathBuf>,
        mezzo_forte: Option<PathBuf>,
        piano: Option<PathBuf>,
    ) -> Samples {
        Samples {
            forte,
            mezzo_forte,
            piano,
        }
    }

    /// Returns the sample for the level, if one is configured.
    pub fn path_for(&self, level: AccentLevel) -> Option<&Path> {
        match level {
            AccentLevel::Forte => self.forte.as_deref(),
            AccentLevel::MezzoForte => self.mezzo_forte.as_deref(),
            AccentLevel::Piano => self.piano.as_deref(),
            AccentLevel::Mute => None,
        }
    }

    /// Resolves relative sample paths against the given directory.
    pub(super) fn relative_to(mut self, dir: &Path) -> Samples {
        for path in [&mut self.forte, &mut self.mezzo_forte, &mut self.piano]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        }
        self
    }
}
