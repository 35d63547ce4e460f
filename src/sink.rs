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
use std::{fmt, sync::Arc};

use tracing::info;

use crate::{accent::AccentLevel, config};

pub mod click;
pub mod cpal;
pub mod mock;
mod voices;

/// Errors produced by a sound sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sound sink is busy, beat dropped")]
    Busy,
    #[error("audio device error: {0}")]
    Device(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("unable to load click sample: {0}")]
    Sample(#[from] hound::Error),
}

/// Something that can make the sound for a beat.
///
/// Implementations must return quickly: the scheduler calls `play` from its timing
/// thread and never waits for the sound to finish. Playback resources must be
/// reused between beats.
pub trait SoundSink: fmt::Display + Send + Sync {
    /// Plays the click for the given accent level.
    fn play(&self, level: AccentLevel) -> Result<(), SinkError>;
}

/// Lists the output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, SinkError> {
    cpal::list()
}

/// Gets the sink described by the configuration. Devices whose names begin with
/// "mock" produce a mock sink that only records beats.
pub fn get_sink(config: &config::Sound) -> Result<Arc<dyn SoundSink>, SinkError> {
    let device = config.device();
    if device.starts_with("mock") {
        info!(device, "Using mock sound sink.");
        return Ok(Arc::new(mock::Sink::get(device)));
    }

    Ok(Arc::new(cpal::Sink::get(config)?))
}

#[cfg(test)]
pub mod test {
    pub use super::mock::Sink;
}
