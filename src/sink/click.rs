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

//! Click sounds for each accent level.
//!
//! Clicks are rendered once when a sink is created and shared between every beat
//! afterwards. A level either uses a WAV sample from disk or a short synthesized
//! sine blip.

use std::{f32::consts::PI, path::Path, sync::Arc, time::Duration};

use tracing::info;

use crate::{accent::AccentLevel, config};

use super::SinkError;

/// The length of a synthesized click.
pub const CLICK_DURATION: Duration = Duration::from_millis(100);

/// Downbeats are pitched higher so they stand out.
const FORTE_FREQUENCY: f32 = 1000.0;
const REGULAR_FREQUENCY: f32 = 800.0;

/// Peak amplitude of a synthesized click before accent and master volume.
const CLICK_AMPLITUDE: f32 = 0.5;

/// Mono click buffers for every audible accent level.
#[derive(Clone)]
pub struct Clicks {
    forte: Arc<[f32]>,
    mezzo_forte: Arc<[f32]>,
    piano: Arc<[f32]>,
}

impl Clicks {
    /// Synthesizes clicks for all levels.
    pub fn synthesize(sample_rate: u32, volume: f32) -> Clicks {
        Clicks {
            forte: synthesize(AccentLevel::Forte, sample_rate, volume).into(),
            mezzo_forte: synthesize(AccentLevel::MezzoForte, sample_rate, volume).into(),
            piano: synthesize(AccentLevel::Piano, sample_rate, volume).into(),
        }
    }

    /// Loads the configured samples, synthesizing clicks for levels without one.
    pub fn load(
        samples: &config::Samples,
        sample_rate: u32,
        volume: f32,
    ) -> Result<Clicks, SinkError> {
        let render = |level: AccentLevel| -> Result<Arc<[f32]>, SinkError> {
            Ok(match samples.path_for(level) {
                Some(path) => read_wav(path, level, sample_rate, volume)?.into(),
                None => synthesize(level, sample_rate, volume).into(),
            })
        };

        Ok(Clicks {
            forte: render(AccentLevel::Forte)?,
            mezzo_forte: render(AccentLevel::MezzoForte)?,
            piano: render(AccentLevel::Piano)?,
        })
    }

    /// Returns the click for the level. Mute has no click.
    pub fn get(&self, level: AccentLevel) -> Option<&Arc<[f32]>> {
        match level {
            AccentLevel::Forte => Some(&self.forte),
            AccentLevel::MezzoForte => Some(&self.mezzo_forte),
            AccentLevel::Piano => Some(&self.piano),
            AccentLevel::Mute => None,
        }
    }
}

/// A sine blip with an exponential decay so it doesn't pop at the end.
fn synthesize(level: AccentLevel, sample_rate: u32, volume: f32) -> Vec<f32> {
    let frequency = if level == AccentLevel::Forte {
        FORTE_FREQUENCY
    } else {
        REGULAR_FREQUENCY
    };
    let gain = CLICK_AMPLITUDE * level.volume() * volume;
    let frames = (sample_rate as f32 * CLICK_DURATION.as_secs_f32()) as usize;

    (0..frames)
        .map(|frame| {
            let t = frame as f32 / sample_rate as f32;
            let envelope = (-t * 40.0).exp();
            gain * envelope * (2.0 * PI * frequency * t).sin()
        })
        .collect()
}

/// Reads a WAV file as mono f32 at the target sample rate.
fn read_wav(
    path: &Path,
    level: AccentLevel,
    sample_rate: u32,
    volume: f32,
) -> Result<Vec<f32>, SinkError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|sample| sample as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    info!(
        path = path.display().to_string(),
        level = level.symbol(),
        source_rate = spec.sample_rate,
        target_rate = sample_rate,
        frames = mono.len(),
        "Loaded click sample."
    );

    let gain = level.volume() * volume;
    Ok(resample(&mono, spec.sample_rate, sample_rate)
        .into_iter()
        .map(|sample| sample * gain)
        .collect())
}

/// Linear interpolation resampling. Clicks are short, so quality is not a concern.
fn resample(input: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || input.is_empty() || from == 0 {
        return input.to_vec();
    }

    let step = f64::from(from) / f64::from(to);
    let frames = ((input.len() as f64) / step).floor() as usize;
    (0..frames)
        .map(|frame| {
            let position = frame as f64 * step;
            let index = position as usize;
            let fraction = (position - index as f64) as f32;
            let current = input[index.min(input.len() - 1)];
            let next = input[(index + 1).min(input.len() - 1)];
            current + (next - current) * fraction
        })
        .collect()
}
