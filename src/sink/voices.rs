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

//! A fixed pool of voices for click playback.
//!
//! The pool is created once with the output stream and lives inside the audio
//! callback. Triggering a click claims a free voice or steals the oldest one, so
//! playing a beat never allocates.

use std::sync::Arc;

use crate::accent::AccentLevel;

use super::click::Clicks;

/// A click that is currently sounding.
struct Voice {
    click: Arc<[f32]>,
    position: usize,
    /// Trigger order, used to find the oldest voice.
    started: u64,
}

pub(super) struct VoicePool {
    clicks: Clicks,
    voices: Vec<Option<Voice>>,
    triggered: u64,
}

impl VoicePool {
    /// Creates a pool with room for the given number of simultaneous clicks.
    pub fn new(clicks: Clicks, max_voices: usize) -> VoicePool {
        let mut voices = Vec::with_capacity(max_voices.max(1));
        voices.resize_with(max_voices.max(1), || None);
        VoicePool {
            clicks,
            voices,
            triggered: 0,
        }
    }

    /// Starts the click for the level. Returns true if a sounding voice was stolen.
    pub fn trigger(&mut self, level: AccentLevel) -> bool {
        let Some(click) = self.clicks.get(level) else {
            return false;
        };

        let slot = match self.voices.iter().position(Option::is_none) {
            Some(free) => (free, false),
            None => {
                let oldest = self
                    .voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, voice)| match voice {
                        Some(voice) => voice.started,
                        None => 0,
                    })
                    .map_or(0, |(index, _)| index);
                (oldest, true)
            }
        };

        self.triggered += 1;
        self.voices[slot.0] = Some(Voice {
            click: click.clone(),
            position: 0,
            started: self.triggered,
        });
        slot.1
    }

    /// Mixes every sounding voice into the interleaved output buffer. The buffer is
    /// overwritten, and finished voices are released.
    pub fn render(&mut self, output: &mut [f32], channels: usize) {
        output.fill(0.0);
        let channels = channels.max(1);

        for slot in self.voices.iter_mut() {
            let Some(voice) = slot.as_mut() else {
                continue;
            };

            for frame in output.chunks_mut(channels) {
                let Some(sample) = voice.click.get(voice.position) else {
                    break;
                };
                frame.iter_mut().for_each(|out| *out += sample);
                voice.position += 1;
            }

            if voice.position >= voice.click.len() {
                *slot = None;
            }
        }

        output
            .iter_mut()
            .for_each(|sample| *sample = sample.clamp(-1.0, 1.0));
    }

    /// Returns the number of sounding voices.
    #[cfg(test)]
    pub fn active(&self) -> usize {
        self.voices.iter().filter(|voice| voice.is_some()).count()
    }
}
