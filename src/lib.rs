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

//! A metronome with live control over tempo, time signature and per-beat accents.
//!
//! The [`metronome::Metronome`] handle owns a control thread that schedules beats and
//! hands each one to a [`sink::SoundSink`]. Everything else in the crate feeds it:
//! time signatures, accent patterns, tap tempo, configuration and controllers.

pub mod accent;
pub mod config;
pub mod controller;
pub mod metronome;
mod priority;
pub mod scheduler;
pub mod signature;
pub mod sink;
pub mod tap;
pub mod tempo;
#[cfg(test)]
mod testutil;
