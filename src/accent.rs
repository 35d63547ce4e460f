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
use std::{fmt, ops::Index, str::FromStr};

use serde::Deserialize;

use crate::signature::TimeSignature;

/// The dynamic emphasis of a single beat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum AccentLevel {
    Forte,
    MezzoForte,
    #[default]
    Piano,
    Mute,
}

impl AccentLevel {
    /// All levels in cycle order.
    pub const ALL: [AccentLevel; 4] = [
        AccentLevel::Forte,
        AccentLevel::MezzoForte,
        AccentLevel::Piano,
        AccentLevel::Mute,
    ];

    /// The relative volume of the level, from 0.0 to 1.0.
    pub fn volume(&self) -> f32 {
        match self {
            AccentLevel::Forte => 1.0,
            AccentLevel::MezzoForte => 0.8,
            AccentLevel::Piano => 0.6,
            AccentLevel::Mute => 0.0,
        }
    }

    /// The level that follows this one when cycling through accents.
    pub fn next(&self) -> AccentLevel {
        match self {
            AccentLevel::Forte => AccentLevel::MezzoForte,
            AccentLevel::MezzoForte => AccentLevel::Piano,
            AccentLevel::Piano => AccentLevel::Mute,
            AccentLevel::Mute => AccentLevel::Forte,
        }
    }

    /// Returns true if beats at this level make no sound.
    pub fn is_muted(&self) -> bool {
        *self == AccentLevel::Mute
    }

    /// The dynamic marking for the level.
    pub fn symbol(&self) -> &'static str {
        match self {
            AccentLevel::Forte => "f",
            AccentLevel::MezzoForte => "mf",
            AccentLevel::Piano => "p",
            AccentLevel::Mute => "mute",
        }
    }
}

impl fmt::Display for AccentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for AccentLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "f" | "forte" => Ok(AccentLevel::Forte),
            "mf" | "mezzoforte" | "mezzo_forte" | "mezzo-forte" => Ok(AccentLevel::MezzoForte),
            "p" | "piano" => Ok(AccentLevel::Piano),
            "mute" | "m" | "-" => Ok(AccentLevel::Mute),
            other => Err(format!("unknown accent level '{}'", other)),
        }
    }
}

impl TryFrom<String> for AccentLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The accent of every beat in a bar. Its length always matches the active
/// time signature's beats per bar.
///
/// The pattern remembers which beats were chosen by the user rather than derived
/// from the meter. Only those survive a change of time signature, so an untouched
/// 4/4 pattern becomes the regular 6/8 default instead of dragging its piano beats
/// over the 6/8 secondary accent.
#[derive(Clone, Debug)]
pub struct AccentPattern {
    levels: Vec<AccentLevel>,
    /// Parallel to levels. True where the user picked the accent.
    edited: Vec<bool>,
}

impl AccentPattern {
    /// Creates a pattern from explicit levels. Every beat counts as a user choice.
    pub fn new(levels: Vec<AccentLevel>) -> AccentPattern {
        let edited = vec![true; levels.len()];
        AccentPattern { levels, edited }
    }

    /// Builds the default pattern for the signature. Accents from the previous pattern
    /// are kept for every beat position that exists in both.
    pub fn for_signature(
        signature: &TimeSignature,
        previous: Option<&AccentPattern>,
    ) -> AccentPattern {
        let beats_per_bar = signature.beats_per_bar() as usize;
        let mut levels = vec![AccentLevel::Piano; beats_per_bar];

        if let Some(first) = levels.first_mut() {
            *first = AccentLevel::Forte;
        }

        // Compound meters get a secondary accent at the start of each group.
        let group = signature.subdivision_group() as usize;
        if group > 1 {
            for i in (group..beats_per_bar).step_by(group) {
                levels[i] = AccentLevel::MezzoForte;
            }
        }

        // User edits win over the structural defaults.
        let mut edited = vec![false; beats_per_bar];
        if let Some(previous) = previous {
            let shared = previous.len().min(beats_per_bar);
            for i in (0..shared).filter(|i| previous.edited[*i]) {
                levels[i] = previous.levels[i];
                edited[i] = true;
            }
        }

        AccentPattern { levels, edited }
    }

    /// Returns the number of beats in the pattern.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns true if the pattern has no beats.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Returns the accent at the index, if it exists.
    pub fn get(&self, index: usize) -> Option<AccentLevel> {
        self.levels.get(index).copied()
    }

    /// Resolves the accent to play for a beat. Beats outside of the pattern play
    /// at piano so that a transient index mismatch never goes silent or panics.
    pub fn accent_for(&self, index: usize) -> AccentLevel {
        self.get(index).unwrap_or(AccentLevel::Piano)
    }

    /// Sets the accent at the index. Returns false if the index is out of range.
    pub fn update(&mut self, index: usize, level: AccentLevel) -> bool {
        match self.levels.get_mut(index) {
            Some(current) => {
                *current = level;
                self.edited[index] = true;
                true
            }
            None => false,
        }
    }

    /// Advances the accent at the index to the next level. Returns the new level,
    /// or None if the index is out of range.
    pub fn cycle(&mut self, index: usize) -> Option<AccentLevel> {
        let current = self.levels.get_mut(index)?;
        *current = current.next();
        self.edited[index] = true;
        Some(*current)
    }

    /// Returns true if the accent at the index was chosen by the user.
    pub fn is_edited(&self, index: usize) -> bool {
        self.edited.get(index).copied().unwrap_or(false)
    }

    /// Returns the levels as a slice.
    pub fn levels(&self) -> &[AccentLevel] {
        &self.levels
    }
}

impl PartialEq for AccentPattern {
    fn eq(&self, other: &Self) -> bool {
        self.levels == other.levels
    }
}

impl Eq for AccentPattern {}

impl Default for AccentPattern {
    fn default() -> Self {
        AccentPattern::for_signature(&TimeSignature::default(), None)
    }
}

impl Index<usize> for AccentPattern {
    type Output = AccentLevel;

    fn index(&self, index: usize) -> &Self::Output {
        &self.levels[index]
    }
}

impl fmt::Display for AccentPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbols: Vec<&str> = self.levels.iter().map(|level| level.symbol()).collect();
        write!(f, "[{}]", symbols.join(" "))
    }
}

impl FromStr for AccentPattern {
    type Err = String;

    /// Parses a comma or whitespace separated list of levels, e.g. "f,p,p,mf".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(AccentLevel::from_str)
            .collect::<Result<Vec<AccentLevel>, String>>()
            .map(AccentPattern::new)
    }
}
