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
use std::{fmt, num::ParseIntError, str::FromStr};

/// The denominator used for display when none is given.
const DEFAULT_DENOMINATOR: u32 = 4;

/// The grouping used by compound meters like 6/8 and 12/8.
const COMPOUND_GROUP: u32 = 3;

/// Errors produced while parsing a time signature.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SignatureError {
    #[error("malformed time signature '{0}', expected N/D or N/D:G")]
    Malformed(String),
    #[error("invalid number in time signature: {0}")]
    Number(#[from] ParseIntError),
    #[error("time signature fields must be at least 1")]
    Zero,
}

/// A time signature. Immutable; a change of meter replaces the whole value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeSignature {
    /// The number of beats in a bar.
    beats_per_bar: u32,
    /// The grouping used to mark secondary accents. 1 means no grouping.
    subdivision_group: u32,
    /// The note value of a beat. Only used for display.
    denominator: u32,
}

impl TimeSignature {
    /// Common time signatures, in the order they are usually offered.
    pub const PRESETS: [TimeSignature; 8] = [
        TimeSignature::preset(2, 4, 1),
        TimeSignature::preset(3, 4, 1),
        TimeSignature::preset(4, 4, 1),
        TimeSignature::preset(5, 4, 1),
        TimeSignature::preset(6, 8, COMPOUND_GROUP),
        TimeSignature::preset(7, 8, 1),
        TimeSignature::preset(9, 8, COMPOUND_GROUP),
        TimeSignature::preset(12, 8, COMPOUND_GROUP),
    ];

    const fn preset(beats_per_bar: u32, denominator: u32, subdivision_group: u32) -> TimeSignature {
        TimeSignature {
            beats_per_bar,
            subdivision_group,
            denominator,
        }
    }

    /// Creates a new time signature. Returns None if either field is zero.
    pub fn new(beats_per_bar: u32, subdivision_group: u32) -> Option<TimeSignature> {
        if beats_per_bar == 0 || subdivision_group == 0 {
            return None;
        }

        Some(TimeSignature {
            beats_per_bar,
            subdivision_group,
            denominator: if subdivision_group == COMPOUND_GROUP {
                8
            } else {
                DEFAULT_DENOMINATOR
            },
        })
    }

    /// Returns the number of beats in a bar.
    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    /// Returns the subdivision grouping.
    pub fn subdivision_group(&self) -> u32 {
        self.subdivision_group
    }

    /// Returns the display denominator.
    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    /// Returns true if this is a compound meter.
    pub fn is_compound(&self) -> bool {
        self.subdivision_group > 1
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature::preset(4, 4, 1)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_bar, self.denominator)?;
        // Only show the grouping when it can't be inferred from N/D.
        let inferred = infer_group(self.beats_per_bar, self.denominator);
        if inferred != self.subdivision_group {
            write!(f, ":{}", self.subdivision_group)?;
        }
        Ok(())
    }
}

/// Eighth-note meters whose numerator is a multiple of three (beyond 3/8) are compound.
fn infer_group(beats_per_bar: u32, denominator: u32) -> u32 {
    if denominator == 8 && beats_per_bar > COMPOUND_GROUP && beats_per_bar % COMPOUND_GROUP == 0 {
        COMPOUND_GROUP
    } else {
        1
    }
}

impl FromStr for TimeSignature {
    type Err = SignatureError;

    /// Parses signatures in the form N/D, e.g. 6/8, with an optional explicit grouping, e.g. 7/8:2.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (fraction, group) = match s.split_once(':') {
            Some((fraction, group)) => (fraction, Some(group.trim().parse::<u32>()?)),
            None => (s, None),
        };
        let (beats_per_bar, denominator) = fraction
            .split_once('/')
            .ok_or_else(|| SignatureError::Malformed(s.to_string()))?;
        let beats_per_bar = beats_per_bar.trim().parse::<u32>()?;
        let denominator = denominator.trim().parse::<u32>()?;

        if beats_per_bar == 0 || denominator == 0 || group == Some(0) {
            return Err(SignatureError::Zero);
        }

        Ok(TimeSignature {
            beats_per_bar,
            subdivision_group: group.unwrap_or_else(|| infer_group(beats_per_bar, denominator)),
            denominator,
        })
    }
}
