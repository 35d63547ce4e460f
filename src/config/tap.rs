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

use crate::tap::{TapTempo, DEFAULT_TAP_TIMEOUT, DEFAULT_TAP_WINDOW};

use super::ConfigError;

/// A YAML representation of the tap tempo configuration.
#[derive(Deserialize, Clone, Default)]
pub struct Tap {
    /// A pause longer than this starts a new tap sequence, e.g. "3s".
    timeout: Option<String>,

    /// How many taps contribute to the estimate.
    window: Option<usize>,
}

impl Tap {
    /// Returns the idle timeout.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        match &self.timeout {
            Some(timeout) => Ok(DurationString::from_string(timeout.clone())
                .map_err(|e| ConfigError::invalid("tap.timeout", e))?
                .into()),
            None => Ok(DEFAULT_TAP_TIMEOUT),
        }
    }

    /// Returns the window size.
    pub fn window(&self) -> Result<usize, ConfigError> {
        match self.window {
            Some(window) if window < 2 => Err(ConfigError::invalid(
                "tap.window",
                "at least two taps are needed for an estimate",
            )),
            Some(window) => Ok(window),
            None => Ok(DEFAULT_TAP_WINDOW),
        }
    }

    /// Builds the estimator described by this configuration.
    pub fn estimator(&self) -> Result<TapTempo, ConfigError> {
        Ok(TapTempo::new(self.timeout()?, self.window()?))
    }
}
