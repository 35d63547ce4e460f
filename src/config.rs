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
use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::{accent::AccentLevel, accent::AccentPattern, signature::TimeSignature, tempo};

mod error;
mod scheduler;
mod sound;
mod tap;

pub use error::ConfigError;
pub use scheduler::Scheduler;
pub use sound::{Samples, Sound, DEFAULT_DEVICE};
pub use tap::Tap;

/// The configuration for the metronome.
#[derive(Deserialize, Clone, Default)]
pub struct Metronome {
    /// The starting tempo in beats per minute.
    tempo: Option<f64>,

    /// The starting time signature, e.g. "6/8" or "7/8:2".
    time_signature: Option<String>,

    /// The starting accent of each beat, e.g. [f, p, p, mf]. Must match the
    /// time signature's beats per bar.
    accents: Option<Vec<AccentLevel>>,

    /// The sound output configuration.
    #[serde(default)]
    sound: Sound,

    /// The scheduler thread configuration.
    #[serde(default)]
    scheduler: Scheduler,

    /// The tap tempo configuration.
    #[serde(default)]
    tap: Tap,
}

impl Metronome {
    /// Loads the configuration from a YAML file. Relative sample paths are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Metronome, ConfigError> {
        let mut metronome: Metronome = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        if let Some(dir) = path.parent() {
            metronome.sound.samples = metronome.sound.samples.relative_to(dir);
        }
        metronome.validate()?;
        Ok(metronome)
    }

    /// Parses the configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Metronome, ConfigError> {
        let metronome: Metronome = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        metronome.validate()?;
        Ok(metronome)
    }

    /// Checks that every value resolves so that problems surface at load time.
    fn validate(&self) -> Result<(), ConfigError> {
        self.time_signature()?;
        self.accent_pattern()?;
        self.scheduler.spin_threshold()?;
        self.tap.estimator()?;
        Ok(())
    }

    /// Returns the starting tempo, clamped to the supported range.
    pub fn tempo(&self) -> f64 {
        self.tempo
            .and_then(tempo::clamp_bpm)
            .unwrap_or(tempo::DEFAULT_BPM)
    }

    /// Returns the starting time signature.
    pub fn time_signature(&self) -> Result<TimeSignature, ConfigError> {
        match &self.time_signature {
            Some(time_signature) => time_signature
                .parse()
                .map_err(|e| ConfigError::invalid("time_signature", e)),
            None => Ok(TimeSignature::default()),
        }
    }

    /// Returns the starting accent pattern, or the default for the time signature.
    pub fn accent_pattern(&self) -> Result<AccentPattern, ConfigError> {
        let time_signature = self.time_signature()?;
        match &self.accents {
            Some(accents) if accents.len() != time_signature.beats_per_bar() as usize => {
                Err(ConfigError::invalid(
                    "accents",
                    format!(
                        "{} accents given for {} beats per bar",
                        accents.len(),
                        time_signature.beats_per_bar()
                    ),
                ))
            }
            Some(accents) => Ok(AccentPattern::new(accents.clone())),
            None => Ok(AccentPattern::for_signature(&time_signature, None)),
        }
    }

    /// Overrides the starting tempo.
    pub fn with_tempo(mut self, tempo: f64) -> Metronome {
        self.tempo = Some(tempo);
        self
    }

    /// Overrides the starting time signature.
    pub fn with_time_signature(mut self, time_signature: &str) -> Metronome {
        self.time_signature = Some(time_signature.to_string());
        self
    }

    /// Overrides the starting accents.
    pub fn with_accents(mut self, accents: Vec<AccentLevel>) -> Metronome {
        self.accents = Some(accents);
        self
    }

    /// Overrides the sound configuration.
    pub fn with_sound(mut self, sound: Sound) -> Metronome {
        self.sound = sound;
        self
    }

    /// Returns the sound configuration.
    pub fn sound(&self) -> &Sound {
        &self.sound
    }

    /// Returns the scheduler configuration.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Returns the tap tempo configuration.
    pub fn tap(&self) -> &Tap {
        &self.tap
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs, time::Duration};

    use crate::accent::AccentLevel::*;

    use super::*;

    #[test]
    fn test_defaults() -> Result<(), Box<dyn Error>> {
        let metronome = Metronome::from_yaml("{}")?;
        assert_eq!(120.0, metronome.tempo());
        assert_eq!(TimeSignature::default(), metronome.time_signature()?);
        assert_eq!(AccentPattern::default(), metronome.accent_pattern()?);
        assert_eq!(DEFAULT_DEVICE, metronome.sound().device());
        assert_eq!(44100, metronome.sound().sample_rate());
        assert_eq!(4, metronome.sound().voices());
        assert_eq!(
            Duration::from_millis(2),
            metronome.scheduler().spin_threshold()?
        );
        assert_eq!(Duration::from_secs(3), metronome.tap().timeout()?);
        assert_eq!(4, metronome.tap().window()?);
        Ok(())
    }

    #[test]
    fn test_full_config() -> Result<(), Box<dyn Error>> {
        let metronome = Metronome::from_yaml(
            r#"
            tempo: 300
            time_signature: 6/8
            accents: [f, p, mute, mf, p, p]
            sound:
              device: mock-device
              sample_rate: 48000
              volume: 1.5
              voices: 8
            scheduler:
              thread_priority: 50
              realtime: false
              spin_threshold: 500us
            tap:
              timeout: 2s
              window: 6
            "#,
        )?;

        assert_eq!(240.0, metronome.tempo());
        assert_eq!(6, metronome.time_signature()?.beats_per_bar());
        assert_eq!(
            vec![Forte, Piano, Mute, MezzoForte, Piano, Piano],
            metronome.accent_pattern()?.levels()
        );
        assert_eq!("mock-device", metronome.sound().device());
        assert_eq!(48000, metronome.sound().sample_rate());
        assert_eq!(1.0, metronome.sound().volume());
        assert_eq!(8, metronome.sound().voices());
        assert!(!metronome.scheduler().realtime());
        assert_eq!(
            Duration::from_micros(500),
            metronome.scheduler().spin_threshold()?
        );
        assert_eq!(Duration::from_secs(2), metronome.tap().timeout()?);
        assert_eq!(6, metronome.tap().window()?);
        Ok(())
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Metronome::from_yaml("time_signature: 0/4"),
            Err(ConfigError::Invalid {
                field: "time_signature",
                ..
            })
        ));
        assert!(matches!(
            Metronome::from_yaml("accents: [f, p]"),
            Err(ConfigError::Invalid {
                field: "accents",
                ..
            })
        ));
        assert!(matches!(
            Metronome::from_yaml("accents: [f, p, p, loud]"),
            Err(ConfigError::Load(_))
        ));
        assert!(matches!(
            Metronome::from_yaml("tap:\n  window: 1"),
            Err(ConfigError::Invalid {
                field: "tap.window",
                ..
            })
        ));
        assert!(matches!(
            Metronome::from_yaml("scheduler:\n  spin_threshold: soon"),
            Err(ConfigError::Invalid {
                field: "scheduler.spin_threshold",
                ..
            })
        ));
    }

    #[test]
    fn test_load_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("metronome.yaml");
        fs::write(
            &path,
            "tempo: 96\nsound:\n  device: mock\n  samples:\n    forte: clicks/high.wav\n",
        )?;

        let metronome = Metronome::load(&path)?;
        assert_eq!(96.0, metronome.tempo());
        assert_eq!(
            Some(dir.path().join("clicks/high.wav").as_path()),
            metronome.sound().samples().path_for(Forte)
        );
        assert_eq!(None, metronome.sound().samples().path_for(Piano));

        assert!(matches!(
            Metronome::load(&dir.path().join("missing.yaml")),
            Err(ConfigError::Load(_))
        ));
        Ok(())
    }
}
