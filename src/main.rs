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
use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use metronome::accent::AccentPattern;
use metronome::config::{self, Sound};
use metronome::controller::{keyboard, Controller};
use metronome::metronome::Metronome;
use metronome::sink;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A metronome."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays the metronome through an audio device.
    Play {
        /// The device name to play through.
        #[arg[short, long, default_value = config::DEFAULT_DEVICE]]
        device: String,
        /// The tempo in beats per minute.
        #[arg[short, long]]
        tempo: Option<f64>,
        /// The time signature, e.g. 4/4, 6/8 or 7/8:1.
        #[arg[short, long]]
        signature: Option<String>,
        /// The accent of every beat in the bar, e.g. f,p,p,p.
        #[arg[short, long]]
        accents: Option<String>,
        /// How long to play for, e.g. 30s. Plays until interrupted if unset.
        #[arg[long]]
        duration: Option<String>,
    },
    /// Start will start the metronome with the keyboard controller.
    Start {
        /// The path to the metronome config.
        config_path: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = sink::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices.iter() {
                println!("- {}", device);
            }
        }
        Commands::Play {
            device,
            tempo,
            signature,
            accents,
            duration,
        } => {
            let mut config = config::Metronome::default().with_sound(Sound::new(&device));
            if let Some(tempo) = tempo {
                config = config.with_tempo(tempo);
            }
            if let Some(signature) = signature {
                config = config.with_time_signature(&signature);
            }
            if let Some(accents) = accents {
                let pattern = accents.parse::<AccentPattern>()?;
                config = config.with_accents(pattern.levels().to_vec());
            }
            let duration: Option<Duration> = match duration {
                Some(duration) => Some(
                    DurationString::from_string(duration)
                        .map_err(|e| e.to_string())?
                        .into(),
                ),
                None => None,
            };

            let sink = sink::get_sink(config.sound())?;
            let metronome = Metronome::new(sink, &config)?;
            let mut beats = metronome.beats();
            metronome.start();

            let report = async move {
                loop {
                    match beats.recv().await {
                        Ok(beat) => {
                            info!(beat = beat.index + 1, level = beat.level.symbol(), "Beat.")
                        }
                        Err(RecvError::Lagged(missed)) => warn!(missed, "Missed beat reports."),
                        Err(RecvError::Closed) => return,
                    }
                }
            };

            match duration {
                Some(duration) => {
                    let _ = tokio::time::timeout(duration, report).await;
                }
                None => report.await,
            }
            metronome.stop();
        }
        Commands::Start { config_path } => {
            let config = match config_path {
                Some(config_path) => config::Metronome::load(&PathBuf::from(config_path))?,
                None => config::Metronome::default(),
            };

            let sink = sink::get_sink(config.sound())?;
            let metronome = Arc::new(Metronome::new(sink, &config)?);
            let mut controller =
                Controller::new(metronome.clone(), Arc::new(keyboard::Driver::new()))?;
            controller.join().await?;
            info!(snapshot = metronome.snapshot().to_string(), "Exiting.");
        }
    }

    Ok(())
}
