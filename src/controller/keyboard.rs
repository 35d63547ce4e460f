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
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use crate::{accent::AccentLevel, signature::TimeSignature};

use super::Event;

const PLAY: &str = "play";
const STOP: &str = "stop";
const TOGGLE: &str = "toggle";
const TAP: &str = "tap";
const TEMPO: &str = "tempo";
const SIG: &str = "sig";
const ACCENT: &str = "accent";
const CYCLE: &str = "cycle";
const STATUS: &str = "status";
const QUIT: &str = "quit";

/// A single line of keyboard input, interpreted.
#[derive(Debug, PartialEq)]
enum Input {
    Event(Event),
    Quit,
    Invalid(String),
}

/// A controller that controls a metronome using the keyboard.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads and handles one line. Returns false once input is exhausted or the user quits.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}, {}, {}, {}, {} <bpm>, {} <N/D[:G]>, {} <beat> <f|mf|p|mute>, {} <beat>, {}, {}): ",
            PLAY, STOP, TOGGLE, TAP, TEMPO, SIG, ACCENT, CYCLE, STATUS, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        match parse(&input) {
            Input::Event(event) => events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
            Input::Quit => return Ok(false),
            Input::Invalid(reason) => {
                warn!(input = input.trim(), reason, "Unrecognized input");
            }
        }
        Ok(true)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a line of input. Beats are counted from 1 on the keyboard.
fn parse(input: &str) -> Input {
    let lowered = input.trim().to_lowercase();
    let mut words = lowered.split_whitespace();
    let Some(command) = words.next() else {
        return Input::Invalid("empty input".to_string());
    };
    let args: Vec<&str> = words.collect();

    let event = match (command, args.as_slice()) {
        (PLAY, []) => Event::Play,
        (STOP, []) => Event::Stop,
        (TOGGLE, []) => Event::Toggle,
        (TAP, []) => Event::Tap,
        (STATUS, []) => Event::Status,
        (QUIT, []) => return Input::Quit,
        (TEMPO, [bpm]) => match bpm.parse::<f64>() {
            Ok(bpm) => Event::Tempo(bpm),
            Err(e) => return Input::Invalid(e.to_string()),
        },
        (SIG, [time_signature]) => match time_signature.parse::<TimeSignature>() {
            Ok(time_signature) => Event::TimeSignature(time_signature),
            Err(e) => return Input::Invalid(e.to_string()),
        },
        (ACCENT, [beat, level]) => {
            let index = match beat_index(beat) {
                Ok(index) => index,
                Err(reason) => return Input::Invalid(reason),
            };
            match level.parse::<AccentLevel>() {
                Ok(level) => Event::Accent(index, level),
                Err(e) => return Input::Invalid(e.to_string()),
            }
        }
        (CYCLE, [beat]) => match beat_index(beat) {
            Ok(index) => Event::Cycle(index),
            Err(reason) => return Input::Invalid(reason),
        },
        _ => return Input::Invalid("unknown command".to_string()),
    };

    Input::Event(event)
}

/// Converts a 1-based beat number into an index.
fn beat_index(beat: &str) -> Result<usize, String> {
    beat.parse::<usize>()
        .map_err(|e| e.to_string())?
        .checked_sub(1)
        .ok_or_else(|| "beats are numbered from 1".to_string())
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}

            info!("Keyboard driver stopped.");
            Ok(())
        })
    }
}
