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

//! The metronome handle and its control thread.
//!
//! A single thread owns the scheduler. Every request is serialized onto it through
//! a command queue, and the thread waits on that queue until the next beat is due.
//! The last stretch before a deadline is spun so the beat lands on time.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, span, Level, Span};

use crate::{
    accent::AccentLevel,
    config::{self, ConfigError},
    priority,
    scheduler::{Beat, Deadline, Scheduler, Snapshot},
    signature::TimeSignature,
    sink::SoundSink,
};

/// How many fired beats a lagging beat subscriber can fall behind by.
const BEAT_CHANNEL_CAPACITY: usize = 64;

enum Command {
    Start,
    Stop,
    Toggle,
    SetTempo(f64),
    SetTimeSignature(u32, u32),
    SetSignature(TimeSignature),
    UpdateAccent(usize, AccentLevel),
    CycleAccent(usize),
    RecordTap(Instant, Sender<Option<f64>>),
    Snapshot(Sender<Snapshot>),
    Shutdown,
}

/// A running metronome. Dropping it stops playback and joins the control thread.
pub struct Metronome {
    commands: Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    beats: broadcast::Sender<Beat>,
    join: Option<JoinHandle<()>>,
    span: Span,
}

impl Metronome {
    /// Creates a stopped metronome that plays through the given sink.
    pub fn new(
        sink: Arc<dyn SoundSink>,
        config: &config::Metronome,
    ) -> Result<Metronome, ConfigError> {
        let span = span!(Level::INFO, "metronome");
        let _enter = span.enter();

        let scheduler = Scheduler::new(
            sink.clone(),
            config.tempo(),
            config.time_signature()?,
            config.accent_pattern()?,
            config.tap().estimator()?,
        );
        let scheduler_config = config.scheduler();
        let spin_threshold = scheduler_config.spin_threshold()?;
        let thread_priority = scheduler_config.thread_priority();
        let realtime = scheduler_config.realtime();

        let (commands_tx, commands_rx) = unbounded();
        let (snapshots_tx, snapshots_rx) = watch::channel(scheduler.snapshot());
        let (beats_tx, _) = broadcast::channel(BEAT_CHANNEL_CAPACITY);

        info!(
            sink = sink.to_string(),
            snapshot = scheduler.snapshot().to_string(),
            "Starting metronome control thread."
        );

        let control = ControlLoop {
            scheduler,
            commands: commands_rx,
            snapshots: snapshots_tx,
            beats: beats_tx.clone(),
            spin_threshold,
        };
        let thread_span = span.clone();
        let join = thread::spawn(move || {
            let _enter = thread_span.enter();
            priority::raise_current_thread_priority(thread_priority, realtime);
            control.run();
        });

        drop(_enter);
        Ok(Metronome {
            commands: commands_tx,
            snapshots: snapshots_rx,
            beats: beats_tx,
            join: Some(join),
            span,
        })
    }

    /// Starts playback from the downbeat. Does nothing if already playing.
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Stops playback and rewinds to the downbeat.
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Starts when stopped, stops when playing.
    pub fn toggle_playback(&self) {
        self.send(Command::Toggle);
    }

    /// Sets the tempo in beats per minute. Out of range values are clamped.
    pub fn set_tempo(&self, bpm: f64) {
        self.send(Command::SetTempo(bpm));
    }

    /// Changes the meter. Zero values are ignored.
    pub fn set_time_signature(&self, beats_per_bar: u32, subdivision_group: u32) {
        self.send(Command::SetTimeSignature(beats_per_bar, subdivision_group));
    }

    /// Changes the meter to a parsed time signature, keeping its denominator.
    pub fn set_signature(&self, time_signature: TimeSignature) {
        self.send(Command::SetSignature(time_signature));
    }

    /// Sets the accent of a single beat.
    pub fn update_accent(&self, index: usize, level: AccentLevel) {
        self.send(Command::UpdateAccent(index, level));
    }

    /// Moves a single beat to the next accent level.
    pub fn cycle_accent(&self, index: usize) {
        self.send(Command::CycleAccent(index));
    }

    /// Records a tap now. Returns the tempo that was applied, if any.
    pub fn record_tap(&self) -> Option<f64> {
        self.record_tap_at(Instant::now())
    }

    /// Records a tap at the given time. Returns the tempo that was applied, if any.
    pub fn record_tap_at(&self, at: Instant) -> Option<f64> {
        let (tx, rx) = bounded(1);
        if !self.send(Command::RecordTap(at, tx)) {
            return None;
        }
        rx.recv().ok().flatten()
    }

    /// Returns the current state, after every previously sent command has been applied.
    pub fn snapshot(&self) -> Snapshot {
        let (tx, rx) = bounded(1);
        if self.send(Command::Snapshot(tx)) {
            if let Ok(snapshot) = rx.recv() {
                return snapshot;
            }
        }
        self.snapshots.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Subscribes to fired beats.
    pub fn beats(&self) -> broadcast::Receiver<Beat> {
        self.beats.subscribe()
    }

    /// Stops playback and waits for the control thread to exit. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };

        let _enter = self.span.enter();
        info!("Shutting down metronome.");
        // The thread may already be gone, in which case there is nothing to tell it.
        let _ = self.commands.send(Command::Shutdown);
        if join.join().is_err() {
            error!("Metronome control thread panicked.");
        }
    }

    fn send(&self, command: Command) -> bool {
        if self.commands.send(command).is_err() {
            let _enter = self.span.enter();
            error!("Metronome control thread is not running.");
            return false;
        }
        true
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The state owned by the control thread.
struct ControlLoop {
    scheduler: Scheduler,
    commands: Receiver<Command>,
    snapshots: watch::Sender<Snapshot>,
    beats: broadcast::Sender<Beat>,
    spin_threshold: Duration,
}

impl ControlLoop {
    fn run(mut self) {
        loop {
            let command = match self.scheduler.deadline() {
                Some(deadline) => {
                    let wake = deadline
                        .at
                        .checked_sub(self.spin_threshold)
                        .unwrap_or(deadline.at);
                    match self.commands.recv_deadline(wake) {
                        Ok(command) => command,
                        Err(RecvTimeoutError::Timeout) => {
                            self.fire(deadline);
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.commands.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            if !self.handle(command) {
                break;
            }
            self.publish();
        }

        self.scheduler.stop();
        self.publish();
        debug!("Metronome control thread exiting.");
    }

    /// Spins until the deadline and then ticks.
    fn fire(&mut self, deadline: Deadline) {
        let remaining = deadline.at.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            spin_sleep::sleep(remaining);
        }

        let beat = self.scheduler.tick(Instant::now(), deadline.generation);
        self.announce(beat);
        self.publish();
    }

    /// Applies a command. Returns false when the loop should exit.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Start => {
                let beat = self.scheduler.start(Instant::now());
                self.announce(beat);
            }
            Command::Stop => self.scheduler.stop(),
            Command::Toggle => {
                let beat = self.scheduler.toggle_playback(Instant::now());
                self.announce(beat);
            }
            Command::SetTempo(bpm) => self.scheduler.set_tempo(bpm),
            Command::SetTimeSignature(beats_per_bar, subdivision_group) => {
                self.scheduler
                    .set_time_signature(beats_per_bar, subdivision_group);
            }
            Command::SetSignature(time_signature) => self.scheduler.set_signature(time_signature),
            Command::UpdateAccent(index, level) => self.scheduler.update_accent(index, level),
            Command::CycleAccent(index) => self.scheduler.cycle_accent(index),
            Command::RecordTap(at, reply) => {
                let bpm = self.scheduler.record_tap(at);
                // The requester may have given up waiting.
                let _ = reply.send(bpm);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.scheduler.snapshot());
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn announce(&self, beat: Option<Beat>) {
        if let Some(beat) = beat {
            // Sending only fails when nobody is listening.
            let _ = self.beats.send(beat);
        }
    }

    /// Publishes the scheduler state if it changed.
    fn publish(&self) {
        let snapshot = self.scheduler.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}
