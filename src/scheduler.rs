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

//! The beat scheduler.
//!
//! The scheduler owns the playback state and decides when each beat fires and how
//! it sounds. It never reads the clock itself: every operation that depends on time
//! takes the current instant, and the caller is expected to invoke `tick` once the
//! armed deadline has passed. This keeps the timing rules deterministic and lets
//! the control thread decide how to wait.

use std::{fmt, sync::Arc, time::Duration, time::Instant};

use tracing::{debug, info, span, warn, Level, Span};

use crate::{
    accent::{AccentLevel, AccentPattern},
    signature::TimeSignature,
    sink::SoundSink,
    tap::TapTempo,
    tempo,
};

/// Whether the metronome is running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
}

/// A consistent view of the scheduler's state for observers.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub state: PlaybackState,
    pub current_beat: usize,
    pub tempo_bpm: f64,
    pub time_signature: TimeSignature,
    pub accent_pattern: AccentPattern,
}

impl Snapshot {
    /// Returns true if the metronome is playing.
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} | {:.1} BPM | {} | beat {} | {}",
            self.state,
            self.tempo_bpm,
            self.time_signature,
            self.current_beat + 1,
            self.accent_pattern
        )
    }
}

/// The next point in time at which a beat should fire. The generation identifies
/// the arming; any change that invalidates a pending deadline bumps it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    pub at: Instant,
    pub generation: u64,
}

/// A beat that was fired.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Beat {
    /// The beat's position in the bar, starting at 0.
    pub index: usize,
    /// The resolved accent.
    pub level: AccentLevel,
    /// When the beat was fired.
    pub at: Instant,
    /// False if the beat was muted or the sink failed to play it.
    pub sounded: bool,
}

/// The armed deadline and the generation counter that guards it.
#[derive(Default)]
struct Timer {
    generation: u64,
    deadline: Option<Deadline>,
}

impl Timer {
    /// Replaces the pending deadline. The old one can no longer fire.
    fn arm(&mut self, at: Instant) {
        self.generation += 1;
        self.deadline = Some(Deadline {
            at,
            generation: self.generation,
        });
    }

    fn cancel(&mut self) {
        self.generation += 1;
        self.deadline = None;
    }
}

pub struct Scheduler {
    sink: Arc<dyn SoundSink>,
    state: PlaybackState,
    current_beat: usize,
    tempo_bpm: f64,
    time_signature: TimeSignature,
    pattern: AccentPattern,
    tap: TapTempo,
    timer: Timer,
    /// Set after a change of meter so the next tick plays the downbeat instead of advancing.
    downbeat_pending: bool,
    span: Span,
}

impl Scheduler {
    /// Creates a stopped scheduler. A pattern that doesn't fit the time signature is resized.
    pub fn new(
        sink: Arc<dyn SoundSink>,
        tempo_bpm: f64,
        time_signature: TimeSignature,
        pattern: AccentPattern,
        tap: TapTempo,
    ) -> Scheduler {
        let pattern = if pattern.len() == time_signature.beats_per_bar() as usize {
            pattern
        } else {
            AccentPattern::for_signature(&time_signature, Some(&pattern))
        };

        Scheduler {
            sink,
            state: PlaybackState::Stopped,
            current_beat: 0,
            tempo_bpm: tempo::clamp_bpm(tempo_bpm).unwrap_or(tempo::DEFAULT_BPM),
            time_signature,
            pattern,
            tap,
            timer: Timer::default(),
            downbeat_pending: false,
            span: span!(Level::INFO, "scheduler"),
        }
    }

    /// Starts playback. The downbeat sounds immediately and the next beat is armed
    /// one interval later. Does nothing if already playing.
    pub fn start(&mut self, now: Instant) -> Option<Beat> {
        let _enter = self.span.enter();

        if self.state == PlaybackState::Playing {
            debug!("Already playing.");
            return None;
        }

        info!(
            tempo = self.tempo_bpm,
            time_signature = self.time_signature.to_string(),
            pattern = self.pattern.to_string(),
            "Starting."
        );
        self.state = PlaybackState::Playing;
        self.current_beat = 0;
        self.downbeat_pending = false;
        let beat = self.fire(0, now);
        let next = now + self.interval();
        self.timer.arm(next);
        Some(beat)
    }

    /// Stops playback and rewinds to the downbeat. Safe to call when stopped.
    pub fn stop(&mut self) {
        let _enter = self.span.enter();

        if self.state == PlaybackState::Playing {
            info!("Stopping.");
        }
        self.state = PlaybackState::Stopped;
        self.timer.cancel();
        self.current_beat = 0;
        self.downbeat_pending = false;
    }

    /// Starts when stopped, stops when playing.
    pub fn toggle_playback(&mut self, now: Instant) -> Option<Beat> {
        match self.state {
            PlaybackState::Stopped => self.start(now),
            PlaybackState::Playing => {
                self.stop();
                None
            }
        }
    }

    /// Fires the beat for an elapsed deadline and arms the next one. Returns None
    /// if the deadline is stale, not yet due, or playback has stopped.
    pub fn tick(&mut self, now: Instant, generation: u64) -> Option<Beat> {
        let _enter = self.span.enter();

        let deadline = self.timer.deadline?;
        if self.state != PlaybackState::Playing || deadline.generation != generation {
            debug!(
                generation,
                current = deadline.generation,
                "Ignoring stale deadline."
            );
            return None;
        }
        if now < deadline.at {
            return None;
        }

        let beats_per_bar = self.time_signature.beats_per_bar() as usize;
        let index = if self.downbeat_pending {
            self.downbeat_pending = false;
            0
        } else {
            (self.current_beat + 1) % beats_per_bar.max(1)
        };
        self.current_beat = index;
        let beat = self.fire(index, now);

        // Tempo is read fresh on every tick, so a change lands on the next boundary.
        let interval = self.interval();
        let mut next = deadline.at + interval;
        if next <= now {
            let missed = (now - deadline.at).as_secs_f64() / interval.as_secs_f64();
            warn!(
                missed = missed.floor() as u64,
                "Fell behind schedule, skipping missed beats."
            );
            next = now + interval;
        }
        self.timer.arm(next);

        Some(beat)
    }

    /// Sets the tempo, clamped to the supported range. A pending beat keeps its
    /// deadline and the new interval applies from the following beat.
    pub fn set_tempo(&mut self, bpm: f64) {
        let _enter = self.span.enter();

        let Some(bpm) = tempo::clamp_bpm(bpm) else {
            warn!(bpm, "Ignoring invalid tempo.");
            return;
        };
        if bpm == self.tempo_bpm {
            return;
        }

        info!(from = self.tempo_bpm, to = bpm, "Changing tempo.");
        self.tempo_bpm = bpm;
        if let Some(deadline) = self.timer.deadline {
            self.timer.arm(deadline.at);
        }
    }

    /// Changes the meter from raw values. Zero values are rejected and leave
    /// everything unchanged. Returns true if the change was applied.
    pub fn set_time_signature(&mut self, beats_per_bar: u32, subdivision_group: u32) -> bool {
        match TimeSignature::new(beats_per_bar, subdivision_group) {
            Some(time_signature) => {
                self.set_signature(time_signature);
                true
            }
            None => {
                let _enter = self.span.enter();
                warn!(
                    beats_per_bar,
                    subdivision_group, "Ignoring invalid time signature."
                );
                false
            }
        }
    }

    /// Changes the meter. The accent pattern is rebuilt keeping the user's edits and
    /// the bar restarts: while playing, the next beat is the new meter's downbeat.
    pub fn set_signature(&mut self, time_signature: TimeSignature) {
        let _enter = self.span.enter();

        info!(
            from = self.time_signature.to_string(),
            to = time_signature.to_string(),
            "Changing time signature."
        );
        self.pattern = AccentPattern::for_signature(&time_signature, Some(&self.pattern));
        self.time_signature = time_signature;
        self.current_beat = 0;

        if self.state == PlaybackState::Playing {
            self.downbeat_pending = true;
            if let Some(deadline) = self.timer.deadline {
                self.timer.arm(deadline.at);
            }
        }
    }

    /// Sets the accent of one beat. Out of range indices are ignored.
    pub fn update_accent(&mut self, index: usize, level: AccentLevel) {
        if !self.pattern.update(index, level) {
            let _enter = self.span.enter();
            debug!(index, "Ignoring accent update for a beat outside the bar.");
        }
    }

    /// Cycles the accent of one beat. Out of range indices are ignored.
    pub fn cycle_accent(&mut self, index: usize) {
        if self.pattern.cycle(index).is_none() {
            let _enter = self.span.enter();
            debug!(index, "Ignoring accent cycle for a beat outside the bar.");
        }
    }

    /// Records a tap and applies the estimated tempo once there is one.
    pub fn record_tap(&mut self, now: Instant) -> Option<f64> {
        let bpm = self.tap.record_tap(now)?;
        self.set_tempo(bpm);
        Some(self.tempo_bpm)
    }

    /// Returns the armed deadline, if playing.
    pub fn deadline(&self) -> Option<Deadline> {
        self.timer.deadline
    }

    /// Returns the time between beats at the current tempo.
    pub fn interval(&self) -> Duration {
        tempo::interval(self.tempo_bpm)
    }

    /// Returns the current state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            current_beat: self.current_beat,
            tempo_bpm: self.tempo_bpm,
            time_signature: self.time_signature,
            accent_pattern: self.pattern.clone(),
        }
    }

    /// Resolves the accent for the beat and hands it to the sink. Sink failures are
    /// logged and otherwise ignored so that timing carries on.
    fn fire(&self, index: usize, now: Instant) -> Beat {
        let level = self.pattern.accent_for(index);
        let sounded = if level.is_muted() {
            false
        } else {
            match self.sink.play(level) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        err = e.to_string(),
                        sink = self.sink.to_string(),
                        beat = index,
                        "Unable to play beat."
                    );
                    false
                }
            }
        };

        debug!(beat = index, level = level.symbol(), sounded, "Beat.");
        Beat {
            index,
            level,
            at: now,
            sounded,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{accent::AccentLevel::*, sink::test::Sink};

    use super::*;

    fn scheduler(sink: &Sink) -> Scheduler {
        Scheduler::new(
            Arc::new(sink.clone()),
            120.0,
            TimeSignature::default(),
            AccentPattern::default(),
            TapTempo::default(),
        )
    }

    /// Ticks at the armed deadline and returns the fired beat.
    fn tick(scheduler: &mut Scheduler) -> Beat {
        let deadline = scheduler.deadline().expect("expected a deadline");
        scheduler
            .tick(deadline.at, deadline.generation)
            .expect("expected a beat")
    }

    #[test]
    fn test_start_plays_downbeat_immediately() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        let now = Instant::now();

        let beat = scheduler.start(now).expect("expected the downbeat");
        assert_eq!(0, beat.index);
        assert_eq!(Forte, beat.level);
        assert!(beat.sounded);
        assert_eq!(vec![Forte], sink.levels());
        assert!(scheduler.snapshot().is_playing());

        let deadline = scheduler.deadline().expect("expected a deadline");
        assert_eq!(now + Duration::from_millis(500), deadline.at);

        // Starting again does nothing.
        assert!(scheduler.start(now).is_none());
        assert_eq!(1, sink.count());
        assert_eq!(Some(deadline), scheduler.deadline());
    }

    #[test]
    fn test_ticks_wrap_around_the_bar() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        scheduler.start(Instant::now());

        let indices: Vec<usize> = (0..6).map(|_| tick(&mut scheduler).index).collect();
        assert_eq!(vec![1, 2, 3, 0, 1, 2], indices);
        assert_eq!(
            vec![Forte, Piano, Piano, Piano, Forte, Piano, Piano],
            sink.levels()
        );
        assert_eq!(2, scheduler.snapshot().current_beat);
    }

    #[test]
    fn test_tick_spacing_matches_tempo() {
        for bpm in [40.0, 60.0, 97.0, 120.0, 180.0, 240.0] {
            let sink = Sink::get("mock-sink");
            let mut scheduler = scheduler(&sink);
            scheduler.set_tempo(bpm);
            let start = Instant::now();
            scheduler.start(start);

            let mut previous = start;
            for _ in 0..8 {
                let beat = tick(&mut scheduler);
                assert_eq!(tempo::interval(bpm), beat.at - previous, "bpm {}", bpm);
                previous = beat.at;
            }
        }
    }

    #[test]
    fn test_stop_and_restart_from_downbeat() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        scheduler.start(Instant::now());
        tick(&mut scheduler);
        tick(&mut scheduler);

        let stale = scheduler.deadline().expect("expected a deadline");
        scheduler.stop();
        assert_eq!(0, scheduler.snapshot().current_beat);
        assert_eq!(PlaybackState::Stopped, scheduler.snapshot().state);
        assert!(scheduler.deadline().is_none());
        assert!(scheduler.tick(stale.at, stale.generation).is_none());

        // Stopping twice is harmless.
        scheduler.stop();

        let beat = scheduler.start(Instant::now()).expect("expected the downbeat");
        assert_eq!(0, beat.index);
        assert_eq!(1, tick(&mut scheduler).index);
    }

    #[test]
    fn test_toggle() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        assert!(scheduler.toggle_playback(Instant::now()).is_some());
        assert!(scheduler.snapshot().is_playing());
        assert!(scheduler.toggle_playback(Instant::now()).is_none());
        assert!(!scheduler.snapshot().is_playing());
    }

    #[test]
    fn test_stale_and_early_ticks_are_ignored() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        let now = Instant::now();
        scheduler.start(now);

        let deadline = scheduler.deadline().expect("expected a deadline");
        assert!(scheduler.tick(deadline.at, deadline.generation + 1).is_none());
        assert!(scheduler
            .tick(deadline.at - Duration::from_millis(1), deadline.generation)
            .is_none());
        assert_eq!(Some(deadline), scheduler.deadline());
        assert_eq!(1, sink.count());

        // The same deadline can't fire twice.
        assert!(scheduler.tick(deadline.at, deadline.generation).is_some());
        assert!(scheduler.tick(deadline.at, deadline.generation).is_none());
    }

    #[test]
    fn test_tempo_change_is_deferred_to_next_beat() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        let start = Instant::now();
        scheduler.start(start);

        let before = scheduler.deadline().expect("expected a deadline");
        scheduler.set_tempo(60.0);
        let after = scheduler.deadline().expect("expected a deadline");

        // Same boundary, new arming.
        assert_eq!(before.at, after.at);
        assert_ne!(before.generation, after.generation);
        assert!(scheduler.tick(before.at, before.generation).is_none());

        // The in-flight beat is not skipped and the new interval applies after it.
        let beat = tick(&mut scheduler);
        assert_eq!(1, beat.index);
        assert_eq!(start + Duration::from_millis(500), beat.at);
        let next = scheduler.deadline().expect("expected a deadline");
        assert_eq!(beat.at + Duration::from_secs(1), next.at);
    }

    #[test]
    fn test_faster_tempo_never_double_fires() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        scheduler.set_tempo(40.0);
        let start = Instant::now();
        scheduler.start(start);

        // Speed up halfway through the first interval.
        scheduler.set_tempo(240.0);
        let first = tick(&mut scheduler);
        let second = tick(&mut scheduler);
        assert_eq!(start + Duration::from_millis(1500), first.at);
        assert_eq!(Duration::from_millis(250), second.at - first.at);
        assert_eq!(vec![0, 1, 2], vec![0, first.index, second.index]);
    }

    #[test]
    fn test_tempo_is_clamped() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        scheduler.set_tempo(500.0);
        assert_eq!(240.0, scheduler.snapshot().tempo_bpm);
        scheduler.set_tempo(1.0);
        assert_eq!(40.0, scheduler.snapshot().tempo_bpm);
        scheduler.set_tempo(f64::NAN);
        assert_eq!(40.0, scheduler.snapshot().tempo_bpm);
    }

    #[test]
    fn test_signature_change_while_playing_restarts_bar() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        scheduler.start(Instant::now());
        tick(&mut scheduler);
        tick(&mut scheduler);

        let stale = scheduler.deadline().expect("expected a deadline");
        assert!(scheduler.set_time_signature(6, 3));
        let snapshot = scheduler.snapshot();
        assert_eq!(0, snapshot.current_beat);
        assert!(snapshot.is_playing());
        assert_eq!(
            vec![Forte, Piano, Piano, MezzoForte, Piano, Piano],
            snapshot.accent_pattern.levels()
        );

        // The old arming is dead, the new one keeps the same boundary.
        assert!(scheduler.tick(stale.at, stale.generation).is_none());
        let deadline = scheduler.deadline().expect("expected a deadline");
        assert_eq!(stale.at, deadline.at);

        let indices: Vec<usize> = (0..7).map(|_| tick(&mut scheduler).index).collect();
        assert_eq!(vec![0, 1, 2, 3, 4, 5, 0], indices);
    }

    #[test]
    fn test_shrinking_bar_never_indexes_past_the_end() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        scheduler.set_signature(TimeSignature::PRESETS[7]);
        scheduler.start(Instant::now());
        for _ in 0..10 {
            tick(&mut scheduler);
        }

        scheduler.set_time_signature(2, 1);
        for _ in 0..5 {
            let beat = tick(&mut scheduler);
            assert!(beat.index < 2);
        }
    }

    #[test]
    fn test_invalid_signature_is_rejected() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        scheduler.start(Instant::now());
        tick(&mut scheduler);
        let before = scheduler.snapshot();

        assert!(!scheduler.set_time_signature(0, 1));
        assert!(!scheduler.set_time_signature(4, 0));
        assert_eq!(before, scheduler.snapshot());
    }

    #[test]
    fn test_signature_change_while_stopped() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        scheduler.update_accent(1, MezzoForte);
        scheduler.update_accent(3, MezzoForte);
        assert!(scheduler.set_time_signature(3, 1));
        assert_eq!(
            vec![Forte, MezzoForte, Piano],
            scheduler.snapshot().accent_pattern.levels()
        );

        // Starting plays the downbeat, then continues normally.
        scheduler.start(Instant::now());
        assert_eq!(1, tick(&mut scheduler).index);
    }

    #[test]
    fn test_muted_beats_advance_silently() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        scheduler.update_accent(1, Mute);
        scheduler.start(Instant::now());

        let beat = tick(&mut scheduler);
        assert_eq!(1, beat.index);
        assert_eq!(Mute, beat.level);
        assert!(!beat.sounded);
        assert_eq!(vec![Forte], sink.levels());

        assert_eq!(2, tick(&mut scheduler).index);
        assert_eq!(vec![Forte, Piano], sink.levels());
    }

    #[test]
    fn test_sink_failure_keeps_time() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        sink.set_failing(true);

        let beat = scheduler.start(Instant::now()).expect("expected the downbeat");
        assert!(!beat.sounded);
        let beat = tick(&mut scheduler);
        assert_eq!(1, beat.index);
        assert!(!beat.sounded);
        assert!(scheduler.snapshot().is_playing());

        sink.set_failing(false);
        assert!(tick(&mut scheduler).sounded);
        assert_eq!(vec![Piano], sink.levels());
    }

    #[test]
    fn test_late_tick_rebases_instead_of_bursting() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        let start = Instant::now();
        scheduler.start(start);

        let deadline = scheduler.deadline().expect("expected a deadline");
        let late = deadline.at + Duration::from_millis(1700);
        let beat = scheduler
            .tick(late, deadline.generation)
            .expect("expected a beat");
        assert_eq!(1, beat.index);

        let next = scheduler.deadline().expect("expected a deadline");
        assert_eq!(late + Duration::from_millis(500), next.at);
    }

    #[test]
    fn test_accent_edits() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        scheduler.cycle_accent(0);
        scheduler.update_accent(2, Mute);
        scheduler.update_accent(4, Forte);
        scheduler.cycle_accent(17);
        assert_eq!(
            vec![MezzoForte, Piano, Mute, Piano],
            scheduler.snapshot().accent_pattern.levels()
        );
    }

    #[test]
    fn test_record_tap_sets_tempo() {
        let sink = Sink::get("mock-sink");
        let mut scheduler = scheduler(&sink);
        let start = Instant::now();

        assert_eq!(None, scheduler.record_tap(start));
        assert_eq!(120.0, scheduler.snapshot().tempo_bpm);
        let bpm = scheduler
            .record_tap(start + Duration::from_millis(750))
            .expect("expected a tempo");
        assert!((bpm - 80.0).abs() < 1e-9);
        assert_eq!(bpm, scheduler.snapshot().tempo_bpm);
    }

    #[test]
    fn test_mismatched_pattern_is_resized() {
        let sink = Sink::get("mock-sink");
        let scheduler = Scheduler::new(
            Arc::new(sink),
            120.0,
            TimeSignature::PRESETS[4],
            AccentPattern::new(vec![Forte, Mute]),
            TapTempo::default(),
        );
        assert_eq!(
            vec![Forte, Mute, Piano, MezzoForte, Piano, Piano],
            scheduler.snapshot().accent_pattern.levels()
        );
    }
}
