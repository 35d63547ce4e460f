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
use std::error::Error;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Level};

use crate::{accent::AccentLevel, metronome::Metronome, signature::TimeSignature};

pub mod keyboard;

/// Controller events that will trigger behavior in the metronome.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Starts playback from the downbeat. If already playing, does nothing.
    Play,

    /// Stops playback. If stopped, does nothing.
    Stop,

    /// Starts when stopped, stops when playing.
    Toggle,

    /// Records a tap for tap tempo.
    Tap,

    /// Sets the tempo in beats per minute.
    Tempo(f64),

    /// Changes the meter.
    TimeSignature(TimeSignature),

    /// Sets the accent of the beat at the given 0-based index.
    Accent(usize, AccentLevel),

    /// Cycles the accent of the beat at the given 0-based index.
    Cycle(usize),

    /// Reports the current state.
    Status,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Controls a metronome.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(
        metronome: Arc<Metronome>,
        driver: Arc<dyn Driver>,
    ) -> Result<Controller, Box<dyn Error>> {
        Ok(Controller {
            handle: tokio::spawn(async move { Controller::trigger_events(metronome, driver).await }),
        })
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Triggers metronome events by watching the driver and getting events from it.
    async fn trigger_events(metronome: Arc<Metronome>, driver: Arc<dyn Driver>) {
        let span = span!(Level::INFO, "controller");
        let _enter = span.enter();

        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);

        info!(
            snapshot = metronome.subscribe().borrow().to_string(),
            "Controller started."
        );

        loop {
            if let Some(event) = events_rx.recv().await {
                info!(event = format!("{:?}", event), "Received event.");

                match event {
                    Event::Play => metronome.start(),
                    Event::Stop => metronome.stop(),
                    Event::Toggle => metronome.toggle_playback(),
                    Event::Tap => {
                        // The reply comes from the control thread, so wait for it off the runtime.
                        let tapped = metronome.clone();
                        match tokio::task::spawn_blocking(move || tapped.record_tap()).await {
                            Ok(Some(bpm)) => info!(bpm, "Tap tempo."),
                            Ok(None) => info!("Tap recorded, keep tapping."),
                            Err(e) => error!("Error recording tap: {}", e),
                        }
                    }
                    Event::Tempo(bpm) => metronome.set_tempo(bpm),
                    Event::TimeSignature(time_signature) => metronome.set_signature(time_signature),
                    Event::Accent(index, level) => metronome.update_accent(index, level),
                    Event::Cycle(index) => metronome.cycle_accent(index),
                    Event::Status => {
                        let status = metronome.clone();
                        match tokio::task::spawn_blocking(move || status.snapshot()).await {
                            Ok(snapshot) => println!("{}", snapshot),
                            Err(e) => error!("Error getting status: {}", e),
                        }
                    }
                }
            } else {
                info!("Controller closing.");
                match join_handle.await {
                    Ok(Err(e)) => error!("Event monitor failed: {}", e),
                    Err(e) => error!("Error waiting for event monitor to stop: {}", e),
                    Ok(Ok(())) => {}
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{io, sync::Arc};

    use parking_lot::Mutex;
    use tokio::{
        sync::mpsc::{self, Receiver, Sender},
        task::JoinHandle,
    };

    use crate::{
        accent::AccentLevel::*, config, metronome::Metronome, scheduler::PlaybackState,
        signature::TimeSignature, sink::test::Sink, testutil::eventually_async,
    };

    use super::{Controller, Driver, Event};

    /// A driver that forwards whatever the test sends it.
    struct TestDriver {
        events_rx: Mutex<Option<Receiver<Event>>>,
    }

    impl TestDriver {
        fn new() -> (TestDriver, Sender<Event>) {
            let (events_tx, events_rx) = mpsc::channel(8);
            (
                TestDriver {
                    events_rx: Mutex::new(Some(events_rx)),
                },
                events_tx,
            )
        }
    }

    impl Driver for TestDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let events_rx = self.events_rx.lock().take();
            tokio::spawn(async move {
                let Some(mut events_rx) = events_rx else {
                    return Ok(());
                };
                while let Some(event) = events_rx.recv().await {
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_controller() -> Result<(), Box<dyn std::error::Error>> {
        let sink = Sink::get("mock-sink");
        let metronome = Arc::new(Metronome::new(
            Arc::new(sink.clone()),
            &config::Metronome::default(),
        )?);
        let (driver, events_tx) = TestDriver::new();
        let mut controller = Controller::new(metronome.clone(), Arc::new(driver))?;

        events_tx.send(Event::Tempo(200.0)).await?;
        eventually_async(
            || async { metronome.snapshot().tempo_bpm == 200.0 },
            "Tempo never changed",
        )
        .await;

        events_tx
            .send(Event::TimeSignature(TimeSignature::PRESETS[1]))
            .await?;
        events_tx.send(Event::Accent(2, Mute)).await?;
        events_tx.send(Event::Cycle(0)).await?;
        eventually_async(
            || async {
                metronome.snapshot().accent_pattern.levels() == [MezzoForte, Piano, Mute]
            },
            "Accents never changed",
        )
        .await;

        events_tx.send(Event::Play).await?;
        eventually_async(
            || async { metronome.snapshot().is_playing() },
            "Metronome never started",
        )
        .await;
        assert_eq!(Some(&MezzoForte), sink.levels().first());

        events_tx.send(Event::Toggle).await?;
        eventually_async(
            || async { metronome.snapshot().state == PlaybackState::Stopped },
            "Metronome never stopped",
        )
        .await;

        events_tx.send(Event::Status).await?;
        drop(events_tx);
        controller.join().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_signature_and_tap() -> Result<(), Box<dyn std::error::Error>> {
        let sink = Sink::get("mock-sink");
        let metronome = Arc::new(Metronome::new(
            Arc::new(sink.clone()),
            &config::Metronome::default(),
        )?);
        let (driver, events_tx) = TestDriver::new();
        let mut controller = Controller::new(metronome.clone(), Arc::new(driver))?;

        events_tx
            .send(Event::TimeSignature("7/8".parse()?))
            .await?;
        eventually_async(
            || async { metronome.snapshot().time_signature.to_string() == "7/8" },
            "Time signature never changed",
        )
        .await;
        assert_eq!(7, metronome.snapshot().accent_pattern.len());

        // Taps this close together estimate a tempo above the maximum.
        for _ in 0..4 {
            events_tx.send(Event::Tap).await?;
        }
        eventually_async(
            || async { metronome.snapshot().tempo_bpm == crate::tempo::MAX_BPM },
            "Tap tempo never applied",
        )
        .await;

        events_tx.send(Event::Status).await?;
        drop(events_tx);
        controller.join().await?;
        Ok(())
    }
}
