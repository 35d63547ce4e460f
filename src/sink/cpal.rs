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
use std::{fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{error, info, span, warn, Level};

use crate::{accent::AccentLevel, config};

use super::{click::Clicks, voices::VoicePool, SinkError, SoundSink};

/// How many beats may wait for the audio callback before play reports busy.
const TRIGGER_QUEUE_SIZE: usize = 16;

/// Frames mixed per pass of the output callback. Larger callbacks are rendered in several passes.
const SCRATCH_FRAMES: usize = 1024;

/// An output device as reported by cpal.
pub struct DeviceInfo {
    name: String,
    host: String,
    max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// Lists output devices across every available host.
pub fn list() -> Result<Vec<DeviceInfo>, SinkError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout().map_err(|e| SinkError::Device(e.to_string()))?;
    let _shh_stderr = shh::stderr().map_err(|e| SinkError::Device(e.to_string()))?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host = cpal::host_from_id(host_id).map_err(|e| SinkError::Device(e.to_string()))?;
        let host_devices = match host.output_devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs
                .map(|output_config| output_config.channels())
                .max()
                .unwrap_or(0);

            if max_channels > 0 {
                devices.push(DeviceInfo {
                    name: device.name().map_err(|e| SinkError::Device(e.to_string()))?,
                    host: host_id.name().to_string(),
                    max_channels,
                });
            }
        }
    }

    devices.sort_by_key(|device| device.name.to_string());
    Ok(devices)
}

/// Finds the named output device. "default" selects the host's default output.
fn find_device(name: &str) -> Result<cpal::Device, SinkError> {
    let host = cpal::default_host();
    if name == config::DEFAULT_DEVICE {
        return host
            .default_output_device()
            .ok_or_else(|| SinkError::Device("no default output device".to_string()));
    }

    let _shh_stderr = shh::stderr().map_err(|e| SinkError::Device(e.to_string()))?;
    host.output_devices()
        .map_err(|e| SinkError::Device(e.to_string()))?
        .find(|device| {
            device
                .name()
                .map(|device_name| device_name.trim() == name)
                .unwrap_or(false)
        })
        .ok_or_else(|| SinkError::Device(format!("no device found with name {}", name)))
}

/// Plays clicks through a cpal output stream.
///
/// The stream runs on its own thread because cpal streams can't move between
/// threads. Beats are handed to the audio callback through a bounded channel and
/// rendered from a fixed voice pool.
pub struct Sink {
    name: String,
    sample_rate: u32,
    trigger_tx: Sender<AccentLevel>,
    /// Dropping this sender tells the output thread to close the stream.
    shutdown_tx: Option<Sender<()>>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl Sink {
    /// Opens the configured device and starts the output stream.
    pub fn get(config: &config::Sound) -> Result<Sink, SinkError> {
        let span = span!(Level::INFO, "cpal sink");
        let _enter = span.enter();

        let name = config.device().to_string();
        let sample_rate = config.sample_rate();
        let clicks = Clicks::load(config.samples(), sample_rate, config.volume())?;
        let pool = VoicePool::new(clicks, config.voices());

        let (trigger_tx, trigger_rx) = crossbeam_channel::bounded(TRIGGER_QUEUE_SIZE);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let output_thread = {
            let name = name.clone();
            thread::spawn(move || {
                let stream = match Sink::open_stream(&name, sample_rate, pool, trigger_rx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(SinkError::Stream(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until the sink goes away.
                let _ = shutdown_rx.recv();
                drop(stream);
            })
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = output_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = output_thread.join();
                return Err(SinkError::Stream("output thread exited".to_string()));
            }
        }

        info!(device = name, sample_rate, "Output stream started.");
        Ok(Sink {
            name,
            sample_rate,
            trigger_tx,
            shutdown_tx: Some(shutdown_tx),
            output_thread: Some(output_thread),
        })
    }

    fn open_stream(
        name: &str,
        sample_rate: u32,
        pool: VoicePool,
        trigger_rx: Receiver<AccentLevel>,
    ) -> Result<cpal::Stream, SinkError> {
        let device = find_device(name)?;
        let default_config = device
            .default_output_config()
            .map_err(|e| SinkError::Device(e.to_string()))?;
        let stream_config = cpal::StreamConfig {
            channels: default_config.channels(),
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        match default_config.sample_format() {
            cpal::SampleFormat::F32 => {
                Sink::build_stream::<f32>(&device, &stream_config, pool, trigger_rx)
            }
            cpal::SampleFormat::I16 => {
                Sink::build_stream::<i16>(&device, &stream_config, pool, trigger_rx)
            }
            cpal::SampleFormat::I32 => {
                Sink::build_stream::<i32>(&device, &stream_config, pool, trigger_rx)
            }
            format => Err(SinkError::Stream(format!(
                "unsupported sample format {}",
                format
            ))),
        }
    }

    fn build_stream<T>(
        device: &cpal::Device,
        stream_config: &cpal::StreamConfig,
        mut pool: VoicePool,
        trigger_rx: Receiver<AccentLevel>,
    ) -> Result<cpal::Stream, SinkError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = usize::from(stream_config.channels);
        let mut scratch: Vec<f32> = vec![0.0; SCRATCH_FRAMES * channels.max(1)];

        device
            .build_output_stream(
                stream_config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    while let Ok(level) = trigger_rx.try_recv() {
                        pool.trigger(level);
                    }

                    render_chunks(&mut pool, &mut scratch, data, channels);
                },
                |err| error!("CPAL output stream error: {}", err),
                None,
            )
            .map_err(|e| SinkError::Stream(e.to_string()))
    }
}

impl SoundSink for Sink {
    fn play(&self, level: AccentLevel) -> Result<(), SinkError> {
        if level.is_muted() {
            return Ok(());
        }

        self.trigger_tx.try_send(level).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Busy,
            TrySendError::Disconnected(_) => {
                SinkError::Stream("output stream has stopped".to_string())
            }
        })
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        drop(self.shutdown_tx.take());
        if let Some(output_thread) = self.output_thread.take() {
            if output_thread.join().is_err() {
                warn!(device = self.name, "Output thread panicked.");
            }
        }
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} Hz)", self.name, self.sample_rate)
    }
}

/// Mixes the pool into the output one scratch buffer at a time, so the callback
/// never allocates. The scratch length must be a whole number of frames.
fn render_chunks<T>(pool: &mut VoicePool, scratch: &mut [f32], data: &mut [T], channels: usize)
where
    T: cpal::FromSample<f32> + cpal::Sample,
{
    let channels = channels.max(1);
    let chunk = (scratch.len() / channels).max(1) * channels;
    for output in data.chunks_mut(chunk) {
        let scratch = &mut scratch[..output.len()];
        pool.render(scratch, channels);
        for (dst, src) in output.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(*src);
        }
    }
}
