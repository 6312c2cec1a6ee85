use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use log::{error, info, warn};
use std::thread;

use crate::types::{AudioChunk, InputEvent, SessionClock};

/// Samples per `AudioChunk` handed to the session.
const CHUNK_SIZE: usize = 1024;
/// Callback buffers queued between the realtime thread and the chunker.
const RAW_QUEUE: usize = 64;
/// Preferred capture rate; the estimator works at any rate.
const PREFERRED_RATE: u32 = 48000;

/// Live microphone / instrument capture via cpal.
///
/// The realtime callback only mixes to mono and `try_send`s; a full queue
/// drops the buffer instead of blocking. A named thread regroups callback
/// buffers into `CHUNK_SIZE` chunks and forwards them as `InputEvent::Audio`.
///
/// Drop this to stop capture.
pub struct AudioCapture {
    _stream: Stream,
    device_name: String,
    sample_rate: u32,
}

impl AudioCapture {
    /// Open the default input device and start streaming.
    pub fn start(tx: Sender<InputEvent>, clock: SessionClock) -> Result<Self, String> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| "No default audio input device found".to_string())?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());

        let default = device
            .default_input_config()
            .map_err(|e| format!("No supported input config: {e}"))?;

        let preferred = cpal::SampleRate(PREFERRED_RATE);
        let chosen = device
            .supported_input_configs()
            .ok()
            .and_then(|mut configs| {
                configs.find(|c| {
                    c.channels() == default.channels()
                        && c.sample_format() == default.sample_format()
                        && c.min_sample_rate() <= preferred
                        && c.max_sample_rate() >= preferred
                })
            })
            .map(|c| c.with_sample_rate(preferred))
            .unwrap_or(default);

        let sample_rate = chosen.sample_rate().0;
        let format = chosen.sample_format();
        let config: StreamConfig = chosen.into();
        info!(
            "Audio input: {}  {}Hz  {} ch  {:?}",
            device_name, sample_rate, config.channels, format
        );

        let (raw_tx, raw_rx) = crossbeam_channel::bounded::<Vec<f32>>(RAW_QUEUE);
        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, raw_tx)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, raw_tx)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, raw_tx)?,
            fmt => return Err(format!("Unsupported sample format {fmt:?}")),
        };
        stream.play().map_err(|e| e.to_string())?;

        thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || forward_chunks(raw_rx, tx, clock, sample_rate))
            .map_err(|e| format!("Failed to spawn capture thread: {e}"))?;

        Ok(Self {
            _stream: stream,
            device_name,
            sample_rate,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    raw_tx: Sender<Vec<f32>>,
) -> Result<Stream, String>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    device
        .build_input_stream(
            config,
            move |data: &[T], _| {
                // Full queue: drop this buffer rather than block the callback
                let _ = raw_tx.try_send(mix_mono(data, channels));
            },
            |e| error!("Audio stream error: {e}"),
            None,
        )
        .map_err(|e| e.to_string())
}

/// Regroup callback buffers into fixed-size chunks until either side hangs up.
fn forward_chunks(
    raw_rx: Receiver<Vec<f32>>,
    tx: Sender<InputEvent>,
    clock: SessionClock,
    sample_rate: u32,
) {
    let mut accum: Vec<f32> = Vec::with_capacity(CHUNK_SIZE * 4);
    for buf in raw_rx {
        accum.extend_from_slice(&buf);
        while accum.len() >= CHUNK_SIZE {
            let samples: Vec<f32> = accum.drain(..CHUNK_SIZE).collect();
            let event = InputEvent::Audio(AudioChunk {
                timestamp_us: clock.now_us(),
                samples,
                sample_rate,
            });
            if tx.send(event).is_err() {
                warn!("Audio capture: session gone, stopping");
                return;
            }
        }
    }
}

/// Average interleaved frames down to one channel of f32.
fn mix_mono<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Sample,
    f32: FromSample<T>,
{
    if channels <= 1 {
        return data.iter().map(|&s| f32::from_sample(s)).collect();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / channels as f32)
        .collect()
}
