//! Audio capture module using cpal for cross-platform microphone access
//!
//! Captures audio from the default input device, mixes it to mono and
//! resamples it to the 16 kHz PCM format the speech service expects.
//! Capture runs on a dedicated thread; chunks reach the rest of the
//! pipeline over a bounded mpsc channel.

mod pipeline;
mod types;

pub use types::{AudioCaptureError, AudioCaptureHandle, AudioChunk};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use pipeline::SamplePipeline;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Sample rate the speech service consumes (16kHz)
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Start audio capture on a dedicated thread
///
/// # Returns
/// A tuple containing:
/// - `AudioCaptureHandle` - Used to stop capture and check status
/// - `mpsc::Receiver<AudioChunk>` - Receives 16 kHz mono PCM chunks
///
/// # Errors
/// Returns `AudioCaptureError::NoInputDevice` if no capture device is
/// available. The session fails fast: nothing is emitted and there is no
/// retry.
pub fn start_capture() -> Result<(AudioCaptureHandle, mpsc::Receiver<AudioChunk>), AudioCaptureError>
{
    // Fail fast before spawning: a missing device is fatal to the session
    if cpal::default_host().default_input_device().is_none() {
        return Err(AudioCaptureError::NoInputDevice);
    }

    let is_capturing = Arc::new(AtomicBool::new(true));
    let is_capturing_clone = is_capturing.clone();

    // Bounded channel: ~1 minute of 0.1 s chunks before overflow
    let (chunk_tx, chunk_rx) = mpsc::channel(600);

    let thread_handle = thread::spawn(move || {
        if let Err(e) = run_capture(is_capturing_clone, chunk_tx) {
            error!("Audio capture error: {}", e);
        }
    });

    let handle = AudioCaptureHandle {
        is_capturing,
        thread_handle: Some(thread_handle),
    };

    Ok((handle, chunk_rx))
}

/// Run audio capture on the current thread (blocking)
fn run_capture(
    is_capturing: Arc<AtomicBool>,
    chunk_tx: mpsc::Sender<AudioChunk>,
) -> Result<(), AudioCaptureError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or(AudioCaptureError::NoInputDevice)?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using audio input device: {}", device_name);

    // Prefer a config that can run at the target rate directly
    let supported_configs = device
        .supported_input_configs()
        .map_err(|e| AudioCaptureError::ConfigError(e.to_string()))?;

    let mut best_config = None;
    let mut found_target_rate = false;

    for config in supported_configs {
        if config.channels() == 0 {
            continue;
        }
        if config.min_sample_rate().0 <= TARGET_SAMPLE_RATE
            && config.max_sample_rate().0 >= TARGET_SAMPLE_RATE
        {
            best_config = Some(config.with_sample_rate(cpal::SampleRate(TARGET_SAMPLE_RATE)));
            found_target_rate = true;
            break;
        } else if best_config.is_none() {
            best_config = Some(config.with_max_sample_rate());
        }
    }

    let supported_config = best_config.ok_or(AudioCaptureError::NoSupportedConfig)?;

    if !found_target_rate {
        warn!(
            "{}Hz not supported, capturing at {}Hz and resampling",
            TARGET_SAMPLE_RATE,
            supported_config.sample_rate().0
        );
    }

    let config: cpal::StreamConfig = supported_config.into();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels as usize;

    info!("Audio config: {} channels, {} Hz", channels, sample_rate);

    let err_callback = |err| {
        error!("Audio stream error: {}", err);
    };

    // The data callback is FnMut, so each branch owns its pipeline outright
    let stream = match device.default_input_config()?.sample_format() {
        SampleFormat::I16 => {
            let mut pipeline = SamplePipeline::new(sample_rate, channels, chunk_tx)
                .map_err(AudioCaptureError::ConfigError)?;
            let is_capturing = is_capturing.clone();
            device.build_input_stream(
                &config,
                move |data: &[i16], _| {
                    if is_capturing.load(Ordering::SeqCst) {
                        pipeline.push(data);
                    }
                },
                err_callback,
                None,
            )?
        }
        SampleFormat::F32 => {
            let mut pipeline = SamplePipeline::new(sample_rate, channels, chunk_tx)
                .map_err(AudioCaptureError::ConfigError)?;
            let is_capturing = is_capturing.clone();
            device.build_input_stream(
                &config,
                move |data: &[f32], _| {
                    if !is_capturing.load(Ordering::SeqCst) {
                        return;
                    }
                    let samples: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                        .collect();
                    pipeline.push(&samples);
                },
                err_callback,
                None,
            )?
        }
        sample_format => {
            return Err(AudioCaptureError::UnsupportedFormat(format!(
                "{:?}",
                sample_format
            )));
        }
    };

    stream.play()?;
    info!("Audio capture started");

    // Keep the stream alive until capture is stopped. Dropping the stream
    // also drops the pipeline and with it the chunk sender, which closes
    // the channel downstream.
    while is_capturing.load(Ordering::SeqCst) {
        thread::sleep(std::time::Duration::from_millis(100));
    }

    drop(stream);
    Ok(())
}
