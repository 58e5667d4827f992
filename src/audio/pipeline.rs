//! Sample pipeline: mono mixdown, resampling, chunking
//!
//! Runs inside the cpal data callback, which is `FnMut`, so the pipeline
//! is owned by the callback and needs no shared buffers. Output is fixed
//! at 16 kHz mono PCM16 in `CHUNK_SIZE`-sample chunks.

use super::types::AudioChunk;
use super::TARGET_SAMPLE_RATE;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Chunk size in samples (0.1 seconds of audio at 16kHz = 1600 samples)
pub(crate) const CHUNK_SIZE: usize = 1600;

/// Converts raw device samples into target-rate mono chunks
pub(crate) struct SamplePipeline {
    channels: usize,
    resampler: Option<SincFixedIn<f32>>,
    /// Input frames consumed per resampler pass
    input_chunk_size: usize,
    input_buffer: Vec<i16>,
    output_buffer: Vec<i16>,
    sender: mpsc::Sender<AudioChunk>,
}

impl SamplePipeline {
    /// Build a pipeline for a device running at `input_rate` with
    /// `channels` interleaved channels. A resampler is only constructed
    /// when the device rate differs from the 16 kHz target.
    pub(crate) fn new(
        input_rate: u32,
        channels: usize,
        sender: mpsc::Sender<AudioChunk>,
    ) -> Result<Self, String> {
        let (resampler, input_chunk_size) = if input_rate != TARGET_SAMPLE_RATE {
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            // Input frames that resample down to one output chunk
            let input_frames =
                (CHUNK_SIZE as f64 * input_rate as f64 / TARGET_SAMPLE_RATE as f64).ceil() as usize;
            let resampler = SincFixedIn::<f32>::new(
                TARGET_SAMPLE_RATE as f64 / input_rate as f64,
                2.0,
                params,
                input_frames,
                1, // mono
            )
            .map_err(|e| format!("resampler {} Hz -> {} Hz: {}", input_rate, TARGET_SAMPLE_RATE, e))?;
            (Some(resampler), input_frames)
        } else {
            (None, CHUNK_SIZE)
        };

        Ok(Self {
            channels,
            resampler,
            input_chunk_size,
            input_buffer: Vec::with_capacity(input_chunk_size * 2),
            output_buffer: Vec::with_capacity(CHUNK_SIZE * 2),
            sender,
        })
    }

    /// Feed interleaved device samples through the pipeline
    pub(crate) fn push(&mut self, data: &[i16]) {
        // Mono mixdown by averaging channels
        if self.channels > 1 {
            let channels = self.channels;
            self.input_buffer.extend(data.chunks(channels).map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            }));
        } else {
            self.input_buffer.extend_from_slice(data);
        }

        if self.resampler.is_some() {
            self.drain_through_resampler();
        } else {
            self.output_buffer.append(&mut self.input_buffer);
        }

        self.send_chunks();
    }

    fn drain_through_resampler(&mut self) {
        let Some(resampler) = self.resampler.as_mut() else {
            return;
        };
        while self.input_buffer.len() >= self.input_chunk_size {
            let input: Vec<f32> = self
                .input_buffer
                .drain(..self.input_chunk_size)
                .map(|s| s as f32 / 32768.0)
                .collect();

            match resampler.process(&[input], None) {
                Ok(resampled) => {
                    self.output_buffer.extend(
                        resampled[0]
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16),
                    );
                }
                Err(e) => error!("Resampling error: {}", e),
            }
        }
    }

    fn send_chunks(&mut self) {
        while self.output_buffer.len() >= CHUNK_SIZE {
            let chunk = AudioChunk {
                samples: self.output_buffer.drain(..CHUNK_SIZE).collect(),
                sample_rate: TARGET_SAMPLE_RATE,
            };
            // try_send keeps the audio callback non-blocking
            if let Err(e) = self.sender.try_send(chunk) {
                warn!("Audio buffer overflow - chunk dropped: {}", e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_chunks_at_target_rate() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pipeline = SamplePipeline::new(TARGET_SAMPLE_RATE, 1, tx).unwrap();

        pipeline.push(&[100i16; CHUNK_SIZE + 10]);

        let chunk = rx.try_recv().expect("one full chunk");
        assert_eq!(chunk.samples.len(), CHUNK_SIZE);
        assert_eq!(chunk.sample_rate, TARGET_SAMPLE_RATE);
        // the remainder stays buffered
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stereo_input_is_mixed_to_mono() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pipeline = SamplePipeline::new(TARGET_SAMPLE_RATE, 2, tx).unwrap();

        // left = 100, right = 300 -> mono = 200
        let frames: Vec<i16> = (0..CHUNK_SIZE).flat_map(|_| [100i16, 300i16]).collect();
        pipeline.push(&frames);

        let chunk = rx.try_recv().expect("one full chunk");
        assert!(chunk.samples.iter().all(|&s| s == 200));
    }

    #[test]
    fn resampler_downsamples_48k_to_16k() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pipeline = SamplePipeline::new(48_000, 1, tx).unwrap();

        // three seconds' worth of input should produce several chunks
        pipeline.push(&[0i16; 48_000]);

        let chunk = rx.try_recv().expect("resampled chunk");
        assert_eq!(chunk.sample_rate, TARGET_SAMPLE_RATE);
    }
}
