//! Sample-rate conversion between the stream rate and the device rate.
//!
//! Runs rubato's streaming sinc resampler on a background thread, reading from one
//! [`SampleQueue`] and writing into another.

use std::sync::Arc;
use std::thread;

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::queue::{PopStrategy, SampleQueue, calc_max_buffered_samples};

#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input frames per resampler call.
    pub chunk_frames: usize,
    /// Output queue size in seconds.
    pub buffer_seconds: f32,
}

/// Spawn the resampler thread and return its output queue.
///
/// The output queue closes once `srcq` is closed and drained, or on a resampler error.
pub fn start_resampler(
    srcq: Arc<SampleQueue>,
    src_rate: u32,
    dst_rate: u32,
    cfg: ResampleConfig,
) -> Result<Arc<SampleQueue>> {
    let channels = srcq.channels();
    let dstq = Arc::new(SampleQueue::new(
        channels,
        calc_max_buffered_samples(dst_rate, channels, cfg.buffer_seconds),
    ));

    let ratio = dst_rate as f64 / src_rate as f64;
    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };
    let chunk = cfg.chunk_frames.max(1);

    let out_q = dstq.clone();
    thread::Builder::new()
        .name("audio-engine-resample".into())
        .spawn(move || {
            let resampler = match Async::<f32>::new_sinc(
                ratio,
                1.1,
                &params,
                chunk,
                channels,
                FixedAsync::Input,
            ) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!("resampler init error: {e:#}");
                    out_q.close();
                    return;
                }
            };
            let mut stage = Stage {
                resampler: Box::new(resampler),
                out: vec![0.0f32; channels * chunk * 3],
                channels,
            };

            while let Some(block) = srcq.pop(PopStrategy::BlockingExact { frames: chunk }) {
                match stage.process(&block, None) {
                    Ok(samples) => {
                        if !out_q.push_blocking(samples) {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("resampler process error: {e:#}");
                        break;
                    }
                }
            }

            // Whatever is left is shorter than a chunk.
            while let Some(tail) = srcq.pop(PopStrategy::BlockingUpTo { max_frames: chunk }) {
                let frames = tail.len() / channels;
                match stage.process(&tail, Some(frames)) {
                    Ok(samples) => {
                        if !samples.is_empty() && !out_q.push_blocking(samples) {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("resampler tail error: {e:#}");
                        break;
                    }
                }
            }

            out_q.close();
        })?;

    tracing::debug!(src_rate_hz = src_rate, dst_rate_hz = dst_rate, chunk, "resampler started");
    Ok(dstq)
}

struct Stage {
    resampler: Box<dyn Resampler<f32>>,
    out: Vec<f32>,
    channels: usize,
}

impl Stage {
    fn process(&mut self, input: &[f32], partial_len: Option<usize>) -> Result<&[f32]> {
        let channels = self.channels;
        let written = {
            let frames = input.len() / channels;
            let input_adapter = InterleavedSlice::new(input, channels, frames)
                .map_err(|e| anyhow!("interleaved slice (input): {e}"))?;
            let capacity = self.out.len() / channels;
            let mut output_adapter = InterleavedSlice::new_mut(&mut self.out, channels, capacity)
                .map_err(|e| anyhow!("interleaved slice (output): {e}"))?;
            let indexing = Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len,
            };
            let (_read, written) = self
                .resampler
                .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
                .map_err(|e| anyhow!("{e}"))?;
            written
        };
        Ok(&self.out[..written * channels])
    }
}
