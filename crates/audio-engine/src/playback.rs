//! cpal output stream fed from a [`SampleQueue`].
//!
//! The callback never waits: it refills a small local buffer with a non-blocking pop, maps
//! channels to the device layout and converts to the device sample type. Missing data and the
//! paused state are both rendered as silence; paused additionally leaves the queue untouched.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::{PopStrategy, SampleQueue};

pub type StreamErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Clone)]
pub struct PlaybackConfig {
    /// Upper bound on frames taken from the queue per refill.
    pub refill_max_frames: usize,
    pub paused: Arc<AtomicBool>,
    pub played_frames: Arc<AtomicU64>,
    pub underrun_events: Arc<AtomicU64>,
    /// Invoked from the cpal error callback.
    pub on_error: Option<StreamErrorCallback>,
}

pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SampleQueue>,
    cfg: PlaybackConfig,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, cfg),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, cfg),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, cfg),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, cfg),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    cfg: PlaybackConfig,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let dst_channels = config.channels as usize;
    let local = Mutex::new(Refill {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
    });
    let refill_max_frames = cfg.refill_max_frames.max(1);
    let queue = queue.clone();
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);

    let PlaybackConfig {
        paused,
        played_frames,
        underrun_events,
        on_error,
        ..
    } = cfg;
    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        if let Some(cb) = &on_error {
            cb(err.to_string());
        }
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if paused.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }

            let mut st = local.lock().unwrap();
            let frames = data.len() / dst_channels;
            let mut filled = 0usize;

            for frame in 0..frames {
                if st.pos >= st.src.len() {
                    st.pos = 0;
                    match queue.pop(PopStrategy::NonBlocking {
                        max_frames: refill_max_frames,
                    }) {
                        Some(v) => st.src = v,
                        None => {
                            st.src.clear();
                            if !queue.is_closed() {
                                underrun_events.fetch_add(1, Ordering::Relaxed);
                            }
                            data[frame * dst_channels..].fill(silence);
                            break;
                        }
                    }
                }
                for ch in 0..dst_channels {
                    let sample = st.next_mapped(dst_channels, ch);
                    data[frame * dst_channels + ch] = <T as cpal::Sample>::from_sample::<f32>(sample);
                }
                filled += 1;
            }

            if filled > 0 {
                played_frames.fetch_add(filled as u64, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Samples already taken from the queue but not yet written to the device.
struct Refill {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

impl Refill {
    /// Output sample for `dst_ch`; the read position advances after the last channel.
    ///
    /// mono → many duplicates, stereo → mono averages, otherwise channels are clamped.
    fn next_mapped(&mut self, dst_channels: usize, dst_ch: usize) -> f32 {
        if self.pos >= self.src.len() {
            return 0.0;
        }
        let start = self.pos;
        let get = |ch: usize| -> f32 {
            if ch < self.src_channels {
                self.src.get(start + ch).copied().unwrap_or(0.0)
            } else {
                0.0
            }
        };

        let out = match (self.src_channels, dst_channels) {
            (2, 1) => 0.5 * (get(0) + get(1)),
            (1, _) => get(0),
            (src, _) => get(dst_ch.min(src.saturating_sub(1))),
        };

        if dst_ch + 1 == dst_channels {
            self.pos += self.src_channels;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(refill: &mut Refill, dst_channels: usize) -> Vec<f32> {
        let mut out = Vec::new();
        while refill.pos < refill.src.len() {
            for ch in 0..dst_channels {
                out.push(refill.next_mapped(dst_channels, ch));
            }
        }
        out
    }

    #[test]
    fn mono_to_stereo_duplicates() {
        let mut r = Refill {
            pos: 0,
            src_channels: 1,
            src: vec![0.25, -0.5],
        };
        assert_eq!(drain(&mut r, 2), vec![0.25, 0.25, -0.5, -0.5]);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let mut r = Refill {
            pos: 0,
            src_channels: 2,
            src: vec![1.0, 0.0, 0.5, 0.5],
        };
        assert_eq!(drain(&mut r, 1), vec![0.5, 0.5]);
    }

    #[test]
    fn wider_layouts_clamp_to_last_channel() {
        let mut r = Refill {
            pos: 0,
            src_channels: 2,
            src: vec![0.1, 0.2],
        };
        assert_eq!(drain(&mut r, 4), vec![0.1, 0.2, 0.2, 0.2]);
    }
}
