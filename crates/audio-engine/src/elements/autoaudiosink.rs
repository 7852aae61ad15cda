//! `autoaudiosink`: plays raw audio on a cpal output device.
//!
//! Each caps event starts an output session: an input [`SampleQueue`] fed by `chain`, an
//! optional resampler to the device rate, and a cpal stream. The stream renders silence and
//! leaves the queue untouched unless the element is PLAYING. End-of-stream is posted on the bus
//! once everything queued has been played.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use cpal::traits::StreamTrait;

use crate::audio::{AudioInfo, RAW_AUDIO, SampleUnpacker};
use crate::buffer::Buffer;
use crate::bus::MessageView;
use crate::caps::Caps;
use crate::device;
use crate::element::{Element, ElementImpl, PropertyValue, invalid_property};
use crate::error::{EngineError, StateChangeError};
use crate::event::StreamEvent;
use crate::pad::{FlowReturn, Pad, PadDirection};
use crate::playback::{self, PlaybackConfig};
use crate::queue::{SampleQueue, calc_max_buffered_samples};
use crate::resample::{self, ResampleConfig};
use crate::state::StateChange;

pub const FACTORY: &str = "autoaudiosink";

/// Output tuning, mirrored by the element's properties.
#[derive(Clone, Debug)]
pub struct OutputSettings {
    /// Substring of the output device name; `None` uses the host default.
    pub device: Option<String>,
    pub buffer_seconds: f32,
    pub chunk_frames: usize,
    pub refill_max_frames: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            device: None,
            buffer_seconds: 2.0,
            chunk_frames: 1024,
            refill_max_frames: 4096,
        }
    }
}

struct Session {
    unpacker: SampleUnpacker,
    input: Arc<SampleQueue>,
    cancel: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

pub struct AutoAudioSinkImpl {
    settings: Mutex<OutputSettings>,
    paused: Arc<AtomicBool>,
    session: Mutex<Option<Session>>,
    played_frames: Arc<AtomicU64>,
    underrun_events: Arc<AtomicU64>,
}

impl Default for AutoAudioSinkImpl {
    fn default() -> Self {
        Self {
            settings: Mutex::new(OutputSettings::default()),
            paused: Arc::new(AtomicBool::new(true)),
            session: Mutex::new(None),
            played_frames: Arc::new(AtomicU64::new(0)),
            underrun_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl AutoAudioSinkImpl {
    fn start_session(&self, element: &Element, caps: &Caps) -> bool {
        let info = match AudioInfo::from_caps(caps) {
            Ok(info) => info,
            Err(e) => {
                element.post_error("Could not negotiate format.", Some(e.to_string()));
                return false;
            }
        };
        self.stop_session();

        let settings = self.settings.lock().unwrap().clone();
        let input = Arc::new(SampleQueue::new(
            info.channels,
            calc_max_buffered_samples(info.rate, info.channels, settings.buffer_seconds),
        ));
        let cancel = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));

        let output = OutputThread {
            element: element.clone(),
            info,
            settings,
            input: input.clone(),
            cancel: cancel.clone(),
            failed: failed.clone(),
            paused: self.paused.clone(),
            played_frames: self.played_frames.clone(),
            underrun_events: self.underrun_events.clone(),
        };
        let thread = match thread::Builder::new()
            .name(format!("{}-output", element.name()))
            .spawn(move || output.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                element.post_error("Could not start audio output.", Some(e.to_string()));
                return false;
            }
        };

        tracing::info!(
            element = %element.name(),
            rate_hz = info.rate,
            channels = info.channels,
            format = info.format.as_str(),
            "audio output session started"
        );
        *self.session.lock().unwrap() = Some(Session {
            unpacker: SampleUnpacker::new(info),
            input,
            cancel,
            failed,
            thread: Some(thread),
        });
        true
    }

    fn stop_session(&self) {
        let Some(mut session) = self.session.lock().unwrap().take() else {
            return;
        };
        session.cancel.store(true, Ordering::SeqCst);
        session.input.flush();
        if let Some(handle) = session.thread.take() {
            let _ = handle.join();
        }
    }
}

struct OutputThread {
    element: Element,
    info: AudioInfo,
    settings: OutputSettings,
    input: Arc<SampleQueue>,
    cancel: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    played_frames: Arc<AtomicU64>,
    underrun_events: Arc<AtomicU64>,
}

impl OutputThread {
    fn run(self) {
        match self.play() {
            Ok(true) => {
                tracing::info!(element = %self.element.name(), "audio output drained");
                self.element.post_message(MessageView::Eos);
            }
            Ok(false) => {
                tracing::debug!(element = %self.element.name(), "audio output cancelled");
            }
            Err(e) => {
                self.failed.store(true, Ordering::SeqCst);
                self.input.close();
                self.element.post_error(
                    "Could not open audio device for playback.",
                    Some(format!("{e:#}")),
                );
            }
        }
    }

    /// Returns `true` when the stream played to the end, `false` when cancelled.
    fn play(&self) -> Result<bool> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, self.settings.device.as_deref())?;
        let config = device::pick_output_config(&device, Some(self.info.rate))?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(size) = device::pick_buffer_size(&config) {
            stream_config.buffer_size = size;
        }

        let dst_rate = stream_config.sample_rate;
        let outq = if dst_rate == self.info.rate {
            tracing::info!(rate_hz = dst_rate, "resample skipped");
            self.input.clone()
        } else {
            tracing::info!(src_rate_hz = self.info.rate, rate_hz = dst_rate, "resampling");
            resample::start_resampler(
                self.input.clone(),
                self.info.rate,
                dst_rate,
                ResampleConfig {
                    chunk_frames: self.settings.chunk_frames,
                    buffer_seconds: self.settings.buffer_seconds,
                },
            )?
        };

        let on_error_el = self.element.clone();
        let stream = playback::build_output_stream(
            &device,
            &stream_config,
            config.sample_format(),
            &outq,
            PlaybackConfig {
                refill_max_frames: self.settings.refill_max_frames,
                paused: self.paused.clone(),
                played_frames: self.played_frames.clone(),
                underrun_events: self.underrun_events.clone(),
                on_error: Some(Arc::new(move |msg: String| {
                    on_error_el.post_message(MessageView::Warning {
                        message: "Audio device reported an error.".into(),
                        debug: Some(msg),
                    })
                })),
            },
        )?;
        stream.play()?;

        let drained = outq.wait_drained_or_cancel(&self.cancel);
        if drained {
            // Let the device play out its last period.
            thread::sleep(Duration::from_millis(100));
        } else {
            outq.flush();
        }
        Ok(drained)
    }
}

impl ElementImpl for AutoAudioSinkImpl {
    fn chain(&self, _element: &Element, _pad: &Pad, buffer: Buffer) -> FlowReturn {
        let (samples, input, failed) = {
            let mut guard = self.session.lock().unwrap();
            let Some(session) = guard.as_mut() else {
                return FlowReturn::NotNegotiated;
            };
            (
                session.unpacker.push(buffer.as_slice()),
                session.input.clone(),
                session.failed.clone(),
            )
        };
        if input.push_blocking(&samples) {
            FlowReturn::Ok
        } else if failed.load(Ordering::SeqCst) {
            FlowReturn::Error
        } else {
            FlowReturn::Flushing
        }
    }

    fn sink_event(&self, element: &Element, _pad: &Pad, event: StreamEvent) -> bool {
        match event {
            StreamEvent::Caps(caps) => self.start_session(element, &caps),
            StreamEvent::Eos => {
                match self.session.lock().unwrap().as_ref() {
                    Some(session) => session.input.close(),
                    None => element.post_message(MessageView::Eos),
                }
                true
            }
            StreamEvent::StreamStart => true,
        }
    }

    fn change_state(&self, element: &Element, transition: StateChange) -> Result<(), StateChangeError> {
        match transition {
            StateChange::NULL_TO_READY => {
                let needle = self.settings.lock().unwrap().device.clone();
                device::pick_device(&cpal::default_host(), needle.as_deref()).map_err(|e| {
                    StateChangeError::new(
                        element,
                        transition,
                        format!("Could not open audio device for playback: {e:#}"),
                    )
                })?;
            }
            StateChange::PAUSED_TO_PLAYING => self.paused.store(false, Ordering::SeqCst),
            StateChange::PLAYING_TO_PAUSED => self.paused.store(true, Ordering::SeqCst),
            StateChange::PAUSED_TO_READY => self.stop_session(),
            _ => {}
        }
        Ok(())
    }

    fn set_property(&self, element: &Element, name: &str, value: PropertyValue) -> Result<(), EngineError> {
        let mut s = self.settings.lock().unwrap();
        match name {
            "device" => {
                s.device = match value {
                    PropertyValue::Str(v) if v.trim().is_empty() => None,
                    PropertyValue::Str(v) => Some(v),
                    _ => return Err(invalid_property(element, name, "expected a string")),
                };
            }
            "buffer-seconds" => {
                s.buffer_seconds = value
                    .as_float()
                    .filter(|v| v.is_finite() && *v > 0.0)
                    .ok_or_else(|| invalid_property(element, name, "expected a positive number"))?
                    as f32;
            }
            "chunk-frames" | "refill-max-frames" => {
                let frames = value
                    .as_int()
                    .filter(|v| *v > 0)
                    .ok_or_else(|| invalid_property(element, name, "expected a positive integer"))?
                    as usize;
                if name == "chunk-frames" {
                    s.chunk_frames = frames;
                } else {
                    s.refill_max_frames = frames;
                }
            }
            _ => {
                return Err(EngineError::UnknownProperty {
                    element: element.name().to_string(),
                    property: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn property(&self, _element: &Element, name: &str) -> Option<PropertyValue> {
        let s = self.settings.lock().unwrap();
        match name {
            "device" => s.device.clone().map(PropertyValue::Str),
            "buffer-seconds" => Some(PropertyValue::Float(s.buffer_seconds as f64)),
            "chunk-frames" => Some(PropertyValue::Int(s.chunk_frames as i64)),
            "refill-max-frames" => Some(PropertyValue::Int(s.refill_max_frames as i64)),
            "played-frames" => Some(PropertyValue::Int(
                self.played_frames.load(Ordering::Relaxed) as i64,
            )),
            "underruns" => Some(PropertyValue::Int(
                self.underrun_events.load(Ordering::Relaxed) as i64,
            )),
            _ => None,
        }
    }

    fn query_caps(&self, _element: &Element, _pad: &Pad) -> Option<Caps> {
        Some(Caps::new_empty_simple(RAW_AUDIO))
    }
}

pub fn create(name: &str) -> Result<Element, EngineError> {
    let element = Element::new(name, FACTORY, AutoAudioSinkImpl::default());
    element.add_pad(Pad::new("sink", PadDirection::Sink))?;
    Ok(element)
}
