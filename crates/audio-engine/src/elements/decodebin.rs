//! `decodebin`: sniffs an encoded byte stream and exposes decoded audio on dynamic pads.
//!
//! The first buffer starts a decode thread that probes the stream with symphonia. One `src_%u`
//! pad is added per track and announced with [`EngineEvent::PadDiscovered`], followed by
//! [`EngineEvent::NoMorePads`]. Decoding begins once one of those pads has been linked (or the
//! link timeout expires); decoded audio leaves as interleaved `F32LE`.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::{AudioInfo, SampleFormat, f32_to_le_bytes};
use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{Element, ElementImpl, PropertyValue, invalid_property};
use crate::elements::bytestream::ByteStream;
use crate::error::{EngineError, StateChangeError};
use crate::event::{EngineEvent, StreamEvent};
use crate::pad::{FlowReturn, Pad, PadDirection};
use crate::state::StateChange;

pub const FACTORY: &str = "decodebin";

pub const DEFAULT_LINK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_SIZE_BYTES: usize = 2 * 1024 * 1024;

/// Media type announced for tracks no decoder is available for.
pub const UNKNOWN_MEDIA: &str = "application/x-unknown";

#[derive(Debug, Clone)]
struct Settings {
    link_timeout: Duration,
    max_size_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            link_timeout: DEFAULT_LINK_TIMEOUT,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

#[derive(Default)]
struct LinkGate {
    linked: Mutex<bool>,
    cv: Condvar,
}

impl LinkGate {
    fn open(&self) {
        *self.linked.lock().unwrap() = true;
        self.cv.notify_all();
    }

    /// Wait until a pad is linked, the stream closes, or `timeout` passes.
    fn wait(&self, stream: &ByteStream, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut linked = self.linked.lock().unwrap();
        while !*linked && !stream.is_closed() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let step = (deadline - now).min(Duration::from_millis(50));
            let (next, _) = self.cv.wait_timeout(linked, step).unwrap();
            linked = next;
        }
        *linked
    }
}

struct Run {
    stream: Arc<ByteStream>,
    gate: Arc<LinkGate>,
    thread: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct DecodeBinImpl {
    settings: Mutex<Settings>,
    run: Mutex<Option<Run>>,
}

impl DecodeBinImpl {
    fn stop(&self, element: &Element) {
        let Some(mut run) = self.run.lock().unwrap().take() else {
            return;
        };
        run.stream.close();
        run.gate.cv.notify_all();
        if let Some(handle) = run.thread.take() {
            let _ = handle.join();
        }
        for pad in element.src_pads() {
            element.remove_pad(&pad);
        }
    }
}

impl ElementImpl for DecodeBinImpl {
    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowReturn {
        let stream = {
            let mut guard = self.run.lock().unwrap();
            let Some(run) = guard.as_mut() else {
                return FlowReturn::Flushing;
            };
            if run.thread.is_none() {
                let settings = self.settings.lock().unwrap().clone();
                let task = DecodeTask {
                    element: element.clone(),
                    stream: run.stream.clone(),
                    gate: run.gate.clone(),
                    link_timeout: settings.link_timeout,
                };
                match thread::Builder::new()
                    .name(format!("{}-decode", element.name()))
                    .spawn(move || task.run())
                {
                    Ok(handle) => run.thread = Some(handle),
                    Err(e) => {
                        element.post_error("Could not start decoder.", Some(e.to_string()));
                        return FlowReturn::Error;
                    }
                }
            }
            run.stream.clone()
        };

        if stream.write(buffer.as_slice()) {
            FlowReturn::Ok
        } else if stream.is_closed() {
            FlowReturn::Flushing
        } else {
            FlowReturn::Eos
        }
    }

    fn sink_event(&self, element: &Element, _pad: &Pad, event: StreamEvent) -> bool {
        if event != StreamEvent::Eos {
            return true;
        }
        let guard = self.run.lock().unwrap();
        match guard.as_ref() {
            Some(run) if run.thread.is_some() => run.stream.finish(),
            _ => element.post_error(
                "Stream contains no data.",
                Some("end-of-stream before any data".into()),
            ),
        }
        true
    }

    fn change_state(&self, element: &Element, transition: StateChange) -> Result<(), StateChangeError> {
        match transition {
            StateChange::READY_TO_PAUSED => {
                let max_size = self.settings.lock().unwrap().max_size_bytes;
                *self.run.lock().unwrap() = Some(Run {
                    stream: ByteStream::new(max_size),
                    gate: Arc::new(LinkGate::default()),
                    thread: None,
                });
            }
            StateChange::PAUSED_TO_READY => self.stop(element),
            _ => {}
        }
        Ok(())
    }

    fn pad_linked(&self, _element: &Element, pad: &Pad, _peer: &Pad) {
        if pad.direction() != PadDirection::Src {
            return;
        }
        if let Some(run) = self.run.lock().unwrap().as_ref() {
            run.gate.open();
        }
    }

    fn set_property(&self, element: &Element, name: &str, value: PropertyValue) -> Result<(), EngineError> {
        let mut s = self.settings.lock().unwrap();
        let positive = value
            .as_int()
            .filter(|v| *v > 0)
            .ok_or_else(|| invalid_property(element, name, "expected a positive integer"));
        match name {
            "link-timeout-ms" => s.link_timeout = Duration::from_millis(positive? as u64),
            "max-size-bytes" => s.max_size_bytes = positive? as usize,
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
            "link-timeout-ms" => Some(PropertyValue::Int(s.link_timeout.as_millis() as i64)),
            "max-size-bytes" => Some(PropertyValue::Int(s.max_size_bytes as i64)),
            _ => None,
        }
    }
}

/// One decodable (or not) track and the pad it leaves through.
struct Output {
    track_id: u32,
    pad: Pad,
    decoder: Option<Box<dyn Decoder>>,
    started: bool,
}

struct DecodeTask {
    element: Element,
    stream: Arc<ByteStream>,
    gate: Arc<LinkGate>,
    link_timeout: Duration,
}

enum Stop {
    Finished,
    Flushing,
    Failed,
}

impl DecodeTask {
    fn run(self) {
        let mss = MediaSourceStream::new(Box::new(self.stream.reader()), Default::default());
        let probed = match symphonia::default::get_probe().format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        ) {
            Ok(probed) => probed,
            Err(e) => {
                if !self.stream.is_closed() {
                    self.fail("Could not determine type of stream.", e.to_string());
                }
                return;
            }
        };
        let mut format = probed.format;

        let mut outputs = match self.expose_tracks(format.as_ref()) {
            Ok(outputs) => outputs,
            Err(e) => {
                self.fail("Could not add decoder pads.", e.to_string());
                return;
            }
        };

        if !self.gate.wait(&self.stream, self.link_timeout) {
            if !self.stream.is_closed() {
                self.fail(
                    "Delayed linking failed.",
                    format!("no decoded pad linked within {:?}", self.link_timeout),
                );
            }
            return;
        }

        match self.decode_loop(format.as_mut(), &mut outputs) {
            Stop::Finished => {
                tracing::debug!(element = %self.element.name(), "decoder reached end of stream");
                for out in outputs.iter().filter(|o| o.pad.is_linked()) {
                    out.pad.push_event(StreamEvent::Eos);
                }
            }
            Stop::Flushing | Stop::Failed => {}
        }
    }

    fn expose_tracks(&self, format: &dyn FormatReader) -> Result<Vec<Output>, EngineError> {
        let mut outputs = Vec::new();
        for (index, track) in format.tracks().iter().enumerate() {
            let decoder = symphonia::default::get_codecs()
                .make(&track.codec_params, &DecoderOptions::default())
                .ok();
            let caps = track_caps(&track.codec_params, decoder.is_some());
            let pad = Pad::with_template(format!("src_{index}"), PadDirection::Src, caps.clone());
            self.element.add_pad(pad.clone())?;

            tracing::info!(
                element = %self.element.name(),
                pad = %pad.name(),
                caps = %caps,
                "decoded pad added"
            );
            self.element.emit(EngineEvent::PadDiscovered {
                element: self.element.name().to_string(),
                pad: pad.clone(),
                caps: Some(caps),
            });
            outputs.push(Output {
                track_id: track.id,
                pad,
                decoder,
                started: false,
            });
        }
        self.element.emit(EngineEvent::NoMorePads {
            element: self.element.name().to_string(),
        });
        Ok(outputs)
    }

    fn decode_loop(&self, format: &mut dyn FormatReader, outputs: &mut [Output]) -> Stop {
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Stop::Finished;
                }
                Err(e) => {
                    if self.stream.is_closed() {
                        return Stop::Flushing;
                    }
                    self.fail("Could not read encoded stream.", e.to_string());
                    return Stop::Failed;
                }
            };

            let Some(out) = outputs.iter_mut().find(|o| o.track_id == packet.track_id()) else {
                continue;
            };
            if !out.pad.is_linked() {
                continue;
            }
            let Some(decoder) = out.decoder.as_mut() else {
                continue;
            };
            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!(element = %self.element.name(), "skipping undecodable packet: {e}");
                    continue;
                }
                Err(e) => {
                    self.fail("Could not decode stream.", e.to_string());
                    return Stop::Failed;
                }
            };

            let spec = *decoded.spec();
            let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            samples.copy_interleaved_ref(decoded);
            if samples.samples().is_empty() {
                continue;
            }

            if !out.started {
                out.started = true;
                let info = AudioInfo::new(SampleFormat::F32LE, spec.rate, spec.channels.count());
                out.pad.push_event(StreamEvent::StreamStart);
                out.pad.push_event(StreamEvent::Caps(info.to_caps()));
            }

            let flow = out.pad.push(Buffer::from_vec(f32_to_le_bytes(samples.samples())));
            match flow {
                FlowReturn::Ok | FlowReturn::NotLinked => {}
                FlowReturn::Flushing | FlowReturn::Eos => return Stop::Flushing,
                FlowReturn::NotNegotiated | FlowReturn::Error => {
                    self.fail(
                        "Internal data stream error.",
                        format!("streaming stopped, reason {flow}"),
                    );
                    return Stop::Failed;
                }
            }
        }
    }

    fn fail(&self, message: &str, detail: String) {
        tracing::warn!(element = %self.element.name(), debug = %detail, "{message}");
        self.element.post_error(message, Some(detail));
    }
}

/// Caps announced on a track's pad before decoding starts.
fn track_caps(params: &CodecParameters, decodable: bool) -> Caps {
    match (decodable, params.sample_rate, params.channels) {
        (true, Some(rate), Some(channels)) => {
            AudioInfo::new(SampleFormat::F32LE, rate, channels.count()).to_caps()
        }
        (true, _, _) => Caps::builder(crate::audio::RAW_AUDIO)
            .field("format", SampleFormat::F32LE.as_str())
            .build(),
        (false, _, _) => Caps::builder(UNKNOWN_MEDIA)
            .field("codec", format!("{:?}", params.codec))
            .build(),
    }
}

pub fn create(name: &str) -> Result<Element, EngineError> {
    let element = Element::new(name, FACTORY, DecodeBinImpl::default());
    element.add_pad(Pad::new("sink", PadDirection::Sink))?;
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bin::Pipeline;
    use crate::bus::MessageView;
    use crate::elements::appsrc::{self, AppSrc};
    use crate::elements::audioconvert;
    use crate::elements::fakesink::{self, FakeSink};
    use crate::state::State;
    use symphonia::core::codecs::CODEC_TYPE_NULL;

    fn wav_s16_mono(rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    fn next_event(pipeline: &Pipeline) -> EngineEvent {
        loop {
            match pipeline.events().recv_timeout(Duration::from_secs(5)) {
                Ok(EngineEvent::Flow { .. }) => continue,
                Ok(event) => return event,
                Err(e) => panic!("no engine event: {e}"),
            }
        }
    }

    fn wait_message(pipeline: &Pipeline, type_name: &str) -> Option<MessageView> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(msg) = pipeline.bus().timed_pop(Duration::from_millis(50)) {
                if msg.type_name() == type_name {
                    return Some(msg.view);
                }
            }
        }
        None
    }

    #[test]
    fn decodes_wav_after_dynamic_link() {
        let pipeline = Pipeline::new("p");
        let src = appsrc::create("src").unwrap();
        let decoder = create("decoder").unwrap();
        let convert = audioconvert::create("convert").unwrap();
        let sink = fakesink::create("sink").unwrap();
        sink.set_property("retain-data", true).unwrap();
        pipeline.add_many(&[&src, &decoder, &convert, &sink]).unwrap();
        src.link(&decoder).unwrap();
        convert.link(&sink).unwrap();
        pipeline.set_state(State::Playing).unwrap();

        let samples: Vec<i16> = (0..800).map(|i| ((i % 100) * 100) as i16).collect();
        let appsrc = AppSrc::from_element(&src).unwrap();
        let wav = wav_s16_mono(8000, &samples);
        for chunk in wav.chunks(256) {
            assert_eq!(appsrc.push_buffer(Buffer::from_slice(chunk)), FlowReturn::Ok);
        }
        appsrc.end_of_stream();

        let EngineEvent::PadDiscovered { pad, caps, .. } = next_event(&pipeline) else {
            panic!("expected pad discovery");
        };
        let caps = caps.unwrap();
        assert_eq!(caps.media_type(), "audio/x-raw");
        assert_eq!(caps.get_int("rate"), Some(8000));
        assert_eq!(caps.get_int("channels"), Some(1));
        assert!(matches!(next_event(&pipeline), EngineEvent::NoMorePads { .. }));

        pad.link(&convert.static_pad("sink").unwrap()).unwrap();

        assert!(wait_message(&pipeline, "eos").is_some());
        let sink = FakeSink::from_element(&sink).unwrap();
        assert_eq!(sink.byte_count(), (samples.len() * 4) as u64);
        pipeline.set_state(State::Null).unwrap();
        assert!(decoder.src_pads().is_empty());
    }

    #[test]
    fn garbage_input_posts_type_error() {
        let pipeline = Pipeline::new("p");
        let src = appsrc::create("src").unwrap();
        let decoder = create("decoder").unwrap();
        pipeline.add_many(&[&src, &decoder]).unwrap();
        src.link(&decoder).unwrap();
        pipeline.set_state(State::Playing).unwrap();

        let appsrc = AppSrc::from_element(&src).unwrap();
        appsrc.push_buffer(Buffer::from_vec(vec![0x5a; 4096]));
        appsrc.end_of_stream();

        let Some(MessageView::Error { message, .. }) = wait_message(&pipeline, "error") else {
            panic!("expected an error message");
        };
        assert_eq!(message, "Could not determine type of stream.");
        pipeline.set_state(State::Null).unwrap();
    }

    #[test]
    fn unlinked_pads_time_out() {
        let pipeline = Pipeline::new("p");
        let src = appsrc::create("src").unwrap();
        let decoder = create("decoder").unwrap();
        decoder.set_property("link-timeout-ms", 100i64).unwrap();
        pipeline.add_many(&[&src, &decoder]).unwrap();
        src.link(&decoder).unwrap();
        pipeline.set_state(State::Playing).unwrap();

        let appsrc = AppSrc::from_element(&src).unwrap();
        appsrc.push_buffer(Buffer::from_vec(wav_s16_mono(8000, &[0; 64])));
        appsrc.end_of_stream();

        let Some(MessageView::Error { message, .. }) = wait_message(&pipeline, "error") else {
            panic!("expected an error message");
        };
        assert_eq!(message, "Delayed linking failed.");
        pipeline.set_state(State::Null).unwrap();
    }

    #[test]
    fn track_caps_for_unknown_codec() {
        let params = CodecParameters::new();
        assert_eq!(params.codec, CODEC_TYPE_NULL);
        let caps = track_caps(&params, false);
        assert_eq!(caps.media_type(), UNKNOWN_MEDIA);
    }
}
