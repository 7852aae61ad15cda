//! `audioconvert`: converts any supported raw layout to interleaved `F32LE`.
//!
//! The sample rate is kept. The output channel count follows the downstream peer when it
//! asks for a fixed `channels` value, otherwise the input count is kept.

use std::sync::Mutex;

use crate::audio::{AudioInfo, RAW_AUDIO, SampleFormat, SampleUnpacker, f32_to_le_bytes, remix};
use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{Element, ElementImpl};
use crate::error::EngineError;
use crate::event::StreamEvent;
use crate::pad::{FlowReturn, Pad, PadDirection};

pub const FACTORY: &str = "audioconvert";

struct Negotiated {
    unpacker: SampleUnpacker,
    out_channels: usize,
}

#[derive(Default)]
pub struct AudioConvertImpl {
    negotiated: Mutex<Option<Negotiated>>,
}

impl AudioConvertImpl {
    fn negotiate(&self, element: &Element, caps: &Caps) -> bool {
        let info = match AudioInfo::from_caps(caps) {
            Ok(info) => info,
            Err(e) => {
                element.post_error("Could not negotiate format.", Some(e.to_string()));
                return false;
            }
        };
        let Some(src) = element.static_pad("src") else {
            return false;
        };
        let out_channels = src
            .peer_query_caps()
            .and_then(|c| c.get_int("channels"))
            .and_then(|c| usize::try_from(c).ok())
            .filter(|c| *c > 0)
            .unwrap_or(info.channels);
        let out = AudioInfo::new(SampleFormat::F32LE, info.rate, out_channels);

        tracing::debug!(
            element = %element.name(),
            input = %caps,
            output_channels = out_channels,
            "audioconvert negotiated"
        );
        *self.negotiated.lock().unwrap() = Some(Negotiated {
            unpacker: SampleUnpacker::new(info),
            out_channels,
        });
        src.push_event(StreamEvent::Caps(out.to_caps()))
    }
}

impl ElementImpl for AudioConvertImpl {
    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowReturn {
        let bytes = {
            let mut guard = self.negotiated.lock().unwrap();
            let Some(neg) = guard.as_mut() else {
                return FlowReturn::NotNegotiated;
            };
            let samples = neg.unpacker.push(buffer.as_slice());
            if samples.is_empty() {
                return FlowReturn::Ok;
            }
            let in_channels = neg.unpacker.info().channels;
            f32_to_le_bytes(&remix(&samples, in_channels, neg.out_channels))
        };
        match element.static_pad("src") {
            Some(src) => src.push(Buffer::from_vec(bytes)),
            None => FlowReturn::NotLinked,
        }
    }

    fn sink_event(&self, element: &Element, _pad: &Pad, event: StreamEvent) -> bool {
        match event {
            StreamEvent::Caps(caps) => self.negotiate(element, &caps),
            other => element.forward_event(other),
        }
    }

    fn query_caps(&self, _element: &Element, _pad: &Pad) -> Option<Caps> {
        Some(Caps::new_empty_simple(RAW_AUDIO))
    }
}

pub fn create(name: &str) -> Result<Element, EngineError> {
    let element = Element::new(name, FACTORY, AudioConvertImpl::default());
    element.add_pad(Pad::new("sink", PadDirection::Sink))?;
    element.add_pad(Pad::new("src", PadDirection::Src))?;
    Ok(element)
}
