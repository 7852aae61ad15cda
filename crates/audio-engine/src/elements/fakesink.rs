//! `fakesink`: accepts and discards everything, counting what it saw.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::buffer::Buffer;
use crate::bus::MessageView;
use crate::caps::Caps;
use crate::element::{Element, ElementImpl, PropertyValue, invalid_property};
use crate::error::{EngineError, StateChangeError};
use crate::event::StreamEvent;
use crate::pad::{FlowReturn, Pad, PadDirection};
use crate::state::StateChange;

pub const FACTORY: &str = "fakesink";

#[derive(Default)]
pub struct FakeSinkImpl {
    buffers: AtomicU64,
    bytes: AtomicU64,
    eos: AtomicBool,
    retain: AtomicBool,
    data: Mutex<Vec<u8>>,
    caps: Mutex<Option<Caps>>,
}

impl ElementImpl for FakeSinkImpl {
    fn chain(&self, _element: &Element, _pad: &Pad, buffer: Buffer) -> FlowReturn {
        if self.eos.load(Ordering::SeqCst) {
            return FlowReturn::Eos;
        }
        if self.retain.load(Ordering::Relaxed) {
            self.data.lock().unwrap().extend_from_slice(buffer.as_slice());
        }
        self.bytes.fetch_add(buffer.len() as u64, Ordering::SeqCst);
        self.buffers.fetch_add(1, Ordering::SeqCst);
        FlowReturn::Ok
    }

    fn sink_event(&self, element: &Element, _pad: &Pad, event: StreamEvent) -> bool {
        match event {
            StreamEvent::Caps(caps) => *self.caps.lock().unwrap() = Some(caps),
            StreamEvent::Eos => {
                self.eos.store(true, Ordering::SeqCst);
                element.post_message(MessageView::Eos);
            }
            StreamEvent::StreamStart => {}
        }
        true
    }

    fn change_state(&self, _element: &Element, transition: StateChange) -> Result<(), StateChangeError> {
        if transition == StateChange::PAUSED_TO_READY {
            self.eos.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn set_property(&self, element: &Element, name: &str, value: PropertyValue) -> Result<(), EngineError> {
        match name {
            "retain-data" => {
                let retain = value
                    .as_bool()
                    .ok_or_else(|| invalid_property(element, name, "expected a boolean"))?;
                self.retain.store(retain, Ordering::Relaxed);
                Ok(())
            }
            _ => Err(EngineError::UnknownProperty {
                element: element.name().to_string(),
                property: name.to_string(),
            }),
        }
    }

    fn property(&self, _element: &Element, name: &str) -> Option<PropertyValue> {
        match name {
            "retain-data" => Some(PropertyValue::Bool(self.retain.load(Ordering::Relaxed))),
            "buffers" => Some(PropertyValue::Int(self.buffers.load(Ordering::SeqCst) as i64)),
            "bytes" => Some(PropertyValue::Int(self.bytes.load(Ordering::SeqCst) as i64)),
            _ => None,
        }
    }
}

pub fn create(name: &str) -> Result<Element, EngineError> {
    let element = Element::new(name, FACTORY, FakeSinkImpl::default());
    element.add_pad(Pad::new("sink", PadDirection::Sink))?;
    Ok(element)
}

/// Typed view of a `fakesink`, mostly for inspecting what reached it.
#[derive(Clone)]
pub struct FakeSink {
    imp: Arc<FakeSinkImpl>,
}

impl FakeSink {
    pub fn from_element(element: &Element) -> Option<Self> {
        Some(Self {
            imp: element.imp::<FakeSinkImpl>()?,
        })
    }

    pub fn buffer_count(&self) -> u64 {
        self.imp.buffers.load(Ordering::SeqCst)
    }

    pub fn byte_count(&self) -> u64 {
        self.imp.bytes.load(Ordering::SeqCst)
    }

    pub fn eos_seen(&self) -> bool {
        self.imp.eos.load(Ordering::SeqCst)
    }

    /// Concatenated payloads, when `retain-data` is set.
    pub fn data(&self) -> Vec<u8> {
        self.imp.data.lock().unwrap().clone()
    }

    pub fn caps(&self) -> Option<Caps> {
        self.imp.caps.lock().unwrap().clone()
    }
}
