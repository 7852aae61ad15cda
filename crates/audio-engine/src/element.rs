//! Elements: named processing stages owning pads and a state.
//!
//! [`Element`] is a cheap, clonable handle. The behaviour lives behind [`ElementImpl`]; each
//! element kind in [`crate::elements`] provides one, plus a typed handle where callers need
//! element-specific calls (for example [`crate::elements::appsrc::AppSrc`]).

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crossbeam_channel::Sender;

use crate::buffer::Buffer;
use crate::bus::{Bus, Message, MessageView};
use crate::caps::Caps;
use crate::error::{EngineError, LinkError, StateChangeError};
use crate::event::{EngineEvent, StreamEvent};
use crate::pad::{FlowReturn, Pad, PadDirection};
use crate::state::{State, StateChange};

/// Dynamically typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Caps(Caps),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_caps(&self) -> Option<&Caps> {
        match self {
            PropertyValue::Caps(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::Str(_) => "string",
            PropertyValue::Caps(_) => "caps",
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<usize> for PropertyValue {
    fn from(v: usize) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::Float(v as f64)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<Caps> for PropertyValue {
    fn from(v: Caps) -> Self {
        PropertyValue::Caps(v)
    }
}

/// Behaviour of an element kind.
///
/// Every method receives the owning [`Element`] so implementations can reach their pads, post
/// bus messages and emit engine events without holding a reference to themselves.
pub trait ElementImpl: Any + Send + Sync {
    /// Handle a buffer arriving on one of the element's sink pads.
    fn chain(&self, element: &Element, pad: &Pad, buffer: Buffer) -> FlowReturn {
        let _ = (element, pad, buffer);
        FlowReturn::Error
    }

    /// Handle an in-band event arriving on a sink pad. Forwards downstream by default.
    fn sink_event(&self, element: &Element, pad: &Pad, event: StreamEvent) -> bool {
        let _ = pad;
        element.forward_event(event)
    }

    /// Perform one adjacent state transition.
    fn change_state(&self, element: &Element, transition: StateChange) -> Result<(), StateChangeError> {
        let _ = (element, transition);
        Ok(())
    }

    fn set_property(&self, element: &Element, name: &str, value: PropertyValue) -> Result<(), EngineError> {
        let _ = value;
        Err(EngineError::UnknownProperty {
            element: element.name().to_string(),
            property: name.to_string(),
        })
    }

    fn property(&self, element: &Element, name: &str) -> Option<PropertyValue> {
        let _ = (element, name);
        None
    }

    /// Caps a pad can handle; `None` falls back to the pad's current caps or template.
    fn query_caps(&self, element: &Element, pad: &Pad) -> Option<Caps> {
        let _ = (element, pad);
        None
    }

    /// Called after `pad` (owned by this element) was linked to `peer`.
    fn pad_linked(&self, element: &Element, pad: &Pad, peer: &Pad) {
        let _ = (element, pad, peer);
    }
}

#[derive(Clone)]
pub(crate) struct Context {
    bus: Bus,
    events: Sender<EngineEvent>,
}

impl Context {
    pub(crate) fn new(bus: Bus, events: Sender<EngineEvent>) -> Self {
        Self { bus, events }
    }
}

pub(crate) struct ElementInner {
    name: String,
    factory: String,
    imp: Arc<dyn ElementImpl>,
    any: Arc<dyn Any + Send + Sync>,
    pads: Mutex<Vec<Pad>>,
    state: Mutex<State>,
    context: OnceLock<Context>,
    parent: Mutex<Option<Weak<ElementInner>>>,
}

/// Shared handle to an element.
#[derive(Clone)]
pub struct Element(Arc<ElementInner>);

impl Element {
    pub fn new<T: ElementImpl>(name: impl Into<String>, factory: impl Into<String>, imp: T) -> Self {
        Self::with_imp(name, factory, Arc::new(imp))
    }

    /// Like [`Element::new`] but keeps the caller's handle on the implementation.
    pub fn with_imp<T: ElementImpl>(
        name: impl Into<String>,
        factory: impl Into<String>,
        imp: Arc<T>,
    ) -> Self {
        let any: Arc<dyn Any + Send + Sync> = imp.clone();
        Element(Arc::new(ElementInner {
            name: name.into(),
            factory: factory.into(),
            imp,
            any,
            pads: Mutex::new(Vec::new()),
            state: Mutex::new(State::Null),
            context: OnceLock::new(),
            parent: Mutex::new(None),
        }))
    }

    pub(crate) fn from_inner(inner: Arc<ElementInner>) -> Self {
        Element(inner)
    }

    pub(crate) fn imp_dyn(&self) -> &dyn ElementImpl {
        self.0.imp.as_ref()
    }

    /// Downcast the implementation to a concrete element kind.
    pub fn imp<T: ElementImpl>(&self) -> Option<Arc<T>> {
        self.0.any.clone().downcast::<T>().ok()
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn factory_name(&self) -> &str {
        &self.0.factory
    }

    pub fn parent(&self) -> Option<Element> {
        self.0
            .parent
            .lock()
            .unwrap()
            .as_ref()?
            .upgrade()
            .map(Element)
    }

    pub(crate) fn set_parent(&self, parent: &Element) -> Result<(), EngineError> {
        let mut slot = self.0.parent.lock().unwrap();
        if slot.as_ref().and_then(Weak::upgrade).is_some() {
            return Err(EngineError::AlreadyParented(self.name().to_string()));
        }
        *slot = Some(Arc::downgrade(&parent.0));
        Ok(())
    }

    pub fn add_pad(&self, pad: Pad) -> Result<(), EngineError> {
        let mut pads = self.0.pads.lock().unwrap();
        if pads.iter().any(|p| p.name() == pad.name()) {
            return Err(EngineError::DuplicatePad {
                element: self.name().to_string(),
                pad: pad.name().to_string(),
            });
        }
        if !pad.set_parent(Arc::downgrade(&self.0)) {
            return Err(EngineError::AlreadyParented(pad.name().to_string()));
        }
        pads.push(pad);
        Ok(())
    }

    pub fn remove_pad(&self, pad: &Pad) -> bool {
        pad.unlink();
        let mut pads = self.0.pads.lock().unwrap();
        let before = pads.len();
        pads.retain(|p| p != pad);
        pads.len() != before
    }

    pub fn static_pad(&self, name: &str) -> Option<Pad> {
        self.0
            .pads
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    pub fn pads(&self) -> Vec<Pad> {
        self.0.pads.lock().unwrap().clone()
    }

    pub fn src_pads(&self) -> Vec<Pad> {
        self.pads()
            .into_iter()
            .filter(|p| p.direction() == PadDirection::Src)
            .collect()
    }

    pub fn sink_pads(&self) -> Vec<Pad> {
        self.pads()
            .into_iter()
            .filter(|p| p.direction() == PadDirection::Sink)
            .collect()
    }

    /// Link the first free source pad of `self` to the first free sink pad of `dest`.
    pub fn link(&self, dest: &Element) -> Result<(), LinkError> {
        let src = self
            .src_pads()
            .into_iter()
            .find(|p| !p.is_linked())
            .ok_or_else(|| LinkError::NoPad(self.name().to_string()))?;
        let sink = dest
            .sink_pads()
            .into_iter()
            .find(|p| !p.is_linked())
            .ok_or_else(|| LinkError::NoPad(dest.name().to_string()))?;
        src.link(&sink)
    }

    /// Link a chain of elements in order.
    pub fn link_many(elements: &[&Element]) -> Result<(), LinkError> {
        for pair in elements.windows(2) {
            pair[0].link(pair[1])?;
        }
        Ok(())
    }

    pub fn set_property(&self, name: &str, value: impl Into<PropertyValue>) -> Result<(), EngineError> {
        self.0.imp.set_property(self, name, value.into())
    }

    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.0.imp.property(self, name)
    }

    pub fn current_state(&self) -> State {
        *self.0.state.lock().unwrap()
    }

    /// Whether the element is at least PAUSED and therefore accepts data.
    pub fn is_active(&self) -> bool {
        self.current_state() >= State::Paused
    }

    /// Walk the element to `target` one adjacent state at a time.
    ///
    /// Stops at the first failing step; the element stays in the last state it reached.
    pub fn set_state(&self, target: State) -> Result<(), StateChangeError> {
        for step in StateChange::steps(self.current_state(), target) {
            if let Err(err) = self.0.imp.change_state(self, step) {
                tracing::warn!(
                    element = %self.name(),
                    from = %step.current,
                    to = %step.next,
                    reason = %err.reason,
                    "state change failed"
                );
                return Err(err);
            }
            *self.0.state.lock().unwrap() = step.next;
            tracing::trace!(element = %self.name(), state = %step.next, "state changed");
        }
        Ok(())
    }

    pub(crate) fn set_context(&self, context: Context) {
        let _ = self.0.context.set(context.clone());
        if let Some(bin) = self.imp::<crate::bin::BinImpl>() {
            for child in bin.children() {
                child.set_context(context.clone());
            }
        }
    }

    pub(crate) fn context(&self) -> Option<&Context> {
        self.0.context.get()
    }

    pub fn post_message(&self, view: MessageView) {
        match self.context() {
            Some(ctx) => ctx.bus.post(Message::new(self.name(), view)),
            None => tracing::debug!(element = %self.name(), "no bus; message dropped"),
        }
    }

    pub fn post_error(&self, message: impl Into<String>, debug: Option<String>) {
        self.post_message(MessageView::Error {
            message: message.into(),
            debug,
        });
    }

    /// Send an event to whoever owns the pipeline.
    pub fn emit(&self, event: EngineEvent) {
        match self.context() {
            Some(ctx) => {
                if ctx.events.send(event).is_err() {
                    tracing::debug!(element = %self.name(), "event receiver gone");
                }
            }
            None => tracing::debug!(element = %self.name(), "no event channel; event dropped"),
        }
    }

    /// Push `event` out of every source pad. True when no pad refused it.
    pub fn forward_event(&self, event: StreamEvent) -> bool {
        let mut ok = true;
        for pad in self.src_pads() {
            ok &= pad.push_event(event.clone());
        }
        ok
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("name", &self.name())
            .field("factory", &self.factory_name())
            .field("state", &self.current_state())
            .finish()
    }
}

/// Helper for property setters rejecting a value.
pub fn invalid_property(element: &Element, property: &str, reason: impl Into<String>) -> EngineError {
    EngineError::InvalidProperty {
        element: element.name().to_string(),
        property: property.to_string(),
        reason: reason.into(),
    }
}
