//! Pads: the connection points between elements.
//!
//! Source pads push buffers and events into the sink pad they are linked to. A ghost pad sits
//! on a bin and forwards everything it receives to a target pad inside that bin.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{Element, ElementInner};
use crate::error::LinkError;
use crate::event::StreamEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadDirection {
    Src,
    Sink,
}

/// Result of pushing a buffer downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowReturn {
    Ok,
    NotLinked,
    Flushing,
    Eos,
    NotNegotiated,
    Error,
}

impl FlowReturn {
    pub fn is_ok(self) -> bool {
        self == FlowReturn::Ok
    }

    pub fn name(self) -> &'static str {
        match self {
            FlowReturn::Ok => "ok",
            FlowReturn::NotLinked => "not-linked",
            FlowReturn::Flushing => "flushing",
            FlowReturn::Eos => "eos",
            FlowReturn::NotNegotiated => "not-negotiated",
            FlowReturn::Error => "error",
        }
    }
}

impl fmt::Display for FlowReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) struct PadInner {
    name: String,
    direction: PadDirection,
    template: Caps,
    parent: OnceLock<Weak<ElementInner>>,
    peer: Mutex<Option<Weak<PadInner>>>,
    caps: Mutex<Option<Caps>>,
    ghost_target: Option<Pad>,
}

/// Shared handle to a pad. Clones refer to the same pad.
#[derive(Clone)]
pub struct Pad(Arc<PadInner>);

impl Pad {
    /// A pad accepting any caps.
    pub fn new(name: impl Into<String>, direction: PadDirection) -> Self {
        Self::with_template(name, direction, Caps::new_any())
    }

    pub fn with_template(name: impl Into<String>, direction: PadDirection, template: Caps) -> Self {
        Pad(Arc::new(PadInner {
            name: name.into(),
            direction,
            template,
            parent: OnceLock::new(),
            peer: Mutex::new(None),
            caps: Mutex::new(None),
            ghost_target: None,
        }))
    }

    /// A pad that forwards to `target`, taking its direction.
    pub fn new_ghost(name: impl Into<String>, target: &Pad) -> Self {
        Pad(Arc::new(PadInner {
            name: name.into(),
            direction: target.direction(),
            template: Caps::new_any(),
            parent: OnceLock::new(),
            peer: Mutex::new(None),
            caps: Mutex::new(None),
            ghost_target: Some(target.clone()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn direction(&self) -> PadDirection {
        self.0.direction
    }

    pub fn is_ghost(&self) -> bool {
        self.0.ghost_target.is_some()
    }

    pub fn ghost_target(&self) -> Option<&Pad> {
        self.0.ghost_target.as_ref()
    }

    pub fn parent(&self) -> Option<Element> {
        self.0.parent.get()?.upgrade().map(Element::from_inner)
    }

    /// `element:pad` form used in logs and errors.
    pub fn path(&self) -> String {
        match self.parent() {
            Some(element) => format!("{}:{}", element.name(), self.name()),
            None => self.name().to_string(),
        }
    }

    pub(crate) fn set_parent(&self, parent: Weak<ElementInner>) -> bool {
        self.0.parent.set(parent).is_ok()
    }

    pub fn peer(&self) -> Option<Pad> {
        self.0.peer.lock().unwrap().as_ref()?.upgrade().map(Pad)
    }

    pub fn is_linked(&self) -> bool {
        self.peer().is_some()
    }

    /// Link this source pad to `sink`.
    ///
    /// Fails when either side is already linked, directions are wrong, or the caps the two
    /// pads can handle do not intersect. Both parents are told about the new link afterwards.
    pub fn link(&self, sink: &Pad) -> Result<(), LinkError> {
        if self.direction() != PadDirection::Src || sink.direction() != PadDirection::Sink {
            return Err(LinkError::WrongDirection {
                src: self.path(),
                sink: sink.path(),
            });
        }

        let src_caps = self.query_caps();
        let sink_caps = sink.query_caps();
        if !src_caps.can_intersect(&sink_caps) {
            return Err(LinkError::NoFormat {
                src: self.path(),
                sink: sink.path(),
            });
        }

        {
            let mut src_peer = self.0.peer.lock().unwrap();
            if src_peer.as_ref().and_then(Weak::upgrade).is_some() {
                return Err(LinkError::WasLinked(self.path()));
            }
            let mut sink_peer = sink.0.peer.lock().unwrap();
            if sink_peer.as_ref().and_then(Weak::upgrade).is_some() {
                return Err(LinkError::WasLinked(sink.path()));
            }
            *src_peer = Some(Arc::downgrade(&sink.0));
            *sink_peer = Some(Arc::downgrade(&self.0));
        }

        tracing::debug!(src = %self.path(), sink = %sink.path(), "pads linked");
        if let Some(element) = self.parent() {
            element.imp_dyn().pad_linked(&element, self, sink);
        }
        if let Some(element) = sink.parent() {
            element.imp_dyn().pad_linked(&element, sink, self);
        }
        Ok(())
    }

    /// Break the link between this pad and its peer. Returns whether a link existed.
    pub fn unlink(&self) -> bool {
        let Some(peer) = self.peer() else {
            return false;
        };
        let (src, sink) = match self.direction() {
            PadDirection::Src => (self, &peer),
            PadDirection::Sink => (&peer, self),
        };
        let mut src_peer = src.0.peer.lock().unwrap();
        let mut sink_peer = sink.0.peer.lock().unwrap();
        *src_peer = None;
        *sink_peer = None;
        true
    }

    /// Caps last sent through this pad.
    pub fn current_caps(&self) -> Option<Caps> {
        if let Some(target) = &self.0.ghost_target {
            if let Some(caps) = target.current_caps() {
                return Some(caps);
            }
        }
        self.0.caps.lock().unwrap().clone()
    }

    /// Caps this pad can handle right now.
    pub fn query_caps(&self) -> Caps {
        if let Some(target) = &self.0.ghost_target {
            return target.query_caps();
        }
        if let Some(element) = self.parent() {
            if let Some(caps) = element.imp_dyn().query_caps(&element, self) {
                return caps;
            }
        }
        if let Some(caps) = self.0.caps.lock().unwrap().clone() {
            return caps;
        }
        self.0.template.clone()
    }

    pub fn peer_query_caps(&self) -> Option<Caps> {
        self.peer().map(|peer| peer.query_caps())
    }

    /// Push a buffer to the peer of this source pad.
    pub fn push(&self, buffer: Buffer) -> FlowReturn {
        match self.peer() {
            Some(peer) => peer.chain(buffer),
            None => FlowReturn::NotLinked,
        }
    }

    /// Push an in-band event to the peer of this source pad.
    pub fn push_event(&self, event: StreamEvent) -> bool {
        if let StreamEvent::Caps(caps) = &event {
            *self.0.caps.lock().unwrap() = Some(caps.clone());
        }
        match self.peer() {
            Some(peer) => peer.handle_event(event),
            None => false,
        }
    }

    pub(crate) fn chain(&self, buffer: Buffer) -> FlowReturn {
        if let Some(target) = &self.0.ghost_target {
            return target.chain(buffer);
        }
        let Some(element) = self.parent() else {
            return FlowReturn::Flushing;
        };
        if !element.is_active() {
            return FlowReturn::Flushing;
        }
        element.imp_dyn().chain(&element, self, buffer)
    }

    pub(crate) fn handle_event(&self, event: StreamEvent) -> bool {
        if let StreamEvent::Caps(caps) = &event {
            *self.0.caps.lock().unwrap() = Some(caps.clone());
        }
        if let Some(target) = &self.0.ghost_target {
            return target.handle_event(event);
        }
        match self.parent() {
            Some(element) => element.imp_dyn().sink_event(&element, self, event),
            None => false,
        }
    }
}

impl PartialEq for Pad {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Pad {}

impl fmt::Debug for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pad")
            .field("path", &self.path())
            .field("direction", &self.direction())
            .field("ghost", &self.is_ghost())
            .finish()
    }
}
