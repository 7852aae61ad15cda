//! Events flowing out of the engine to the application, and events flowing down pads.

use crate::caps::Caps;
use crate::pad::Pad;

/// Backpressure signal raised by a source element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSignal {
    /// The source queue ran dry. `length` is a size hint in bytes.
    NeedData { length: u32 },
    /// The source queue reached its limit.
    EnoughData,
}

/// Notifications delivered on the pipeline's event channel.
///
/// These replace per-element callbacks: whoever owns the pipeline receives them and decides
/// what to do, on its own thread.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    PadDiscovered {
        element: String,
        pad: Pad,
        caps: Option<Caps>,
    },
    NoMorePads {
        element: String,
    },
    Flow {
        element: String,
        signal: FlowSignal,
    },
}

/// In-band events pushed downstream alongside buffers.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    StreamStart,
    Caps(Caps),
    Eos,
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::StreamStart => "stream-start",
            StreamEvent::Caps(_) => "caps",
            StreamEvent::Eos => "eos",
        }
    }
}
