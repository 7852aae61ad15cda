//! A small streaming-media engine: elements connected through pads, negotiated with caps,
//! driven through NULL/READY/PAUSED/PLAYING, reporting on a bus.
//!
//! ## Elements
//! - `appsrc`: application-fed queue with need-data/enough-data signalling.
//! - `decodebin`: Symphonia decoding with one dynamic pad per track.
//! - `audioconvert`: raw sample-format and channel conversion to interleaved `f32`.
//! - `autoaudiosink`: CPAL device output, resampled with Rubato to the device rate.
//! - `filesink` / `fakesink`: write to a file / discard.
//!
//! Asynchronous element callbacks (pads appearing, flow signals) arrive on
//! [`Pipeline::events`]; messages (errors, EOS, state changes) on [`Pipeline::bus`].

pub mod audio;
pub mod bin;
pub mod buffer;
pub mod bus;
pub mod caps;
pub mod device;
pub mod element;
pub mod elements;
pub mod error;
pub mod event;
pub mod pad;
pub mod playback;
pub mod queue;
pub mod registry;
pub mod resample;
pub mod state;

pub use audio::{AudioInfo, SampleFormat};
pub use bin::{Bin, Pipeline};
pub use buffer::Buffer;
pub use bus::{Bus, Message, MessageView};
pub use caps::{Caps, FieldValue};
pub use element::{Element, ElementImpl, PropertyValue};
pub use elements::appsrc::{AppSrc, StreamType};
pub use error::{CapsError, EngineError, LinkError, StateChangeError};
pub use event::{EngineEvent, FlowSignal, StreamEvent};
pub use pad::{FlowReturn, Pad, PadDirection};
pub use registry::Registry;
pub use state::State;
