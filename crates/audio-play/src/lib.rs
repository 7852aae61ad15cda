//! Plays an audio topic through an `audio-engine` pipeline.
//!
//! Frames arrive from a publisher (see [`subscriber`]) and are pushed into an `appsrc`. The
//! graph behind it depends on the configuration:
//! - raw PCM to the output device: `appsrc ! autoaudiosink`
//! - encoded audio to the output device: `appsrc ! decodebin`, with `audioconvert ! autoaudiosink`
//!   linked once the decoder exposes an audio pad
//! - anything to a file: `appsrc ! filesink`
//!
//! When the source runs dry the pipeline is paused; the next frame resumes it.

pub mod cli;
pub mod config;
pub mod flow;
pub mod graph;
pub mod lifecycle;
pub mod linker;
pub mod monitor;
pub mod runtime;
pub mod source;
pub mod status;
pub mod subscriber;
