//! Built-in elements.

pub mod appsrc;
pub mod audioconvert;
pub mod autoaudiosink;
pub mod bytestream;
pub mod decodebin;
pub mod fakesink;
pub mod filesink;
