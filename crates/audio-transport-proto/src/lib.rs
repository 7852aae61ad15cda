//! Wire protocol between an audio topic publisher and `audio-play`.
//!
//! Framed stream over a single TCP connection:
//! - magic: 4 bytes "AUDT" (once, at connection start, from both sides)
//! - version: u16 LE (once, at connection start)
//! - then repeated frames:
//!   - kind: u8
//!   - len: u32 LE
//!   - payload: [u8; len]
//!
//! The subscriber sends one `SUBSCRIBE`; the publisher answers with `AUDIO_DATA` frames in
//! publication order, or an `ERROR` frame before closing.

use std::io::{self, Read, Write};

pub const MAGIC: [u8; 4] = *b"AUDT";
pub const VERSION: u16 = 1;

/// Largest payload `read_frame` accepts.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Subscriber → publisher: topic name and requested queue size.
    Subscribe = 0x01,

    /// Publisher → subscriber: one audio frame, payload verbatim.
    AudioData = 0x10,

    Error = 0x7F,
}

impl FrameKind {
    pub fn from_u8(b: u8) -> io::Result<Self> {
        let k = match b {
            0x01 => FrameKind::Subscribe,
            0x10 => FrameKind::AudioData,
            0x7F => FrameKind::Error,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown frame kind {b:#x}"),
                ));
            }
        };
        Ok(k)
    }
}

/// One audio message as published on the topic. Opaque bytes: raw PCM or an encoded stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioData {
    data: Vec<u8>,
}

impl AudioData {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A decoded `SUBSCRIBE` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub topic: String,
    pub queue_size: u16,
}

/// A frame read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Subscribe(Subscribe),
    AudioData(AudioData),
    Error(String),
}

/// Connection prelude: magic + version.
pub fn write_prelude(mut w: impl Write) -> io::Result<()> {
    w.write_all(&MAGIC)?;
    w.write_all(&VERSION.to_le_bytes())?;
    Ok(())
}

/// Read and validate the connection prelude.
pub fn read_prelude(mut r: impl Read) -> io::Result<()> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic"));
    }

    let mut ver = [0u8; 2];
    r.read_exact(&mut ver)?;
    let version = u16::from_le_bytes(ver);
    if version != VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported version {version}"),
        ));
    }

    Ok(())
}

/// Write a frame header + payload.
pub fn write_frame(mut w: impl Write, kind: FrameKind, payload: &[u8]) -> io::Result<()> {
    let frame = encode_frame(kind, payload)?;
    w.write_all(&frame)?;
    Ok(())
}

/// Encode a frame into a single buffer (header + payload).
pub fn encode_frame(kind: FrameKind, payload: &[u8]) -> io::Result<Vec<u8>> {
    let len: u32 = payload
        .len()
        .try_into()
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "payload too large"))?;

    let mut out = Vec::with_capacity(1 + 4 + payload.len());
    out.push(kind as u8);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Read a frame header and return `(kind, len)`.
///
/// The caller should then read exactly `len` bytes of payload.
pub fn read_frame_header(mut r: impl Read) -> io::Result<(FrameKind, u32)> {
    let mut kindb = [0u8; 1];
    r.read_exact(&mut kindb)?;
    let kind = FrameKind::from_u8(kindb[0])?;

    let mut lenb = [0u8; 4];
    r.read_exact(&mut lenb)?;
    let len = u32::from_le_bytes(lenb);
    Ok((kind, len))
}

/// Read one whole frame, rejecting payloads over [`MAX_FRAME_LEN`].
pub fn read_frame(mut r: impl Read) -> io::Result<Frame> {
    let (kind, len) = read_frame_header(&mut r)?;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)?;

    Ok(match kind {
        FrameKind::Subscribe => Frame::Subscribe(decode_subscribe(&payload)?),
        FrameKind::AudioData => Frame::AudioData(AudioData::new(payload)),
        FrameKind::Error => Frame::Error(decode_error(&payload)?),
    })
}

/// Encode a `SUBSCRIBE` payload: `u16 topic_len` + UTF-8 topic + `u16 queue_size`.
pub fn encode_subscribe(topic: &str, queue_size: u16) -> io::Result<Vec<u8>> {
    let topic_bytes = topic.as_bytes();
    let topic_len: u16 = topic_bytes
        .len()
        .try_into()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "topic too long"))?;

    let mut out = Vec::with_capacity(2 + topic_bytes.len() + 2);
    out.extend_from_slice(&topic_len.to_le_bytes());
    out.extend_from_slice(topic_bytes);
    out.extend_from_slice(&queue_size.to_le_bytes());
    Ok(out)
}

/// Decode a `SUBSCRIBE` payload.
pub fn decode_subscribe(payload: &[u8]) -> io::Result<Subscribe> {
    if payload.len() < 4 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "short SUBSCRIBE"));
    }
    let topic_len = u16::from_le_bytes([payload[0], payload[1]]) as usize;
    if payload.len() != 2 + topic_len + 2 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "SUBSCRIBE topic length mismatch",
        ));
    }
    let topic = std::str::from_utf8(&payload[2..2 + topic_len])
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "topic not utf-8"))?;
    let queue_size = u16::from_le_bytes([payload[2 + topic_len], payload[3 + topic_len]]);
    Ok(Subscribe {
        topic: topic.to_string(),
        queue_size,
    })
}

/// Decode an `ERROR` payload (UTF-8 text; invalid bytes are replaced).
pub fn decode_error(payload: &[u8]) -> io::Result<String> {
    Ok(String::from_utf8_lossy(payload).into_owned())
}

/// Write an `AUDIO_DATA` frame.
pub fn write_audio(w: impl Write, audio: &AudioData) -> io::Result<()> {
    write_frame(w, FrameKind::AudioData, audio.data())
}

/// Write an `ERROR` frame.
pub fn write_error(w: impl Write, message: &str) -> io::Result<()> {
    write_frame(w, FrameKind::Error, message.as_bytes())
}
