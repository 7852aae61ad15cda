//! Raw audio formats and sample conversion.
//!
//! Raw audio travels between elements as interleaved little-endian bytes described by caps.
//! [`AudioInfo`] is the parsed form of those caps; [`SampleUnpacker`] turns byte buffers into
//! interleaved `f32` samples, keeping partial frames across buffers.

use crate::caps::Caps;
use crate::error::CapsError;

pub const RAW_AUDIO: &str = "audio/x-raw";

/// Little-endian byte order marker used by legacy caps (`endianness=1234`).
pub const LITTLE_ENDIAN: i32 = 1234;
pub const BIG_ENDIAN: i32 = 4321;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    S8,
    S16LE,
    S24LE,
    S32LE,
    F32LE,
}

impl SampleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::U8 => "U8",
            SampleFormat::S8 => "S8",
            SampleFormat::S16LE => "S16LE",
            SampleFormat::S24LE => "S24LE",
            SampleFormat::S32LE => "S32LE",
            SampleFormat::F32LE => "F32LE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "U8" => Some(SampleFormat::U8),
            "S8" => Some(SampleFormat::S8),
            "S16LE" => Some(SampleFormat::S16LE),
            "S24LE" => Some(SampleFormat::S24LE),
            "S32LE" => Some(SampleFormat::S32LE),
            "F32LE" => Some(SampleFormat::F32LE),
            _ => None,
        }
    }

    /// Signed little-endian integer format for a bit depth.
    pub fn signed_int(depth: u32) -> Option<Self> {
        match depth {
            8 => Some(SampleFormat::S8),
            16 => Some(SampleFormat::S16LE),
            24 => Some(SampleFormat::S24LE),
            32 => Some(SampleFormat::S32LE),
            _ => None,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::S8 => 1,
            SampleFormat::S16LE => 2,
            SampleFormat::S24LE => 3,
            SampleFormat::S32LE | SampleFormat::F32LE => 4,
        }
    }

    fn decode_one(self, b: &[u8]) -> f32 {
        match self {
            SampleFormat::U8 => (b[0] as f32 - 128.0) / 128.0,
            SampleFormat::S8 => (b[0] as i8) as f32 / 128.0,
            SampleFormat::S16LE => i16::from_le_bytes([b[0], b[1]]) as f32 / 32_768.0,
            SampleFormat::S24LE => {
                // Sign-extend the packed 24-bit value through the top byte of an i32.
                let v = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
                v as f32 / 8_388_608.0
            }
            SampleFormat::S32LE => {
                i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0
            }
            SampleFormat::F32LE => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        }
    }
}

/// Parsed raw audio caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: usize,
}

impl AudioInfo {
    pub fn new(format: SampleFormat, rate: u32, channels: usize) -> Self {
        Self {
            format,
            rate,
            channels,
        }
    }

    /// Parse `audio/x-raw` caps.
    ///
    /// Accepts either a `format` string (`S16LE`, `F32LE`, ...) or the legacy integer
    /// description made of `width`/`depth`/`signed`/`endianness`.
    pub fn from_caps(caps: &Caps) -> Result<Self, CapsError> {
        if caps.media_type() != RAW_AUDIO {
            return Err(CapsError::NotRawAudio(caps.media_type().to_string()));
        }
        let rate = positive_field(caps, "rate")?;
        let channels = positive_field(caps, "channels")?;

        let format = match caps.get_str("format") {
            Some(name) => SampleFormat::from_name(name)
                .ok_or_else(|| CapsError::UnsupportedFormat(name.to_string()))?,
            None => legacy_format(caps)?,
        };

        Ok(Self {
            format,
            rate,
            channels: channels as usize,
        })
    }

    pub fn to_caps(&self) -> Caps {
        Caps::builder(RAW_AUDIO)
            .field("format", self.format.as_str())
            .field("layout", "interleaved")
            .field("rate", self.rate as i32)
            .field("channels", self.channels as i32)
            .build()
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channels
    }
}

fn positive_field(caps: &Caps, name: &'static str) -> Result<u32, CapsError> {
    let value = caps.get_int(name).ok_or(CapsError::MissingField(name))?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or(CapsError::InvalidField(name))
}

fn legacy_format(caps: &Caps) -> Result<SampleFormat, CapsError> {
    let width = caps
        .get_int("width")
        .or_else(|| caps.get_int("depth"))
        .ok_or(CapsError::MissingField("format"))?;
    let depth = caps.get_int("depth").unwrap_or(width);
    let signed = caps.get_bool("signed").unwrap_or(true);
    let endianness = caps.get_int("endianness").unwrap_or(LITTLE_ENDIAN);

    if width != depth {
        return Err(CapsError::UnsupportedFormat(format!(
            "width {width} with depth {depth}"
        )));
    }
    if endianness != LITTLE_ENDIAN && !(endianness == BIG_ENDIAN && width == 8) {
        return Err(CapsError::UnsupportedFormat(format!(
            "endianness {endianness}"
        )));
    }
    match (width, signed) {
        (8, false) => Ok(SampleFormat::U8),
        (w, true) => u32::try_from(w)
            .ok()
            .and_then(SampleFormat::signed_int)
            .ok_or_else(|| CapsError::UnsupportedFormat(format!("signed width {w}"))),
        (w, false) => Err(CapsError::UnsupportedFormat(format!("unsigned width {w}"))),
    }
}

/// Converts byte buffers into interleaved `f32`, carrying incomplete frames forward.
#[derive(Debug)]
pub struct SampleUnpacker {
    info: AudioInfo,
    pending: Vec<u8>,
}

impl SampleUnpacker {
    pub fn new(info: AudioInfo) -> Self {
        Self {
            info,
            pending: Vec::new(),
        }
    }

    pub fn info(&self) -> AudioInfo {
        self.info
    }

    /// Bytes held back because they do not yet form a whole frame.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<f32> {
        let frame_len = self.info.bytes_per_frame();
        if frame_len == 0 {
            return Vec::new();
        }
        self.pending.extend_from_slice(bytes);
        let whole = self.pending.len() / frame_len * frame_len;
        let step = self.info.format.bytes_per_sample();

        let mut out = Vec::with_capacity(whole / step);
        for chunk in self.pending[..whole].chunks_exact(step) {
            out.push(self.info.format.decode_one(chunk));
        }
        self.pending.drain(..whole);
        out
    }
}

/// Serialise interleaved `f32` samples as `F32LE` bytes.
pub fn f32_to_le_bytes(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 4);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Remap interleaved samples between channel counts.
///
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - other layouts: clamp to the last available source channel
pub fn remix(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }
    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        for dst_ch in 0..to {
            let v = match (from, to) {
                (2, 1) => 0.5 * (frame[0] + frame[1]),
                (1, _) => frame[0],
                _ => frame[dst_ch.min(from - 1)],
            };
            out.push(v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_caps_reads_modern_format() {
        let caps = AudioInfo::new(SampleFormat::F32LE, 48_000, 2).to_caps();
        let info = AudioInfo::from_caps(&caps).unwrap();
        assert_eq!(info, AudioInfo::new(SampleFormat::F32LE, 48_000, 2));
        assert_eq!(info.bytes_per_frame(), 8);
    }

    #[test]
    fn from_caps_reads_legacy_integer_fields() {
        let caps: Caps = "audio/x-raw, rate=(int)96000, channels=(int)1, endianness=(int)1234, \
                          width=(int)16, depth=(int)16, signed=(boolean)true"
            .parse()
            .unwrap();
        let info = AudioInfo::from_caps(&caps).unwrap();
        assert_eq!(info, AudioInfo::new(SampleFormat::S16LE, 96_000, 1));
    }

    #[test]
    fn from_caps_legacy_depths() {
        for (depth, fmt) in [
            (8, SampleFormat::S8),
            (24, SampleFormat::S24LE),
            (32, SampleFormat::S32LE),
        ] {
            let caps = Caps::builder(RAW_AUDIO)
                .field("rate", 8000)
                .field("channels", 2)
                .field("width", depth)
                .field("depth", depth)
                .build();
            assert_eq!(AudioInfo::from_caps(&caps).unwrap().format, fmt);
        }
    }

    #[test]
    fn from_caps_rejects_unsupported() {
        let base = Caps::builder(RAW_AUDIO).field("rate", 8000).field("channels", 1);
        let big_endian = base
            .clone()
            .field("width", 16)
            .field("endianness", BIG_ENDIAN)
            .build();
        assert!(matches!(
            AudioInfo::from_caps(&big_endian),
            Err(CapsError::UnsupportedFormat(_))
        ));

        let odd = base.clone().field("width", 12).build();
        assert!(matches!(
            AudioInfo::from_caps(&odd),
            Err(CapsError::UnsupportedFormat(_))
        ));

        let no_rate = Caps::builder(RAW_AUDIO)
            .field("channels", 1)
            .field("format", "S16LE")
            .build();
        assert_eq!(
            AudioInfo::from_caps(&no_rate),
            Err(CapsError::MissingField("rate"))
        );

        let zero_channels = Caps::builder(RAW_AUDIO)
            .field("rate", 8000)
            .field("channels", 0)
            .field("format", "S16LE")
            .build();
        assert_eq!(
            AudioInfo::from_caps(&zero_channels),
            Err(CapsError::InvalidField("channels"))
        );

        let encoded = Caps::new_empty_simple("audio/mpeg");
        assert!(matches!(
            AudioInfo::from_caps(&encoded),
            Err(CapsError::NotRawAudio(_))
        ));
    }

    #[test]
    fn unpacker_carries_partial_frames() {
        let mut unpacker = SampleUnpacker::new(AudioInfo::new(SampleFormat::S16LE, 8000, 2));
        let full_scale = i16::MIN.to_le_bytes();
        let half = 16_384i16.to_le_bytes();

        // One and a half frames.
        let out = unpacker.push(&[full_scale[0], full_scale[1], half[0], half[1], 0]);
        assert_eq!(out, vec![-1.0, 0.5]);
        assert_eq!(unpacker.pending_bytes(), 1);

        let out = unpacker.push(&[0, 0, 0]);
        assert_eq!(out, vec![0.0, 0.0]);
        assert_eq!(unpacker.pending_bytes(), 0);
    }

    #[test]
    fn decode_24_bit_sign_extends() {
        let mut unpacker = SampleUnpacker::new(AudioInfo::new(SampleFormat::S24LE, 8000, 1));
        let out = unpacker.push(&[0x00, 0x00, 0x80, 0x00, 0x00, 0x40]);
        assert_eq!(out, vec![-1.0, 0.5]);
    }

    #[test]
    fn decode_unsigned_8_bit_centres_on_128() {
        let mut unpacker = SampleUnpacker::new(AudioInfo::new(SampleFormat::U8, 8000, 1));
        assert_eq!(unpacker.push(&[128, 0, 192]), vec![0.0, -1.0, 0.5]);
    }

    #[test]
    fn f32_bytes_are_little_endian() {
        let bytes = f32_to_le_bytes(&[1.0]);
        assert_eq!(bytes, 1.0f32.to_le_bytes().to_vec());
        let mut unpacker = SampleUnpacker::new(AudioInfo::new(SampleFormat::F32LE, 8000, 1));
        assert_eq!(unpacker.push(&bytes), vec![1.0]);
    }

    #[test]
    fn remix_mono_and_stereo() {
        assert_eq!(remix(&[0.1, 0.2], 1, 2), vec![0.1, 0.1, 0.2, 0.2]);
        assert_eq!(remix(&[0.2, 0.4, 1.0, 0.0], 2, 1), vec![0.3, 0.5]);
        assert_eq!(remix(&[0.1, 0.2, 0.3], 3, 3), vec![0.1, 0.2, 0.3]);
        assert_eq!(remix(&[0.1, 0.2, 0.3], 3, 4), vec![0.1, 0.2, 0.3, 0.3]);
    }
}
