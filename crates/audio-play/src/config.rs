use std::path::PathBuf;

use anyhow::{Result, bail};
use audio_engine::audio::{LITTLE_ENDIAN, RAW_AUDIO, SampleFormat};
use audio_engine::caps::Caps;

use crate::cli::Args;

/// `--dst` values that select the output device instead of a file.
pub const DEVICE_DESTINATIONS: [&str; 2] = ["alsasink", "autoaudiosink"];

/// `--format` value for raw PCM input.
pub const RAW_FORMAT: &str = "pcm";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Device,
    File(PathBuf),
}

impl Destination {
    pub fn parse(dst: &str) -> Self {
        if DEVICE_DESTINATIONS.contains(&dst) {
            Destination::Device
        } else {
            Destination::File(PathBuf::from(dst))
        }
    }
}

/// Layout of raw input: interleaved, signed, little-endian integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawAudioConfig {
    pub channels: u32,
    pub sample_rate: u32,
    pub depth: u32,
}

impl RawAudioConfig {
    pub fn new(channels: u32, sample_rate: u32, depth: u32) -> Result<Self> {
        if channels == 0 {
            bail!("channels must be at least 1");
        }
        if sample_rate == 0 || i32::try_from(sample_rate).is_err() {
            bail!("invalid sample rate {sample_rate}");
        }
        if SampleFormat::signed_int(depth).is_none() {
            bail!("unsupported depth {depth} (expected 8, 16, 24 or 32)");
        }
        Ok(Self {
            channels,
            sample_rate,
            depth,
        })
    }

    pub fn sample_format(&self) -> SampleFormat {
        SampleFormat::signed_int(self.depth).unwrap_or(SampleFormat::S16LE)
    }

    /// Caps announced by the source for raw input.
    ///
    /// Carries both the `format` string and the legacy `endianness/width/depth/signed` fields.
    pub fn caps(&self) -> Caps {
        Caps::builder(RAW_AUDIO)
            .field("format", self.sample_format().as_str())
            .field("layout", "interleaved")
            .field("rate", self.sample_rate as i32)
            .field("channels", self.channels as i32)
            .field("endianness", LITTLE_ENDIAN)
            .field("width", self.depth as i32)
            .field("depth", self.depth as i32)
            .field("signed", true)
            .build()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputFormat {
    Raw(RawAudioConfig),
    Encoded,
}

/// Tuning forwarded to the device sink.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutputTuning {
    pub buffer_seconds: f32,
    pub chunk_frames: usize,
    pub refill_max_frames: usize,
}

impl Default for OutputTuning {
    fn default() -> Self {
        Self {
            buffer_seconds: 2.0,
            chunk_frames: 1024,
            refill_max_frames: 4096,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlayConfig {
    pub destination: Destination,
    pub format: InputFormat,
    pub device: Option<String>,
    pub output: OutputTuning,
}

impl PlayConfig {
    pub fn new(destination: Destination, format: InputFormat) -> Self {
        Self {
            destination,
            format,
            device: None,
            output: OutputTuning::default(),
        }
    }

    pub fn from_args(args: &Args) -> Result<Self> {
        let format = if args.format == RAW_FORMAT {
            InputFormat::Raw(RawAudioConfig::new(args.channels, args.samplerate, args.depth)?)
        } else {
            InputFormat::Encoded
        };
        if !(args.buffer_seconds.is_finite() && args.buffer_seconds > 0.0) {
            bail!("buffer-seconds must be positive");
        }
        if args.chunk_frames == 0 || args.refill_max_frames == 0 {
            bail!("chunk-frames and refill-max-frames must be positive");
        }
        Ok(Self {
            destination: Destination::parse(&args.dst),
            format,
            device: normalize_device_name(args.device.clone()),
            output: OutputTuning {
                buffer_seconds: args.buffer_seconds,
                chunk_frames: args.chunk_frames,
                refill_max_frames: args.refill_max_frames,
            },
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionConfig {
    pub connect: String,
    pub topic: String,
    pub queue_size: u16,
}

impl SubscriptionConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        if args.topic.is_empty() {
            bail!("topic must not be empty");
        }
        Ok(Self {
            connect: args.connect.clone(),
            topic: args.topic.clone(),
            queue_size: args.queue_size.max(1),
        })
    }
}

pub fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["audio-play"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn device_names_select_device_destination() {
        assert_eq!(Destination::parse("alsasink"), Destination::Device);
        assert_eq!(Destination::parse("autoaudiosink"), Destination::Device);
        assert_eq!(
            Destination::parse("out.wav"),
            Destination::File(PathBuf::from("out.wav"))
        );
    }

    #[test]
    fn raw_caps_follow_configuration() {
        let raw = RawAudioConfig::new(2, 44_100, 24).unwrap();
        let caps = raw.caps();
        assert_eq!(caps.media_type(), "audio/x-raw");
        assert_eq!(caps.get_int("channels"), Some(2));
        assert_eq!(caps.get_int("rate"), Some(44_100));
        assert_eq!(caps.get_int("width"), Some(24));
        assert_eq!(caps.get_int("depth"), Some(24));
        assert_eq!(caps.get_int("endianness"), Some(1234));
        assert_eq!(caps.get_bool("signed"), Some(true));
        assert_eq!(caps.get_str("format"), Some("S24LE"));
    }

    #[test]
    fn raw_config_rejects_bad_values() {
        assert!(RawAudioConfig::new(0, 48_000, 16).is_err());
        assert!(RawAudioConfig::new(1, 0, 16).is_err());
        assert!(RawAudioConfig::new(1, 48_000, 12).is_err());
    }

    #[test]
    fn defaults_give_raw_mono_to_device() {
        let config = PlayConfig::from_args(&args(&[])).unwrap();
        assert_eq!(config.destination, Destination::Device);
        assert_eq!(
            config.format,
            InputFormat::Raw(RawAudioConfig {
                channels: 1,
                sample_rate: 96_000,
                depth: 16,
            })
        );
        assert_eq!(config.output, OutputTuning::default());
    }

    #[test]
    fn non_pcm_format_is_encoded_and_skips_raw_checks() {
        let config = PlayConfig::from_args(&args(&["--format", "mp3", "--depth", "12"])).unwrap();
        assert_eq!(config.format, InputFormat::Encoded);
    }

    #[test]
    fn device_name_is_normalized() {
        let config = PlayConfig::from_args(&args(&["--device", "  USB DAC "])).unwrap();
        assert_eq!(config.device.as_deref(), Some("USB DAC"));
        let config = PlayConfig::from_args(&args(&["--device", "   "])).unwrap();
        assert_eq!(config.device, None);
    }

    #[test]
    fn normalize_device_name_preserves_inner_spaces() {
        assert_eq!(
            normalize_device_name(Some("USB  DAC".to_string())),
            Some("USB  DAC".to_string())
        );
    }

    #[test]
    fn subscription_from_args() {
        let sub = SubscriptionConfig::from_args(&args(&["--connect", "10.0.0.2:7000", "--queue-size", "0"]))
            .unwrap();
        assert_eq!(sub.connect, "10.0.0.2:7000");
        assert_eq!(sub.topic, "/audio");
        assert_eq!(sub.queue_size, 1);
    }
}
