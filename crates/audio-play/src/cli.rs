use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "audio-play", version)]
pub struct Args {
    /// Destination: `alsasink` or `autoaudiosink` for the output device, otherwise a file path
    #[arg(long, default_value = "alsasink")]
    pub dst: String,

    /// Input format: `pcm` for raw samples, anything else is sniffed and decoded
    #[arg(long, default_value = "pcm")]
    pub format: String,

    /// Channel count of raw input
    #[arg(long, default_value_t = 1)]
    pub channels: u32,

    /// Sample rate of raw input (Hz)
    #[arg(long, default_value_t = 96_000)]
    pub samplerate: u32,

    /// Bits per sample of raw input (signed, little-endian)
    #[arg(long, default_value_t = 16)]
    pub depth: u32,

    /// Publisher address, e.g. 127.0.0.1:5570
    #[arg(long, default_value = "127.0.0.1:5570")]
    pub connect: String,

    /// Topic to subscribe to
    #[arg(long, default_value = "/audio")]
    pub topic: String,

    /// Frames buffered between the network reader and the pipeline
    #[arg(long, default_value_t = 10)]
    pub queue_size: u16,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Queue buffer target in seconds (per output stage)
    #[arg(long, default_value_t = 2.0)]
    pub buffer_seconds: f32,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// Playback callback refill cap (frames). Larger reduces lock churn but can add latency.
    #[arg(long, default_value_t = 4096)]
    pub refill_max_frames: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_raw_device_playback() {
        let args = Args::parse_from(["audio-play"]);
        assert_eq!(args.dst, "alsasink");
        assert_eq!(args.format, "pcm");
        assert_eq!((args.channels, args.samplerate, args.depth), (1, 96_000, 16));
        assert_eq!(args.topic, "/audio");
        assert_eq!(args.queue_size, 10);
        assert!(args.device.is_none());
    }

    #[test]
    fn parses_file_destination_and_format() {
        let args = Args::parse_from([
            "audio-play",
            "--dst",
            "/tmp/out.mp3",
            "--format",
            "mp3",
            "--queue-size",
            "32",
        ]);
        assert_eq!(args.dst, "/tmp/out.mp3");
        assert_eq!(args.format, "mp3");
        assert_eq!(args.queue_size, 32);
    }
}
