//! `audio-play`: subscribe to an audio topic and play it on the output device or into a file.
//!
//! ## Graphs
//! - raw PCM (`--format pcm`) to the device: `appsrc ! autoaudiosink`, caps from
//!   `--channels/--samplerate/--depth`.
//! - encoded audio to the device: `appsrc ! decodebin`, the first decoded audio pad linked to
//!   `audioconvert ! autoaudiosink`.
//! - `--dst <path>`: `appsrc ! filesink`, bytes written verbatim.
//!
//! The pipeline pauses whenever the source runs dry and resumes with the next frame.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use audio_play::cli::Args;
use audio_play::config::{PlayConfig, SubscriptionConfig};
use audio_play::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,audio_play=info,audio_engine=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let _ = ctrlc::set_handler(|| std::process::exit(130));

    let config = PlayConfig::from_args(&args)?;
    let subscription = SubscriptionConfig::from_args(&args)?;
    tracing::info!(destination = ?config.destination, format = ?config.format, "starting");

    let snapshot = runtime::run(&config, &subscription)?;
    tracing::info!(status = %serde_json::to_string(&snapshot)?, "done");
    Ok(())
}
