//! Runtime helpers for the `audio-play` binary.

use anyhow::Result;
use audio_engine::{Registry, device};

use crate::config::{PlayConfig, SubscriptionConfig};
use crate::lifecycle::PlayPipeline;
use crate::status::StatusSnapshot;
use crate::subscriber;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for line in device::list_devices(&host)? {
        println!("{line}");
    }
    Ok(())
}

/// Start the pipeline, play the subscribed topic until the publisher goes away, then wait for
/// the pipeline to report end-of-stream (or an error).
pub fn run(config: &PlayConfig, subscription: &SubscriptionConfig) -> Result<StatusSnapshot> {
    let registry = Registry::with_defaults();
    let player = PlayPipeline::start(config, &registry)?;
    let feed = subscriber::connect(subscription)?;
    let delivered = feed.deliver(&player.frame_source())?;
    tracing::info!(frames = delivered, "feed finished; waiting for the pipeline to drain");
    player.wait_finished(None);
    Ok(player.status().snapshot())
}
