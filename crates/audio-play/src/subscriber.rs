//! Topic subscription over TCP.
//!
//! A reader thread decodes frames off the socket into a bounded channel; the delivery loop hands
//! them to the [`FrameSource`] in arrival order. When the channel is full the reader blocks, which
//! in turn stalls the publisher through TCP flow control.

use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::net::TcpStream;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow, bail};
use audio_transport_proto::{self as proto, AudioData, Frame, FrameKind};
use crossbeam_channel::{Receiver, Sender};

use crate::config::SubscriptionConfig;
use crate::source::FrameSource;

pub const READER_THREAD: &str = "audio-play-subscriber";

pub struct Subscription {
    frames: Receiver<AudioData>,
    reader: JoinHandle<Result<u64>>,
}

/// Connect to the publisher and subscribe to `config.topic`.
pub fn connect(config: &SubscriptionConfig) -> Result<Subscription> {
    let stream = TcpStream::connect(&config.connect)
        .with_context(|| format!("connect to publisher {}", config.connect))?;
    let _ = stream.set_nodelay(true);
    let peer = stream.peer_addr().ok();

    let mut writer = BufWriter::new(stream.try_clone().context("clone socket")?);
    proto::write_prelude(&mut writer)?;
    let payload = proto::encode_subscribe(&config.topic, config.queue_size)?;
    proto::write_frame(&mut writer, FrameKind::Subscribe, &payload)?;
    writer.flush().context("send subscription")?;

    let mut reader = BufReader::new(stream);
    proto::read_prelude(&mut reader).context("publisher handshake")?;
    tracing::info!(peer = ?peer, topic = %config.topic, queue = config.queue_size, "subscribed");

    let (tx, rx) = crossbeam_channel::bounded(config.queue_size.max(1) as usize);
    let reader = thread::Builder::new()
        .name(READER_THREAD.to_string())
        .spawn(move || read_frames(reader, tx))
        .context("spawn subscriber thread")?;
    Ok(Subscription { frames: rx, reader })
}

fn read_frames(mut reader: impl std::io::Read, tx: Sender<AudioData>) -> Result<u64> {
    let mut count = 0u64;
    loop {
        let frame = match proto::read_frame(&mut reader) {
            Ok(frame) => frame,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                tracing::info!(frames = count, "publisher closed the connection");
                return Ok(count);
            }
            Err(e) => return Err(e).context("read frame"),
        };
        match frame {
            Frame::AudioData(audio) => {
                if tx.send(audio).is_err() {
                    return Ok(count);
                }
                count += 1;
            }
            Frame::Error(message) => return Err(anyhow!("publisher error: {message}")),
            Frame::Subscribe(_) => bail!("unexpected SUBSCRIBE from publisher"),
        }
    }
}

impl Subscription {
    /// Submit every frame until the feed ends, then queue end-of-stream.
    ///
    /// Returns the number of frames delivered, or the reader's error.
    pub fn deliver(self, source: &FrameSource) -> Result<u64> {
        let mut delivered = 0u64;
        for frame in self.frames.iter() {
            source.submit(&frame);
            delivered += 1;
        }
        source.finish();
        let read = self
            .reader
            .join()
            .map_err(|_| anyhow!("subscriber thread panicked"))??;
        tracing::debug!(read, delivered, "feed drained");
        Ok(delivered)
    }
}
