//! Links the decoder's first audio pad to the audio sub-graph, once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use audio_engine::{Caps, LinkError, Pad};

use crate::status::PlayStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unlinked,
    Linked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    AlreadyLinked,
    NotAudio,
    Failed(LinkError),
}

pub struct PadLinker {
    target: Pad,
    linked: AtomicBool,
    status: Arc<PlayStatus>,
}

impl PadLinker {
    /// `target` is the sub-graph's input pad (the audio bin's ghost `sink`).
    pub fn new(target: Pad, status: Arc<PlayStatus>) -> Self {
        Self {
            target,
            linked: AtomicBool::new(false),
            status,
        }
    }

    pub fn state(&self) -> LinkState {
        if self.linked.load(Ordering::SeqCst) {
            LinkState::Linked
        } else {
            LinkState::Unlinked
        }
    }

    pub fn on_pad_added(&self, pad: &Pad, caps: Option<&Caps>) -> LinkOutcome {
        if self.state() == LinkState::Linked || self.target.is_linked() {
            tracing::debug!(pad = %pad.path(), "audio sink already linked; pad ignored");
            return LinkOutcome::AlreadyLinked;
        }

        let caps = caps
            .cloned()
            .or_else(|| pad.current_caps())
            .unwrap_or_else(|| pad.query_caps());
        if !caps.media_type().starts_with("audio") {
            tracing::debug!(pad = %pad.path(), caps = %caps, "not an audio pad");
            return LinkOutcome::NotAudio;
        }

        if self
            .linked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return LinkOutcome::AlreadyLinked;
        }
        match pad.link(&self.target) {
            Ok(()) => {
                tracing::info!(pad = %pad.path(), caps = %caps, "decoded audio linked");
                self.status.set_pad_linked(true);
                LinkOutcome::Linked
            }
            Err(e) => {
                self.linked.store(false, Ordering::SeqCst);
                tracing::warn!(pad = %pad.path(), "linking decoded pad failed: {e}");
                LinkOutcome::Failed(e)
            }
        }
    }
}
