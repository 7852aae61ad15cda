//! Reports what the pipeline posts on its bus.

use std::sync::Arc;

use audio_engine::{Message, MessageView};

use crate::status::PlayStatus;

/// What the monitor made of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    Error,
    Eos,
    Other(&'static str),
}

/// Reports bus messages. Never changes the pipeline.
pub struct BusMonitor {
    status: Arc<PlayStatus>,
}

impl BusMonitor {
    pub fn new(status: Arc<PlayStatus>) -> Self {
        Self { status }
    }

    pub fn handle(&self, message: &Message) -> Observed {
        match message.view() {
            MessageView::Error { message: text, debug: detail } => {
                tracing::error!(
                    source = %message.source,
                    debug = detail.as_deref().unwrap_or(""),
                    "Error {text}"
                );
                self.status.record_error(text);
                Observed::Error
            }
            MessageView::Eos => {
                tracing::info!(source = %message.source, "End of stream");
                self.status.record_eos();
                Observed::Eos
            }
            _ => {
                let name = message.type_name();
                tracing::debug!(source = %message.source, "got message {name}");
                Observed::Other(name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio_engine::State;

    #[test]
    fn errors_and_eos_are_recorded() {
        let status = PlayStatus::shared();
        let monitor = BusMonitor::new(status.clone());

        let error = Message::new(
            "app_source",
            MessageView::Error {
                message: "Internal data stream error.".into(),
                debug: Some("streaming stopped, reason not-linked".into()),
            },
        );
        assert_eq!(monitor.handle(&error), Observed::Error);
        assert_eq!(monitor.handle(&Message::new("sink", MessageView::Eos)), Observed::Eos);

        let snap = status.snapshot();
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.last_error.as_deref(), Some("Internal data stream error."));
        assert!(snap.eos_seen);
    }

    #[test]
    fn other_messages_report_type_name() {
        let monitor = BusMonitor::new(PlayStatus::shared());
        let changed = Message::new(
            "app_pipeline",
            MessageView::StateChanged {
                old: State::Paused,
                current: State::Playing,
            },
        );
        assert_eq!(monitor.handle(&changed), Observed::Other("state-changed"));
        assert_eq!(
            monitor.handle(&Message::new("app_source", MessageView::StreamStart)),
            Observed::Other("stream-start")
        );
    }
}
