//! Asynchronous pipeline message stream.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::state::State;

#[derive(Debug, Clone, PartialEq)]
pub enum MessageView {
    Error { message: String, debug: Option<String> },
    Warning { message: String, debug: Option<String> },
    Info { message: String },
    Eos,
    StateChanged { old: State, current: State },
    StreamStart,
}

/// A message posted by an element, tagged with the element's name.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub source: String,
    pub view: MessageView,
}

impl Message {
    pub fn new(source: impl Into<String>, view: MessageView) -> Self {
        Self {
            source: source.into(),
            view,
        }
    }

    pub fn view(&self) -> &MessageView {
        &self.view
    }

    pub fn type_name(&self) -> &'static str {
        match self.view {
            MessageView::Error { .. } => "error",
            MessageView::Warning { .. } => "warning",
            MessageView::Info { .. } => "info",
            MessageView::Eos => "eos",
            MessageView::StateChanged { .. } => "state-changed",
            MessageView::StreamStart => "stream-start",
        }
    }
}

/// Multi-producer message queue owned by a pipeline.
#[derive(Debug, Clone)]
pub struct Bus {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl Bus {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Post a message. Never blocks.
    pub fn post(&self, message: Message) {
        // Both ends live in `self`, so the channel cannot be disconnected here.
        let _ = self.tx.send(message);
    }

    /// Receiver side, for `select!` loops.
    pub fn receiver(&self) -> &Receiver<Message> {
        &self.rx
    }

    pub fn pop(&self) -> Option<Message> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn timed_pop(&self, timeout: Duration) -> Option<Message> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_arrive_in_order() {
        let bus = Bus::new();
        bus.post(Message::new("src", MessageView::StreamStart));
        bus.post(Message::new("sink", MessageView::Eos));

        let first = bus.pop().unwrap();
        assert_eq!(first.source, "src");
        assert_eq!(first.type_name(), "stream-start");
        assert_eq!(bus.pop().unwrap().type_name(), "eos");
        assert!(bus.pop().is_none());
    }

    #[test]
    fn timed_pop_times_out_when_empty() {
        let bus = Bus::new();
        assert!(bus.timed_pop(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn type_names() {
        let err = Message::new(
            "x",
            MessageView::Error {
                message: "boom".into(),
                debug: None,
            },
        );
        assert_eq!(err.type_name(), "error");
        let changed = Message::new(
            "x",
            MessageView::StateChanged {
                old: State::Paused,
                current: State::Playing,
            },
        );
        assert_eq!(changed.type_name(), "state-changed");
    }
}
