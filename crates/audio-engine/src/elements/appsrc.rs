//! `appsrc`: lets the application inject buffers into a pipeline.
//!
//! Buffers pushed by the application are queued and sent downstream by a streaming thread
//! that runs while the element is PAUSED or PLAYING. The element reports queue pressure as
//! [`FlowSignal`] events on the pipeline's event channel: `NeedData` when the queue runs dry
//! (once per dry spell) and `EnoughData` when it reaches `max-bytes`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::buffer::Buffer;
use crate::bus::MessageView;
use crate::caps::Caps;
use crate::element::{Element, ElementImpl, PropertyValue, invalid_property};
use crate::error::{EngineError, StateChangeError};
use crate::event::{EngineEvent, FlowSignal, StreamEvent};
use crate::pad::{FlowReturn, Pad, PadDirection};
use crate::state::StateChange;

pub const FACTORY: &str = "appsrc";

pub const DEFAULT_MAX_BYTES: u64 = 200_000;
/// Size hint carried by `NeedData`.
pub const DEFAULT_BLOCKSIZE: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamType {
    #[default]
    Stream,
    Seekable,
    RandomAccess,
}

impl StreamType {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamType::Stream => "stream",
            StreamType::Seekable => "seekable",
            StreamType::RandomAccess => "random-access",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "stream" => Some(StreamType::Stream),
            "seekable" => Some(StreamType::Seekable),
            "random-access" => Some(StreamType::RandomAccess),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Settings {
    caps: Option<Caps>,
    max_bytes: u64,
    block: bool,
    min_percent: u32,
    stream_type: StreamType,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            caps: None,
            max_bytes: DEFAULT_MAX_BYTES,
            block: false,
            min_percent: 0,
            stream_type: StreamType::Stream,
        }
    }
}

#[derive(Debug)]
enum Item {
    Buffer(Buffer),
    Eos,
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<Item>,
    level_bytes: u64,
    need_data_sent: bool,
    enough_sent: bool,
    eos_queued: bool,
    flushing: bool,
}

impl Default for QueueState {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
            level_bytes: 0,
            need_data_sent: false,
            enough_sent: false,
            eos_queued: false,
            flushing: true,
        }
    }
}

#[derive(Default)]
pub struct AppSrcImpl {
    settings: Mutex<Settings>,
    queue: Mutex<QueueState>,
    cv: Condvar,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AppSrcImpl {
    fn settings(&self) -> Settings {
        self.settings.lock().unwrap().clone()
    }

    fn push_item(&self, element: &Element, item: Item) -> FlowReturn {
        let settings = self.settings();
        let mut q = self.queue.lock().unwrap();
        loop {
            if q.flushing {
                return FlowReturn::Flushing;
            }
            if q.eos_queued {
                return FlowReturn::Eos;
            }
            let full = q.level_bytes >= settings.max_bytes;
            if matches!(item, Item::Buffer(_)) && settings.block && full {
                q = self.cv.wait(q).unwrap();
                continue;
            }
            break;
        }

        match &item {
            Item::Buffer(buffer) => {
                q.level_bytes += buffer.len() as u64;
                q.need_data_sent = false;
            }
            Item::Eos => q.eos_queued = true,
        }
        q.items.push_back(item);

        let saturated = q.level_bytes >= settings.max_bytes && !q.enough_sent;
        if saturated {
            q.enough_sent = true;
        }
        drop(q);
        self.cv.notify_all();

        if saturated {
            element.emit(EngineEvent::Flow {
                element: element.name().to_string(),
                signal: FlowSignal::EnoughData,
            });
        }
        FlowReturn::Ok
    }

    /// Block until an item is available; `None` once flushing.
    fn next_item(&self, element: &Element, settings: &Settings) -> Option<Item> {
        let threshold = settings.max_bytes * settings.min_percent as u64 / 100;
        let mut q = self.queue.lock().unwrap();
        loop {
            if q.flushing {
                return None;
            }
            if !q.need_data_sent && !q.eos_queued && q.level_bytes <= threshold {
                q.need_data_sent = true;
                element.emit(EngineEvent::Flow {
                    element: element.name().to_string(),
                    signal: FlowSignal::NeedData {
                        length: DEFAULT_BLOCKSIZE,
                    },
                });
            }
            if let Some(item) = q.items.pop_front() {
                if let Item::Buffer(buffer) = &item {
                    q.level_bytes = q.level_bytes.saturating_sub(buffer.len() as u64);
                    if q.level_bytes < settings.max_bytes {
                        q.enough_sent = false;
                    }
                }
                drop(q);
                self.cv.notify_all();
                return Some(item);
            }
            q = self.cv.wait(q).unwrap();
        }
    }

    fn stream_loop(&self, element: &Element) {
        let Some(src) = element.static_pad("src") else {
            return;
        };
        let mut started = false;

        loop {
            let settings = self.settings();
            let Some(item) = self.next_item(element, &settings) else {
                tracing::trace!(element = %element.name(), "streaming thread flushing");
                return;
            };

            if !started {
                started = true;
                src.push_event(StreamEvent::StreamStart);
                element.post_message(MessageView::StreamStart);
                if let Some(caps) = settings.caps {
                    src.push_event(StreamEvent::Caps(caps));
                }
            }

            match item {
                Item::Buffer(buffer) => {
                    let flow = src.push(buffer);
                    match flow {
                        FlowReturn::Ok => {}
                        FlowReturn::Flushing | FlowReturn::Eos => {
                            tracing::debug!(element = %element.name(), %flow, "streaming task paused");
                            return;
                        }
                        FlowReturn::NotLinked | FlowReturn::NotNegotiated | FlowReturn::Error => {
                            element.post_error(
                                "Internal data stream error.",
                                Some(format!("streaming stopped, reason {flow}")),
                            );
                            return;
                        }
                    }
                }
                Item::Eos => {
                    tracing::debug!(element = %element.name(), "pushing end-of-stream");
                    src.push_event(StreamEvent::Eos);
                }
            }
        }
    }

    fn start_task(&self, element: &Element) -> Result<(), StateChangeError> {
        {
            let mut q = self.queue.lock().unwrap();
            q.flushing = false;
            q.need_data_sent = false;
        }
        let Some(me) = element.imp::<AppSrcImpl>() else {
            return Ok(());
        };
        let el = element.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-stream", element.name()))
            .spawn(move || me.stream_loop(&el))
            .map_err(|e| {
                StateChangeError::new(element, StateChange::READY_TO_PAUSED, e.to_string())
            })?;
        *self.task.lock().unwrap() = Some(handle);
        Ok(())
    }

    fn stop_task(&self) {
        {
            let mut q = self.queue.lock().unwrap();
            q.flushing = true;
        }
        self.cv.notify_all();
        if let Some(handle) = self.task.lock().unwrap().take() {
            let _ = handle.join();
        }
        let mut q = self.queue.lock().unwrap();
        *q = QueueState::default();
    }
}

impl ElementImpl for AppSrcImpl {
    fn change_state(&self, element: &Element, transition: StateChange) -> Result<(), StateChangeError> {
        match transition {
            StateChange::READY_TO_PAUSED => self.start_task(element),
            StateChange::PAUSED_TO_READY => {
                self.stop_task();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn set_property(&self, element: &Element, name: &str, value: PropertyValue) -> Result<(), EngineError> {
        let mut s = self.settings.lock().unwrap();
        match name {
            "caps" => match value {
                PropertyValue::Caps(caps) => s.caps = Some(caps),
                PropertyValue::Str(text) => s.caps = Some(text.parse()?),
                other => {
                    let reason = format!("expected caps, got {}", other.type_name());
                    return Err(invalid_property(element, name, reason));
                }
            },
            "max-bytes" => {
                s.max_bytes = value
                    .as_int()
                    .and_then(|v| u64::try_from(v).ok())
                    .ok_or_else(|| invalid_property(element, name, "expected a non-negative integer"))?;
            }
            "block" => {
                s.block = value
                    .as_bool()
                    .ok_or_else(|| invalid_property(element, name, "expected a boolean"))?;
            }
            "min-percent" => {
                s.min_percent = value
                    .as_int()
                    .filter(|v| (0..=100).contains(v))
                    .map(|v| v as u32)
                    .ok_or_else(|| invalid_property(element, name, "expected 0..=100"))?;
            }
            "stream-type" => {
                s.stream_type = value
                    .as_str()
                    .and_then(StreamType::from_name)
                    .ok_or_else(|| invalid_property(element, name, "unknown stream type"))?;
            }
            _ => {
                return Err(EngineError::UnknownProperty {
                    element: element.name().to_string(),
                    property: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn property(&self, _element: &Element, name: &str) -> Option<PropertyValue> {
        let s = self.settings.lock().unwrap();
        match name {
            "caps" => s.caps.clone().map(PropertyValue::Caps),
            "max-bytes" => Some(PropertyValue::Int(s.max_bytes as i64)),
            "block" => Some(PropertyValue::Bool(s.block)),
            "min-percent" => Some(PropertyValue::Int(s.min_percent as i64)),
            "stream-type" => Some(PropertyValue::Str(s.stream_type.as_str().to_string())),
            "current-level-bytes" => Some(PropertyValue::Int(
                self.queue.lock().unwrap().level_bytes as i64,
            )),
            _ => None,
        }
    }

    fn query_caps(&self, _element: &Element, _pad: &Pad) -> Option<Caps> {
        self.settings.lock().unwrap().caps.clone()
    }
}

pub fn create(name: &str) -> Result<Element, EngineError> {
    let element = Element::new(name, FACTORY, AppSrcImpl::default());
    element.add_pad(Pad::new("src", PadDirection::Src))?;
    Ok(element)
}

/// Typed handle for application-side calls on an `appsrc`.
#[derive(Clone)]
pub struct AppSrc {
    element: Element,
    imp: Arc<AppSrcImpl>,
}

impl AppSrc {
    pub fn from_element(element: &Element) -> Option<Self> {
        let imp = element.imp::<AppSrcImpl>()?;
        Some(Self {
            element: element.clone(),
            imp,
        })
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    /// Queue a buffer for the streaming thread.
    ///
    /// Returns `Flushing` unless the element is PAUSED or PLAYING, and `Eos` after
    /// [`AppSrc::end_of_stream`]. Blocks while the queue is full when `block` is set.
    pub fn push_buffer(&self, buffer: Buffer) -> FlowReturn {
        self.imp.push_item(&self.element, Item::Buffer(buffer))
    }

    /// Queue end-of-stream behind any pending buffers.
    pub fn end_of_stream(&self) -> FlowReturn {
        self.imp.push_item(&self.element, Item::Eos)
    }

    pub fn set_caps(&self, caps: Option<Caps>) {
        self.imp.settings.lock().unwrap().caps = caps;
    }

    pub fn caps(&self) -> Option<Caps> {
        self.imp.settings.lock().unwrap().caps.clone()
    }

    pub fn set_stream_type(&self, stream_type: StreamType) {
        self.imp.settings.lock().unwrap().stream_type = stream_type;
    }

    pub fn stream_type(&self) -> StreamType {
        self.imp.settings.lock().unwrap().stream_type
    }

    pub fn set_max_bytes(&self, max_bytes: u64) {
        self.imp.settings.lock().unwrap().max_bytes = max_bytes;
    }

    pub fn set_block(&self, block: bool) {
        self.imp.settings.lock().unwrap().block = block;
    }

    /// Bytes queued but not yet sent downstream.
    pub fn current_level_bytes(&self) -> u64 {
        self.imp.queue.lock().unwrap().level_bytes
    }
}

impl std::fmt::Debug for AppSrc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSrc")
            .field("name", &self.element.name())
            .field("level_bytes", &self.current_level_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bin::Pipeline;
    use crate::elements::fakesink::{self, FakeSink};
    use crate::state::State;
    use std::time::{Duration, Instant};

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn setup() -> (Pipeline, AppSrc, FakeSink) {
        let pipeline = Pipeline::new("test");
        let src = create("src").unwrap();
        let sink = fakesink::create("sink").unwrap();
        sink.set_property("retain-data", true).unwrap();
        pipeline.add_many(&[&src, &sink]).unwrap();
        src.link(&sink).unwrap();
        (
            pipeline,
            AppSrc::from_element(&src).unwrap(),
            FakeSink::from_element(&sink).unwrap(),
        )
    }

    #[test]
    fn push_before_paused_is_flushing() {
        let (_pipeline, src, _sink) = setup();
        assert_eq!(src.push_buffer(Buffer::from_slice(&[1])), FlowReturn::Flushing);
    }

    #[test]
    fn buffers_reach_sink_in_order_then_eos() {
        let (pipeline, src, sink) = setup();
        pipeline.set_state(State::Playing).unwrap();

        for chunk in [&b"ab"[..], b"cd", b"e"] {
            assert_eq!(src.push_buffer(Buffer::from_slice(chunk)), FlowReturn::Ok);
        }
        assert_eq!(src.end_of_stream(), FlowReturn::Ok);
        assert_eq!(src.push_buffer(Buffer::from_slice(b"x")), FlowReturn::Eos);

        assert!(wait_for(|| sink.eos_seen()));
        assert_eq!(sink.data(), b"abcde".to_vec());
        assert_eq!(sink.buffer_count(), 3);
        pipeline.set_state(State::Null).unwrap();
    }

    #[test]
    fn need_data_emitted_once_per_dry_spell() {
        let (pipeline, src, sink) = setup();
        pipeline.set_state(State::Playing).unwrap();

        let need_data = || loop {
            match pipeline.events().recv_timeout(Duration::from_secs(5)) {
                Ok(EngineEvent::Flow {
                    signal: FlowSignal::NeedData { length },
                    ..
                }) => return length,
                Ok(_) => continue,
                Err(e) => panic!("no need-data: {e}"),
            }
        };

        assert_eq!(need_data(), DEFAULT_BLOCKSIZE);
        // Nothing else until data flows again.
        assert!(pipeline.events().recv_timeout(Duration::from_millis(50)).is_err());

        src.push_buffer(Buffer::from_slice(&[1, 2, 3]));
        assert!(wait_for(|| sink.buffer_count() == 1));
        need_data();
        pipeline.set_state(State::Null).unwrap();
    }

    #[test]
    fn enough_data_when_queue_reaches_max_bytes() {
        let pipeline = Pipeline::new("test");
        let el = create("src").unwrap();
        pipeline.add(&el).unwrap();
        let src = AppSrc::from_element(&el).unwrap();
        src.set_max_bytes(4);
        pipeline.set_state(State::Paused).unwrap();
        // Initial need-data.
        let _ = pipeline.events().recv_timeout(Duration::from_secs(5));

        src.push_buffer(Buffer::from_slice(&[0; 4]));
        let saw_enough = (0..10).any(|_| {
            matches!(
                pipeline.events().recv_timeout(Duration::from_millis(200)),
                Ok(EngineEvent::Flow {
                    signal: FlowSignal::EnoughData,
                    ..
                })
            )
        });
        assert!(saw_enough);
        pipeline.set_state(State::Null).unwrap();
    }

    #[test]
    fn unlinked_source_posts_stream_error() {
        let pipeline = Pipeline::new("test");
        let el = create("src").unwrap();
        pipeline.add(&el).unwrap();
        let src = AppSrc::from_element(&el).unwrap();
        pipeline.set_state(State::Playing).unwrap();
        src.push_buffer(Buffer::from_slice(&[1]));

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut found = None;
        while Instant::now() < deadline && found.is_none() {
            if let Some(msg) = pipeline.bus().timed_pop(Duration::from_millis(50)) {
                if let MessageView::Error { message, debug } = msg.view {
                    found = Some((message, debug));
                }
            }
        }
        let (message, debug) = found.unwrap();
        assert_eq!(message, "Internal data stream error.");
        assert_eq!(debug.as_deref(), Some("streaming stopped, reason not-linked"));
        pipeline.set_state(State::Null).unwrap();
    }

    #[test]
    fn properties_round_trip() {
        let el = create("src").unwrap();
        el.set_property("max-bytes", 1024i64).unwrap();
        el.set_property("block", true).unwrap();
        el.set_property("stream-type", "seekable").unwrap();
        el.set_property("caps", "audio/x-raw, rate=(int)8000").unwrap();
        assert_eq!(el.property("max-bytes"), Some(PropertyValue::Int(1024)));
        assert_eq!(el.property("block"), Some(PropertyValue::Bool(true)));
        assert_eq!(
            el.property("stream-type"),
            Some(PropertyValue::Str("seekable".into()))
        );
        assert_eq!(
            el.static_pad("src").unwrap().query_caps().get_int("rate"),
            Some(8000)
        );
        assert!(el.set_property("min-percent", 150i64).is_err());
        assert!(el.set_property("stream-type", "tape").is_err());
    }
}
