use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Counters shared by the frame source, the dispatch thread and `main`.
#[derive(Debug, Default)]
pub struct PlayStatus {
    frames_submitted: AtomicU64,
    bytes_submitted: AtomicU64,
    empty_frames: AtomicU64,
    push_failures: AtomicU64,
    need_data: AtomicU64,
    pauses: AtomicU64,
    resumes: AtomicU64,
    pad_linked: AtomicBool,
    errors: AtomicU64,
    eos_sent: AtomicBool,
    eos_seen: AtomicBool,
    last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StatusSnapshot {
    pub frames_submitted: u64,
    pub bytes_submitted: u64,
    pub empty_frames: u64,
    pub push_failures: u64,
    pub need_data: u64,
    pub pauses: u64,
    pub resumes: u64,
    pub pad_linked: bool,
    pub errors: u64,
    pub last_error: Option<String>,
    pub eos_sent: bool,
    pub eos_seen: bool,
}

impl PlayStatus {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn record_frame(&self, bytes: usize) {
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
        self.bytes_submitted.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_empty_frame(&self) {
        self.empty_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_push_failure(&self) {
        self.push_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_end_of_stream(&self) {
        self.eos_sent.store(true, Ordering::Relaxed);
    }

    pub(crate) fn record_need_data(&self) {
        self.need_data.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pause(&self) {
        self.pauses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_resume(&self) {
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_pad_linked(&self, linked: bool) {
        self.pad_linked.store(linked, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self, message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap() = Some(message.to_string());
    }

    pub(crate) fn record_eos(&self) {
        self.eos_seen.store(true, Ordering::Relaxed);
    }

    pub fn eos_seen(&self) -> bool {
        self.eos_seen.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            bytes_submitted: self.bytes_submitted.load(Ordering::Relaxed),
            empty_frames: self.empty_frames.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            need_data: self.need_data.load(Ordering::Relaxed),
            pauses: self.pauses.load(Ordering::Relaxed),
            resumes: self.resumes.load(Ordering::Relaxed),
            pad_linked: self.pad_linked.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_error: self.last_error.lock().unwrap().clone(),
            eos_sent: self.eos_sent.load(Ordering::Relaxed),
            eos_seen: self.eos_seen.load(Ordering::Relaxed),
        }
    }
}
