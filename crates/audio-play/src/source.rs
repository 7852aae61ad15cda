//! Turns topic frames into buffers on the pipeline's `appsrc`.

use std::sync::Arc;

use audio_engine::{AppSrc, Buffer, FlowReturn, Pipeline};
use audio_transport_proto::AudioData;

use crate::flow::{RunState, SharedRunState, apply_run_state};
use crate::status::PlayStatus;

#[derive(Clone)]
pub struct FrameSource {
    pipeline: Pipeline,
    source: AppSrc,
    run: Arc<SharedRunState>,
    status: Arc<PlayStatus>,
}

impl FrameSource {
    pub fn new(pipeline: Pipeline, source: AppSrc, run: Arc<SharedRunState>, status: Arc<PlayStatus>) -> Self {
        Self {
            pipeline,
            source,
            run,
            status,
        }
    }

    /// Push one frame, resuming a paused pipeline first.
    ///
    /// Returns the push result. Failures are logged and counted; the frame is dropped.
    pub fn submit(&self, frame: &AudioData) -> FlowReturn {
        if frame.is_empty() {
            tracing::debug!("empty frame ignored");
            self.status.record_empty_frame();
            return FlowReturn::Ok;
        }

        self.resume_if_paused();

        let mut buffer = Buffer::with_size(frame.len());
        buffer.fill(0, frame.data());
        let flow = self.source.push_buffer(buffer);
        self.status.record_frame(frame.len());
        if !flow.is_ok() {
            tracing::warn!(%flow, bytes = frame.len(), "frame push failed; dropped");
            self.status.record_push_failure();
        }

        // A need-data raised before this push may have paused the pipeline meanwhile.
        self.resume_if_paused();
        flow
    }

    /// Queue end-of-stream once the feed is over.
    pub fn finish(&self) -> FlowReturn {
        self.resume_if_paused();
        let flow = self.source.end_of_stream();
        self.status.record_end_of_stream();
        tracing::info!(%flow, "feed ended; end-of-stream queued");
        self.resume_if_paused();
        flow
    }

    fn resume_if_paused(&self) {
        if !self.run.transition(RunState::Playing) {
            return;
        }
        self.status.record_resume();
        tracing::debug!("resuming pipeline for incoming data");
        if let Err(e) = apply_run_state(&self.pipeline, &self.run) {
            tracing::warn!("resume failed: {e}");
        }
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("source", &self.source)
            .field("run", &self.run.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio_engine::State;
    use audio_engine::elements::fakesink::{self, FakeSink};
    use audio_engine::elements::appsrc;
    use std::time::{Duration, Instant};

    fn setup(initial: RunState) -> (FrameSource, Pipeline, FakeSink, Arc<SharedRunState>, Arc<PlayStatus>) {
        let pipeline = Pipeline::new("p");
        let src = appsrc::create("src").unwrap();
        let sink = fakesink::create("sink").unwrap();
        sink.set_property("retain-data", true).unwrap();
        pipeline.add_many(&[&src, &sink]).unwrap();
        src.link(&sink).unwrap();
        pipeline.set_state(initial.into()).unwrap();

        let run = SharedRunState::new(initial);
        let status = PlayStatus::shared();
        let source = FrameSource::new(
            pipeline.clone(),
            AppSrc::from_element(&src).unwrap(),
            run.clone(),
            status.clone(),
        );
        (source, pipeline, FakeSink::from_element(&sink).unwrap(), run, status)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn submit_resumes_paused_pipeline() {
        let (source, pipeline, sink, run, status) = setup(RunState::Paused);
        assert_eq!(source.submit(&AudioData::new(vec![1, 2, 3])), FlowReturn::Ok);
        assert_eq!(run.get(), RunState::Playing);
        assert_eq!(pipeline.state(), State::Playing);
        assert!(wait_for(|| sink.data() == [1, 2, 3]));
        assert_eq!(status.snapshot().resumes, 1);
    }

    #[test]
    fn empty_frames_are_ignored() {
        let (source, _pipeline, sink, _run, status) = setup(RunState::Playing);
        assert_eq!(source.submit(&AudioData::default()), FlowReturn::Ok);
        let snap = status.snapshot();
        assert_eq!(snap.frames_submitted, 0);
        assert_eq!(snap.empty_frames, 1);
        assert_eq!(sink.buffer_count(), 0);
    }

    #[test]
    fn failed_push_is_counted_not_raised() {
        let (source, _pipeline, _sink, _run, status) = setup(RunState::Playing);
        assert_eq!(source.finish(), FlowReturn::Ok);
        assert_eq!(source.submit(&AudioData::new(vec![9])), FlowReturn::Eos);
        assert_eq!(status.snapshot().push_failures, 1);
    }

    #[test]
    fn finish_reaches_the_sink_while_paused() {
        let (source, pipeline, sink, _run, _status) = setup(RunState::Paused);
        source.finish();
        assert_eq!(pipeline.state(), State::Playing);
        assert!(wait_for(|| sink.eos_seen()));
    }
}
