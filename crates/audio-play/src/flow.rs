//! Run state and the reaction to the source's backpressure signals.
//!
//! A need-data signal pauses the pipeline until the next frame arrives; there is no timer that
//! resumes it on its own. Enough-data is only logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use audio_engine::{AppSrc, FlowSignal, Pipeline, State, StateChangeError};

use crate::status::PlayStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Playing,
    Paused,
}

impl From<RunState> for State {
    fn from(run: RunState) -> Self {
        match run {
            RunState::Playing => State::Playing,
            RunState::Paused => State::Paused,
        }
    }
}

/// Run state shared by the frame source and the flow controller.
#[derive(Debug)]
pub struct SharedRunState {
    paused: AtomicBool,
}

impl SharedRunState {
    pub fn new(initial: RunState) -> Arc<Self> {
        Arc::new(Self {
            paused: AtomicBool::new(initial == RunState::Paused),
        })
    }

    pub fn get(&self) -> RunState {
        if self.paused.load(Ordering::SeqCst) {
            RunState::Paused
        } else {
            RunState::Playing
        }
    }

    pub fn set(&self, run: RunState) {
        self.paused.store(run == RunState::Paused, Ordering::SeqCst);
    }

    /// Switch to `run`; returns whether the state changed.
    pub fn transition(&self, run: RunState) -> bool {
        let paused = run == RunState::Paused;
        self.paused
            .compare_exchange(!paused, paused, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Move `pipeline` to the run state current at the time the pipeline's state lock is taken.
pub fn apply_run_state(pipeline: &Pipeline, run: &SharedRunState) -> Result<State, StateChangeError> {
    pipeline.set_state_with(|| run.get().into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Run state moved to PAUSED and was applied.
    Paused,
    /// Enough-data: logged only.
    Ignored,
    /// Applying the state failed (reported on the bus by the pipeline).
    Failed,
}

pub struct FlowController {
    pipeline: Pipeline,
    source: AppSrc,
    run: Arc<SharedRunState>,
    status: Arc<PlayStatus>,
}

impl FlowController {
    pub fn new(pipeline: Pipeline, source: AppSrc, run: Arc<SharedRunState>, status: Arc<PlayStatus>) -> Self {
        Self {
            pipeline,
            source,
            run,
            status,
        }
    }

    pub fn handle(&self, signal: FlowSignal) -> FlowOutcome {
        match signal {
            FlowSignal::NeedData { length } => self.on_need_data(length),
            FlowSignal::EnoughData => {
                tracing::debug!(
                    level_bytes = self.source.current_level_bytes(),
                    "source queue saturated (enough-data)"
                );
                FlowOutcome::Ignored
            }
        }
    }

    fn on_need_data(&self, length: u32) -> FlowOutcome {
        self.status.record_need_data();
        tracing::warn!(
            length,
            queued = self.source.current_level_bytes(),
            "need-data signal emitted! Pausing the pipeline"
        );
        if self.run.transition(RunState::Paused) {
            self.status.record_pause();
        }
        if let Err(e) = apply_run_state(&self.pipeline, &self.run) {
            tracing::warn!("pause failed: {e}");
            return FlowOutcome::Failed;
        }
        FlowOutcome::Paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use audio_engine::buffer::Buffer;
    use audio_engine::elements::{appsrc, fakesink};

    fn controller() -> (FlowController, Arc<SharedRunState>, AppSrc) {
        let pipeline = Pipeline::new("p");
        let src = appsrc::create("src").unwrap();
        let sink = fakesink::create("sink").unwrap();
        pipeline.add_many(&[&src, &sink]).unwrap();
        src.link(&sink).unwrap();
        pipeline.set_state(State::Playing).unwrap();

        let source = AppSrc::from_element(&src).unwrap();
        let run = SharedRunState::new(RunState::Playing);
        let status = PlayStatus::shared();
        let controller = FlowController::new(pipeline, source.clone(), run.clone(), status);
        (controller, run, source)
    }

    #[test]
    fn need_data_pauses_pipeline() {
        let (controller, run, _source) = controller();
        assert_eq!(controller.handle(FlowSignal::NeedData { length: 4096 }), FlowOutcome::Paused);
        assert_eq!(run.get(), RunState::Paused);
        assert_eq!(controller.pipeline.state(), State::Paused);
    }

    #[test]
    fn enough_data_changes_nothing() {
        let (controller, run, _source) = controller();
        assert_eq!(controller.handle(FlowSignal::EnoughData), FlowOutcome::Ignored);
        assert_eq!(run.get(), RunState::Playing);
        assert_eq!(controller.pipeline.state(), State::Playing);
    }

    #[test]
    fn need_data_pauses_even_with_bytes_queued() {
        let pipeline = Pipeline::new("p");
        let src = appsrc::create("src").unwrap();
        pipeline.add(&src).unwrap();
        pipeline.set_state(State::Playing).unwrap();
        let source = AppSrc::from_element(&src).unwrap();

        // Unlinked, so the streaming thread stops after taking the first buffer.
        source.push_buffer(Buffer::from_slice(&[1]));
        let deadline = Instant::now() + Duration::from_secs(5);
        while source.current_level_bytes() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        source.push_buffer(Buffer::from_slice(&[2, 3]));
        assert_eq!(source.current_level_bytes(), 2);

        let run = SharedRunState::new(RunState::Playing);
        let status = PlayStatus::shared();
        let controller = FlowController::new(pipeline.clone(), source.clone(), run.clone(), status.clone());
        assert_eq!(controller.handle(FlowSignal::NeedData { length: 4096 }), FlowOutcome::Paused);
        assert_eq!(run.get(), RunState::Paused);
        assert_eq!(pipeline.state(), State::Paused);
        assert_eq!(status.snapshot().resumes, 0);
    }

    #[test]
    fn repeated_need_data_stays_paused() {
        let (controller, run, _source) = controller();
        assert_eq!(controller.handle(FlowSignal::NeedData { length: 4096 }), FlowOutcome::Paused);
        assert_eq!(controller.handle(FlowSignal::NeedData { length: 4096 }), FlowOutcome::Paused);
        assert_eq!(run.get(), RunState::Paused);
        assert_eq!(controller.status.snapshot().pauses, 1);
    }

    #[test]
    fn run_state_maps_to_pipeline_state() {
        assert_eq!(State::from(RunState::Playing), State::Playing);
        assert_eq!(State::from(RunState::Paused), State::Paused);
        let run = SharedRunState::new(RunState::Playing);
        assert!(run.transition(RunState::Paused));
        assert!(!run.transition(RunState::Paused));
        run.set(RunState::Playing);
        assert_eq!(run.get(), RunState::Playing);
    }
}
