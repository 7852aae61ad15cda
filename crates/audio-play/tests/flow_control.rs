use std::time::{Duration, Instant};

use audio_engine::elements::fakesink::{self, FakeSink};
use audio_engine::{FlowReturn, FlowSignal, Registry, State};
use audio_play::config::{Destination, InputFormat, PlayConfig, RawAudioConfig};
use audio_play::flow::{FlowController, FlowOutcome, RunState, SharedRunState, apply_run_state};
use audio_play::graph;
use audio_play::lifecycle::PlayPipeline;
use audio_play::source::FrameSource;
use audio_play::status::PlayStatus;
use audio_transport_proto::AudioData;

fn registry() -> Registry {
    let mut registry = Registry::with_defaults();
    registry.register(graph::DEVICE_SINK_FACTORY, fakesink::create);
    registry
}

fn raw_config() -> PlayConfig {
    let raw = RawAudioConfig::new(1, 8_000, 16).unwrap();
    PlayConfig::new(Destination::Device, InputFormat::Raw(raw))
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
fn need_data_pauses_and_next_frame_resumes() {
    let graph = graph::build(&raw_config(), &registry()).unwrap();
    let run = SharedRunState::new(RunState::Playing);
    let status = PlayStatus::shared();
    apply_run_state(&graph.pipeline, &run).unwrap();

    let flow = FlowController::new(graph.pipeline.clone(), graph.source.clone(), run.clone(), status.clone());
    let frames = FrameSource::new(graph.pipeline.clone(), graph.source.clone(), run.clone(), status.clone());

    assert_eq!(flow.handle(FlowSignal::NeedData { length: 4096 }), FlowOutcome::Paused);
    assert_eq!(run.get(), RunState::Paused);
    assert_eq!(graph.pipeline.state(), State::Paused);

    assert_eq!(frames.submit(&AudioData::new(vec![0, 1, 2, 3])), FlowReturn::Ok);
    assert_eq!(run.get(), RunState::Playing);
    assert_eq!(graph.pipeline.state(), State::Playing);

    let sink = FakeSink::from_element(&graph.sink).unwrap();
    assert!(wait_for(|| sink.byte_count() == 4));
    let snap = status.snapshot();
    assert_eq!(snap.pauses, 1);
    assert_eq!(snap.resumes, 1);
}

#[test]
fn running_pipeline_pauses_when_source_runs_dry() {
    let player = PlayPipeline::start(&raw_config(), &registry()).unwrap();
    let status = player.status();
    assert!(wait_for(|| status.snapshot().pauses >= 1));

    let source = player.frame_source();
    source.submit(&AudioData::new(vec![0; 64]));
    assert!(status.snapshot().resumes >= 1);

    let sink = FakeSink::from_element(&player.graph().sink).unwrap();
    assert!(wait_for(|| sink.byte_count() == 64));
    assert!(wait_for(|| status.snapshot().need_data >= 2));
}
