//! Owns the pipeline: builds it, starts it, and runs the event dispatch thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use audio_engine::{EngineEvent, Pipeline, Registry, State};
use crossbeam_channel::{Receiver, Sender, select};

use crate::config::PlayConfig;
use crate::flow::{FlowController, RunState, SharedRunState, apply_run_state};
use crate::graph::{self, PipelineGraph};
use crate::linker::PadLinker;
use crate::monitor::{BusMonitor, Observed};
use crate::source::FrameSource;
use crate::status::PlayStatus;

pub const DISPATCH_THREAD: &str = "audio-play-events";

pub struct PlayPipeline {
    graph: PipelineGraph,
    run: Arc<SharedRunState>,
    status: Arc<PlayStatus>,
    frames: FrameSource,
    finished: Receiver<()>,
    _dispatch: JoinHandle<()>,
}

impl PlayPipeline {
    /// Build the graph for `config` and bring it to PLAYING.
    pub fn start(config: &PlayConfig, registry: &Registry) -> Result<Self> {
        let graph = graph::build(config, registry).context("build pipeline graph")?;
        let status = PlayStatus::shared();
        let run = SharedRunState::new(RunState::Playing);

        if let Err(e) = apply_run_state(&graph.pipeline, &run) {
            let _ = graph.pipeline.set_state(State::Null);
            return Err(e).context("start pipeline");
        }
        tracing::info!(pipeline = %graph.pipeline.name(), topology = ?graph.topology, "pipeline playing");

        let frames = FrameSource::new(
            graph.pipeline.clone(),
            graph.source.clone(),
            run.clone(),
            status.clone(),
        );
        let (finished_tx, finished) = crossbeam_channel::unbounded();
        let dispatcher = Dispatcher {
            pipeline: graph.pipeline.clone(),
            finished: finished_tx,
            monitor: BusMonitor::new(status.clone()),
            linker: graph
                .audio
                .as_ref()
                .map(|audio| PadLinker::new(audio.sink_pad.clone(), status.clone())),
            flow: FlowController::new(
                graph.pipeline.clone(),
                graph.source.clone(),
                run.clone(),
                status.clone(),
            ),
        };
        let dispatch = thread::Builder::new()
            .name(DISPATCH_THREAD.to_string())
            .spawn(move || dispatcher.run())
            .context("spawn event dispatch thread")?;

        Ok(Self {
            graph,
            run,
            status,
            frames,
            finished,
            _dispatch: dispatch,
        })
    }

    pub fn frame_source(&self) -> FrameSource {
        self.frames.clone()
    }

    pub fn status(&self) -> Arc<PlayStatus> {
        self.status.clone()
    }

    pub fn state(&self) -> RunState {
        self.run.get()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.graph.pipeline
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Wait until end-of-stream or an error was reported on the bus.
    ///
    /// Returns `false` when `timeout` passes first.
    pub fn wait_finished(&self, timeout: Option<Duration>) -> bool {
        if self.status.eos_seen() || self.status.errors() > 0 {
            return true;
        }
        match timeout {
            Some(timeout) => self.finished.recv_timeout(timeout).is_ok(),
            None => self.finished.recv().is_ok(),
        }
    }
}

struct Dispatcher {
    pipeline: Pipeline,
    finished: Sender<()>,
    monitor: BusMonitor,
    linker: Option<PadLinker>,
    flow: FlowController,
}

impl Dispatcher {
    fn run(self) {
        let bus = self.pipeline.bus().receiver().clone();
        let events = self.pipeline.events().clone();
        loop {
            select! {
                recv(bus) -> msg => match msg {
                    Ok(msg) => {
                        if matches!(self.monitor.handle(&msg), Observed::Error | Observed::Eos) {
                            let _ = self.finished.send(());
                        }
                    }
                    Err(_) => break,
                },
                recv(events) -> event => match event {
                    Ok(event) => self.dispatch(event),
                    Err(_) => break,
                },
            }
        }
        tracing::debug!("event dispatch stopped");
    }

    fn dispatch(&self, event: EngineEvent) {
        match event {
            EngineEvent::PadDiscovered { element, pad, caps } => match &self.linker {
                Some(linker) => {
                    let outcome = linker.on_pad_added(&pad, caps.as_ref());
                    tracing::debug!(%element, pad = %pad.name(), ?outcome, "pad discovered");
                }
                None => tracing::debug!(%element, pad = %pad.name(), "pad discovered; no audio sub-graph"),
            },
            EngineEvent::NoMorePads { element } => {
                tracing::debug!(%element, "no more pads");
            }
            EngineEvent::Flow { element, signal } => {
                let outcome = self.flow.handle(signal);
                tracing::trace!(%element, ?signal, ?outcome, "flow signal handled");
            }
        }
    }
}
