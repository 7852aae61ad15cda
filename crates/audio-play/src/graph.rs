//! Builds the processing graph for a [`PlayConfig`].

use audio_engine::error::{EngineError, LinkError};
use audio_engine::{AppSrc, Bin, Element, Pad, Pipeline, Registry, StreamType};
use thiserror::Error;

use crate::config::{Destination, InputFormat, OutputTuning, PlayConfig};

pub const PIPELINE_NAME: &str = "app_pipeline";
pub const SOURCE_NAME: &str = "app_source";
pub const DECODER_NAME: &str = "decoder";
pub const AUDIO_BIN_NAME: &str = "audiobin";
pub const CONVERT_NAME: &str = "convert";
pub const SINK_NAME: &str = "sink";

pub const SOURCE_FACTORY: &str = "appsrc";
pub const DECODER_FACTORY: &str = "decodebin";
pub const CONVERT_FACTORY: &str = "audioconvert";
pub const DEVICE_SINK_FACTORY: &str = "autoaudiosink";
pub const FILE_SINK_FACTORY: &str = "filesink";

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("cannot create {stage} stage from `{factory}`")]
    Create {
        stage: &'static str,
        factory: String,
        #[source]
        source: EngineError,
    },

    #[error("`{factory}` did not produce an application source")]
    NotAppSrc { factory: String },

    #[error("cannot configure {stage} stage")]
    Configure {
        stage: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("cannot link {from} to {to}")]
    Link {
        from: &'static str,
        to: &'static str,
        #[source]
        source: LinkError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    RawToDevice,
    EncodedToDevice,
    ToFile,
}

/// `audioconvert ! autoaudiosink` behind a ghost `sink` pad.
#[derive(Debug, Clone)]
pub struct AudioSubgraph {
    pub bin: Bin,
    pub sink_pad: Pad,
}

#[derive(Debug, Clone)]
pub struct PipelineGraph {
    pub pipeline: Pipeline,
    pub source: AppSrc,
    pub topology: Topology,
    pub decoder: Option<Element>,
    pub audio: Option<AudioSubgraph>,
    pub sink: Element,
}

pub fn build(config: &PlayConfig, registry: &Registry) -> Result<PipelineGraph, GraphError> {
    let pipeline = Pipeline::new(PIPELINE_NAME);
    let source_element = make(registry, "source", SOURCE_FACTORY, SOURCE_NAME)?;
    let source = AppSrc::from_element(&source_element).ok_or_else(|| GraphError::NotAppSrc {
        factory: SOURCE_FACTORY.to_string(),
    })?;
    add(&pipeline, "source", &source_element)?;

    let graph = match (&config.destination, &config.format) {
        (Destination::File(path), _) => {
            let sink = make(registry, "file sink", FILE_SINK_FACTORY, SINK_NAME)?;
            sink.set_property("location", path.display().to_string())
                .map_err(|source| GraphError::Configure {
                    stage: "file sink",
                    source,
                })?;
            add(&pipeline, "file sink", &sink)?;
            link(&source_element, "source", &sink, "file sink")?;
            tracing::info!(path = %path.display(), "graph: source -> file");
            PipelineGraph {
                pipeline,
                source,
                topology: Topology::ToFile,
                decoder: None,
                audio: None,
                sink,
            }
        }
        (Destination::Device, InputFormat::Raw(raw)) => {
            source.set_stream_type(StreamType::Stream);
            source.set_caps(Some(raw.caps()));
            let sink = make(registry, "device sink", DEVICE_SINK_FACTORY, SINK_NAME)?;
            configure_output(&sink, config.device.as_deref(), &config.output)?;
            add(&pipeline, "device sink", &sink)?;
            link(&source_element, "source", &sink, "device sink")?;
            tracing::info!(
                channels = raw.channels,
                rate_hz = raw.sample_rate,
                depth = raw.depth,
                "graph: raw source -> device"
            );
            PipelineGraph {
                pipeline,
                source,
                topology: Topology::RawToDevice,
                decoder: None,
                audio: None,
                sink,
            }
        }
        (Destination::Device, InputFormat::Encoded) => {
            let decoder = make(registry, "decoder", DECODER_FACTORY, DECODER_NAME)?;
            add(&pipeline, "decoder", &decoder)?;
            link(&source_element, "source", &decoder, "decoder")?;

            let bin = Bin::new(AUDIO_BIN_NAME);
            let convert = make(registry, "converter", CONVERT_FACTORY, CONVERT_NAME)?;
            let sink = make(registry, "device sink", DEVICE_SINK_FACTORY, SINK_NAME)?;
            configure_output(&sink, config.device.as_deref(), &config.output)?;
            bin.add_many(&[&convert, &sink])
                .map_err(|source| GraphError::Configure {
                    stage: "audio bin",
                    source,
                })?;
            link(&convert, "converter", &sink, "device sink")?;
            let target = convert.static_pad("sink").ok_or(GraphError::Link {
                from: "audio bin",
                to: "converter",
                source: LinkError::NoPad(CONVERT_NAME.to_string()),
            })?;
            let sink_pad = bin
                .add_ghost_pad("sink", &target)
                .map_err(|source| GraphError::Configure {
                    stage: "audio bin",
                    source,
                })?;
            add(&pipeline, "audio bin", bin.element())?;
            tracing::info!("graph: source -> decoder ... audio bin (linked on first audio pad)");
            PipelineGraph {
                pipeline,
                source,
                topology: Topology::EncodedToDevice,
                decoder: Some(decoder),
                audio: Some(AudioSubgraph { bin, sink_pad }),
                sink,
            }
        }
    };
    Ok(graph)
}

fn make(registry: &Registry, stage: &'static str, factory: &str, name: &str) -> Result<Element, GraphError> {
    registry.make(factory, name).map_err(|source| GraphError::Create {
        stage,
        factory: factory.to_string(),
        source,
    })
}

fn add(pipeline: &Pipeline, stage: &'static str, element: &Element) -> Result<(), GraphError> {
    pipeline
        .add(element)
        .map_err(|source| GraphError::Configure { stage, source })
}

fn link(
    from: &Element,
    from_stage: &'static str,
    to: &Element,
    to_stage: &'static str,
) -> Result<(), GraphError> {
    from.link(to).map_err(|source| GraphError::Link {
        from: from_stage,
        to: to_stage,
        source,
    })
}

fn configure_output(sink: &Element, device: Option<&str>, output: &OutputTuning) -> Result<(), GraphError> {
    let configure = |name: &str, value: audio_engine::PropertyValue| {
        sink.set_property(name, value)
            .map_err(|source| GraphError::Configure {
                stage: "device sink",
                source,
            })
    };
    // Substitute sinks (tests register `fakesink` under the device factory) may not know these.
    if sink.factory_name() != DEVICE_SINK_FACTORY {
        return Ok(());
    }
    if let Some(device) = device {
        configure("device", device.into())?;
    }
    configure("buffer-seconds", output.buffer_seconds.into())?;
    configure("chunk-frames", output.chunk_frames.into())?;
    configure("refill-max-frames", output.refill_max_frames.into())?;
    Ok(())
}
