//! Engine error types.

use thiserror::Error;

use crate::element::Element;
use crate::state::{State, StateChange};

/// Errors raised while building or configuring a pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no element factory named `{0}`")]
    NoSuchFactory(String),

    #[error("failed to create element `{name}` from factory `{factory}`: {reason}")]
    ElementCreation {
        factory: String,
        name: String,
        reason: String,
    },

    #[error("element `{element}` has no property `{property}`")]
    UnknownProperty { element: String, property: String },

    #[error("invalid value for property `{property}` of `{element}`: {reason}")]
    InvalidProperty {
        element: String,
        property: String,
        reason: String,
    },

    #[error("element `{element}` already has a pad named `{pad}`")]
    DuplicatePad { element: String, pad: String },

    #[error("bin `{bin}` already contains an element named `{element}`")]
    DuplicateElement { bin: String, element: String },

    #[error("element `{0}` already has a parent")]
    AlreadyParented(String),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    StateChange(#[from] StateChangeError),

    #[error(transparent)]
    Caps(#[from] CapsError),
}

/// Reasons a pad link is refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("pad `{0}` is already linked")]
    WasLinked(String),

    #[error("cannot link `{src}` to `{sink}`: wrong pad directions")]
    WrongDirection { src: String, sink: String },

    #[error("caps of `{src}` and `{sink}` do not intersect")]
    NoFormat { src: String, sink: String },

    #[error("element `{0}` has no free pad to link")]
    NoPad(String),
}

/// A failed state transition of a single element.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("state change of `{element}` from {from} to {to} failed: {reason}")]
pub struct StateChangeError {
    pub element: String,
    pub from: State,
    pub to: State,
    pub reason: String,
}

impl StateChangeError {
    pub fn new(element: &Element, transition: StateChange, reason: impl Into<String>) -> Self {
        Self {
            element: element.name().to_string(),
            from: transition.current,
            to: transition.next,
            reason: reason.into(),
        }
    }
}

/// Caps parsing and raw audio negotiation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapsError {
    #[error("caps string is empty")]
    Empty,

    #[error("malformed caps field `{0}`")]
    MalformedField(String),

    #[error("unknown caps field type `{0}`")]
    UnknownType(String),

    #[error("expected `audio/x-raw` caps, got `{0}`")]
    NotRawAudio(String),

    #[error("raw audio caps are missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for caps field `{0}`")]
    InvalidField(&'static str),

    #[error("unsupported raw audio format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
