//! Element factories by name.

use std::collections::HashMap;

use crate::element::Element;
use crate::elements::{appsrc, audioconvert, autoaudiosink, decodebin, fakesink, filesink};
use crate::error::EngineError;

/// Constructor for one element factory. Receives the instance name.
pub type ElementFactory = fn(&str) -> Result<Element, EngineError>;

/// Maps factory names to constructors.
///
/// Callers build elements by name so a graph description never depends on concrete element
/// types, and tests can swap a factory out for one that fails or discards its input.
#[derive(Clone, Default)]
pub struct Registry {
    factories: HashMap<String, ElementFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in element.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(appsrc::FACTORY, appsrc::create);
        registry.register(decodebin::FACTORY, decodebin::create);
        registry.register(audioconvert::FACTORY, audioconvert::create);
        registry.register(autoaudiosink::FACTORY, autoaudiosink::create);
        registry.register(filesink::FACTORY, filesink::create);
        registry.register(fakesink::FACTORY, fakesink::create);
        registry
    }

    /// Add or replace a factory. Returns the one it replaced.
    pub fn register(&mut self, name: impl Into<String>, factory: ElementFactory) -> Option<ElementFactory> {
        self.factories.insert(name.into(), factory)
    }

    pub fn unregister(&mut self, name: &str) -> Option<ElementFactory> {
        self.factories.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Create an element named `name` from `factory`.
    pub fn make(&self, factory: &str, name: &str) -> Result<Element, EngineError> {
        let ctor = self
            .factories
            .get(factory)
            .ok_or_else(|| EngineError::NoSuchFactory(factory.to_string()))?;
        ctor(name).map_err(|e| match e {
            EngineError::ElementCreation { .. } => e,
            other => EngineError::ElementCreation {
                factory: factory.to_string(),
                name: name.to_string(),
                reason: other.to_string(),
            },
        })
    }

    pub fn factory_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("factories", &self.factory_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broken(name: &str) -> Result<Element, EngineError> {
        Err(EngineError::DuplicatePad {
            element: name.to_string(),
            pad: "sink".into(),
        })
    }

    #[test]
    fn defaults_cover_builtin_elements() {
        let registry = Registry::with_defaults();
        assert_eq!(
            registry.factory_names(),
            vec!["appsrc", "audioconvert", "autoaudiosink", "decodebin", "fakesink", "filesink"]
        );
        let element = registry.make("fakesink", "out").unwrap();
        assert_eq!(element.name(), "out");
        assert_eq!(element.factory_name(), "fakesink");
    }

    #[test]
    fn unknown_factory_is_reported() {
        let registry = Registry::new();
        let err = registry.make("alsasink", "out").unwrap_err();
        assert!(matches!(err, EngineError::NoSuchFactory(ref f) if f == "alsasink"));
    }

    #[test]
    fn constructor_errors_name_the_factory() {
        let mut registry = Registry::with_defaults();
        assert!(registry.register("filesink", broken).is_some());
        let err = registry.make("filesink", "out").unwrap_err();
        match err {
            EngineError::ElementCreation { factory, name, .. } => {
                assert_eq!(factory, "filesink");
                assert_eq!(name, "out");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unregister_removes_factory() {
        let mut registry = Registry::with_defaults();
        assert!(registry.unregister("decodebin").is_some());
        assert!(!registry.contains("decodebin"));
        assert!(registry.make("decodebin", "d").is_err());
    }
}
