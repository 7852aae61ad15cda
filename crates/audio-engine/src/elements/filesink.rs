//! `filesink`: writes every buffer verbatim to a file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::buffer::Buffer;
use crate::bus::MessageView;
use crate::element::{Element, ElementImpl, PropertyValue, invalid_property};
use crate::error::{EngineError, StateChangeError};
use crate::event::StreamEvent;
use crate::pad::{FlowReturn, Pad, PadDirection};
use crate::state::{State, StateChange};

pub const FACTORY: &str = "filesink";

#[derive(Default)]
struct Settings {
    location: Option<PathBuf>,
    append: bool,
}

#[derive(Default)]
pub struct FileSinkImpl {
    settings: Mutex<Settings>,
    file: Mutex<Option<File>>,
}

impl FileSinkImpl {
    fn open(&self, element: &Element, transition: StateChange) -> Result<(), StateChangeError> {
        let settings = self.settings.lock().unwrap();
        let Some(path) = settings.location.clone() else {
            return Err(StateChangeError::new(
                element,
                transition,
                "No file name specified for writing.",
            ));
        };
        let mut options = OpenOptions::new();
        options.create(true);
        if settings.append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options.open(&path).map_err(|e| {
            StateChangeError::new(
                element,
                transition,
                format!("Could not open file \"{}\" for writing: {e}", path.display()),
            )
        })?;
        tracing::debug!(element = %element.name(), path = %path.display(), "file opened");
        *self.file.lock().unwrap() = Some(file);
        Ok(())
    }
}

impl ElementImpl for FileSinkImpl {
    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowReturn {
        let mut file = self.file.lock().unwrap();
        let Some(file) = file.as_mut() else {
            return FlowReturn::Flushing;
        };
        match file.write_all(buffer.as_slice()) {
            Ok(()) => FlowReturn::Ok,
            Err(e) => {
                element.post_error("Error while writing to file.", Some(e.to_string()));
                FlowReturn::Error
            }
        }
    }

    fn sink_event(&self, element: &Element, _pad: &Pad, event: StreamEvent) -> bool {
        if event == StreamEvent::Eos {
            if let Some(file) = self.file.lock().unwrap().as_mut() {
                if let Err(e) = file.flush() {
                    element.post_error("Error while writing to file.", Some(e.to_string()));
                    return false;
                }
            }
            element.post_message(MessageView::Eos);
        }
        true
    }

    fn change_state(&self, element: &Element, transition: StateChange) -> Result<(), StateChangeError> {
        match transition {
            StateChange::NULL_TO_READY => self.open(element, transition),
            StateChange::READY_TO_NULL => {
                if let Some(mut file) = self.file.lock().unwrap().take() {
                    let _ = file.flush();
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn set_property(&self, element: &Element, name: &str, value: PropertyValue) -> Result<(), EngineError> {
        let mut s = self.settings.lock().unwrap();
        match name {
            "location" => {
                if element.current_state() != State::Null {
                    return Err(invalid_property(element, name, "can only be changed in NULL"));
                }
                let path = value
                    .as_str()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| invalid_property(element, name, "expected a file path"))?;
                s.location = Some(PathBuf::from(path));
            }
            "append" => {
                s.append = value
                    .as_bool()
                    .ok_or_else(|| invalid_property(element, name, "expected a boolean"))?;
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
            "location" => s
                .location
                .as_ref()
                .map(|p| PropertyValue::Str(p.display().to_string())),
            "append" => Some(PropertyValue::Bool(s.append)),
            _ => None,
        }
    }
}

pub fn create(name: &str) -> Result<Element, EngineError> {
    let element = Element::new(name, FACTORY, FileSinkImpl::default());
    element.add_pad(Pad::new("sink", PadDirection::Sink))?;
    Ok(element)
}
