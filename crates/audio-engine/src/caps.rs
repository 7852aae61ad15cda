//! Caps: the format description attached to pads and links.
//!
//! A [`Caps`] value is a media type (`audio/x-raw`, `audio/mpeg`, ...) plus an ordered list of
//! typed fields. The text form matches the familiar `media/type, name=(type)value` notation so
//! caps can be logged and parsed back.

use std::fmt;
use std::str::FromStr;

use crate::error::CapsError;

const ANY: &str = "ANY";

/// A single typed caps field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i32),
    Bool(bool),
    Str(String),
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "(int){v}"),
            FieldValue::Bool(v) => write!(f, "(boolean){v}"),
            FieldValue::Str(v) => write!(f, "(string){v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    media_type: String,
    fields: Vec<(String, FieldValue)>,
}

impl Caps {
    /// Caps that accept anything.
    pub fn new_any() -> Self {
        Self::new_empty_simple(ANY)
    }

    pub fn new_empty_simple(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            fields: Vec::new(),
        }
    }

    pub fn builder(media_type: impl Into<String>) -> CapsBuilder {
        CapsBuilder {
            caps: Self::new_empty_simple(media_type),
        }
    }

    pub fn is_any(&self) -> bool {
        self.media_type == ANY
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.get(name)? {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Set a field, replacing an existing value in place.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(field, _)| field == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Whether a stream described by `self` could flow into a pad accepting `other`.
    ///
    /// `ANY` intersects with everything; otherwise media types must match and every field
    /// present on both sides must be equal.
    pub fn can_intersect(&self, other: &Caps) -> bool {
        if self.is_any() || other.is_any() {
            return true;
        }
        if self.media_type != other.media_type {
            return false;
        }
        self.fields
            .iter()
            .all(|(name, value)| other.get(name).map(|v| v == value).unwrap_or(true))
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.media_type)?;
        for (name, value) in &self.fields {
            write!(f, ", {name}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for Caps {
    type Err = CapsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',').map(str::trim);
        let media_type = parts.next().filter(|m| !m.is_empty()).ok_or(CapsError::Empty)?;
        let mut caps = Caps::new_empty_simple(media_type);
        for part in parts {
            if part.is_empty() {
                continue;
            }
            let (name, raw) = part
                .split_once('=')
                .ok_or_else(|| CapsError::MalformedField(part.to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(CapsError::MalformedField(part.to_string()));
            }
            caps.set(name, parse_field_value(raw.trim())?);
        }
        Ok(caps)
    }
}

fn parse_field_value(raw: &str) -> Result<FieldValue, CapsError> {
    if let Some(rest) = raw.strip_prefix('(') {
        let (ty, value) = rest
            .split_once(')')
            .ok_or_else(|| CapsError::MalformedField(raw.to_string()))?;
        let value = value.trim();
        return match ty {
            "int" | "i" => value
                .parse()
                .map(FieldValue::Int)
                .map_err(|_| CapsError::MalformedField(raw.to_string())),
            "boolean" | "bool" | "b" => parse_bool(value)
                .map(FieldValue::Bool)
                .ok_or_else(|| CapsError::MalformedField(raw.to_string())),
            "string" | "s" => Ok(FieldValue::Str(value.to_string())),
            other => Err(CapsError::UnknownType(other.to_string())),
        };
    }

    if let Ok(v) = raw.parse::<i32>() {
        return Ok(FieldValue::Int(v));
    }
    if let Some(v) = parse_bool(raw) {
        return Ok(FieldValue::Bool(v));
    }
    Ok(FieldValue::Str(raw.to_string()))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "true" | "TRUE" | "yes" => Some(true),
        "false" | "FALSE" | "no" => Some(false),
        _ => None,
    }
}

/// Fluent constructor for [`Caps`].
#[derive(Debug, Clone)]
pub struct CapsBuilder {
    caps: Caps,
}

impl CapsBuilder {
    pub fn field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.caps.set(name, value);
        self
    }

    pub fn build(self) -> Caps {
        self.caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_typed_notation() {
        let caps = Caps::builder("audio/x-raw")
            .field("rate", 96_000)
            .field("signed", true)
            .field("format", "S16LE")
            .build();
        assert_eq!(
            caps.to_string(),
            "audio/x-raw, rate=(int)96000, signed=(boolean)true, format=(string)S16LE"
        );
    }

    #[test]
    fn parse_reads_typed_and_untyped_fields() {
        let caps: Caps = "audio/x-raw, rate=(int)44100, channels=2, signed=true, layout=interleaved"
            .parse()
            .unwrap();
        assert_eq!(caps.media_type(), "audio/x-raw");
        assert_eq!(caps.get_int("rate"), Some(44_100));
        assert_eq!(caps.get_int("channels"), Some(2));
        assert_eq!(caps.get_bool("signed"), Some(true));
        assert_eq!(caps.get_str("layout"), Some("interleaved"));
    }

    #[test]
    fn parse_display_is_stable() {
        let text = "audio/x-raw, rate=(int)8000, channels=(int)1";
        let caps: Caps = text.parse().unwrap();
        assert_eq!(caps.to_string(), text);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!("".parse::<Caps>().unwrap_err(), CapsError::Empty);
        assert!(matches!(
            "audio/x-raw, rate".parse::<Caps>(),
            Err(CapsError::MalformedField(_))
        ));
        assert!(matches!(
            "audio/x-raw, rate=(float)1.0".parse::<Caps>(),
            Err(CapsError::UnknownType(_))
        ));
        assert!(matches!(
            "audio/x-raw, rate=(int)fast".parse::<Caps>(),
            Err(CapsError::MalformedField(_))
        ));
    }

    #[test]
    fn set_replaces_existing_field() {
        let mut caps = Caps::builder("audio/x-raw").field("rate", 8000).build();
        caps.set("rate", 16_000);
        assert_eq!(caps.get_int("rate"), Some(16_000));
        assert_eq!(caps.fields().count(), 1);
    }

    #[test]
    fn intersect_rules() {
        let any = Caps::new_any();
        let raw = Caps::builder("audio/x-raw").field("channels", 2).build();
        let raw_mono = Caps::builder("audio/x-raw").field("channels", 1).build();
        let raw_plain = Caps::new_empty_simple("audio/x-raw");
        let video = Caps::new_empty_simple("video/x-raw");

        assert!(any.can_intersect(&video));
        assert!(raw.can_intersect(&any));
        assert!(raw.can_intersect(&raw_plain));
        assert!(raw_plain.can_intersect(&raw));
        assert!(!raw.can_intersect(&raw_mono));
        assert!(!raw.can_intersect(&video));
    }
}
