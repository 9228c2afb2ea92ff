//! Values, provenance records, and the keys used to address them
//!
//! Candidate and resolved values are plain [`serde_json::Value`]s. Every value
//! travels with a [`Provenance`] whose shape mirrors the value: a scalar has a
//! single origin, a list has a list of provenances, a mapping has a mapping.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;
use std::path::PathBuf;

/// Where a single value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// A location in Rust source, e.g. where a default was declared
    Source { file: &'static str, line: u32 },
    /// A key in an in-memory config
    Config { source: String, key: String },
    /// An environment variable
    Env { var: String, value: String },
    /// A key in a config file
    File { path: PathBuf, key: String },
    /// Free-form description supplied by a custom finder or getter
    Custom { description: String },
}

impl Origin {
    /// The source location of the caller of the enclosing `#[track_caller]` fn
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self::Source {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source { file, line } => write!(f, "{}:{}", file, line),
            Self::Config { source, key } => write!(f, "{} (key '{}')", source, key),
            Self::Env { var, .. } => write!(f, "environment variable ${}", var),
            Self::File { path, key } => write!(f, "{} (key '{}')", path.display(), key),
            Self::Custom { description } => f.write_str(description),
        }
    }
}

/// Description of where a (possibly composite) value originated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Provenance {
    /// Nothing is known about the origin
    #[default]
    None,
    Origin(Origin),
    List(Vec<Provenance>),
    Map(BTreeMap<String, Provenance>),
}

impl Provenance {
    /// Origin-less provenance with the same shape as `value`
    pub fn skeleton(value: &Value) -> Self {
        match value {
            Value::Array(items) => Self::List(items.iter().map(Self::skeleton).collect()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::skeleton(v)))
                    .collect(),
            ),
            _ => Self::None,
        }
    }

    /// The origin of a scalar provenance
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            Self::Origin(origin) => Some(origin),
            _ => None,
        }
    }

    /// Provenance of one list element
    pub fn index(&self, index: usize) -> Option<&Provenance> {
        match self {
            Self::List(items) => items.get(index),
            _ => None,
        }
    }

    /// Provenance of one mapping entry
    pub fn key(&self, key: &str) -> Option<&Provenance> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }
}

impl From<Origin> for Provenance {
    fn from(origin: Origin) -> Self {
        Self::Origin(origin)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("<unknown>"),
            Self::Origin(origin) => write!(f, "{}", origin),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, item)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// One step of a path into a collection
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Index(usize),
    Key(String),
}

/// Storage location of an attribute on its app
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKey {
    /// A named field on a struct-like app
    Name(String),
    /// An item nested inside a collection
    Path(Vec<Segment>),
}

impl FieldKey {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// The field name, if this key addresses a named field
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Path(_) => None,
        }
    }
}

impl From<&str> for FieldKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Path(segments) => {
                for segment in segments {
                    match segment {
                        Segment::Index(i) => write!(f, "[{}]", i)?,
                        Segment::Key(k) => write!(f, "[{:?}]", k)?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Key used to look a value up in a finder.
///
/// A single-segment path is a plain key; longer paths descend into nested
/// mappings, and numeric segments index into lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    /// A path of several nested keys
    pub fn nested<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Split a dotted key like `server.port` into segments
    pub fn dotted(key: &str) -> Self {
        Self::nested(key.split('.'))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Follow this path into `value`
    pub fn lookup<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        let mut current = value;
        for segment in &self.0 {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl From<&str> for KeyPath {
    fn from(key: &str) -> Self {
        Self(vec![key.to_string()])
    }
}

impl From<String> for KeyPath {
    fn from(key: String) -> Self {
        Self(vec![key])
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}
