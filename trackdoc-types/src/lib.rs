//! Shared types for trackdoc
//!
//! This crate provides the vocabulary shared by the tracking engine and the
//! save protocol: path segments, dot-joined field paths and save outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step from a node to one of its children
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    /// Named field of a structured record
    Field(String),

    /// Position inside an ordered sequence
    Index(usize),

    /// Key inside a map, rendered as a string
    Key(String),

    /// Member of a set; set members are not addressable on their own
    Member,
}

impl Segment {
    pub fn field(name: impl Into<String>) -> Self {
        Segment::Field(name.into())
    }

    pub fn key(key: impl Into<String>) -> Self {
        Segment::Key(key.into())
    }

    /// Returns true if this segment contributes a path component
    pub fn is_addressable(&self) -> bool {
        !matches!(self, Segment::Member)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) | Segment::Key(name) => f.write_str(name),
            Segment::Index(i) => write!(f, "{}", i),
            Segment::Member => Ok(()),
        }
    }
}

/// Dot-joined field path, e.g. `map.k.level`
///
/// Prefix relations are evaluated on whole segments, so `a.b` is an
/// ancestor of `a.b.c` but not of `a.bc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DotPath(String);

impl DotPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Build a path from segments, skipping set members
    pub fn from_segments<'a, I>(segments: I) -> Self
    where
        I: IntoIterator<Item = &'a Segment>,
    {
        let mut path = DotPath::default();
        for segment in segments {
            if segment.is_addressable() {
                path = path.child(segment);
            }
        }
        path
    }

    /// Append one component
    pub fn child(&self, segment: impl fmt::Display) -> Self {
        if self.0.is_empty() {
            DotPath(segment.to_string())
        } else {
            DotPath(format!("{}.{}", self.0, segment))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|s| !s.is_empty())
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// The path one level up, `None` for single-segment and empty paths
    pub fn parent(&self) -> Option<DotPath> {
        self.0.rfind('.').map(|at| DotPath(self.0[..at].to_string()))
    }

    /// Strict ancestor test on segment boundaries
    pub fn is_ancestor_of(&self, other: &DotPath) -> bool {
        !self.0.is_empty()
            && other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'.'
    }

    /// Ancestor-or-equal test
    pub fn covers(&self, other: &DotPath) -> bool {
        self == other || self.is_ancestor_of(other)
    }
}

impl fmt::Display for DotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DotPath {
    fn from(path: &str) -> Self {
        DotPath(path.to_string())
    }
}

impl From<String> for DotPath {
    fn from(path: String) -> Self {
        DotPath(path)
    }
}

impl AsRef<str> for DotPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How a save treats the document's identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// Insert when the identity is unknown, update otherwise
    #[default]
    InsertOrUpdate,

    /// Insert only; an existing identity is a failure
    InsertOnly,

    /// Update only; a missing identity is reported, not inserted
    UpdateOnly,
}

/// Outcome of a successful save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SaveResult {
    pub inserted: bool,
    pub updated: bool,
}

impl SaveResult {
    pub fn inserted() -> Self {
        Self {
            inserted: true,
            updated: false,
        }
    }

    pub fn updated() -> Self {
        Self {
            inserted: false,
            updated: true,
        }
    }

    pub fn noop() -> Self {
        Self::default()
    }

    pub fn is_inserted(&self) -> bool {
        self.inserted
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Neither an insert nor an update happened
    pub fn is_noop(&self) -> bool {
        !self.inserted && !self.updated
    }
}
