//! Canonical hierarchical paths.
//!
//! Every folder and document in a workspace is addressed by a [`KbPath`]: an ordered sequence
//! of non-empty, allow-listed segments. Paths are values. The hierarchy is never stored as
//! parent/child pointers; it is recomputed from prefix relationships between paths whenever a
//! caller needs it.
//!
//! Raw strings coming from callers go through [`normalize`] (or [`KbPath::from_str`]):
//!
//! * leading and trailing separators are stripped and repeated separators collapsed,
//! * `.` and `..` segments are rejected rather than resolved,
//! * segments may only contain ASCII letters and digits, space and `_ - . ( ) & , ' + #`,
//!   may not start or end with a space and may not exceed [`MAX_SEGMENT_LEN`] bytes.
//!
//! Everything in this module is pure and deterministic.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const SEPARATOR: char = '/';
pub const MAX_SEGMENT_LEN: usize = 255;

static SAFE_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9 _\-.()&,'+#]+$").expect("segment allow-list pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path contains a blank segment")]
    BlankSegment,

    #[error("relative segment '{0}' is not allowed")]
    RelativeSegment(String),

    #[error("segment '{0}' contains characters outside the allowed set")]
    UnsafeCharacters(String),

    #[error("segment '{0}' has leading or trailing whitespace")]
    PaddedSegment(String),

    #[error("segment is {0} bytes long (limit: {MAX_SEGMENT_LEN})")]
    SegmentTooLong(usize),
}

/// A canonical, slash-separated path inside a workspace.
///
/// Two paths are equal iff their segment sequences are equal. Ordering compares segment by
/// segment, which keeps every descendant of a folder contiguous when sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KbPath {
    segments: Vec<String>,
}

impl KbPath {
    /// The workspace root. It has no segments and is never produced by [`normalize`].
    pub fn root() -> Self {
        KbPath { segments: Vec::new() }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Returns the last segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Returns the parent path. The parent of a top-level entry is the root; the root itself
    /// has no parent.
    pub fn parent(&self) -> Option<KbPath> {
        if self.is_root() {
            return None;
        }
        Some(KbPath { segments: self.segments[..self.segments.len() - 1].to_vec() })
    }

    /// Returns all proper ancestors from the top-level segment down to the parent, excluding
    /// the root.
    pub fn ancestors(&self) -> impl Iterator<Item = KbPath> + '_ {
        (1..self.segments.len()).map(|len| KbPath { segments: self.segments[..len].to_vec() })
    }

    /// Appends `name` (which may itself contain separators) to this path.
    pub fn join(&self, name: &str) -> Result<KbPath, PathError> {
        let tail = normalize(name)?;
        let mut segments = self.segments.clone();
        segments.extend(tail.segments);
        Ok(KbPath { segments })
    }

    /// True iff `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &KbPath) -> bool {
        other.segments.len() > self.segments.len() && other.segments.starts_with(&self.segments)
    }

    /// True iff `self` equals `prefix` or lies below it.
    pub fn starts_with(&self, prefix: &KbPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Substitutes the leading `from` prefix with `to`.
    ///
    /// Returns `None` when `self` does not start with `from`.
    pub fn rebase(&self, from: &KbPath, to: &KbPath) -> Option<KbPath> {
        let rest = self.segments.strip_prefix(from.segments.as_slice())?;
        let mut segments = to.segments.clone();
        segments.extend(rest.iter().cloned());
        Some(KbPath { segments })
    }
}

/// Normalizes a raw, caller-supplied path string.
pub fn normalize(raw: &str) -> Result<KbPath, PathError> {
    let mut segments = Vec::new();
    for segment in raw.split(SEPARATOR).filter(|s| !s.is_empty()) {
        validate_segment(segment)?;
        segments.push(segment.to_string());
    }
    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(KbPath { segments })
}

/// True iff `b` lies strictly below `a`.
pub fn is_ancestor(a: &KbPath, b: &KbPath) -> bool {
    a.is_ancestor_of(b)
}

pub fn join(parent: &KbPath, name: &str) -> Result<KbPath, PathError> {
    parent.join(name)
}

fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.trim().is_empty() {
        return Err(PathError::BlankSegment);
    }
    if segment == "." || segment == ".." {
        return Err(PathError::RelativeSegment(segment.to_string()));
    }
    if segment.len() > MAX_SEGMENT_LEN {
        return Err(PathError::SegmentTooLong(segment.len()));
    }
    if segment.trim() != segment {
        return Err(PathError::PaddedSegment(segment.to_string()));
    }
    if !SAFE_SEGMENT.is_match(segment) {
        return Err(PathError::UnsafeCharacters(segment.to_string()));
    }
    Ok(())
}

impl fmt::Display for KbPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl FromStr for KbPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize(s)
    }
}

impl Serialize for KbPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KbPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(KbPath::root());
        }
        normalize(&raw).map_err(serde::de::Error::custom)
    }
}
