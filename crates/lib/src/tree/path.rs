//! Slash-separated document paths.
//!
//! A [`Path`] is an ordered list of segments; the empty list is the root of the
//! store. Paths map one-to-one onto physical keys by joining segments with `/`,
//! so a subtree is always a contiguous key range.
//!
//! ```rust
//! use canopy::Path;
//!
//! let path = Path::parse("fruits/banana/color");
//! assert_eq!(path.len(), 3);
//! assert_eq!(path.join(), "fruits/banana/color");
//! assert_eq!(path.parent(), Some(Path::parse("fruits/banana")));
//!
//! // Empty segments are dropped while parsing
//! assert_eq!(Path::parse("/fruits//banana/"), Path::parse("fruits/banana"));
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::errors::TreeError;
use crate::constants::{DELETED, MAP, REDUCE, RESERVED_SIGILS, REV, SCAN_SENTINEL, SEPARATOR, VALUE};

/// An owned document path.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a slash-joined string. Empty segments are dropped.
    pub fn parse(input: &str) -> Self {
        Self {
            segments: input
                .split(SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Join the segments back into the physical key form.
    ///
    /// The root joins to the empty string.
    pub fn join(&self) -> String {
        self.segments.join("/")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The final segment, or `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Return a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Return a new path with every segment of `other` appended.
    pub fn concat(&self, other: &Path) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// `self` extended by already-split relative segments.
    pub(crate) fn descendant(&self, rel: &[String]) -> Self {
        let mut segments = self.segments.clone();
        segments.extend_from_slice(rel);
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// All strict ancestors, root first.
    pub fn ancestors(&self) -> Vec<Self> {
        (0..self.segments.len())
            .map(|i| Self {
                segments: self.segments[..i].to_vec(),
            })
            .collect()
    }

    pub fn starts_with(&self, base: &Path) -> bool {
        self.segments.starts_with(&base.segments)
    }

    /// The suffix of `self` below `base`, or `None` when `base` is not a prefix.
    ///
    /// ```rust
    /// use canopy::Path;
    ///
    /// let doc = Path::parse("sub1/1/ok");
    /// assert_eq!(doc.relative_to(&Path::parse("sub1")), Some(Path::parse("1/ok")));
    /// assert_eq!(doc.relative_to(&Path::parse("sub2")), None);
    /// ```
    pub fn relative_to(&self, base: &Path) -> Option<Self> {
        self.segments
            .strip_prefix(base.segments.as_slice())
            .map(|rest| Self {
                segments: rest.to_vec(),
            })
    }

    /// Physical key of this node's own leaf value.
    pub fn key(&self) -> Vec<u8> {
        self.join().into_bytes()
    }

    /// Physical key of a reserved suffix of this node (`_rev`, `@map`, ...).
    pub fn meta_key(&self, suffix: &str) -> Vec<u8> {
        self.child(suffix).key()
    }

    /// Prefix shared by every descendant key (and this node's metadata).
    pub(crate) fn scan_prefix(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!("{}{SEPARATOR}", self.join())
        }
    }

    /// Key range `[own key, prefix + sentinel)` covering the whole subtree.
    ///
    /// The range may include keys of siblings sharing a textual prefix
    /// (`fruits` vs `fruits-old`); callers filter with [`Path::relative_key`].
    pub(crate) fn subtree_range(&self) -> (Vec<u8>, Vec<u8>) {
        let mut end = self.scan_prefix().into_bytes();
        end.push(SCAN_SENTINEL);
        (self.key(), end)
    }

    /// Split a scanned physical key into segments relative to this path.
    ///
    /// Returns `None` for keys outside the subtree.
    pub(crate) fn relative_key(&self, key: &str) -> Option<Vec<String>> {
        if self.is_root() {
            return Some(Self::parse(key).segments);
        }
        let own = self.join();
        if key == own {
            return Some(Vec::new());
        }
        key.strip_prefix(&own)
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
            .map(|rest| Self::parse(rest).segments)
    }

    /// Reject paths that cannot hold user data.
    ///
    /// Every segment must be non-empty, free of `/` and not begin with a
    /// reserved sigil.
    pub fn validate_writable(&self) -> Result<(), TreeError> {
        for segment in &self.segments {
            validate_segment(segment).map_err(|reason| TreeError::InvalidSegment {
                path: self.join(),
                segment: segment.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    /// Reject paths that address metadata keys directly.
    ///
    /// Reading inside `@map` and `!reduce` is allowed, reading `_rev`, `_del`
    /// or `_val` as a node is not.
    pub fn validate_readable(&self) -> Result<(), TreeError> {
        for segment in &self.segments {
            if segment == REV || segment == DELETED || segment == VALUE {
                return Err(TreeError::InvalidSegment {
                    path: self.join(),
                    segment: segment.clone(),
                    reason: "metadata keys cannot be read as nodes".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Whether the final segment names a script (`@map` or `!reduce`).
    pub(crate) fn is_script_key(&self) -> bool {
        matches!(self.last(), Some(MAP) | Some(REDUCE))
    }
}

/// Check one segment for use in a document path.
pub(crate) fn validate_segment(segment: &str) -> Result<(), String> {
    if segment.is_empty() {
        return Err("empty segment".to_string());
    }
    if segment.contains(SEPARATOR) {
        return Err(format!("segment contains '{SEPARATOR}'"));
    }
    if segment.starts_with(RESERVED_SIGILS) {
        return Err("segment starts with a reserved character".to_string());
    }
    Ok(())
}

/// Whether `segment` is reserved for metadata or derived data.
pub fn is_reserved(segment: &str) -> bool {
    segment.starts_with(RESERVED_SIGILS)
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "{SEPARATOR}")
        } else {
            write!(f, "{}", self.join())
        }
    }
}

impl FromStr for Path {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.join()
    }
}

impl From<&Path> for Path {
    fn from(path: &Path) -> Self {
        path.clone()
    }
}
