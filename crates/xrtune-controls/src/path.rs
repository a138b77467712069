#![forbid(unsafe_code)]

//! Dot-joined control paths.
//!
//! Paths are the wire format between the registry and every consumer:
//! `segment("." segment)*`, where the first segment is the registration id
//! of the owning schema. Segments are never empty and never contain `.`.

use std::borrow::Borrow;
use std::fmt;

/// Separator between path segments.
pub const SEPARATOR: char = '.';

/// Fully qualified address of a control or folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlPath(String);

impl ControlPath {
    /// Wrap a dot-joined path string as-is.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Join segments with [`SEPARATOR`].
    #[must_use]
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = String::new();
        for (i, segment) in segments.into_iter().enumerate() {
            if i > 0 {
                out.push(SEPARATOR);
            }
            out.push_str(segment.as_ref());
        }
        Self(out)
    }

    /// Whether `key` can be used as a single segment.
    #[must_use]
    pub fn is_valid_segment(key: &str) -> bool {
        !key.is_empty() && !key.contains(SEPARATOR)
    }

    /// This path extended by one segment.
    #[must_use]
    pub fn child(&self, key: &str) -> Self {
        let mut out = String::with_capacity(self.0.len() + 1 + key.len());
        out.push_str(&self.0);
        out.push(SEPARATOR);
        out.push_str(key);
        Self(out)
    }

    /// The path as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Number of segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// First segment: the registration id.
    #[must_use]
    pub fn root(&self) -> &str {
        self.0.split(SEPARATOR).next().unwrap_or_default()
    }

    /// Last segment.
    #[must_use]
    pub fn key(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or_default()
    }

    /// Everything but the last segment, or `None` for a single-segment path.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rfind(SEPARATOR)
            .map(|idx| Self(self.0[..idx].to_owned()))
    }

    /// Whether `self` equals `prefix` or lies beneath it.
    ///
    /// `ctrl.speed` is within `ctrl`, but `ctrlx.speed` is not.
    #[must_use]
    pub fn is_within(&self, prefix: &str) -> bool {
        match self.0.strip_prefix(prefix) {
            Some("") => true,
            Some(rest) => rest.starts_with(SEPARATOR),
            None => false,
        }
    }

    /// Whether `self` is a direct child of `parent`.
    #[must_use]
    pub fn is_child_of(&self, parent: &str) -> bool {
        self.0
            .strip_prefix(parent)
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
            .is_some_and(|rest| !rest.is_empty() && !rest.contains(SEPARATOR))
    }
}

impl fmt::Display for ControlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ControlPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ControlPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ControlPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ControlPath {
    fn from(value: String) -> Self {
        Self(value)
    }
}
