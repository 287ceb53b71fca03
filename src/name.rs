//! Hierarchical request names and the sequencer that generates them.
use std::{fmt, str::FromStr, sync::Arc};

use serde::{Serialize, Serializer};

/// Component separator used in names.
pub const SEPARATOR: char = '/';

/// A hierarchical name such as `/ndn/external/test/42`.
///
/// Names are cheap to clone and compare. They always start with `/`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Arc<str>);

impl Name {
    /// Create a name, prepending the root separator when it is missing.
    pub fn new(s: impl AsRef<str>) -> Self {
        let s = s.as_ref().trim();
        if s.starts_with(SEPARATOR) {
            Self(s.into())
        } else {
            Self(format!("{SEPARATOR}{s}").into())
        }
    }

    /// The root name `/`.
    pub fn root() -> Self {
        Self::new("/")
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns this name with exactly one trailing separator, ready to have
    /// a sequence number appended.
    pub fn as_prefix(&self) -> Name {
        if self.0.ends_with(SEPARATOR) {
            self.clone()
        } else {
            Self(format!("{}{SEPARATOR}", self.0).into())
        }
    }

    /// Returns true if `prefix` is a component-wise prefix of this name.
    ///
    /// `/a/b` is a prefix of `/a/b` and `/a/b/1`, but not of `/a/bc`.
    pub fn has_prefix(&self, prefix: &Name) -> bool {
        let p = prefix.0.trim_end_matches(SEPARATOR);
        if p.is_empty() {
            return true;
        }
        match self.0.strip_prefix(p) {
            Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
            None => false,
        }
    }

    /// Number of non-empty components.
    pub fn len(&self) -> usize {
        self.components().count()
    }

    /// Returns true for the root name.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the non-empty components.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|c| !c.is_empty())
    }
}

impl FromStr for Name {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err("name cannot be empty".to_string());
        }
        if s.chars().any(char::is_whitespace) {
            return Err(format!("invalid name '{s}': must not contain whitespace"));
        }
        Ok(Name::new(s))
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Generates `prefix/0`, `prefix/1`, ... for one run.
///
/// The sequence is strictly increasing and never repeats a name until
/// [`reset`](Self::reset) is called.
#[derive(Debug, Clone)]
pub struct NameSequencer {
    prefix: Name,
    start: u64,
    next: u64,
}

impl NameSequencer {
    /// Create a sequencer starting at index 0.
    pub fn new(prefix: &Name) -> Self {
        Self::starting_at(prefix, 0)
    }

    /// Create a sequencer starting at the given index.
    pub fn starting_at(prefix: &Name, start: u64) -> Self {
        Self { prefix: prefix.as_prefix(), start, next: start }
    }

    /// The normalized prefix, always ending with a separator.
    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    /// The name for an arbitrary index.
    pub fn name_at(&self, index: u64) -> Name {
        Name(format!("{}{index}", self.prefix).into())
    }

    /// Index of the next name to be produced.
    pub fn position(&self) -> u64 {
        self.next
    }

    /// Rewind to the starting index.
    pub fn reset(&mut self) {
        self.next = self.start;
    }
}

impl Iterator for NameSequencer {
    type Item = Name;

    fn next(&mut self) -> Option<Name> {
        let index = self.next;
        // u64 exhaustion would take centuries at any realistic rate
        self.next = self.next.checked_add(1)?;
        Some(self.name_at(index))
    }
}
