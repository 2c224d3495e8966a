// src/graph/key.rs

//! Structural resource identities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One component of a [`ResourceKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Int(i64),
    Str(String),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Int(i) => write!(f, "{i}"),
            KeyPart::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Identity of a resource in a [`crate::graph::System`].
///
/// A key is a namespace plus an ordered list of parts, e.g. `dist(3,4)` is
/// namespace `dist` with parts `[3, 4]`. Equality and hashing are structural,
/// so `a(1)` and `b(1)` never collide even when a caller formats them the
/// same way. [`fmt::Display`] is only a label for logs and errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    namespace: String,
    parts: Vec<KeyPart>,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            parts: Vec::new(),
        }
    }

    /// Append an integer part.
    pub fn int(mut self, part: i64) -> Self {
        self.parts.push(KeyPart::Int(part));
        self
    }

    /// Append a string part.
    pub fn str(mut self, part: impl Into<String>) -> Self {
        self.parts.push(KeyPart::Str(part.into()));
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    /// Key under which a named task's completion marker is stored.
    pub fn task(name: impl Into<String>) -> Self {
        Self::new("task").str(name)
    }

    /// Key naming a file path produced by some task.
    pub fn file(path: impl Into<String>) -> Self {
        Self::new("file").str(path)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.namespace)?;
        if self.parts.is_empty() {
            return Ok(());
        }
        f.write_str("(")?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str(")")
    }
}

impl From<&str> for ResourceKey {
    fn from(name: &str) -> Self {
        ResourceKey::new(name)
    }
}
