// src/graph/resource.rs

//! Resource payloads stored by the graph engine.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An installed package, as reported by a package manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub manager: String,
    pub name: String,
    pub version: String,
}

/// A value produced by a task or seeded as an input.
///
/// Resources are immutable once stored in a [`crate::graph::System`].
#[derive(Clone)]
pub enum Resource {
    File(PathBuf),
    Package(Package),
    /// Marker that the named task has run; used when a task is depended on
    /// for its effect rather than a value.
    TaskResult(String),
    Str(String),
    Int(i64),
    Opaque(Arc<dyn Any + Send + Sync>),
}

/// Discriminant of [`Resource`], used in kind mismatch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Package,
    TaskResult,
    Str,
    Int,
    Opaque,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::File => "file",
            ResourceKind::Package => "package",
            ResourceKind::TaskResult => "task result",
            ResourceKind::Str => "string",
            ResourceKind::Int => "integer",
            ResourceKind::Opaque => "opaque value",
        };
        f.write_str(name)
    }
}

impl Resource {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Resource::Opaque(Arc::new(value))
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::File(_) => ResourceKind::File,
            Resource::Package(_) => ResourceKind::Package,
            Resource::TaskResult(_) => ResourceKind::TaskResult,
            Resource::Str(_) => ResourceKind::Str,
            Resource::Int(_) => ResourceKind::Int,
            Resource::Opaque(_) => ResourceKind::Opaque,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Resource::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Resource::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Resource::File(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_package(&self) -> Option<&Package> {
        match self {
            Resource::Package(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_task_result(&self) -> Option<&str> {
        match self {
            Resource::TaskResult(name) => Some(name),
            _ => None,
        }
    }

    /// Borrow an opaque payload as `T`, if it is one.
    pub fn downcast_opaque<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Resource::Opaque(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::File(p) => f.debug_tuple("File").field(p).finish(),
            Resource::Package(p) => f.debug_tuple("Package").field(p).finish(),
            Resource::TaskResult(t) => f.debug_tuple("TaskResult").field(t).finish(),
            Resource::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Resource::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Resource::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<i64> for Resource {
    fn from(value: i64) -> Self {
        Resource::Int(value)
    }
}

impl From<String> for Resource {
    fn from(value: String) -> Self {
        Resource::Str(value)
    }
}

impl From<&str> for Resource {
    fn from(value: &str) -> Self {
        Resource::Str(value.to_string())
    }
}

impl From<PathBuf> for Resource {
    fn from(value: PathBuf) -> Self {
        Resource::File(value)
    }
}
