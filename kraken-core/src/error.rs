// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use crate::value::ValueType;

/// Everything that can go wrong while building or executing a graph.
///
/// Configuration errors (raised while a script is loading, during finalization, or while
/// constructing a `TaskGraph`) are fatal: they halt before any task runs. `TaskExecutionFailed`
/// is the one variant that is captured per-task in an `ExecutionReport` instead of aborting the
/// whole run; see `Executor`.
#[derive(Debug)]
pub enum Error {
    TypeMismatch {
        expected: ValueType,
        got: String,
    },
    NameCollision {
        project: String,
        name: String,
    },
    UnknownPath(String),
    UnknownTask(String),
    PropertyUnset {
        task: String,
        property: &'static str,
    },
    NotHydrated {
        task: String,
        property: &'static str,
    },
    PropertyFrozen {
        task: String,
        property: &'static str,
    },
    ContextSealed,
    CycleDetected {
        cycle: Vec<String>,
    },
    NothingSelected,
    TaskExecutionFailed {
        task: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TypeMismatch { expected, got } => {
                write!(f, "expected a value of type {expected:?}, got {got}")
            }
            Error::NameCollision { project, name } => {
                write!(f, "project {project} already has a member named {name}")
            }
            Error::UnknownPath(path) => write!(f, "no project or task resolves to {path}"),
            Error::UnknownTask(selector) => write!(f, "no task matches selector {selector}"),
            Error::PropertyUnset { task, property } => {
                write!(f, "property {property} of task {task} was read before being set")
            }
            Error::NotHydrated { task, property } => write!(
                f,
                "property {property} of task {task} is derived from a task that has not run yet"
            ),
            Error::PropertyFrozen { task, property } => write!(
                f,
                "property {property} of task {task} may only be written by its owner's execute"
            ),
            Error::ContextSealed => write!(f, "the context is sealed; no new projects or tasks may be added"),
            Error::CycleDetected { cycle } => {
                write!(f, "dependency cycle detected: {}", cycle.join(" -> "))
            }
            Error::NothingSelected => write!(f, "selection resolved to an empty set of tasks"),
            Error::TaskExecutionFailed { task, source } => {
                write!(f, "task {task} failed: {source}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::TaskExecutionFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
