// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Kernel of a task-orchestration build system.
//!
//! Users populate a [`Context`] with [`Project`](project::ProjectHandle)s and
//! [`Task`](task::TaskHandle)s whose typed [`Property`] cells wire together (an output feeding
//! an input both transports a value and implies a dependency). `Context::finalize` seals the
//! tree, [`graph::TaskGraph::build`] materializes the dependency graph for a selection, and
//! [`Executor`](executor::Executor) runs it.
//!
//! ```no_run
//! use kraken_core::context::Context;
//! use kraken_core::task::{Schema, TaskHandle, TaskLogic, TaskStatus, PropertySchemaEntry};
//! use kraken_core::value::ValueType;
//! use kraken_core::error::Result;
//!
//! struct Noop;
//! impl TaskLogic for Noop {
//!     fn schema(&self) -> Vec<PropertySchemaEntry> { Schema::new().build() }
//!     fn execute(&self, _task: &TaskHandle) -> Result<TaskStatus> { Ok(TaskStatus::Succeeded) }
//! }
//!
//! let ctx = Context::new("/tmp/example-build");
//! let root = ctx.root_project();
//! root.do_task("hello", Noop).unwrap();
//! let report = ctx.execute(&[":hello"]).unwrap();
//! assert!(report.succeeded());
//! # let _ = ValueType::Bool;
//! ```

pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod project;
pub mod property;
mod selector;
pub mod supplier;
pub mod task;
pub mod value;

pub use context::Context;
pub use error::{Error, Result};
pub use executor::{ErrorPolicy, ExecutionReport, Executor, TaskResult};
pub use graph::TaskGraph;
pub use project::{ProjectHandle, Resolved};
pub use property::{Property, PropertyKind};
pub use supplier::Supplier;
pub use task::{Schema, TaskHandle, TaskLogic, TaskStatus};
pub use value::{Value, ValueType};
