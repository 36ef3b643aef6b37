// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Tasks: units of work that own a fixed set of properties and declare relationships to other
//! tasks. The actual work a task performs is supplied by a `TaskLogic` implementation; `Task`
//! itself (in the data model sense) is the `TaskRecord` kept in the `Context`'s arena plus the
//! `TaskHandle` used to address it.

use indexmap::IndexMap;

use crate::context::{Context, ProjectId, TaskId};
use crate::error::Result;
use crate::project::ProjectHandle;
use crate::property::{Property, PropertyCell, PropertyKind};
use crate::value::ValueType;

/// Terminal and in-flight states a task can be in. Only `Started` is internal; a `TaskLogic`
/// implementation's `execute` returns one of the other five.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Started,
    Succeeded,
    SucceededNoop,
    UpToDate,
    Skipped(String),
    Failed(String),
}

impl TaskStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskStatus::Failed(_))
    }

    /// Whether this status satisfies a dependent's strict predecessor requirement: any terminal
    /// status other than `Failed`.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::SucceededNoop | TaskStatus::UpToDate | TaskStatus::Skipped(_)
        )
    }
}

/// One declared property of a task's schema.
pub struct PropertySchemaEntry {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub ty: ValueType,
}

/// Builder for a `TaskLogic`'s property schema, named the way the source system's class-level
/// introspection would have discovered it: `Schema::new().input("src", ValueType::Path)`.
#[derive(Default)]
pub struct Schema(Vec<PropertySchemaEntry>);

impl Schema {
    pub fn new() -> Self {
        Schema(Vec::new())
    }

    pub fn input(mut self, name: &'static str, ty: ValueType) -> Self {
        self.0.push(PropertySchemaEntry { name, kind: PropertyKind::Input, ty });
        self
    }

    pub fn output(mut self, name: &'static str, ty: ValueType) -> Self {
        self.0.push(PropertySchemaEntry { name, kind: PropertyKind::Output, ty });
        self
    }

    pub fn build(self) -> Vec<PropertySchemaEntry> {
        self.0
    }
}

/// The work a task performs, plus its property schema. One implementation is instantiated per
/// task and lives for the lifetime of the `Context`.
pub trait TaskLogic: Send + Sync {
    fn schema(&self) -> Vec<PropertySchemaEntry>;

    fn execute(&self, task: &TaskHandle) -> Result<TaskStatus>;

    /// Called exactly once, by `Context::finalize`. May mutate properties or add relationships.
    fn finalize(&self, _task: &TaskHandle) -> Result<()> {
        Ok(())
    }

    fn is_group(&self) -> bool {
        false
    }

    fn description(&self) -> Option<String> {
        None
    }
}

/// A group task's work is a no-op; it exists only to bundle its members under a shared name.
/// Structurally equivalent to a task with strict relationships to each member.
pub(crate) struct GroupLogic;

impl TaskLogic for GroupLogic {
    fn schema(&self) -> Vec<PropertySchemaEntry> {
        Vec::new()
    }

    fn execute(&self, _task: &TaskHandle) -> Result<TaskStatus> {
        Ok(TaskStatus::SucceededNoop)
    }

    fn is_group(&self) -> bool {
        true
    }

    fn description(&self) -> Option<String> {
        Some("group".to_string())
    }
}

/// An unresolved relationship target, as given by a caller: either a task handle (resolved
/// immediately) or a selector string (resolved at `TaskGraph` construction, against the project
/// that was current when the relationship was declared).
pub enum RelationshipTargetInput {
    Task(TaskId),
    Selector(String),
}

impl From<&TaskHandle> for RelationshipTargetInput {
    fn from(handle: &TaskHandle) -> Self {
        RelationshipTargetInput::Task(handle.id)
    }
}

impl From<TaskHandle> for RelationshipTargetInput {
    fn from(handle: TaskHandle) -> Self {
        RelationshipTargetInput::Task(handle.id)
    }
}

impl From<&str> for RelationshipTargetInput {
    fn from(s: &str) -> Self {
        RelationshipTargetInput::Selector(s.to_string())
    }
}

impl From<String> for RelationshipTargetInput {
    fn from(s: String) -> Self {
        RelationshipTargetInput::Selector(s)
    }
}

#[derive(Clone)]
pub(crate) enum RelationshipTarget {
    Resolved(TaskId),
    Pending { selector: String, from: ProjectId },
}

/// A recorded relationship. `inverse` distinguishes `depends_on` (this task depends on
/// `target`) from `required_by` (`target` depends on this task) — both are stored on the
/// declaring task's list so that a selector-string target can be resolved lazily, at graph
/// construction, regardless of which direction it implies.
#[derive(Clone)]
pub(crate) struct Relationship {
    pub(crate) target: RelationshipTarget,
    pub(crate) strict: bool,
    pub(crate) inverse: bool,
}

pub(crate) struct TaskRecord {
    pub(crate) name: String,
    pub(crate) project: ProjectId,
    pub(crate) default: bool,
    pub(crate) capture: bool,
    pub(crate) relationships: Vec<Relationship>,
    pub(crate) properties: IndexMap<&'static str, PropertyCell>,
    pub(crate) finalized: bool,
    pub(crate) executing: bool,
    pub(crate) status: Option<TaskStatus>,
}

/// A handle to a task, cheap to clone, used both by build scripts (to wire properties and
/// declare relationships) and by `TaskLogic` implementations (as their `execute`/`finalize`
/// argument).
#[derive(Clone)]
pub struct TaskHandle {
    ctx: Context,
    id: TaskId,
}

impl TaskHandle {
    pub(crate) fn new(ctx: Context, id: TaskId) -> Self {
        TaskHandle { ctx, id }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> String {
        self.ctx.task_name(self.id)
    }

    pub fn path(&self) -> String {
        self.ctx.task_path(self.id)
    }

    pub fn project(&self) -> ProjectHandle {
        ProjectHandle::new(self.ctx.clone(), self.ctx.task_project(self.id))
    }

    pub fn is_default(&self) -> bool {
        self.ctx.task_default(self.id)
    }

    pub fn captures_output(&self) -> bool {
        self.ctx.task_capture(self.id)
    }

    pub fn description(&self) -> Option<String> {
        self.ctx.task_description(self.id)
    }

    /// Names of this task's declared Output properties, in schema order.
    pub fn outputs(&self) -> Vec<&'static str> {
        self.ctx
            .task_property_names(self.id)
            .into_iter()
            .filter(|(_, kind)| *kind == PropertyKind::Output)
            .map(|(name, _)| name)
            .collect()
    }

    /// Looks up a declared property by name, regardless of its kind. `input`/`output` are the
    /// same accessor under different names, for readability at call sites.
    pub fn property(&self, name: &'static str) -> Property {
        Property::new(self.ctx.clone(), self.id, name)
    }

    pub fn input(&self, name: &'static str) -> Property {
        self.property(name)
    }

    pub fn output(&self, name: &'static str) -> Property {
        self.property(name)
    }

    /// Records a relationship to `target`, resolved immediately if it's a task handle, or
    /// deferred to graph construction if it's a selector string.
    pub fn add_relationship(&self, target: impl Into<RelationshipTargetInput>, strict: bool) {
        self.record(target, strict, false);
    }

    /// Convenience for `add_relationship(target, strict: true)`.
    pub fn depends_on(&self, target: impl Into<RelationshipTargetInput>) {
        self.add_relationship(target, true);
    }

    /// Convenience for declaring the inverse: `target` will depend on this task.
    pub fn required_by(&self, target: impl Into<RelationshipTargetInput>) {
        self.record(target, true, true);
    }

    fn record(&self, target: impl Into<RelationshipTargetInput>, strict: bool, inverse: bool) {
        let target = match target.into() {
            RelationshipTargetInput::Task(id) => RelationshipTarget::Resolved(id),
            RelationshipTargetInput::Selector(selector) => RelationshipTarget::Pending {
                selector,
                from: self.ctx.task_project(self.id),
            },
        };
        self.ctx.task_add_relationship(self.id, Relationship { target, strict, inverse });
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskHandle({})", self.path())
    }
}
