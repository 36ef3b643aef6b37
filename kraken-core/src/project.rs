// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Projects: a tree-structured namespace of child projects and tasks, addressable by
//! colon-joined path.

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::context::{Context, ProjectId, TaskId};
use crate::error::{Error, Result};
use crate::property::ValueOrSupplier;
use crate::task::{GroupLogic, TaskHandle, TaskLogic};

const DEFAULT_GROUPS: [&str; 4] = ["fmt", "lint", "build", "test"];

#[derive(Clone, Copy, Debug)]
pub(crate) enum Member {
    Task(TaskId),
    Project(ProjectId),
}

pub(crate) struct ProjectRecord {
    pub(crate) name: String,
    pub(crate) directory: PathBuf,
    pub(crate) parent: Option<ProjectId>,
    pub(crate) members: IndexMap<String, Member>,
}

/// A resolved path or lookup result: either a task or a project.
#[derive(Clone, Debug)]
pub enum Resolved {
    Task(TaskHandle),
    Project(ProjectHandle),
}

/// A handle to a project, cheap to clone.
#[derive(Clone)]
pub struct ProjectHandle {
    ctx: Context,
    id: ProjectId,
}

impl ProjectHandle {
    pub(crate) fn new(ctx: Context, id: ProjectId) -> Self {
        ProjectHandle { ctx, id }
    }

    pub(crate) fn id(&self) -> ProjectId {
        self.id
    }

    pub fn name(&self) -> String {
        self.ctx.project_name(self.id)
    }

    pub fn path(&self) -> String {
        self.ctx.project_path(self.id)
    }

    pub fn directory(&self) -> PathBuf {
        self.ctx.project_directory(self.id)
    }

    pub fn parent(&self) -> Option<ProjectHandle> {
        self.ctx.project_parent(self.id).map(|id| ProjectHandle::new(self.ctx.clone(), id))
    }

    /// Registers a child project; fails with `NameCollision` if the name is already taken.
    /// Like every project, the child gets its own `fmt`/`lint`/`build`/`test` groups.
    pub fn add_child(&self, name: impl Into<String>, directory: impl Into<PathBuf>) -> Result<ProjectHandle> {
        let id = self.ctx.add_project(self.id, name.into(), directory.into())?;
        let child = ProjectHandle::new(self.ctx.clone(), id);
        bootstrap_default_groups(&child)?;
        Ok(child)
    }

    pub fn project(&self, name: &str) -> Option<ProjectHandle> {
        match self.ctx.project_member(self.id, name) {
            Some(Member::Project(id)) => Some(ProjectHandle::new(self.ctx.clone(), id)),
            _ => None,
        }
    }

    pub fn task(&self, name: &str) -> Option<TaskHandle> {
        match self.ctx.project_member(self.id, name) {
            Some(Member::Task(id)) => Some(TaskHandle::new(self.ctx.clone(), id)),
            _ => None,
        }
    }

    /// Resolves a path relative to this project (`foo:bar`) or absolute from the root
    /// (`:foo:bar`).
    pub fn resolve(&self, path: &str) -> Result<Resolved> {
        match self.ctx.resolve(self.id, path)? {
            Member::Task(id) => Ok(Resolved::Task(TaskHandle::new(self.ctx.clone(), id))),
            Member::Project(id) => Ok(Resolved::Project(ProjectHandle::new(self.ctx.clone(), id))),
        }
    }

    /// Every direct child, both projects and tasks, in registration order.
    pub fn members(&self) -> Vec<(String, Resolved)> {
        self.ctx
            .project_members(self.id)
            .into_iter()
            .map(|(name, member)| {
                let resolved = match member {
                    Member::Task(id) => Resolved::Task(TaskHandle::new(self.ctx.clone(), id)),
                    Member::Project(id) => Resolved::Project(ProjectHandle::new(self.ctx.clone(), id)),
                };
                (name, resolved)
            })
            .collect()
    }

    /// Starts building a task registered under this project. `TaskBuilder::build` performs the
    /// actual registration.
    pub fn task_builder(&self, name: impl Into<String>, logic: impl TaskLogic + 'static) -> TaskBuilder<'_> {
        TaskBuilder {
            project: self,
            name: name.into(),
            logic: Box::new(logic),
            default: false,
            capture: false,
            properties: Vec::new(),
        }
    }

    /// Factory shortcut: instantiates `logic`, registers it under this project. Equivalent to
    /// `task_builder(name, logic).build()`; use `task_builder` directly to set `default`,
    /// `capture`, or initial properties.
    pub fn do_task(&self, name: impl Into<String>, logic: impl TaskLogic + 'static) -> Result<TaskHandle> {
        self.task_builder(name, logic).build()
    }

    /// Idempotent getter-or-creator for a named group: returns the existing group task if one
    /// exists under this name, otherwise creates one. Errors if the name is already taken by
    /// something that isn't a group.
    pub fn group(&self, name: &str) -> Result<TaskHandle> {
        match self.ctx.project_member(self.id, name) {
            Some(Member::Task(id)) if self.ctx.task_is_group(id) => {
                Ok(TaskHandle::new(self.ctx.clone(), id))
            }
            Some(_) => Err(Error::NameCollision { project: self.path(), name: name.to_string() }),
            None => self.task_builder(name, GroupLogic).build(),
        }
    }
}

impl std::fmt::Debug for ProjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProjectHandle({})", self.path())
    }
}

pub struct TaskBuilder<'p> {
    project: &'p ProjectHandle,
    name: String,
    logic: Box<dyn TaskLogic>,
    default: bool,
    capture: bool,
    properties: Vec<(&'static str, ValueOrSupplier)>,
}

impl<'p> TaskBuilder<'p> {
    pub fn default_task(mut self, value: bool) -> Self {
        self.default = value;
        self
    }

    pub fn capture(mut self, value: bool) -> Self {
        self.capture = value;
        self
    }

    pub fn property(mut self, name: &'static str, value: impl Into<ValueOrSupplier>) -> Self {
        self.properties.push((name, value.into()));
        self
    }

    pub fn build(self) -> Result<TaskHandle> {
        let id = self
            .project
            .ctx
            .add_task(self.project.id, self.name, self.default, self.capture, self.logic)?;
        let handle = TaskHandle::new(self.project.ctx.clone(), id);
        for (name, value) in self.properties {
            handle.property(name).set(value)?;
        }
        Ok(handle)
    }
}

pub(crate) fn bootstrap_default_groups(project: &ProjectHandle) -> Result<()> {
    for name in DEFAULT_GROUPS {
        project.group(name)?;
    }
    Ok(())
}
