// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The root of the project tree: holds the build directory and global metadata, and
//! orchestrates finalization and execution.
//!
//! Back references (`Task` -> `Project`, `Property` -> `Task`) are plain integer handles into
//! arenas owned here, rather than pointers or `Weak` references: `TaskId`/`ProjectId` are `Copy`
//! and cheap to pass around, and the arenas live exactly as long as the `Context` does.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::executor::{ErrorPolicy, ExecutionReport, Executor};
use crate::graph::TaskGraph;
use crate::project::{bootstrap_default_groups, Member, ProjectHandle, ProjectRecord};
use crate::property::{PropertyCell, PropertyKind, PropertyState, ValueOrSupplier};
use crate::task::{Relationship, TaskHandle, TaskLogic, TaskRecord, TaskStatus};
use crate::value::adapt;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct TaskId(pub(crate) u32);

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct ProjectId(pub(crate) u32);

pub(crate) struct ContextState {
    pub(crate) build_directory: PathBuf,
    pub(crate) projects: Vec<ProjectRecord>,
    pub(crate) tasks: Vec<TaskRecord>,
    pub(crate) root: ProjectId,
    pub(crate) sealed: bool,
    metadata: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

/// Task logic objects live behind their own lock, separate from `ContextState`: a running
/// task's `execute`/`finalize` call holds only its own entry's mutex, so it can freely read and
/// write *other* tasks' properties (which go through `state`) without risking self-deadlock.
struct ContextImpl {
    state: Mutex<ContextState>,
    logics: RwLock<Vec<Arc<Mutex<Box<dyn TaskLogic>>>>>,
}

/// Singleton root object for one build invocation. Cheap to clone (an `Arc` underneath); all
/// clones refer to the same arenas.
#[derive(Clone)]
pub struct Context(Arc<ContextImpl>);

impl Context {
    pub fn new(build_directory: impl Into<PathBuf>) -> Context {
        let root = ProjectRecord {
            name: String::new(),
            directory: build_directory.into(),
            parent: None,
            members: IndexMap::new(),
        };
        let build_directory = root.directory.clone();
        let state = ContextState {
            build_directory,
            projects: vec![root],
            tasks: Vec::new(),
            root: ProjectId(0),
            sealed: false,
            metadata: HashMap::new(),
        };
        let ctx = Context(Arc::new(ContextImpl {
            state: Mutex::new(state),
            logics: RwLock::new(Vec::new()),
        }));
        bootstrap_default_groups(&ctx.root_project()).expect("default group names are always valid");
        ctx
    }

    pub fn root_project(&self) -> ProjectHandle {
        ProjectHandle::new(self.clone(), self.0.state.lock().root)
    }

    pub fn build_directory(&self) -> PathBuf {
        self.0.state.lock().build_directory.clone()
    }

    pub fn metadata_insert<T: Any + Send + Sync>(&self, value: T) {
        self.0
            .state
            .lock()
            .metadata
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn metadata_get<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        self.0
            .state
            .lock()
            .metadata
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Walks all projects depth-first and calls `finalize` on every task exactly once, then
    /// seals the context against further structural mutation.
    pub fn finalize(&self) -> Result<()> {
        if self.0.state.lock().sealed {
            return Ok(());
        }
        let root = self.0.state.lock().root;
        self.finalize_project(root)?;
        self.0.state.lock().sealed = true;
        let state = self.0.state.lock();
        info!("sealed {} projects and {} tasks", state.projects.len(), state.tasks.len());
        Ok(())
    }

    fn finalize_project(&self, project: ProjectId) -> Result<()> {
        let members: Vec<Member> = self
            .0
            .state
            .lock()
            .projects
            .get(project.0 as usize)
            .expect("valid project id")
            .members
            .values()
            .cloned()
            .collect();
        for member in members {
            match member {
                Member::Task(task) => self.finalize_task(task)?,
                Member::Project(child) => self.finalize_project(child)?,
            }
        }
        Ok(())
    }

    fn finalize_task(&self, task: TaskId) -> Result<()> {
        let already = self.0.state.lock().tasks[task.0 as usize].finalized;
        if already {
            return Ok(());
        }
        let handle = TaskHandle::new(self.clone(), task);
        let entry = self.0.logics.read()[task.0 as usize].clone();
        entry.lock().finalize(&handle)?;
        self.0.state.lock().tasks[task.0 as usize].finalized = true;
        debug!("finalized task {}", self.task_path(task));
        Ok(())
    }

    /// Resolves `selectors` (defaulting to every task marked `default` when empty), builds a
    /// `TaskGraph`, and runs it to completion.
    pub fn execute(&self, selectors: &[&str]) -> Result<ExecutionReport> {
        self.execute_with_policy(selectors, ErrorPolicy::HaltOnFailure, 1)
    }

    pub fn execute_with_policy(
        &self,
        selectors: &[&str],
        policy: ErrorPolicy,
        parallelism: usize,
    ) -> Result<ExecutionReport> {
        self.finalize()?;
        let graph = TaskGraph::build(self, selectors)?;
        Executor::new(policy, parallelism).run(self, &graph)
    }

    // -- project arena -----------------------------------------------------------------

    pub(crate) fn add_project(
        &self,
        parent: ProjectId,
        name: String,
        directory: PathBuf,
    ) -> Result<ProjectId> {
        let mut state = self.0.state.lock();
        if state.sealed {
            return Err(Error::ContextSealed);
        }
        if state.projects[parent.0 as usize].members.contains_key(&name) {
            return Err(Error::NameCollision {
                project: project_path_locked(&state, parent),
                name,
            });
        }
        let id = ProjectId(state.projects.len() as u32);
        state.projects.push(ProjectRecord {
            name: name.clone(),
            directory,
            parent: Some(parent),
            members: IndexMap::new(),
        });
        state.projects[parent.0 as usize]
            .members
            .insert(name, Member::Project(id));
        Ok(id)
    }

    pub(crate) fn add_task(
        &self,
        project: ProjectId,
        name: String,
        default: bool,
        capture: bool,
        logic: Box<dyn TaskLogic>,
    ) -> Result<TaskId> {
        let mut state = self.0.state.lock();
        if state.sealed {
            return Err(Error::ContextSealed);
        }
        if state.projects[project.0 as usize].members.contains_key(&name) {
            return Err(Error::NameCollision {
                project: project_path_locked(&state, project),
                name,
            });
        }
        let id = TaskId(state.tasks.len() as u32);
        let schema = logic.schema();
        let mut properties = IndexMap::with_capacity(schema.len());
        for entry in schema {
            properties.insert(entry.name, PropertyCell::new(entry.kind, entry.ty.clone()));
        }
        state.tasks.push(TaskRecord {
            name: name.clone(),
            project,
            default,
            capture,
            relationships: Vec::new(),
            properties,
            finalized: false,
            executing: false,
            status: None,
        });
        state.projects[project.0 as usize]
            .members
            .insert(name, Member::Task(id));
        drop(state);
        self.0.logics.write().push(Arc::new(Mutex::new(logic)));
        Ok(id)
    }

    pub(crate) fn project_name(&self, id: ProjectId) -> String {
        self.0.state.lock().projects[id.0 as usize].name.clone()
    }

    pub(crate) fn project_directory(&self, id: ProjectId) -> PathBuf {
        self.0.state.lock().projects[id.0 as usize].directory.clone()
    }

    pub(crate) fn project_parent(&self, id: ProjectId) -> Option<ProjectId> {
        self.0.state.lock().projects[id.0 as usize].parent
    }

    pub(crate) fn project_path(&self, id: ProjectId) -> String {
        project_path_locked(&self.0.state.lock(), id)
    }

    pub(crate) fn project_member(&self, id: ProjectId, name: &str) -> Option<Member> {
        self.0.state.lock().projects[id.0 as usize].members.get(name).copied()
    }

    pub(crate) fn project_members(&self, id: ProjectId) -> Vec<(String, Member)> {
        self.0.state.lock().projects[id.0 as usize]
            .members
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub(crate) fn all_projects(&self) -> Vec<ProjectId> {
        (0..self.0.state.lock().projects.len() as u32).map(ProjectId).collect()
    }

    // -- task arena ----------------------------------------------------------------------

    pub(crate) fn all_tasks(&self) -> Vec<TaskId> {
        (0..self.0.state.lock().tasks.len() as u32).map(TaskId).collect()
    }

    pub(crate) fn task_name(&self, id: TaskId) -> String {
        self.0.state.lock().tasks[id.0 as usize].name.clone()
    }

    pub(crate) fn task_project(&self, id: TaskId) -> ProjectId {
        self.0.state.lock().tasks[id.0 as usize].project
    }

    pub(crate) fn task_path(&self, id: TaskId) -> String {
        let state = self.0.state.lock();
        let task = &state.tasks[id.0 as usize];
        let project_path = project_path_locked(&state, task.project);
        if project_path == ":" {
            format!(":{}", task.name)
        } else {
            format!("{}:{}", project_path, task.name)
        }
    }

    pub(crate) fn task_default(&self, id: TaskId) -> bool {
        self.0.state.lock().tasks[id.0 as usize].default
    }

    pub(crate) fn task_capture(&self, id: TaskId) -> bool {
        self.0.state.lock().tasks[id.0 as usize].capture
    }

    pub(crate) fn task_relationships(&self, id: TaskId) -> Vec<Relationship> {
        self.0.state.lock().tasks[id.0 as usize].relationships.clone()
    }

    /// Every declared property of `id`, by name, alongside its kind. Used by `TaskGraph`
    /// construction to walk each Input's `upstream()` for implied strict dependencies.
    pub(crate) fn task_property_names(&self, id: TaskId) -> Vec<(&'static str, PropertyKind)> {
        self.0.state.lock().tasks[id.0 as usize]
            .properties
            .iter()
            .map(|(name, cell)| (*name, cell.kind))
            .collect()
    }

    pub(crate) fn task_add_relationship(&self, id: TaskId, rel: Relationship) {
        self.0.state.lock().tasks[id.0 as usize].relationships.push(rel);
    }

    pub(crate) fn task_is_group(&self, id: TaskId) -> bool {
        self.0.logics.read()[id.0 as usize].lock().is_group()
    }

    pub(crate) fn task_description(&self, id: TaskId) -> Option<String> {
        self.0.logics.read()[id.0 as usize].lock().description()
    }

    pub(crate) fn task_status(&self, id: TaskId) -> Option<TaskStatus> {
        self.0.state.lock().tasks[id.0 as usize].status.clone()
    }

    pub(crate) fn set_task_status(&self, id: TaskId, status: TaskStatus) {
        self.0.state.lock().tasks[id.0 as usize].status = Some(status);
    }

    pub(crate) fn set_task_executing(&self, id: TaskId, executing: bool) {
        self.0.state.lock().tasks[id.0 as usize].executing = executing;
    }

    pub(crate) fn run_task(&self, id: TaskId) -> Result<TaskStatus> {
        let handle = TaskHandle::new(self.clone(), id);
        let entry = self.0.logics.read()[id.0 as usize].clone();
        entry.lock().execute(&handle)
    }

    // -- property cells --------------------------------------------------------------------

    pub(crate) fn with_property<R>(&self, task: TaskId, name: &'static str, f: impl FnOnce(&PropertyCell) -> R) -> R {
        let state = self.0.state.lock();
        let cell = state.tasks[task.0 as usize]
            .properties
            .get(name)
            .unwrap_or_else(|| panic!("task {task:?} has no property named {name}"));
        f(cell)
    }

    pub(crate) fn with_property_result<R>(
        &self,
        task: TaskId,
        name: &'static str,
        f: impl FnOnce(&PropertyCell) -> Result<R>,
    ) -> Result<R> {
        self.with_property(task, name, f)
    }

    pub(crate) fn set_property(&self, task: TaskId, name: &'static str, value: ValueOrSupplier) -> Result<()> {
        let mut state = self.0.state.lock();
        let record = &mut state.tasks[task.0 as usize];
        let finalized = record.finalized;
        let executing = record.executing;
        let cell = record
            .properties
            .get_mut(name)
            .unwrap_or_else(|| panic!("task {task:?} has no property named {name}"));

        if cell.kind == PropertyKind::Output && finalized && !executing {
            let project = record.project;
            let task_name = record.name.clone();
            let project_path = project_path_locked(&state, project);
            let path = if project_path == ":" {
                format!(":{task_name}")
            } else {
                format!("{project_path}:{task_name}")
            };
            return Err(Error::PropertyFrozen { task: path, property: name });
        }

        cell.state = match value {
            ValueOrSupplier::Value(v) => PropertyState::Static(adapt(&cell.ty, &v)?),
            ValueOrSupplier::Supplier(s) => PropertyState::Derived(s),
        };
        Ok(())
    }

    // -- path resolution --------------------------------------------------------------------

    /// Resolves a colon-delimited path. `:a:b` is relative to `from`; `:` prefixed paths (i.e.
    /// starting with an empty first component) are absolute, resolved from the root project.
    pub(crate) fn resolve(&self, from: ProjectId, path: &str) -> Result<Member> {
        if path.is_empty() {
            return Err(Error::UnknownPath(path.to_string()));
        }
        let (mut current, rest) = if let Some(stripped) = path.strip_prefix(':') {
            (self.0.state.lock().root, stripped)
        } else {
            (from, path)
        };
        if rest.is_empty() {
            return Ok(Member::Project(current));
        }
        let components: Vec<&str> = rest.split(':').collect();
        for (i, component) in components.iter().enumerate() {
            let member = self
                .project_member(current, component)
                .ok_or_else(|| Error::UnknownPath(path.to_string()))?;
            let is_last = i == components.len() - 1;
            match member {
                Member::Project(p) => current = p,
                Member::Task(t) => {
                    if is_last {
                        return Ok(Member::Task(t));
                    }
                    return Err(Error::UnknownPath(path.to_string()));
                }
            }
        }
        Ok(Member::Project(current))
    }
}

fn project_path_locked(state: &ContextState, id: ProjectId) -> String {
    let mut names = Vec::new();
    let mut current = id;
    loop {
        let project = &state.projects[current.0 as usize];
        match project.parent {
            None => break,
            Some(parent) => {
                names.push(project.name.clone());
                current = parent;
            }
        }
    }
    names.reverse();
    if names.is_empty() {
        ":".to_string()
    } else {
        format!(":{}", names.join(":"))
    }
}
