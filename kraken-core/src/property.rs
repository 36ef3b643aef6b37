// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Typed, lazily-evaluated value cells that also carry provenance.
//!
//! Every property is a `Supplier`: reading one that is `Derived` walks its supplier(s), and
//! wiring one property's output into another's input is simultaneously a data-flow connection
//! and (via `upstream()`) an implied dependency edge. See `TaskGraph` for how those edges become
//! a schedule.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::context::{Context, TaskId};
use crate::error::{Error, Result};
use crate::supplier::{Of, Supplier};
use crate::task::TaskStatus;
use crate::value::{adapt, Value, ValueType};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PropertyKind {
    Input,
    Output,
}

/// The three-way state of a property: no value yet, a value fixed at wiring time, or a value
/// that will come from a supplier (often another task's property) once evaluated.
pub(crate) enum PropertyState {
    Unset,
    Static(Value),
    Derived(Arc<dyn Supplier>),
}

impl PropertyState {
    pub(crate) fn is_unset(&self) -> bool {
        matches!(self, PropertyState::Unset)
    }
}

/// Anything that can be handed to `Property::set`: a concrete value, or a supplier (typically
/// another task's `Property`) that will produce one lazily.
pub enum ValueOrSupplier {
    Value(Value),
    Supplier(Arc<dyn Supplier>),
}

impl<T: Into<Value>> From<T> for ValueOrSupplier {
    fn from(v: T) -> Self {
        ValueOrSupplier::Value(v.into())
    }
}

impl From<Arc<dyn Supplier>> for ValueOrSupplier {
    fn from(s: Arc<dyn Supplier>) -> Self {
        ValueOrSupplier::Supplier(s)
    }
}

impl From<Property> for ValueOrSupplier {
    fn from(p: Property) -> Self {
        ValueOrSupplier::Supplier(Arc::new(p))
    }
}

pub(crate) struct PropertyCell {
    pub(crate) kind: PropertyKind,
    pub(crate) ty: ValueType,
    pub(crate) state: PropertyState,
}

impl PropertyCell {
    pub(crate) fn new(kind: PropertyKind, ty: ValueType) -> Self {
        PropertyCell {
            kind,
            ty,
            state: PropertyState::Unset,
        }
    }
}

/// A handle to a single property of a single task. Cheap to clone; equality and hashing are by
/// `(task, name)` identity, not by value.
#[derive(Clone)]
pub struct Property {
    ctx: Context,
    task: TaskId,
    name: &'static str,
}

impl Property {
    pub(crate) fn new(ctx: Context, task: TaskId, name: &'static str) -> Self {
        Property { ctx, task, name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn task_id(&self) -> TaskId {
        self.task
    }

    pub fn kind(&self) -> PropertyKind {
        self.ctx.with_property(self.task, self.name, |cell| cell.kind)
    }

    pub fn value_type(&self) -> ValueType {
        self.ctx.with_property(self.task, self.name, |cell| cell.ty.clone())
    }

    /// Sets this property's value or supplier, validating eagerly for static values (suppliers
    /// are validated lazily, on `get`, since their value isn't known yet).
    pub fn set(&self, value: impl Into<ValueOrSupplier>) -> Result<()> {
        self.ctx.set_property(self.task, self.name, value.into())
    }

    /// Sets this property only if it is currently `Unset`.
    pub fn set_default(&self, value: impl Into<ValueOrSupplier>) -> Result<()> {
        if self.is_set() {
            return Ok(());
        }
        self.set(value)
    }

    /// Equivalent to `set_default` with a static value, then returns the effective value.
    /// Intended for use inside `execute`, for an Output property that has a computed fallback.
    pub fn setdefault(&self, value: impl Into<Value>) -> Result<Value> {
        self.set_default(value.into())?;
        self.get()
    }

    pub fn get(&self) -> Result<Value> {
        self.check_hydrated()?;
        self.ctx.with_property_result(self.task, self.name, |cell| match &cell.state {
            PropertyState::Unset => Err(Error::PropertyUnset {
                task: self.ctx.task_path(self.task),
                property: self.name,
            }),
            PropertyState::Static(value) => Ok(value.clone()),
            PropertyState::Derived(supplier) => {
                let raw = supplier.get()?;
                adapt(&cell.ty, &raw)
            }
        })
    }

    pub fn get_or(&self, default: Value) -> Value {
        self.get().unwrap_or(default)
    }

    pub fn is_set(&self) -> bool {
        self.ctx.with_property(self.task, self.name, |cell| !cell.state.is_unset())
    }

    pub fn is_filled(&self) -> bool {
        self.is_set()
    }

    /// The set of properties transitively referenced by this property's supplier(s), in
    /// discovery order with duplicates removed.
    pub fn upstream(&self) -> Vec<Property> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue: Vec<Property> = self.direct_upstream();
        while let Some(p) = queue.pop() {
            let key = (p.task, p.name);
            if !seen.insert(key) {
                continue;
            }
            let next = p.direct_upstream();
            order.push(p);
            queue.extend(next);
        }
        order
    }

    fn direct_upstream(&self) -> Vec<Property> {
        self.ctx
            .with_property(self.task, self.name, |cell| match &cell.state {
                PropertyState::Derived(supplier) => supplier.direct_upstream(),
                _ => Vec::new(),
            })
    }

    /// For an Output property, verifies that its owning task has reached a terminal status
    /// before its value is read (directly, or via a `Derived` chain that bottoms out here).
    fn check_hydrated(&self) -> Result<()> {
        let kind = self.kind();
        if kind != PropertyKind::Output {
            return Ok(());
        }
        match self.ctx.task_status(self.task) {
            Some(status) if is_terminal(&status) => Ok(()),
            _ => Err(Error::NotHydrated {
                task: self.ctx.task_path(self.task),
                property: self.name,
            }),
        }
    }
}

fn is_terminal(status: &TaskStatus) -> bool {
    !matches!(status, TaskStatus::Started)
}

impl Supplier for Property {
    fn get(&self) -> Result<Value> {
        Property::get(self)
    }

    fn direct_upstream(&self) -> Vec<Property> {
        vec![self.clone()]
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.task == other.task && self.name == other.name
    }
}

impl Eq for Property {}

impl Hash for Property {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.task.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Property({:?}.{})", self.task, self.name)
    }
}

/// Normalizes a raw value or an existing supplier into a `Supplier` trait object, mirroring
/// `Supplier.of` in the source system.
pub fn of(value: impl Into<Value>) -> Arc<dyn Supplier> {
    Of::new(value)
}
