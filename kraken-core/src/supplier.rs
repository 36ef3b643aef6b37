// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Lazy value providers.
//!
//! A `Supplier` is a uniform handle over anything that can eventually produce a `Value`: a
//! constant, a pure callable, or another task's `Property`. Treating a property itself as a
//! supplier is what lets wiring (`b.input("src").set(a.output("path"))`) double as declaring a
//! dependency: the graph discovers strict edges by walking `upstream()`.

use std::sync::Arc;

use crate::error::Result;
use crate::property::Property;
use crate::value::Value;

/// Something that can be asked for a `Value`, lazily, possibly more than once.
///
/// Suppliers are pure: callers must not depend on how many times `get()` is invoked.
pub trait Supplier: Send + Sync {
    fn get(&self) -> Result<Value>;

    /// The properties this supplier directly reads from. Does not recurse into properties that
    /// are themselves `Derived`; `Property::upstream` does that walk.
    fn direct_upstream(&self) -> Vec<Property>;
}

/// A supplier that always returns the same value.
pub struct Of(Value);

impl Of {
    pub fn new(value: impl Into<Value>) -> Arc<dyn Supplier> {
        Arc::new(Of(value.into()))
    }
}

impl Supplier for Of {
    fn get(&self) -> Result<Value> {
        Ok(self.0.clone())
    }

    fn direct_upstream(&self) -> Vec<Property> {
        Vec::new()
    }
}

/// A supplier backed by a pure callable, with an explicitly declared upstream.
pub struct OfCallable<F> {
    func: F,
    upstream: Vec<Property>,
}

impl<F> OfCallable<F>
where
    F: Fn() -> Result<Value> + Send + Sync + 'static,
{
    pub fn new(func: F, upstream: Vec<Property>) -> Arc<dyn Supplier> {
        Arc::new(OfCallable { func, upstream })
    }
}

impl<F> Supplier for OfCallable<F>
where
    F: Fn() -> Result<Value> + Send + Sync,
{
    fn get(&self) -> Result<Value> {
        (self.func)()
    }

    fn direct_upstream(&self) -> Vec<Property> {
        self.upstream.clone()
    }
}

/// A supplier that maps the output of another supplier through a pure function.
pub struct Map<F> {
    inner: Arc<dyn Supplier>,
    func: F,
}

impl<F> Map<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
{
    pub fn new(inner: Arc<dyn Supplier>, func: F) -> Arc<dyn Supplier> {
        Arc::new(Map { inner, func })
    }
}

impl<F> Supplier for Map<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    fn get(&self) -> Result<Value> {
        (self.func)(self.inner.get()?)
    }

    fn direct_upstream(&self) -> Vec<Property> {
        self.inner.direct_upstream()
    }
}

/// A supplier that combines several suppliers into one, via a pure function over their values.
/// Its upstream is the union of all inputs' upstreams.
pub struct Lift<F> {
    inputs: Vec<Arc<dyn Supplier>>,
    func: F,
}

impl<F> Lift<F>
where
    F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
{
    pub fn new(inputs: Vec<Arc<dyn Supplier>>, func: F) -> Arc<dyn Supplier> {
        Arc::new(Lift { inputs, func })
    }
}

impl<F> Supplier for Lift<F>
where
    F: Fn(Vec<Value>) -> Result<Value> + Send + Sync,
{
    fn get(&self) -> Result<Value> {
        let values = self
            .inputs
            .iter()
            .map(|supplier| supplier.get())
            .collect::<Result<Vec<_>>>()?;
        (self.func)(values)
    }

    fn direct_upstream(&self) -> Vec<Property> {
        self.inputs
            .iter()
            .flat_map(|supplier| supplier.direct_upstream())
            .collect()
    }
}
