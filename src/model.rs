//! Live, reactive model instances.
//!
//! A [`ModelInstance`] owns one validated JSON tree conforming to an object
//! type of a shared [`Schema`]. It is read through [`ModelRef`]s (the whole
//! instance or any reachable submodel); every read reports a dependency to
//! the [`Runtime`], and the only way to write is [`ModelRef::apply`] with a
//! single [`Patch`].
pub mod factory;
pub mod patch;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::{Serialize, Serializer};
use serde_json::Value as Json;
use tracing::warn;

pub use factory::TypeInstanceFactory;
pub use patch::{Patch, PatchOp};

use crate::error::PatchError;
use crate::expr::{Context, Value};
use crate::pointer::{self, Seg};
use crate::reactive::{Change, Dependency, ModelId, Runtime};
use crate::schema::{ComputedField, Schema, TypeId};

/// Computed fields may read other computed fields; this bounds the chain so
/// a field that reads itself fails instead of overflowing the stack.
const MAX_COMPUTED_DEPTH: u32 = 32;

// -------------------------------- Instance -------------------------------- //

#[derive(Clone)]
pub struct ModelInstance {
    inner: Rc<Inner>,
}

struct Inner {
    id: ModelId,
    schema: Rc<Schema>,
    ty: TypeId,
    data: RefCell<Json>,
    runtime: Runtime,
    computing: Cell<u32>,
}

impl ModelInstance {
    /// `data` must already be the output of `Schema::instantiate` for `ty`.
    pub(crate) fn new(schema: Rc<Schema>, ty: TypeId, data: Json, runtime: Runtime) -> Self {
        Self {
            inner: Rc::new(Inner {
                id: runtime.model(),
                schema,
                ty,
                data: RefCell::new(data),
                runtime,
                computing: Cell::new(0),
            }),
        }
    }

    pub fn id(&self) -> ModelId {
        self.inner.id
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.inner.schema
    }

    pub fn type_id(&self) -> TypeId {
        self.inner.ty
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn root(&self) -> ModelRef {
        ModelRef { model: self.clone(), path: Vec::new() }
    }

    /// Stored fields only; computed fields are never part of it. Untracked.
    pub fn snapshot(&self) -> Json {
        self.inner.data.borrow().clone()
    }

    pub fn describe(&self) -> String {
        self.inner.schema.describe(self.inner.ty)
    }

    pub fn get(&self, name: &str) -> Value {
        self.root().get(name)
    }

    pub fn apply_patch(&self, patch: &Patch) -> Result<Change, PatchError> {
        self.root().apply(patch)
    }

    fn with_node<R>(&self, path: &[Seg], read: impl FnOnce(Option<&Json>) -> R) -> R {
        let data = self.inner.data.borrow();
        read(pointer::get(&data, path))
    }
}

impl fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInstance")
            .field("id", &self.inner.id)
            .field("data", &*self.inner.data.borrow())
            .finish()
    }
}

impl Serialize for ModelInstance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.data.borrow().serialize(serializer)
    }
}

// ------------------------------- References ------------------------------- //

/// A model instance, or a submodel reachable from it by path.
///
/// References are positional: `/items/0` names whatever element sits at
/// index 0 when it is read.
#[derive(Clone)]
pub struct ModelRef {
    model: ModelInstance,
    path: Vec<Seg>,
}

impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.model.inner, &other.model.inner) && self.path == other.path
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelRef({:?}{})", self.model.id(), pointer::format(&self.path))
    }
}

impl ModelRef {
    pub fn model(&self) -> &ModelInstance {
        &self.model
    }

    pub fn path(&self) -> &[Seg] {
        &self.path
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.model.schema().type_at(self.model.type_id(), &self.path)
    }

    pub fn is_array(&self) -> bool {
        self.model.with_node(&self.path, |node| node.is_some_and(Json::is_array))
    }

    fn child(&self, seg: Seg) -> ModelRef {
        let mut path = self.path.clone();
        path.push(seg);
        ModelRef { model: self.model.clone(), path }
    }

    fn observe(&self, deep: bool) {
        self.model.runtime().record(Dependency {
            model: self.model.id(),
            path: self.path.clone(),
            deep,
        });
    }

    /// Subscribe the current observer to this whole subtree.
    pub fn observe_deep(&self) {
        self.observe(true);
    }

    /// Wrap the node at this reference: composites stay references, leaves
    /// become plain values.
    fn load(self) -> Value {
        let leaf = self.model.with_node(&self.path, |node| match node {
            None => Some(Value::Undefined),
            Some(Json::Object(_) | Json::Array(_)) => None,
            Some(leaf) => Some(Value::from_json(leaf)),
        });
        leaf.unwrap_or(Value::Model(self))
    }

    /// Member access. Computed fields are evaluated on every read; their
    /// failures are logged and read as `Undefined`.
    pub fn get(&self, name: &str) -> Value {
        let schema = self.model.schema().clone();
        if let Some(computed) = self.type_id().and_then(|ty| schema.object(ty)?.computed.get(name)) {
            return self.compute(name, computed);
        }
        let child = self.child(Seg::Field(name.to_string()));
        child.observe(false);
        child.load()
    }

    /// Element `index` of an array submodel.
    pub fn at(&self, index: usize) -> Value {
        let child = self.child(Seg::Index(index));
        child.observe(false);
        child.load()
    }

    /// Array length; subscribes to insertions and removals.
    pub fn len(&self) -> Option<usize> {
        self.observe(false);
        self.model.with_node(&self.path, |node| node.and_then(Json::as_array).map(Vec::len))
    }

    pub fn is_empty(&self) -> bool {
        self.len().is_none_or(|n| n == 0)
    }

    pub fn items(&self) -> Option<Vec<Value>> {
        let len = self.len()?;
        Some((0..len).map(|i| self.at(i)).collect())
    }

    /// Stored state under this reference; subscribes to the whole subtree.
    pub fn snapshot(&self) -> Json {
        self.observe(true);
        self.model.with_node(&self.path, |node| node.cloned().unwrap_or(Json::Null))
    }

    fn compute(&self, name: &str, field: &ComputedField) -> Value {
        let depth = &self.model.inner.computing;
        if depth.get() >= MAX_COMPUTED_DEPTH {
            warn!(field = name, "computed field nesting too deep; reading as undefined");
            return Value::Undefined;
        }
        let program = match field.program() {
            Ok(program) => program,
            Err(error) => {
                warn!(field = name, %error, "computed field failed to parse");
                return Value::Undefined;
            }
        };
        let ctx = Context::new()
            .with("$root", self.model.root())
            .with("$self", self.clone());
        depth.set(depth.get() + 1);
        let result = program.run(&ctx);
        depth.set(depth.get() - 1);
        result.unwrap_or_else(|error| {
            warn!(field = name, %error, "computed field failed to evaluate");
            Value::Undefined
        })
    }
}

// --------------------------------- Tests ---------------------------------- //
