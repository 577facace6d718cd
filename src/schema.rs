//! Compiled model schemas.
//!
//! A [`Schema`] is an arena of [`TypeDescriptor`]s indexed by [`TypeId`].
//! Composite descriptors refer to their children by index, which is what
//! lets a schema refer to itself: `$ref` specs compile to
//! [`TypeKind::Ref`] placeholders that a second pass points at their
//! targets once every node has a slot.
//!
//! Schemas are immutable once compiled and are shared (`Rc<Schema>`) by
//! every model instance created from them.
pub mod compile;
pub mod describe;
pub mod spec;
pub mod validate;

use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use ordered_float::OrderedFloat;
use serde_json::Value;

pub use compile::compile;
pub use spec::{PropertySpec, SpecKind};

use crate::error::{ExprError, Result};
use crate::expr::Program;

// -------------------------------- Arena ----------------------------------- //

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) usize);

#[derive(Debug)]
pub struct Schema {
    types: Vec<TypeDescriptor>,
    root: TypeId,
}

#[derive(Debug)]
pub struct TypeDescriptor {
    /// Where the spec sits in the schema document (`#`, `#/properties/x`).
    pub pointer: String,
    pub presence: Presence,
    pub kind: TypeKind,
}

/// What absence means for a slot of this type.
#[derive(Clone, Debug, PartialEq)]
pub enum Presence {
    Required,
    Optional,
    Defaulted(Value),
}

#[derive(Debug)]
pub enum TypeKind {
    String,
    Number(Vec<Refinement>),
    Boolean,
    Array { items: TypeId },
    Object(ObjectType),
    Ref(TypeId),
    /// Degraded type for an unrecognized `kind`: accepts anything.
    Any { declared: String },
}

#[derive(Debug, Default)]
pub struct ObjectType {
    /// Stored fields, in declaration order.
    pub fields: IndexMap<String, TypeId>,
    /// Derived fields; never part of stored state.
    pub computed: IndexMap<String, ComputedField>,
}

// ------------------------------ Refinements ------------------------------- //

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Rule {
    AtLeast(OrderedFloat<f64>),
    AtMost(OrderedFloat<f64>),
}

impl Rule {
    pub fn rejects(&self, n: f64) -> bool {
        match self {
            Rule::AtLeast(min) => n < min.0,
            Rule::AtMost(max) => n > max.0,
        }
    }
}

/// A predicate plus the message reported when it rejects. Descriptors keep
/// them in evaluation order; the first rejecting one wins.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Refinement {
    pub rule: Rule,
    pub message: String,
}

impl Refinement {
    pub fn min(min: f64) -> Self {
        Self {
            rule: Rule::AtLeast(OrderedFloat(min)),
            message: format!("Value must be equal or greater than {min}"),
        }
    }

    pub fn max(max: f64) -> Self {
        Self {
            rule: Rule::AtMost(OrderedFloat(max)),
            message: format!("Value must be equal or lower than {max}"),
        }
    }
}

// ------------------------------- Computed --------------------------------- //

/// Lazy accessor for a computed field. The expression is parsed on first
/// use; a parse failure is remembered and reported on every read.
#[derive(Debug)]
pub struct ComputedField {
    pub expression: String,
    program: OnceCell<Result<Program, ExprError>>,
}

impl ComputedField {
    pub fn new(expression: impl Into<String>) -> Self {
        Self { expression: expression.into(), program: OnceCell::new() }
    }

    pub fn program(&self) -> Result<&Program, ExprError> {
        self.program
            .get_or_init(|| Program::parse(&self.expression))
            .as_ref()
            .map_err(Clone::clone)
    }
}

// --------------------------------- API ------------------------------------ //

impl Schema {
    /// Parse and compile a schema document.
    pub fn from_json(document: &Value) -> Result<Self> {
        let spec: PropertySpec = crate::path_de::from_value_with_path(document.clone())?;
        Ok(compile(&spec)?)
    }

    pub fn root(&self) -> TypeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn descriptor(&self, id: TypeId) -> &TypeDescriptor {
        &self.types[id.0]
    }

    /// Follow `Ref` links to the concrete type. Compilation guarantees the
    /// chain terminates.
    pub fn resolve(&self, mut id: TypeId) -> TypeId {
        for _ in 0..=self.types.len() {
            match self.types[id.0].kind {
                TypeKind::Ref(target) => id = target,
                _ => return id,
            }
        }
        id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.types[self.resolve(id).0].kind
    }

    pub fn object(&self, id: TypeId) -> Option<&ObjectType> {
        match self.kind(id) {
            TypeKind::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// The type of the node reached from `from` along `path`.
    pub fn type_at(&self, from: TypeId, path: &[crate::pointer::Seg]) -> Option<TypeId> {
        use crate::pointer::Seg;
        let mut id = from;
        for seg in path {
            id = match (self.kind(id), seg) {
                (TypeKind::Object(obj), Seg::Field(name)) => *obj.fields.get(name)?,
                (TypeKind::Array { items }, Seg::Index(_)) => *items,
                _ => return None,
            };
        }
        Some(id)
    }

    /// Short name of a type's kind, after following references.
    pub fn kind_name(&self, id: TypeId) -> &str {
        match self.kind(id) {
            TypeKind::String => "string",
            TypeKind::Number(_) => "number",
            TypeKind::Boolean => "boolean",
            TypeKind::Array { .. } => "array",
            TypeKind::Object(_) => "object",
            TypeKind::Ref(_) => "$ref",
            TypeKind::Any { .. } => "any",
        }
    }
}
