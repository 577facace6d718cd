//! Error kinds, one enum per concern, unified by [`Error`].
use thiserror::Error;

use crate::pointer::{self, Seg};

// ------------------------------- Schema ----------------------------------- //

/// Failures that stop a schema from compiling.
///
/// An unrecognized `kind` is *not* one of these: it degrades to an `any`
/// type with a warning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("{at}: reference `{target}` does not point at a property spec")]
    UnresolvedRef { at: String, target: String },
    #[error("{at}: reference `{target}` points at a computed property")]
    RefToComputed { at: String, target: String },
    #[error("{at}: reference chain never reaches a concrete type")]
    RefCycle { at: String },
    #[error("{at}: required properties lead back to this object, so no finite value satisfies it")]
    RequiredCycle { at: String },
    #[error("{at}: default value is invalid: {reason}")]
    InvalidDefault { at: String, reason: ValidationError },
}

/// A value rejected by a type descriptor. The prior state is never touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", located(.path, .message))]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: &[Seg], message: impl Into<String>) -> Self {
        Self { path: pointer::format(path), message: message.into() }
    }
}

fn located(path: &str, message: &str) -> String {
    if path.is_empty() { message.to_string() } else { format!("{path}: {message}") }
}

// -------------------------------- Patch ----------------------------------- //

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatchError {
    #[error("invalid patch path `{0}`")]
    InvalidPointer(String),
    #[error("nothing exists at `{0}`")]
    PathNotFound(String),
    #[error("`{0}` is not a declared field")]
    UnknownField(String),
    #[error("`{0}` is a computed field and cannot be patched")]
    ComputedField(String),
    #[error("`{0}` is not a valid array position")]
    InvalidIndex(String),
    #[error("`{0}` is not an object or array")]
    NotAContainer(String),
    #[error("`{0}` can only be replaced as a whole")]
    WholeTarget(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// ------------------------------ Expressions ------------------------------- //

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("parse error at offset {at} in `{expression}`: {message}")]
    Parse { expression: String, at: usize, message: String },
    #[error("cannot apply `{op}` to {left} and {right}")]
    TypeMismatch { op: String, left: &'static str, right: &'static str },
    #[error("cannot apply `{op}` to {operand}")]
    UnaryMismatch { op: String, operand: &'static str },
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("`{function}` expects {expected} argument(s), got {found}")]
    Arity { function: String, expected: String, found: usize },
    #[error("{0}")]
    Arithmetic(String),
    #[error("cannot index {target} with {index}")]
    NotIndexable { target: &'static str, index: &'static str },
    #[error("expected {expected}, got {found}")]
    Shape { expected: String, found: String },
}

// ------------------------------- Documents -------------------------------- //

/// A JSON document that does not match the shape it was read as.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("at JSON path {path} → {message}")]
pub struct DocumentError {
    pub path: String,
    pub message: String,
}

// -------------------------------- Actions --------------------------------- //

/// Driving a mounted view from the outside (`--fire button.onClick`).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("`{0}` is not of the form TAG.PROP")]
    BadTarget(String),
    #[error("no `{0}` element is rendered")]
    NoElement(String),
    #[error("`{tag}` has no `{prop}` event handler")]
    NoHandler { tag: String, prop: String },
}

// -------------------------------- Unified --------------------------------- //

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Action(#[from] ActionError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
