//! What resolution produces, and the plain tree handed to the host.
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value as Json;
use tracing::error;

use crate::error::{ExprError, Result};
use crate::expr::{Context, Evaluator, Value};
use crate::model::{Patch, PatchOp};
use crate::reactive::{Change, ObserverId};

pub type BoundaryId = ObserverId;

pub type Props = IndexMap<String, Rendered>;

// -------------------------------- Rendered -------------------------------- //

/// The result of resolving one view node. Elements and collections are
/// their own reactive boundaries and appear here only by id.
#[derive(Clone, Debug)]
pub enum Rendered {
    Value(Value),
    Handler(EventHandler),
    Sequence(Vec<Rendered>),
    Host(HostElement),
    Boundary(BoundaryId),
    Opaque(Json),
}

#[derive(Clone, Debug)]
pub struct HostElement {
    pub tag: String,
    pub props: Props,
}

impl Rendered {
    /// Subscribe the current observer to every model value this output
    /// hands to the host.
    pub fn observe_deep(&self) {
        match self {
            Rendered::Value(value) => value.observe_deep(),
            Rendered::Sequence(items) => items.iter().for_each(Rendered::observe_deep),
            Rendered::Host(host) => host.props.values().for_each(Rendered::observe_deep),
            Rendered::Handler(_) | Rendered::Boundary(_) | Rendered::Opaque(_) => {}
        }
    }
}

impl From<Value> for Rendered {
    fn from(value: Value) -> Self {
        Rendered::Value(value)
    }
}

impl From<&str> for Rendered {
    fn from(text: &str) -> Self {
        Rendered::Value(Value::from(text))
    }
}

// ----------------------------- Event handlers ----------------------------- //

/// A `%expr` binding, closed over the context it was resolved in.
#[derive(Clone)]
pub struct EventHandler {
    expression: String,
    context: Context,
    evaluator: Rc<dyn Evaluator>,
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler").field("expression", &self.expression).finish()
    }
}

impl EventHandler {
    pub fn new(expression: impl Into<String>, context: Context, evaluator: Rc<dyn Evaluator>) -> Self {
        Self { expression: expression.into(), context, evaluator }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Fire the handler. Failures are logged and leave every model as it
    /// was; returns whether a patch was applied.
    pub fn invoke(&self, event: Value) -> bool {
        match self.try_invoke(event) {
            Ok(_) => true,
            Err(error) => {
                error!(expression = %self.expression, %error, "event handler failed");
                false
            }
        }
    }

    /// Evaluate against `context ∪ {$event}`; the result must be
    /// `(target, op, path)` or `(target, op, path, value)`.
    pub fn try_invoke(&self, event: Value) -> Result<Change> {
        let context = self.context.with("$event", event);
        let result = self.evaluator.evaluate(&self.expression, &context)?;
        let shape = |found: &Value| ExprError::Shape {
            expected: "(target, op, path, value?)".into(),
            found: found.kind().into(),
        };
        let Value::List(parts) = &result else {
            return Err(shape(&result).into());
        };
        let (target, op, path, value) = match parts.as_slice() {
            [Value::Model(target), Value::String(op), Value::String(path)] => (target, op, path, None),
            [Value::Model(target), Value::String(op), Value::String(path), value] => {
                (target, op, path, value.to_json_opt())
            }
            _ => return Err(shape(&result).into()),
        };
        let op = PatchOp::parse(op).ok_or_else(|| ExprError::Shape {
            expected: "one of add, replace, remove".into(),
            found: format!("`{op}`"),
        })?;
        Ok(target.apply(&Patch { op, path: path.clone(), value })?)
    }
}

// ------------------------------- Host tree -------------------------------- //

/// Fully materialized output: owned, boundary-free.
#[derive(Clone, Debug)]
pub enum RenderTree {
    Data(Json),
    Handler(EventHandler),
    Fragment(Vec<RenderTree>),
    Element { tag: String, props: IndexMap<String, RenderTree> },
}

impl RenderTree {
    /// Elements as `{"<>": tag, ...props}`, handlers as `"%expr"`.
    pub fn to_json(&self) -> Json {
        match self {
            RenderTree::Data(data) => data.clone(),
            RenderTree::Handler(handler) => Json::String(format!("%{}", handler.expression())),
            RenderTree::Fragment(items) => Json::Array(items.iter().map(RenderTree::to_json).collect()),
            RenderTree::Element { tag, props } => {
                let mut out = serde_json::Map::new();
                out.insert("<>".to_string(), Json::String(tag.clone()));
                for (name, prop) in props {
                    out.insert(name.clone(), prop.to_json());
                }
                Json::Object(out)
            }
        }
    }

    /// First element with `tag`, depth-first.
    pub fn find(&self, tag: &str) -> Option<&RenderTree> {
        match self {
            RenderTree::Element { tag: own, .. } if own == tag => Some(self),
            RenderTree::Element { props, .. } => props.values().find_map(|p| p.find(tag)),
            RenderTree::Fragment(items) => items.iter().find_map(|i| i.find(tag)),
            RenderTree::Data(_) | RenderTree::Handler(_) => None,
        }
    }

    pub fn prop(&self, name: &str) -> Option<&RenderTree> {
        match self {
            RenderTree::Element { props, .. } => props.get(name),
            _ => None,
        }
    }

    pub fn handler(&self, name: &str) -> Option<&EventHandler> {
        match self.prop(name)? {
            RenderTree::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&Json> {
        match self {
            RenderTree::Data(data) => Some(data),
            _ => None,
        }
    }
}
