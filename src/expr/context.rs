use std::rc::Rc;

use indexmap::IndexMap;

use super::Value;
use crate::model::ModelInstance;

/// Names visible to an expression (`$root`, `$self`, `$index`, `$event`, …).
///
/// Immutable: entering a collection scope or invoking a handler derives a
/// new context with [`Context::with`]; the parent stays as it was.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Context {
    scope: Rc<IndexMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{ $root: model, $self: model }`.
    pub fn root(model: &ModelInstance) -> Self {
        let root = Value::Model(model.root());
        Self::new().with("$root", root.clone()).with("$self", root)
    }

    /// Top-level members of a JSON object become names.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let scope = value
            .as_object()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect())
            .unwrap_or_default();
        Self { scope: Rc::new(scope) }
    }

    pub fn with(&self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut scope = (*self.scope).clone();
        scope.insert(name.into(), value.into());
        Self { scope: Rc::new(scope) }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scope.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scope.keys().map(String::as_str)
    }
}
