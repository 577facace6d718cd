//! Checking and normalizing values against descriptors.
//!
//! `instantiate` produces the value actually stored: defaults filled in,
//! undeclared object members dropped, absent optionals left out.
use serde_json::{Map, Value};

use super::{Presence, Schema, TypeId, TypeKind};
use crate::error::ValidationError;
use crate::pointer::Seg;

impl Schema {
    /// Validate a value standing in a slot of type `id`. `None` (or `null`)
    /// is absence, which the slot's presence rule decides about.
    pub fn instantiate_slot(
        &self,
        id: TypeId,
        value: Option<&Value>,
        at: &[Seg],
    ) -> Result<Option<Value>, ValidationError> {
        match value.filter(|v| !v.is_null()) {
            Some(v) => self.instantiate(id, v, at).map(Some),
            None => match &self.descriptor(id).presence {
                _ if matches!(self.kind(id), TypeKind::Any { .. }) => Ok(value.cloned()),
                Presence::Defaulted(default) => self.instantiate(id, default, at).map(Some),
                Presence::Optional => Ok(None),
                Presence::Required => Err(ValidationError::new(at, "value is required")),
            },
        }
    }

    /// Validate a present value against type `id`.
    pub fn instantiate(&self, id: TypeId, value: &Value, at: &[Seg]) -> Result<Value, ValidationError> {
        let mismatch = |expected: &str| {
            ValidationError::new(at, format!("expected {expected}, got {}", json_kind(value)))
        };
        match self.kind(id) {
            TypeKind::Any { .. } => Ok(value.clone()),
            TypeKind::String => value.is_string().then(|| value.clone()).ok_or_else(|| mismatch("string")),
            TypeKind::Boolean => value.is_boolean().then(|| value.clone()).ok_or_else(|| mismatch("boolean")),
            TypeKind::Number(refinements) => {
                let n = value.as_f64().ok_or_else(|| mismatch("number"))?;
                match refinements.iter().find(|r| r.rule.rejects(n)) {
                    Some(refinement) => Err(ValidationError::new(at, refinement.message.clone())),
                    None => Ok(value.clone()),
                }
            }
            TypeKind::Array { items } => {
                let elements = value.as_array().ok_or_else(|| mismatch("array"))?;
                let mut out = Vec::with_capacity(elements.len());
                let mut path = at.to_vec();
                for (index, element) in elements.iter().enumerate() {
                    path.push(Seg::Index(index));
                    out.push(self.instantiate_slot(*items, Some(element), &path)?.unwrap_or(Value::Null));
                    path.pop();
                }
                Ok(Value::Array(out))
            }
            TypeKind::Object(object) => {
                let members = value.as_object().ok_or_else(|| mismatch("object"))?;
                let mut out = Map::new();
                let mut path = at.to_vec();
                for (name, field) in &object.fields {
                    path.push(Seg::Field(name.clone()));
                    if let Some(v) = self.instantiate_slot(*field, members.get(name), &path)? {
                        out.insert(name.clone(), v);
                    }
                    path.pop();
                }
                Ok(Value::Object(out))
            }
            TypeKind::Ref(_) => Err(ValidationError::new(at, "unresolved type reference")),
        }
    }
}

pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(v: Value) -> Schema {
        Schema::from_json(&v).unwrap()
    }

    #[test]
    fn first_violated_rule_wins() {
        let s = schema(json!({"kind": "number", "min": 0, "max": 10}));
        let err = s.instantiate(s.root(), &json!(11), &[]).unwrap_err();
        assert_eq!(err.message, "Value must be equal or lower than 10");
        let err = s.instantiate(s.root(), &json!(-1), &[]).unwrap_err();
        assert_eq!(err.message, "Value must be equal or greater than 0");
        assert_eq!(s.instantiate(s.root(), &json!(5), &[]), Ok(json!(5)));
    }

    #[test]
    fn objects_fill_defaults_and_drop_undeclared_members() {
        let s = schema(json!({"properties": {
            "name": {"kind": "string", "optional": false},
            "count": {"kind": "number", "default": 1},
            "note": {"kind": "string"},
            "total": {"kind": "computed", "expression": "$self.count"}
        }}));
        let out = s
            .instantiate(s.root(), &json!({"name": "x", "extra": true, "total": 9}), &[])
            .unwrap();
        assert_eq!(out, json!({"name": "x", "count": 1}));
    }

    #[test]
    fn missing_required_field_reports_its_path() {
        let s = schema(json!({"properties": {
            "items": {"kind": "array", "items": {"properties": {
                "title": {"kind": "string", "optional": false}
            }}}
        }}));
        let err = s.instantiate(s.root(), &json!({"items": [{"title": "a"}, {}]}), &[]).unwrap_err();
        assert_eq!(err.to_string(), "/items/1/title: value is required");
    }

    #[test]
    fn optional_array_items_store_null() {
        let s = schema(json!({"kind": "array", "items": {"kind": "string"}}));
        assert_eq!(s.instantiate(s.root(), &json!(["a", null]), &[]), Ok(json!(["a", null])));
        let err = s.instantiate(s.root(), &json!(["a", 1]), &[]).unwrap_err();
        assert_eq!(err.to_string(), "/1: expected string, got number");
    }

    #[test]
    fn any_accepts_everything() {
        let s = schema(json!({"properties": {"blob": {"kind": "mystery", "optional": false}}}));
        assert_eq!(s.instantiate(s.root(), &json!({}), &[]), Ok(json!({})));
        assert_eq!(
            s.instantiate(s.root(), &json!({"blob": [1, {"x": 2}]}), &[]),
            Ok(json!({"blob": [1, {"x": 2}]}))
        );
    }
}
