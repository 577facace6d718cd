use indexmap::IndexMap;

use crate::error::ExprError;
use crate::model::ModelRef;

/// Runtime value of an expression.
///
/// `Undefined` is "absent" (a missing field, a failed binding) and is kept
/// apart from JSON `null`. `Model` is a live reference into a model
/// instance: member access through it is tracked by the reactive runtime
/// and it can be the target of a patch.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Model(ModelRef),
}

impl Value {
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(xs) => Value::List(xs.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(m) => {
                Value::Map(m.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect())
            }
        }
    }

    /// `Undefined` serializes as `null`; model references as their snapshot.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => json_num_pref_i64(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(xs) => serde_json::Value::Array(xs.iter().map(Value::to_json).collect()),
            Value::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Model(r) => r.snapshot(),
        }
    }

    /// Like [`Value::to_json`], but keeps `Undefined` distinguishable.
    pub fn to_json_opt(&self) -> Option<serde_json::Value> {
        match self {
            Value::Undefined => None,
            other => Some(other.to_json()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Model(r) if r.is_array() => "model array",
            Value::Model(_) => "model",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) | Value::Model(_) => true,
        }
    }

    /// Member access. Anything without the member yields `Undefined`.
    pub fn member(&self, name: &str) -> Value {
        match self {
            Value::Map(m) => m.get(name).cloned().unwrap_or_default(),
            Value::Model(r) => r.get(name),
            _ => Value::Undefined,
        }
    }

    pub fn index(&self, index: &Value) -> Result<Value, ExprError> {
        match (self, index) {
            (Value::Undefined | Value::Null, _) => Ok(Value::Undefined),
            (Value::List(xs), Value::Number(n)) => Ok(position(*n)
                .and_then(|i| xs.get(i).cloned())
                .unwrap_or_default()),
            (Value::Model(r), Value::Number(n)) if r.is_array() => {
                Ok(position(*n).map(|i| r.at(i)).unwrap_or_default())
            }
            (Value::Map(_) | Value::Model(_), Value::String(name)) => Ok(self.member(name)),
            (target, index) => Err(ExprError::NotIndexable {
                target: target.kind(),
                index: index.kind(),
            }),
        }
    }

    /// The elements of a list-like value, `None` for anything else.
    pub fn items(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(xs) => Some(xs.clone()),
            Value::Model(r) => r.items(),
            _ => None,
        }
    }

    /// Subscribe the current observer to every model subtree this value
    /// exposes. Used when a value is handed to the host as-is.
    pub fn observe_deep(&self) {
        match self {
            Value::Model(r) => r.observe_deep(),
            Value::List(xs) => xs.iter().for_each(Value::observe_deep),
            Value::Map(m) => m.values().for_each(Value::observe_deep),
            _ => {}
        }
    }

    /// Text form used by string concatenation and `string()`.
    pub fn display(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::String(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }
}

fn position(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

/// Prefer emitting integers when exact.
pub fn json_num_pref_i64(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ModelRef> for Value {
    fn from(r: ModelRef) -> Self {
        Value::Model(r)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        Value::from_json(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip_prefers_integers() {
        let v = Value::from_json(&json!({"count": 5, "ratio": 0.5, "tags": ["a"]}));
        assert_eq!(v.member("count"), Value::Number(5.0));
        assert_eq!(v.to_json(), json!({"count": 5, "ratio": 0.5, "tags": ["a"]}));
    }

    #[test]
    fn truthiness_follows_script_rules() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::List(vec![]).is_truthy());
    }

    #[test]
    fn indexing_absent_or_out_of_range_is_undefined() {
        let list = Value::from_json(&json!([1, 2]));
        assert_eq!(list.index(&Value::Number(1.0)), Ok(Value::Number(2.0)));
        assert_eq!(list.index(&Value::Number(9.0)), Ok(Value::Undefined));
        assert_eq!(Value::Undefined.index(&Value::Number(0.0)), Ok(Value::Undefined));
        assert!(Value::Bool(true).index(&Value::Number(0.0)).is_err());
    }
}
