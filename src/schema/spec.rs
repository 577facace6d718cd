//! The model schema document: a tree of property specs.
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// One field's declared type and constraints.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawSpec")]
pub struct PropertySpec {
    pub optional: bool,
    pub default: Option<Value>,
    pub kind: SpecKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SpecKind {
    String,
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
    Array { items: Box<PropertySpec> },
    Computed { expression: String },
    Object { properties: IndexMap<String, PropertySpec> },
    /// `{"$ref": "#/..."}`, resolved after the whole document is compiled.
    Ref { pointer: String },
    /// Any `kind` outside the fixed set.
    Unknown { kind: String },
}

impl PropertySpec {
    pub fn new(kind: SpecKind) -> Self {
        Self { optional: true, default: None, kind }
    }

    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, PropertySpec)>,
        K: Into<String>,
    {
        Self::new(SpecKind::Object {
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        })
    }
}

// ------------------------------ Wire format -------------------------------- //

#[derive(Deserialize)]
struct RawSpec {
    #[serde(alias = "type")]
    kind: Option<String>,
    optional: Option<bool>,
    default: Option<Value>,
    min: Option<f64>,
    max: Option<f64>,
    items: Option<Box<PropertySpec>>,
    expression: Option<String>,
    #[serde(default)]
    properties: IndexMap<String, PropertySpec>,
    #[serde(rename = "$ref")]
    reference: Option<String>,
}

impl TryFrom<RawSpec> for PropertySpec {
    type Error = String;

    fn try_from(raw: RawSpec) -> Result<Self, Self::Error> {
        let kind = match (raw.reference, raw.kind.as_deref()) {
            (Some(pointer), _) => SpecKind::Ref { pointer },
            (None, Some("string")) => SpecKind::String,
            (None, Some("number")) => SpecKind::Number { min: raw.min, max: raw.max },
            (None, Some("boolean")) => SpecKind::Boolean,
            (None, Some("array")) => SpecKind::Array {
                items: raw.items.ok_or("array property is missing `items`")?,
            },
            (None, Some("computed")) => SpecKind::Computed {
                expression: raw.expression.ok_or("computed property is missing `expression`")?,
            },
            (None, Some("object") | None) => SpecKind::Object { properties: raw.properties },
            (None, Some(other)) => SpecKind::Unknown { kind: other.to_string() },
        };
        Ok(PropertySpec {
            optional: raw.optional.unwrap_or(true),
            // `null` and a missing default mean the same thing
            default: raw.default.filter(|v| !v.is_null()),
            kind,
        })
    }
}
