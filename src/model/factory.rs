//! Turning a compiled schema plus initial JSON into a live model.
use std::rc::Rc;

use serde_json::{Map, Value as Json};
use tracing::debug;

use super::ModelInstance;
use crate::error::ValidationError;
use crate::reactive::Runtime;
use crate::schema::{Presence, Rule, Schema, TypeId, TypeKind};

/// Creates model instances bound to one reactive runtime.
#[derive(Clone, Debug, Default)]
pub struct TypeInstanceFactory {
    runtime: Runtime,
}

impl TypeInstanceFactory {
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Instantiate the schema's root type.
    pub fn create(&self, schema: &Rc<Schema>, initial: &Json) -> Result<ModelInstance, ValidationError> {
        self.create_typed(schema, schema.root(), initial)
    }

    /// Instantiate any object type of the schema. Missing required fields
    /// fail; members the type does not declare are ignored.
    pub fn create_typed(
        &self,
        schema: &Rc<Schema>,
        ty: TypeId,
        initial: &Json,
    ) -> Result<ModelInstance, ValidationError> {
        if schema.object(ty).is_none() {
            return Err(ValidationError::new(
                &[],
                format!("a model needs an object type, not {}", schema.kind_name(ty)),
            ));
        }
        let data = schema.instantiate(ty, initial, &[])?;
        let model = ModelInstance::new(schema.clone(), ty, data, self.runtime.clone());
        debug!(model = ?model.id(), pointer = %schema.descriptor(ty).pointer, "model created");
        Ok(model)
    }

    pub fn describe(&self, schema: &Schema, ty: TypeId) -> String {
        schema.describe(ty)
    }
}

/// The smallest value `create_typed(schema, ty, _)` accepts: required fields
/// only, each at its zero value (numbers clamped into their bounds).
/// Compilation rejects required fields that cycle back to their own object,
/// so the recursion ends.
pub fn minimal_value(schema: &Schema, ty: TypeId) -> Json {
    match schema.kind(ty) {
        TypeKind::String => Json::from(""),
        TypeKind::Boolean => Json::from(false),
        TypeKind::Any { .. } => Json::Null,
        TypeKind::Array { .. } => Json::Array(Vec::new()),
        TypeKind::Number(refinements) => {
            let mut n = 0.0_f64;
            for refinement in refinements {
                match refinement.rule {
                    Rule::AtLeast(min) => n = n.max(min.0),
                    Rule::AtMost(max) => n = n.min(max.0),
                }
            }
            crate::expr::value::json_num_pref_i64(n)
        }
        TypeKind::Object(object) => {
            let mut out = Map::new();
            for (name, field) in &object.fields {
                if schema.descriptor(*field).presence == Presence::Required {
                    out.insert(name.clone(), minimal_value(schema, *field));
                }
            }
            Json::Object(out)
        }
        TypeKind::Ref(_) => Json::Null,
    }
}

// --------------------------------- Tests ---------------------------------- //
