//! Property spec → type arena.
//!
//! Pass 1 walks the spec tree, giving every stored node a slot keyed by its
//! document pointer; `$ref` nodes get a placeholder. Pass 2 points each
//! placeholder at its target and rejects chains that never reach a concrete
//! type. Defaults are validated last, when every type is complete.
use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::{ComputedField, ObjectType, Presence, Refinement, Schema, TypeDescriptor, TypeId, TypeKind};
use super::spec::{PropertySpec, SpecKind};
use crate::error::CompileError;
use crate::pointer;

const PLACEHOLDER: TypeId = TypeId(usize::MAX);

pub fn compile(spec: &PropertySpec) -> Result<Schema, CompileError> {
    let mut compiler = Compiler::default();
    let root = compiler.node(spec, "#".to_string())?;
    compiler.link()?;
    let schema = Schema { types: compiler.types, root };
    check_defaults(&schema)?;
    Ok(schema)
}

#[derive(Default)]
struct Compiler {
    types: Vec<TypeDescriptor>,
    by_pointer: HashMap<String, TypeId>,
    computed: HashSet<String>,
    pending: Vec<(TypeId, String)>,
}

impl Compiler {
    fn push(&mut self, pointer: String, presence: Presence, kind: TypeKind) -> TypeId {
        let id = TypeId(self.types.len());
        self.by_pointer.insert(pointer.clone(), id);
        self.types.push(TypeDescriptor { pointer, presence, kind });
        id
    }

    fn node(&mut self, spec: &PropertySpec, at: String) -> Result<TypeId, CompileError> {
        let presence = presence(spec, &at);
        let id = match &spec.kind {
            SpecKind::String => self.push(at, presence, TypeKind::String),
            SpecKind::Boolean => self.push(at, presence, TypeKind::Boolean),
            SpecKind::Number { min, max } => {
                // order matters: the min check reports first
                let mut refinements = Vec::new();
                if let Some(min) = min {
                    refinements.push(Refinement::min(*min));
                }
                if let Some(max) = max {
                    refinements.push(Refinement::max(*max));
                }
                self.push(at, presence, TypeKind::Number(refinements))
            }
            SpecKind::Array { items } => {
                let id = self.push(at.clone(), presence, TypeKind::Array { items: PLACEHOLDER });
                let items_id = self.node(items, format!("{at}/items"))?;
                self.types[id.0].kind = TypeKind::Array { items: items_id };
                id
            }
            SpecKind::Object { properties } => {
                let id = self.push(at.clone(), presence, TypeKind::Object(ObjectType::default()));
                let mut object = ObjectType::default();
                for (name, prop) in properties {
                    let child_at = format!("{at}/properties/{}", pointer::escape(name));
                    match &prop.kind {
                        SpecKind::Computed { expression } => {
                            self.computed.insert(child_at);
                            object.computed.insert(name.clone(), ComputedField::new(expression.clone()));
                        }
                        _ => {
                            let child = self.node(prop, child_at)?;
                            object.fields.insert(name.clone(), child);
                        }
                    }
                }
                self.types[id.0].kind = TypeKind::Object(object);
                id
            }
            SpecKind::Ref { pointer } => {
                let id = self.push(at, presence, TypeKind::Ref(PLACEHOLDER));
                self.pending.push((id, pointer.clone()));
                id
            }
            SpecKind::Computed { expression } => {
                // only reachable as a root or array item; there is no object
                // to hang the accessor on, so it degrades like an unknown kind
                warn!(pointer = %at, %expression, "computed property outside an object; treating as `any`");
                self.push(at, presence, TypeKind::Any { declared: "computed".into() })
            }
            SpecKind::Unknown { kind } => {
                warn!(pointer = %at, %kind, "unknown property kind; compiling to a no-op type");
                self.push(at, presence, TypeKind::Any { declared: kind.clone() })
            }
        };
        Ok(id)
    }

    fn link(&mut self) -> Result<(), CompileError> {
        for (id, target) in std::mem::take(&mut self.pending) {
            let at = self.types[id.0].pointer.clone();
            let key = normalize(&target);
            let Some(resolved) = self.by_pointer.get(&key).copied() else {
                return Err(if self.computed.contains(&key) {
                    CompileError::RefToComputed { at, target }
                } else {
                    CompileError::UnresolvedRef { at, target }
                });
            };
            self.types[id.0].kind = TypeKind::Ref(resolved);
        }
        for (index, ty) in self.types.iter().enumerate() {
            if matches!(ty.kind, TypeKind::Ref(_)) && !self.terminates(TypeId(index)) {
                return Err(CompileError::RefCycle { at: ty.pointer.clone() });
            }
        }
        if let Some(id) = self.unsatisfiable() {
            return Err(CompileError::RequiredCycle { at: self.types[id.0].pointer.clone() });
        }
        Ok(())
    }

    /// The first object type with no finite instance: every way down its
    /// required fields returns to an object already on the way.
    fn unsatisfiable(&self) -> Option<TypeId> {
        let mut satisfiable: Vec<bool> =
            self.types.iter().map(|ty| !matches!(ty.kind, TypeKind::Object(_))).collect();
        loop {
            let mut changed = false;
            for (index, ty) in self.types.iter().enumerate() {
                let TypeKind::Object(object) = &ty.kind else { continue };
                if satisfiable[index] {
                    continue;
                }
                let ready = object.fields.values().all(|field| {
                    self.types[field.0].presence != Presence::Required || satisfiable[self.target(*field).0]
                });
                if ready {
                    satisfiable[index] = true;
                    changed = true;
                }
            }
            if !changed {
                return satisfiable.iter().position(|ok| !ok).map(TypeId);
            }
        }
    }

    fn target(&self, mut id: TypeId) -> TypeId {
        while let TypeKind::Ref(next) = self.types[id.0].kind {
            id = next;
        }
        id
    }

    fn terminates(&self, mut id: TypeId) -> bool {
        for _ in 0..=self.types.len() {
            match self.types[id.0].kind {
                TypeKind::Ref(next) => id = next,
                _ => return true,
            }
        }
        false
    }
}

/// `#`, `#/a`, `/a` and `` all name nodes of the same document.
fn normalize(target: &str) -> String {
    let rest = target.strip_prefix('#').unwrap_or(target);
    format!("#{}", rest.trim_end_matches('/'))
}

fn presence(spec: &PropertySpec, at: &str) -> Presence {
    match (spec.optional, &spec.default) {
        (false, Some(_)) => {
            debug!(pointer = %at, "default on a required property is ignored");
            Presence::Required
        }
        (false, None) => Presence::Required,
        (true, Some(default)) => Presence::Defaulted(default.clone()),
        (true, None) => Presence::Optional,
    }
}

fn check_defaults(schema: &Schema) -> Result<(), CompileError> {
    for (index, ty) in schema.types.iter().enumerate() {
        if let Presence::Defaulted(default) = &ty.presence {
            schema
                .instantiate(TypeId(index), default, &[])
                .map_err(|reason| CompileError::InvalidDefault { at: ty.pointer.clone(), reason })?;
        }
    }
    Ok(())
}

// --------------------------------- Tests ---------------------------------- //

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile_json(v: serde_json::Value) -> Result<Schema, CompileError> {
        let spec: PropertySpec = serde_json::from_value(v).unwrap();
        compile(&spec)
    }

    #[test]
    fn object_partitions_stored_and_computed_fields() {
        let schema = compile_json(json!({
            "properties": {
                "count": {"kind": "number"},
                "double": {"kind": "computed", "expression": "$self.count * 2"},
                "label": {"kind": "string"}
            }
        }))
        .unwrap();
        let root = schema.object(schema.root()).unwrap();
        assert_eq!(root.fields.keys().collect::<Vec<_>>(), ["count", "label"]);
        assert_eq!(root.computed.keys().collect::<Vec<_>>(), ["double"]);
    }

    #[test]
    fn number_refinements_keep_min_before_max() {
        let schema = compile_json(json!({"kind": "number", "min": 0, "max": 10})).unwrap();
        let TypeKind::Number(refinements) = schema.kind(schema.root()) else { panic!() };
        assert_eq!(refinements, &vec![Refinement::min(0.0), Refinement::max(10.0)]);
        assert_eq!(refinements[0].message, "Value must be equal or greater than 0");
        assert_eq!(refinements[1].message, "Value must be equal or lower than 10");
    }

    #[test]
    fn self_reference_resolves_to_the_root() {
        let schema = compile_json(json!({
            "properties": {
                "name": {"kind": "string"},
                "children": {"kind": "array", "items": {"$ref": "#"}}
            }
        }))
        .unwrap();
        let root = schema.root();
        let children = schema.object(root).unwrap().fields["children"];
        let TypeKind::Array { items } = schema.kind(children) else { panic!() };
        assert_eq!(schema.resolve(*items), root);
    }

    #[test]
    fn forward_references_resolve_in_the_second_pass() {
        let schema = compile_json(json!({
            "properties": {
                "best": {"$ref": "#/properties/people/items"},
                "people": {"kind": "array", "items": {"properties": {"age": {"kind": "number"}}}}
            }
        }))
        .unwrap();
        let best = schema.object(schema.root()).unwrap().fields["best"];
        assert_eq!(schema.kind_name(best), "object");
    }

    #[test]
    fn required_fields_cycling_back_to_their_object_fail_compilation() {
        let err = compile_json(json!({"properties": {
            "name": {"kind": "string", "optional": false},
            "parent": {"$ref": "#", "optional": false}
        }}))
        .unwrap_err();
        assert_eq!(err, CompileError::RequiredCycle { at: "#".into() });

        // through a second object
        let err = compile_json(json!({"properties": {
            "a": {"optional": false, "properties": {
                "b": {"optional": false, "properties": {"up": {"$ref": "#/properties/a", "optional": false}}}
            }}
        }}))
        .unwrap_err();
        assert!(matches!(err, CompileError::RequiredCycle { .. }), "{err}");

        // an optional link or an array breaks the cycle
        for link in [
            json!({"$ref": "#"}),
            json!({"kind": "array", "optional": false, "items": {"$ref": "#"}}),
        ] {
            assert!(compile_json(json!({"properties": {"name": {"kind": "string"}, "next": link}})).is_ok());
        }
    }

    #[test]
    fn bad_references_fail_compilation() {
        assert!(matches!(
            compile_json(json!({"properties": {"a": {"$ref": "#/properties/zzz"}}})),
            Err(CompileError::UnresolvedRef { .. })
        ));
        assert!(matches!(
            compile_json(json!({"properties": {
                "c": {"kind": "computed", "expression": "1"},
                "a": {"$ref": "#/properties/c"}
            }})),
            Err(CompileError::RefToComputed { .. })
        ));
        assert!(matches!(
            compile_json(json!({"properties": {
                "a": {"$ref": "#/properties/b"},
                "b": {"$ref": "#/properties/a"}
            }})),
            Err(CompileError::RefCycle { .. })
        ));
    }

    #[test]
    fn unknown_kind_degrades_to_any() {
        let schema = compile_json(json!({"properties": {"when": {"kind": "date"}}})).unwrap();
        let when = schema.object(schema.root()).unwrap().fields["when"];
        assert!(matches!(schema.kind(when), TypeKind::Any { declared } if declared == "date"));
    }

    #[test]
    fn invalid_default_fails_compilation() {
        let err = compile_json(json!({"properties": {
            "count": {"kind": "number", "max": 3, "default": 7}
        }}))
        .unwrap_err();
        match err {
            CompileError::InvalidDefault { at, reason } => {
                assert_eq!(at, "#/properties/count");
                assert_eq!(reason.message, "Value must be equal or lower than 3");
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn specs_built_in_code_compile_like_documents() {
        let spec = PropertySpec::object([
            ("name", PropertySpec::new(SpecKind::String).required()),
            ("size", PropertySpec::new(SpecKind::Number { min: Some(1.0), max: None }).with_default(json!(1))),
        ]);
        let schema = compile(&spec).unwrap();
        let fields = &schema.object(schema.root()).unwrap().fields;
        assert_eq!(schema.descriptor(fields["name"]).presence, Presence::Required);
        assert_eq!(schema.descriptor(fields["size"]).presence, Presence::Defaulted(json!(1)));
        assert_eq!(schema.descriptor(fields["size"]).pointer, "#/properties/size");
    }

    #[test]
    fn presence_follows_optional_and_default() {
        let schema = compile_json(json!({"properties": {
            "a": {"kind": "string", "optional": false, "default": "x"},
            "b": {"kind": "string"},
            "c": {"kind": "boolean", "default": false}
        }}))
        .unwrap();
        let fields = &schema.object(schema.root()).unwrap().fields;
        assert_eq!(schema.descriptor(fields["a"]).presence, Presence::Required);
        assert_eq!(schema.descriptor(fields["b"]).presence, Presence::Optional);
        assert_eq!(schema.descriptor(fields["c"]).presence, Presence::Defaulted(json!(false)));
    }
}
