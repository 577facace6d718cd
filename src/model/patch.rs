//! Single-operation patches, the only write path into a model.
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use super::ModelRef;
use crate::error::{PatchError, ValidationError};
use crate::pointer::{self, Seg};
use crate::reactive::Change;
use crate::schema::{TypeId, TypeKind};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

impl PatchOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "add" => Some(PatchOp::Add),
            "replace" => Some(PatchOp::Replace),
            "remove" => Some(PatchOp::Remove),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOp::Add => "add",
            PatchOp::Replace => "replace",
            PatchOp::Remove => "remove",
        }
    }
}

/// `{op, path, value?}`, with `path` a JSON Pointer relative to the model
/// reference the patch is applied to. `-` as the last token of an array path
/// appends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,
}

impl Patch {
    pub fn add(path: impl Into<String>, value: Json) -> Self {
        Self { op: PatchOp::Add, path: path.into(), value: Some(value) }
    }

    pub fn replace(path: impl Into<String>, value: Json) -> Self {
        Self { op: PatchOp::Replace, path: path.into(), value: Some(value) }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self { op: PatchOp::Remove, path: path.into(), value: None }
    }
}

/// The mutation a patch boils down to once it has been validated.
enum Edit {
    Set(Json),
    Unset,
    Insert(usize, Json),
    Delete(usize),
}

impl ModelRef {
    /// Validate and apply one patch. On any error the model is untouched.
    /// On success, every boundary the change affects is marked pending.
    pub fn apply(&self, patch: &Patch) -> Result<Change, PatchError> {
        let tokens = pointer::split(&patch.path)
            .ok_or_else(|| PatchError::InvalidPointer(patch.path.clone()))?;
        let Some((last, parents)) = tokens.split_last() else {
            return self.replace_whole(patch);
        };

        let schema = self.model.schema().clone();
        let mut container_ty = self
            .type_id()
            .ok_or_else(|| PatchError::PathNotFound(pointer::format(&self.path)))?;
        let mut container = self.path.clone();
        for token in parents {
            let (seg, ty) = self.step(container_ty, token, &container)?;
            container.push(seg);
            container_ty = ty;
        }

        let len = self
            .model
            .with_node(&container, |node| match node {
                Some(Json::Array(xs)) => Ok(Some(xs.len())),
                Some(Json::Object(_)) => Ok(None),
                Some(_) => Err(PatchError::NotAContainer(pointer::format(&container))),
                None => Err(PatchError::PathNotFound(pointer::format(&container))),
            })?;

        let (seg, edit, shifted) = match (schema.kind(container_ty), len) {
            (TypeKind::Object(object), None) => {
                if object.computed.contains_key(last) {
                    return Err(PatchError::ComputedField(last.clone()));
                }
                let field = *object
                    .fields
                    .get(last)
                    .ok_or_else(|| PatchError::UnknownField(last.clone()))?;
                let at = child_path(&container, Seg::Field(last.clone()));
                let incoming = match patch.op {
                    PatchOp::Remove => None,
                    PatchOp::Add | PatchOp::Replace => patch.value.as_ref(),
                };
                let edit = match schema.instantiate_slot(field, incoming, &at)? {
                    Some(value) => Edit::Set(value),
                    None => Edit::Unset,
                };
                (Seg::Field(last.clone()), edit, None)
            }
            (TypeKind::Array { items }, Some(len)) => {
                let items = *items;
                let index = match (patch.op, last.as_str()) {
                    (PatchOp::Add, "-") => len,
                    _ => last
                        .parse::<usize>()
                        .map_err(|_| PatchError::InvalidIndex(last.clone()))?,
                };
                let in_bounds = match patch.op {
                    PatchOp::Add => index <= len,
                    PatchOp::Replace | PatchOp::Remove => index < len,
                };
                if !in_bounds {
                    return Err(PatchError::InvalidIndex(last.clone()));
                }
                let at = child_path(&container, Seg::Index(index));
                match patch.op {
                    PatchOp::Add => {
                        let value = self.element(items, patch.value.as_ref(), &at)?;
                        (Seg::Index(index), Edit::Insert(index, value), Some((container.clone(), index)))
                    }
                    PatchOp::Replace => {
                        let value = self.element(items, patch.value.as_ref(), &at)?;
                        (Seg::Index(index), Edit::Set(value), None)
                    }
                    PatchOp::Remove => (Seg::Index(index), Edit::Delete(index), Some((container.clone(), index))),
                }
            }
            _ => return Err(PatchError::NotAContainer(pointer::format(&container))),
        };

        {
            let mut data = self.model.inner.data.borrow_mut();
            let node = pointer::get_mut(&mut data, &container)
                .ok_or_else(|| PatchError::PathNotFound(pointer::format(&container)))?;
            match (node, &seg, edit) {
                (Json::Object(map), Seg::Field(name), Edit::Set(value)) => {
                    map.insert(name.clone(), value);
                }
                (Json::Object(map), Seg::Field(name), Edit::Unset) => {
                    map.shift_remove(name);
                }
                (Json::Array(xs), Seg::Index(i), Edit::Set(value)) => xs[*i] = value,
                (Json::Array(xs), _, Edit::Insert(i, value)) => xs.insert(i, value),
                (Json::Array(xs), _, Edit::Delete(i)) => {
                    xs.remove(i);
                }
                _ => return Err(PatchError::NotAContainer(pointer::format(&container))),
            }
        }

        let change = Change {
            model: self.model.id(),
            path: child_path(&container, seg),
            shifted,
        };
        let marked = self.model.runtime().notify(&change);
        debug!(op = patch.op.as_str(), path = %pointer::format(&change.path), marked, "patch applied");
        Ok(change)
    }

    /// Resolve one intermediate token against the type of its container.
    fn step(&self, ty: TypeId, token: &str, container: &[Seg]) -> Result<(Seg, TypeId), PatchError> {
        let schema = self.model.schema();
        match schema.kind(ty) {
            TypeKind::Object(object) => {
                if object.computed.contains_key(token) {
                    return Err(PatchError::ComputedField(token.to_string()));
                }
                let field = object
                    .fields
                    .get(token)
                    .ok_or_else(|| PatchError::UnknownField(token.to_string()))?;
                Ok((Seg::Field(token.to_string()), *field))
            }
            TypeKind::Array { items } => {
                let index = token
                    .parse::<usize>()
                    .map_err(|_| PatchError::InvalidIndex(token.to_string()))?;
                Ok((Seg::Index(index), *items))
            }
            _ => Err(PatchError::NotAContainer(pointer::format(container))),
        }
    }

    /// Array slots always hold something; an absent optional item is `null`.
    fn element(&self, items: TypeId, value: Option<&Json>, at: &[Seg]) -> Result<Json, ValidationError> {
        Ok(self
            .model
            .schema()
            .instantiate_slot(items, value, at)?
            .unwrap_or(Json::Null))
    }

    /// `path: ""` swaps the referenced node for a new value of the same type.
    fn replace_whole(&self, patch: &Patch) -> Result<Change, PatchError> {
        let at = pointer::format(&self.path);
        if patch.op == PatchOp::Remove {
            return Err(PatchError::WholeTarget(at));
        }
        let ty = self.type_id().ok_or_else(|| PatchError::PathNotFound(at.clone()))?;
        let value = match patch.value.as_ref().filter(|v| !v.is_null()) {
            Some(value) => self.model.schema().instantiate(ty, value, &self.path)?,
            None => return Err(ValidationError::new(&self.path, "value is required").into()),
        };
        {
            let mut data = self.model.inner.data.borrow_mut();
            let node = pointer::get_mut(&mut data, &self.path).ok_or_else(|| PatchError::PathNotFound(at))?;
            *node = value;
        }
        let change = Change { model: self.model.id(), path: self.path.clone(), shifted: None };
        let marked = self.model.runtime().notify(&change);
        debug!(op = patch.op.as_str(), path = %pointer::format(&change.path), marked, "patch applied");
        Ok(change)
    }
}

fn child_path(parent: &[Seg], seg: Seg) -> Vec<Seg> {
    let mut path = parent.to_vec();
    path.push(seg);
    path
}

// --------------------------------- Tests ---------------------------------- //
