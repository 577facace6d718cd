//! A model schema, a view and optional data in one document, and a live
//! session over it. This is what the CLI and the sample runner drive.
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use tracing::{debug, info};

use crate::error::{ActionError, Result};
use crate::expr::{Context, Value};
use crate::model::{factory, ModelInstance, Patch, TypeInstanceFactory};
use crate::reactive::Runtime;
use crate::schema::Schema;
use crate::view::{BoundaryId, ComponentRegistry, ViewDocument, ViewInterpreter};

/// `{ "model": PropertySpec, "view": ViewDocument, "data"?: initial value }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub model: Json,
    #[serde(default)]
    pub view: ViewDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Json>,
}

impl Bundle {
    pub fn from_json(document: Json) -> Result<Self> {
        Ok(crate::path_de::from_value_with_path(document)?)
    }

    pub fn schema(&self) -> Result<Schema> {
        Schema::from_json(&self.model)
    }
}

pub struct Session {
    model: ModelInstance,
    interp: ViewInterpreter,
    root: BoundaryId,
}

impl Session {
    /// Compile the schema, create the model (from `data`, or the minimal
    /// valid value when there is none) and mount the view over it.
    pub fn start(bundle: &Bundle, registry: ComponentRegistry) -> Result<Self> {
        let schema = Rc::new(bundle.schema()?);
        let runtime = Runtime::new();
        let initial = match &bundle.data {
            Some(data) => data.clone(),
            None => factory::minimal_value(&schema, schema.root()),
        };
        let model = TypeInstanceFactory::new(runtime.clone()).create(&schema, &initial)?;
        let interp = ViewInterpreter::new(registry, runtime);
        let root = interp.render_view(&bundle.view, &Context::root(&model));
        info!(types = schema.len(), boundaries = interp.mounted(), "session started");
        Ok(Self { model, interp, root })
    }

    pub fn model(&self) -> &ModelInstance {
        &self.model
    }

    pub fn interpreter(&self) -> &ViewInterpreter {
        &self.interp
    }

    pub fn describe(&self) -> String {
        self.model.describe()
    }

    /// Apply a patch to the root model and re-render what it affected.
    pub fn apply(&self, patch: &Patch) -> Result<usize> {
        self.model.apply_patch(patch)?;
        Ok(self.interp.flush())
    }

    /// Invoke handler `PROP` of the first rendered `TAG` element (e.g.
    /// `button.onClick`), then re-render.
    pub fn fire(&self, target: &str) -> Result<usize> {
        let (tag, prop) = target
            .split_once('.')
            .filter(|(tag, prop)| !tag.is_empty() && !prop.is_empty())
            .ok_or_else(|| ActionError::BadTarget(target.to_string()))?;
        let handler = {
            let tree = self.view_tree();
            let element = tree.find(tag).ok_or_else(|| ActionError::NoElement(tag.to_string()))?;
            element
                .handler(prop)
                .cloned()
                .ok_or_else(|| ActionError::NoHandler { tag: tag.to_string(), prop: prop.to_string() })?
        };
        handler.try_invoke(Value::Undefined)?;
        let rendered = self.interp.flush();
        debug!(target, rendered, "fired");
        Ok(rendered)
    }

    fn view_tree(&self) -> crate::view::RenderTree {
        self.interp
            .render_tree(self.root)
            .unwrap_or(crate::view::RenderTree::Data(Json::Null))
    }

    pub fn view(&self) -> Json {
        self.view_tree().to_json()
    }

    /// `{"view": ..., "model": ...}`.
    pub fn output(&self) -> Json {
        json!({"view": self.view(), "model": self.model.snapshot()})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn counter() -> Bundle {
        Bundle::from_json(json!({
            "model": {"properties": {
                "count": {"kind": "number", "default": 0, "min": 0, "max": 10},
                "double": {"kind": "computed", "expression": "$self.count * 2"}
            }},
            "view": {"root": {"<>": "div", "children": [
                {"<>": "span", "children": "#$self.count"},
                {"<>": "Button", "onClick": "%($self, 'replace', '/count', $self.count + 1)", "children": "Increment"},
                "#$self.double"
            ]}}
        }))
        .unwrap()
    }

    #[test]
    fn session_fires_handlers_and_rerenders() {
        let session = Session::start(&counter(), ComponentRegistry::standard()).unwrap();
        assert_eq!(session.model().snapshot(), json!({"count": 0}));
        session.fire("button.onClick").unwrap();
        session.fire("button.onClick").unwrap();
        assert_eq!(
            session.output(),
            json!({
                "view": {"<>": "div", "children": [
                    {"<>": "span", "children": 2},
                    {"<>": "button", "className": "button",
                     "onClick": "%($self, 'replace', '/count', $self.count + 1)", "children": "Increment"},
                    4
                ]},
                "model": {"count": 2}
            })
        );
    }

    #[test]
    fn bad_fire_targets_are_reported() {
        let session = Session::start(&counter(), ComponentRegistry::standard()).unwrap();
        assert!(matches!(session.fire("button"), Err(Error::Action(ActionError::BadTarget(_)))));
        assert!(matches!(session.fire("form.onSubmit"), Err(Error::Action(ActionError::NoElement(_)))));
        assert!(matches!(
            session.fire("span.onClick"),
            Err(Error::Action(ActionError::NoHandler { .. }))
        ));
    }

    #[test]
    fn patches_flush_immediately() {
        let session = Session::start(&counter(), ComponentRegistry::standard()).unwrap();
        assert_eq!(session.apply(&Patch::replace("/count", json!(3))).unwrap(), 2);
        assert_eq!(session.view()["children"][2], json!(6));
        assert!(session.apply(&Patch::replace("/count", json!(30))).is_err());
        assert_eq!(session.model().snapshot(), json!({"count": 3}));
    }

    #[test]
    fn bundles_without_a_view_render_the_placeholder() {
        let bundle = Bundle::from_json(json!({"model": {"properties": {}}})).unwrap();
        let session = Session::start(&bundle, ComponentRegistry::new()).unwrap();
        assert_eq!(session.view(), json!({"<>": "h1", "children": "Empty View"}));
        assert_eq!(session.describe(), "{}");
    }
}
