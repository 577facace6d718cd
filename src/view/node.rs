use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::expr::Value;

/// A raw view JSON node, classified once.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewNode {
    /// null, booleans, numbers and plain strings.
    Literal(Value),
    /// `"#expr"`: evaluated against the context.
    Read(String),
    /// `"%expr"`: becomes an event handler producing one patch.
    Write(String),
    Sequence(Vec<ViewNode>),
    /// `{"[]": source, "template": node}`.
    Collection { source: Rc<ViewNode>, template: Rc<ViewNode> },
    /// `{"<>": tag, ...props}`.
    Element { tag: String, props: Rc<IndexMap<String, ViewNode>> },
    /// Any other object, passed through untouched.
    Opaque(Json),
}

impl ViewNode {
    pub fn classify(raw: &Json) -> Self {
        match raw {
            Json::Null | Json::Bool(_) | Json::Number(_) => ViewNode::Literal(Value::from_json(raw)),
            Json::String(text) => {
                let trimmed = text.trim();
                if let Some(expr) = trimmed.strip_prefix('#') {
                    ViewNode::Read(expr.to_string())
                } else if let Some(expr) = trimmed.strip_prefix('%') {
                    ViewNode::Write(expr.to_string())
                } else {
                    ViewNode::Literal(Value::String(text.clone()))
                }
            }
            Json::Array(items) => ViewNode::Sequence(items.iter().map(ViewNode::classify).collect()),
            Json::Object(members) => {
                if let Some(source) = members.get("[]").filter(|v| truthy(v)) {
                    let template = members
                        .get("template")
                        .map(ViewNode::classify)
                        .unwrap_or(ViewNode::Literal(Value::Undefined));
                    return ViewNode::Collection {
                        source: Rc::new(ViewNode::classify(source)),
                        template: Rc::new(template),
                    };
                }
                if let Some(tag) = members.get("<>").filter(|v| truthy(v)) {
                    let tag = match tag {
                        Json::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    let props = members
                        .iter()
                        .filter(|(name, _)| name.as_str() != "<>")
                        .map(|(name, node)| (name.clone(), ViewNode::classify(node)))
                        .collect();
                    return ViewNode::Element { tag, props: Rc::new(props) };
                }
                ViewNode::Opaque(raw.clone())
            }
        }
    }

    /// `{"<>": "h1", "children": "Empty View"}`, shown for a view without a root.
    pub fn placeholder() -> Self {
        let mut props = IndexMap::new();
        props.insert("children".to_string(), ViewNode::Literal(Value::from("Empty View")));
        ViewNode::Element { tag: "h1".to_string(), props: Rc::new(props) }
    }
}

fn truthy(value: &Json) -> bool {
    Value::from_json(value).is_truthy()
}

/// `{ "root": ViewNode }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewDocument {
    #[serde(default)]
    pub root: Option<Json>,
}

impl ViewDocument {
    pub fn new(root: Json) -> Self {
        Self { root: Some(root) }
    }

    /// The classified root; `None` when it is missing or falsy.
    pub fn root_node(&self) -> Option<ViewNode> {
        self.root.as_ref().filter(|v| truthy(v)).map(ViewNode::classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_are_trimmed_before_dispatch() {
        assert_eq!(ViewNode::classify(&json!("  #$self.count ")), ViewNode::Read("$self.count".into()));
        assert_eq!(ViewNode::classify(&json!("%($self, 'remove', '/x')")), ViewNode::Write("($self, 'remove', '/x')".into()));
        assert_eq!(ViewNode::classify(&json!(" plain ")), ViewNode::Literal(Value::from(" plain ")));
        assert_eq!(ViewNode::classify(&json!(3)), ViewNode::Literal(Value::Number(3.0)));
    }

    #[test]
    fn collection_wins_over_element() {
        let node = ViewNode::classify(&json!({"[]": "#$self.items", "<>": "ul", "template": "#$self"}));
        let ViewNode::Collection { source, template } = node else { panic!("{node:?}") };
        assert_eq!(*source, ViewNode::Read("$self.items".into()));
        assert_eq!(*template, ViewNode::Read("$self".into()));

        let node = ViewNode::classify(&json!({"[]": false, "<>": "ul", "class": "x"}));
        let ViewNode::Element { tag, props } = node else { panic!("{node:?}") };
        assert_eq!(tag, "ul");
        assert_eq!(props.keys().collect::<Vec<_>>(), ["[]", "class"]);
    }

    #[test]
    fn falsy_tags_are_opaque() {
        let raw = json!({"<>": "", "x": 1});
        assert_eq!(ViewNode::classify(&raw), ViewNode::Opaque(raw.clone()));
        assert_eq!(ViewNode::classify(&json!({"a": 1})), ViewNode::Opaque(json!({"a": 1})));
    }

    #[test]
    fn missing_or_falsy_roots_have_no_node() {
        assert_eq!(ViewDocument::default().root_node(), None);
        assert_eq!(ViewDocument::new(json!(null)).root_node(), None);
        assert_eq!(ViewDocument::new(json!("")).root_node(), None);
        assert!(ViewDocument::new(json!({"<>": "div"})).root_node().is_some());
    }
}
