//! Resolving view nodes under reactive render boundaries.
//!
//! Every element, every collection and every collection item is its own
//! boundary: it is evaluated inside [`Runtime::track`], so it re-renders
//! only when something it read changes. Boundaries form a tree. When a
//! boundary re-renders, the child boundaries it asks for are matched by
//! position against its previous children; a child whose node and context
//! are unchanged is kept as it is, the others are created fresh and any
//! previous child left unmatched is unmounted.
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value as Json;
use tracing::{debug, error};

use super::node::{ViewDocument, ViewNode};
use super::registry::ComponentRegistry;
use super::render::{BoundaryId, EventHandler, HostElement, Props, RenderTree, Rendered};
use crate::expr::{Context, Evaluator, Sandbox, Value};
use crate::reactive::Runtime;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Role {
    /// A mounted root node.
    View,
    Element,
    Collection,
    /// One position of a collection: its template under `$self`/`$index`.
    Item,
}

struct Boundary {
    role: Role,
    node: ViewNode,
    context: Context,
    parent: Option<BoundaryId>,
    children: Vec<BoundaryId>,
    output: Rendered,
    renders: usize,
}

/// Per-render bookkeeping for positional child matching.
struct Frame {
    previous: Vec<BoundaryId>,
    cursor: usize,
    children: Vec<BoundaryId>,
    owner: BoundaryId,
}

pub struct ViewInterpreter {
    registry: ComponentRegistry,
    evaluator: Rc<dyn Evaluator>,
    runtime: Runtime,
    boundaries: RefCell<BTreeMap<BoundaryId, Boundary>>,
    frames: RefCell<Vec<Frame>>,
}

impl ViewInterpreter {
    /// Takes ownership of the registry; it cannot change afterwards.
    pub fn new(registry: ComponentRegistry, runtime: Runtime) -> Self {
        Self {
            registry,
            evaluator: Rc::new(Sandbox::new()),
            runtime,
            boundaries: RefCell::new(BTreeMap::new()),
            frames: RefCell::new(Vec::new()),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Rc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    // ---- Resolution ---- //

    /// Resolve one node. Elements and collections come back as boundaries
    /// owned by whichever boundary is rendering. Outside a render they are
    /// roots of their own, released by [`unmount`](Self::unmount) or
    /// [`unmount_all`](Self::unmount_all).
    pub fn resolve(&self, node: &ViewNode, context: &Context) -> Rendered {
        match node {
            ViewNode::Literal(value) => Rendered::Value(value.clone()),
            ViewNode::Read(expression) => Rendered::Value(self.read(expression, context)),
            ViewNode::Write(expression) => Rendered::Handler(EventHandler::new(
                expression.as_str(),
                context.clone(),
                self.evaluator.clone(),
            )),
            ViewNode::Sequence(items) => {
                Rendered::Sequence(items.iter().map(|item| self.resolve(item, context)).collect())
            }
            ViewNode::Collection { .. } => Rendered::Boundary(self.child(Role::Collection, node, context)),
            ViewNode::Element { .. } => Rendered::Boundary(self.child(Role::Element, node, context)),
            ViewNode::Opaque(raw) => Rendered::Opaque(raw.clone()),
        }
    }

    pub fn resolve_json(&self, raw: &Json, context: &Context) -> Rendered {
        self.resolve(&ViewNode::classify(raw), context)
    }

    fn read(&self, expression: &str, context: &Context) -> Value {
        self.evaluator.evaluate(expression, context).unwrap_or_else(|error| {
            error!(%expression, %error, "read binding failed");
            Value::Undefined
        })
    }

    fn evaluate(&self, role: Role, node: &ViewNode, context: &Context) -> Rendered {
        match (role, node) {
            (Role::Element, ViewNode::Element { tag, props }) => self.element(tag, props, context),
            (Role::Collection, ViewNode::Collection { source, template }) => {
                self.collection(source, template, context)
            }
            _ => self.resolve(node, context),
        }
    }

    fn element(&self, tag: &str, props: &IndexMap<String, ViewNode>, context: &Context) -> Rendered {
        let mut resolved = Props::new();
        for (name, prop) in props {
            let value = self.resolve(prop, context);
            value.observe_deep();
            resolved.insert(name.clone(), value);
        }
        match self.registry.lookup(tag) {
            Some(component) => component.render(resolved),
            None => Rendered::Host(HostElement { tag: tag.to_string(), props: resolved }),
        }
    }

    fn collection(&self, source: &ViewNode, template: &Rc<ViewNode>, context: &Context) -> Rendered {
        let items = match self.resolve(source, context) {
            Rendered::Value(value) => value.items().unwrap_or_default(),
            Rendered::Sequence(items) => items
                .into_iter()
                .map(|item| match item {
                    Rendered::Value(value) => value,
                    _ => Value::Undefined,
                })
                .collect(),
            _ => Vec::new(),
        };
        let rendered = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let scope = context.with("$self", item).with("$index", index as f64);
                Rendered::Boundary(self.child(Role::Item, template, &scope))
            })
            .collect();
        Rendered::Sequence(rendered)
    }

    // ---- Boundaries ---- //

    /// The boundary for `node` at the next child position of the boundary
    /// currently rendering: the previous occupant when it still matches,
    /// otherwise a freshly mounted one.
    fn child(&self, role: Role, node: &ViewNode, context: &Context) -> BoundaryId {
        let (owner, candidate) = {
            let mut frames = self.frames.borrow_mut();
            match frames.last_mut() {
                Some(frame) => {
                    let candidate = frame.previous.get(frame.cursor).copied();
                    frame.cursor += 1;
                    (Some(frame.owner), candidate)
                }
                None => (None, None),
            }
        };
        let reusable = candidate.filter(|id| {
            self.boundaries
                .borrow()
                .get(id)
                .is_some_and(|b| b.role == role && b.node == *node && b.context == *context)
        });
        let id = match reusable {
            Some(id) => id,
            None => self.spawn(role, node.clone(), context.clone(), owner),
        };
        if let Some(frame) = self.frames.borrow_mut().last_mut() {
            frame.children.push(id);
        }
        id
    }

    fn spawn(&self, role: Role, node: ViewNode, context: Context, parent: Option<BoundaryId>) -> BoundaryId {
        let id = self.runtime.observer();
        self.boundaries.borrow_mut().insert(
            id,
            Boundary {
                role,
                node,
                context,
                parent,
                children: Vec::new(),
                output: Rendered::Value(Value::Undefined),
                renders: 0,
            },
        );
        self.render(id);
        id
    }

    fn render(&self, id: BoundaryId) {
        let (role, node, context, previous) = {
            let mut boundaries = self.boundaries.borrow_mut();
            let Some(boundary) = boundaries.get_mut(&id) else { return };
            (
                boundary.role,
                boundary.node.clone(),
                boundary.context.clone(),
                std::mem::take(&mut boundary.children),
            )
        };
        self.frames.borrow_mut().push(Frame {
            previous: previous.clone(),
            cursor: 0,
            children: Vec::new(),
            owner: id,
        });
        let output = self.runtime.track(id, || self.evaluate(role, &node, &context));
        let children = self.frames.borrow_mut().pop().map(|f| f.children).unwrap_or_default();

        let kept: BTreeSet<_> = children.iter().copied().collect();
        for stale in previous.into_iter().filter(|id| !kept.contains(id)) {
            self.drop_boundary(stale);
        }
        if let Some(boundary) = self.boundaries.borrow_mut().get_mut(&id) {
            boundary.children = children;
            boundary.output = output;
            boundary.renders += 1;
            debug!(boundary = ?id, ?role, renders = boundary.renders, "rendered");
        }
    }

    /// Mount `node` as a root boundary of its own and render it.
    pub fn mount(&self, node: &ViewNode, context: &Context) -> BoundaryId {
        self.spawn(Role::View, node.clone(), context.clone(), None)
    }

    /// Mount a view document's root, or an "Empty View" heading when it has
    /// none.
    pub fn render_view(&self, document: &ViewDocument, context: &Context) -> BoundaryId {
        let root = document.root_node().unwrap_or_else(ViewNode::placeholder);
        self.mount(&root, context)
    }

    /// Re-render every mounted boundary marked dirty since the last flush,
    /// each once, parents before the children they own. Returns how many
    /// boundaries re-rendered.
    pub fn flush(&self) -> usize {
        let mut rendered = 0;
        for id in self.runtime.take_pending() {
            if self.is_mounted(id) {
                self.render(id);
                rendered += 1;
            }
        }
        rendered
    }

    /// Remove a boundary and everything beneath it, with all their
    /// subscriptions.
    pub fn unmount(&self, id: BoundaryId) {
        let parent = self.boundaries.borrow().get(&id).and_then(|b| b.parent);
        if let Some(parent) = parent {
            if let Some(boundary) = self.boundaries.borrow_mut().get_mut(&parent) {
                boundary.children.retain(|child| *child != id);
            }
        }
        self.drop_boundary(id);
    }

    /// Release every root boundary, mounted views and stray resolutions
    /// alike.
    pub fn unmount_all(&self) {
        for root in self.roots() {
            self.drop_boundary(root);
        }
    }

    fn drop_boundary(&self, id: BoundaryId) {
        let Some(boundary) = self.boundaries.borrow_mut().remove(&id) else { return };
        self.runtime.unsubscribe(id);
        for child in boundary.children {
            self.drop_boundary(child);
        }
        debug!(boundary = ?id, "unmounted");
    }

    // ---- Inspection ---- //

    pub fn is_mounted(&self, id: BoundaryId) -> bool {
        self.boundaries.borrow().contains_key(&id)
    }

    /// Boundaries owned by no other boundary.
    pub fn roots(&self) -> Vec<BoundaryId> {
        self.boundaries
            .borrow()
            .iter()
            .filter(|(_, b)| b.parent.is_none())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn mounted(&self) -> usize {
        self.boundaries.borrow().len()
    }

    pub fn render_count(&self, id: BoundaryId) -> usize {
        self.boundaries.borrow().get(&id).map_or(0, |b| b.renders)
    }

    pub fn output(&self, id: BoundaryId) -> Option<Rendered> {
        self.boundaries.borrow().get(&id).map(|b| b.output.clone())
    }

    pub fn children(&self, id: BoundaryId) -> Vec<BoundaryId> {
        self.boundaries.borrow().get(&id).map(|b| b.children.clone()).unwrap_or_default()
    }

    /// The host tree below a boundary, with nested boundaries inlined.
    pub fn render_tree(&self, id: BoundaryId) -> Option<RenderTree> {
        let output = self.output(id)?;
        Some(self.materialize(&output))
    }

    pub fn materialize(&self, rendered: &Rendered) -> RenderTree {
        match rendered {
            Rendered::Value(value) => RenderTree::Data(self.runtime.untracked(|| value.to_json())),
            Rendered::Opaque(raw) => RenderTree::Data(raw.clone()),
            Rendered::Handler(handler) => RenderTree::Handler(handler.clone()),
            Rendered::Sequence(items) => {
                RenderTree::Fragment(items.iter().map(|item| self.materialize(item)).collect())
            }
            Rendered::Host(host) => RenderTree::Element {
                tag: host.tag.clone(),
                props: host
                    .props
                    .iter()
                    .map(|(name, prop)| (name.clone(), self.materialize(prop)))
                    .collect(),
            },
            Rendered::Boundary(id) => self
                .render_tree(*id)
                .unwrap_or(RenderTree::Data(Json::Null)),
        }
    }
}

// --------------------------------- Tests ---------------------------------- //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelInstance, Patch, TypeInstanceFactory};
    use crate::schema::Schema;
    use serde_json::json;
    use tracing_test::traced_test;

    struct Fixture {
        interp: ViewInterpreter,
        model: ModelInstance,
    }

    impl Fixture {
        fn new(schema: Json, data: Json) -> Self {
            let runtime = Runtime::new();
            let schema = Rc::new(Schema::from_json(&schema).unwrap());
            let model = TypeInstanceFactory::new(runtime.clone()).create(&schema, &data).unwrap();
            let interp = ViewInterpreter::new(ComponentRegistry::standard(), runtime);
            Self { interp, model }
        }

        fn counter() -> Self {
            Self::new(
                json!({"properties": {
                    "count": {"kind": "number", "min": 0, "max": 10, "default": 0},
                    "double": {"kind": "computed", "expression": "$self.count * 2"}
                }}),
                json!({"count": 5}),
            )
        }

        fn todos() -> Self {
            Self::new(
                json!({"properties": {
                    "todos": {"kind": "array", "default": [], "items": {"properties": {
                        "title": {"kind": "string", "optional": false}
                    }}}
                }}),
                json!({"todos": [{"title": "a"}, {"title": "b"}]}),
            )
        }

        fn context(&self) -> Context {
            Context::root(&self.model)
        }

        fn mount(&self, view: Json) -> BoundaryId {
            self.interp.render_view(&ViewDocument::new(view), &self.context())
        }

        fn json(&self, id: BoundaryId) -> Json {
            self.interp.render_tree(id).unwrap().to_json()
        }
    }

    fn counter_view() -> Json {
        json!({"<>": "div", "children": [
            {"<>": "span", "children": "#$self.count"},
            {"<>": "Button", "onClick": "%($self, 'replace', '/count', $self.count + 1)", "children": "Increment"},
            "#$self.double"
        ]})
    }

    #[test]
    fn literals_pass_through_unchanged() {
        let f = Fixture::counter();
        let ctx = f.context();
        for raw in [json!(null), json!(true), json!(1.5), json!("plain")] {
            let tree = f.interp.materialize(&f.interp.resolve_json(&raw, &ctx));
            assert_eq!(tree.to_json(), raw);
        }
        let opaque = json!({"style": {"color": "red"}});
        assert_eq!(f.interp.materialize(&f.interp.resolve_json(&opaque, &ctx)).to_json(), opaque);
    }

    #[test]
    fn read_binding_evaluates_against_context() {
        let f = Fixture::counter();
        let rendered = f.interp.resolve_json(&json!("#$self.count"), &f.context());
        assert!(matches!(rendered, Rendered::Value(Value::Number(n)) if n == 5.0));
    }

    #[traced_test]
    #[test]
    fn failing_read_binding_logs_and_yields_absent() {
        let f = Fixture::counter();
        let rendered = f.interp.resolve_json(&json!("#$self.bogus("), &f.context());
        assert!(matches!(rendered, Rendered::Value(Value::Undefined)));
        assert!(logs_contain("read binding failed"));
    }

    #[test]
    fn hosts_can_substitute_the_evaluator() {
        struct Echo;
        impl Evaluator for Echo {
            fn evaluate(&self, source: &str, _: &Context) -> Result<Value, crate::error::ExprError> {
                Ok(Value::String(source.to_uppercase()))
            }
        }
        let f = Fixture::counter();
        let interp = ViewInterpreter::new(ComponentRegistry::new(), Runtime::new()).with_evaluator(Rc::new(Echo));
        let rendered = interp.resolve_json(&json!("#$self.count"), &f.context());
        assert!(matches!(rendered, Rendered::Value(Value::String(s)) if s == "$SELF.COUNT"));
    }

    #[test]
    fn missing_root_renders_placeholder() {
        let f = Fixture::counter();
        let id = f.interp.render_view(&ViewDocument::default(), &f.context());
        assert_eq!(f.json(id), json!({"<>": "h1", "children": "Empty View"}));
    }

    #[test]
    fn unregistered_tags_fall_back_to_host_elements() {
        let f = Fixture::counter();
        let id = f.mount(json!({"<>": "section", "title": "#$self.count"}));
        assert_eq!(f.json(id), json!({"<>": "section", "title": 5}));
    }

    #[test]
    fn increment_handler_adds_one_and_rerenders_dependents() {
        let f = Fixture::counter();
        let root = f.mount(counter_view());
        assert_eq!(
            f.json(root),
            json!({"<>": "div", "children": [
                {"<>": "span", "children": 5},
                {"<>": "button", "className": "button",
                 "onClick": "%($self, 'replace', '/count', $self.count + 1)", "children": "Increment"},
                10
            ]})
        );

        let tree = f.interp.render_tree(root).unwrap();
        let onclick = tree.find("button").and_then(|b| b.handler("onClick")).unwrap().clone();
        assert!(onclick.invoke(Value::Undefined));
        assert_eq!(f.model.get("count"), Value::Number(6.0));

        // the div (reads `double`) and the span (reads `count`)
        assert_eq!(f.interp.flush(), 2);
        let tree = f.json(root);
        assert_eq!(tree["children"][0]["children"], json!(6));
        assert_eq!(tree["children"][2], json!(12));
        assert_eq!(f.interp.flush(), 0);
    }

    #[test]
    fn element_boundaries_only_rerender_on_their_own_reads() {
        let f = Fixture::counter();
        let root = f.mount(counter_view());
        let div = f.interp.children(root)[0];
        let elements = f.interp.children(div);
        assert_eq!(elements.len(), 2);
        let (span, button) = (elements[0], elements[1]);

        f.model.apply_patch(&Patch::replace("/count", json!(7))).unwrap();
        f.model.apply_patch(&Patch::replace("/count", json!(8))).unwrap();
        f.interp.flush();
        assert_eq!(f.interp.render_count(span), 2, "coalesced into one re-render");
        assert_eq!(f.interp.render_count(button), 1);
        assert_eq!(f.interp.render_count(root), 1);
        assert_eq!(f.interp.children(div), vec![span, button], "kept across the parent re-render");
    }

    #[test]
    fn rejected_patch_from_a_handler_changes_nothing() {
        let f = Fixture::new(
            json!({"properties": {"count": {"kind": "number", "max": 1, "default": 1}}}),
            json!({}),
        );
        let root = f.mount(json!({"<>": "Button", "onClick": "%($self, 'replace', '/count', $self.count + 1)"}));
        let tree = f.interp.render_tree(root).unwrap();
        let onclick = tree.find("button").and_then(|b| b.handler("onClick")).unwrap().clone();
        assert!(!onclick.invoke(Value::Undefined));
        assert_eq!(f.model.snapshot(), json!({"count": 1}));
        assert_eq!(f.interp.flush(), 0);
    }

    #[test]
    fn appending_instantiates_exactly_one_template() {
        let f = Fixture::todos();
        let root = f.mount(json!({"<>": "ul", "children": {
            "[]": "#$self.todos",
            "template": {"<>": "li", "index": "#$index", "children": "#$self.title"}
        }}));
        let collection = f.interp.children(f.interp.children(root)[0])[0];
        let items = f.interp.children(collection);
        assert_eq!(items.len(), 2);
        let before = f.interp.mounted();

        f.model.apply_patch(&Patch::add("/todos/-", json!({"title": "c"}))).unwrap();
        f.interp.flush();

        let after = f.interp.children(collection);
        assert_eq!(after.len(), 3);
        assert_eq!(&after[..2], &items[..]);
        // one item boundary plus the `li` element inside it
        assert_eq!(f.interp.mounted(), before + 2);
        for item in &items {
            assert_eq!(f.interp.render_count(*item), 1);
            let li = f.interp.children(*item)[0];
            assert_eq!(f.interp.render_count(li), 1);
        }
        assert_eq!(
            f.json(root),
            json!({"<>": "ul", "children": [
                {"<>": "li", "index": 0, "children": "a"},
                {"<>": "li", "index": 1, "children": "b"},
                {"<>": "li", "index": 2, "children": "c"}
            ]})
        );
    }

    #[test]
    fn removing_an_item_rebinds_later_positions() {
        let f = Fixture::todos();
        let root = f.mount(json!({"[]": "#$self.todos", "template": {"<>": "li", "children": "#$self.title"}}));
        f.model.apply_patch(&Patch::remove("/todos/0")).unwrap();
        f.interp.flush();
        assert_eq!(f.json(root), json!([{"<>": "li", "children": "b"}]));
    }

    #[test]
    fn editing_an_item_leaves_the_collection_alone() {
        let f = Fixture::todos();
        let root = f.mount(json!({"[]": "#$self.todos", "template": {"<>": "li", "children": "#$self.title"}}));
        let collection = f.interp.children(root)[0];
        f.model.apply_patch(&Patch::replace("/todos/1/title", json!("B"))).unwrap();
        assert_eq!(f.interp.flush(), 1);
        assert_eq!(f.interp.render_count(collection), 1);
        assert_eq!(f.json(root), json!([{"<>": "li", "children": "a"}, {"<>": "li", "children": "B"}]));
    }

    #[test]
    fn literal_collections_bind_each_item() {
        let f = Fixture::counter();
        let root = f.mount(json!({"[]": ["x", "y"], "template": "#$index + ':' + $self"}));
        assert_eq!(f.json(root), json!(["0:x", "1:y"]));
    }

    #[test]
    fn unmount_releases_every_subscription() {
        let f = Fixture::todos();
        let root = f.mount(json!({"<>": "div", "children": [
            "#length($self.todos)",
            {"[]": "#$self.todos", "template": {"<>": "li", "children": "#$self.title"}}
        ]}));
        assert!(f.interp.runtime().subscriber_count() > 0);
        f.interp.unmount(root);
        assert_eq!(f.interp.runtime().subscriber_count(), 0);
        assert_eq!(f.interp.mounted(), 0);

        f.model.apply_patch(&Patch::add("/todos/-", json!({"title": "z"}))).unwrap();
        assert_eq!(f.interp.flush(), 0);
    }

    #[test]
    fn elements_resolved_outside_a_view_are_released_as_roots() {
        let f = Fixture::counter();
        let ctx = f.context();
        let view = f.mount(counter_view());
        let span = json!({"<>": "span", "children": "#$self.count"});
        let stray: Vec<_> = (0..5)
            .map(|_| match f.interp.resolve_json(&span, &ctx) {
                Rendered::Boundary(id) => id,
                other => panic!("expected a boundary, got {other:?}"),
            })
            .collect();
        let roots = f.interp.roots();
        assert_eq!(roots.len(), 6);
        assert!(roots.contains(&view) && stray.iter().all(|id| roots.contains(id)));

        f.interp.unmount(stray[0]);
        assert_eq!(f.interp.roots().len(), 5);

        f.interp.unmount_all();
        assert_eq!(f.interp.mounted(), 0);
        assert_eq!(f.interp.runtime().subscriber_count(), 0);
        f.model.apply_patch(&Patch::replace("/count", json!(6))).unwrap();
        assert_eq!(f.interp.flush(), 0);
    }

    #[traced_test]
    #[test]
    fn failing_bindings_leave_their_siblings_alone() {
        let f = Fixture::counter();
        let root = f.mount(json!({"<>": "div", "children": [
            "#$self.bogus(",
            {"<>": "Button", "onClick": "%$self.bogus(", "children": "Broken"},
            {"<>": "span", "children": "#$self.count"}
        ]}));
        let tree = f.json(root);
        assert_eq!(tree["children"][0], Json::Null);
        assert_eq!(tree["children"][2], json!({"<>": "span", "children": 5}));
        assert!(logs_contain("read binding failed"));

        let rendered = f.interp.render_tree(root).unwrap();
        let onclick = rendered.find("button").and_then(|b| b.handler("onClick")).unwrap().clone();
        assert!(!onclick.invoke(Value::Undefined));
        assert_eq!(f.model.get("count"), Value::Number(5.0));

        f.model.apply_patch(&Patch::replace("/count", json!(9))).unwrap();
        assert_eq!(f.interp.flush(), 1);
        assert_eq!(f.json(root)["children"][2], json!({"<>": "span", "children": 9}));
    }

    #[test]
    fn model_props_subscribe_to_their_whole_subtree() {
        let f = Fixture::todos();
        let root = f.mount(json!({"<>": "pre", "data": "#$self.todos"}));
        let pre = f.interp.children(root)[0];
        f.model.apply_patch(&Patch::replace("/todos/0/title", json!("A"))).unwrap();
        assert_eq!(f.interp.flush(), 1);
        assert_eq!(f.interp.render_count(pre), 2);
        assert_eq!(f.json(root)["data"], json!([{"title": "A"}, {"title": "b"}]));
    }
}
