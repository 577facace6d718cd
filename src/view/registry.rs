use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::render::{HostElement, Props, Rendered};
use crate::expr::Value;

/// Anything that turns resolved props into output.
pub trait Component {
    fn render(&self, props: Props) -> Rendered;
}

impl<F> Component for F
where
    F: Fn(Props) -> Rendered,
{
    fn render(&self, props: Props) -> Rendered {
        self(props)
    }
}

/// A host tag with fixed props. Props given at render time come after the
/// fixed ones and override them.
#[derive(Clone, Debug)]
pub struct HostComponent {
    tag: String,
    fixed: Props,
}

impl HostComponent {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), fixed: Props::new() }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Rendered>) -> Self {
        self.fixed.insert(name.into(), value.into());
        self
    }
}

impl Component for HostComponent {
    fn render(&self, props: Props) -> Rendered {
        let mut merged = self.fixed.clone();
        merged.extend(props);
        Rendered::Host(HostElement { tag: self.tag.clone(), props: merged })
    }
}

/// Tag name → component. Built up front, then moved into the interpreter,
/// which only ever reads it.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    components: HashMap<String, Rc<dyn Component>>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.components.keys().collect();
        names.sort();
        f.debug_struct("ComponentRegistry").field("components", &names).finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The components every view can use: `Button` → `<button className="button">`,
    /// and `undefined`, which renders the text `undefined` for a tag that
    /// came from a missing value.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .register("Button", HostComponent::new("button").with_prop("className", "button"))
            .register("undefined", |_: Props| Rendered::Value(Value::from("undefined")));
        registry
    }

    /// Inserts, or replaces an earlier registration of the same name.
    pub fn register(&mut self, name: impl Into<String>, component: impl Component + 'static) -> &mut Self {
        self.components.insert(name.into(), Rc::new(component));
        self
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<dyn Component>> {
        self.components.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
