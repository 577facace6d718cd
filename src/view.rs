//! JSON view trees, interpreted against live models.
//!
//! Raw nodes are classified once into [`ViewNode`]s and resolved by the
//! [`ViewInterpreter`] into [`Rendered`] output. The host receives a plain
//! [`RenderTree`] from [`ViewInterpreter::render_tree`].
pub mod interp;
pub mod node;
pub mod registry;
pub mod render;

pub use interp::ViewInterpreter;
pub use node::{ViewDocument, ViewNode};
pub use registry::{Component, ComponentRegistry, HostComponent};
pub use render::{BoundaryId, EventHandler, HostElement, Props, RenderTree, Rendered};
