//! Render user interfaces from two JSON documents: a model schema and a
//! view tree bound to it through a small expression language.
pub mod bundle;
pub mod error;
pub mod expr;
pub mod jq_exec;
pub mod model;
pub mod path_de;
pub mod pointer;
pub mod reactive;
pub mod schema;
pub mod view;

pub use error::{Error, Result};
