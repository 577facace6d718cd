//! Sandboxed expression language for bindings and computed fields.
//!
//! Expressions are parsed into a small AST and interpreted; nothing in here
//! can reach host code. Grammar, loosest to tightest:
//!
//! ```text
//! expr    := or
//! or      := and ("||" and)*
//! and     := eq ("&&" eq)*
//! eq      := cmp (("==" | "!=") cmp)*
//! cmp     := add (("<" | "<=" | ">" | ">=") add)*
//! add     := mul (("+" | "-") mul)*
//! mul     := unary (("*" | "/" | "%") unary)*
//! unary   := ("!" | "-") unary | postfix
//! postfix := primary ("." name | "[" expr "]")*
//! primary := number | string | true | false | null | $name | name
//!          | name "(" args ")" | "(" expr ("," expr)* ")" | "[" args "]"
//! ```
pub mod context;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub use context::Context;
pub use value::Value;

use crate::error::ExprError;
use parser::Expr;

/// Evaluates binding expressions against a context. Must report failures as
/// `Err`, never panic.
pub trait Evaluator {
    fn evaluate(&self, source: &str, context: &Context) -> Result<Value, ExprError>;
}

/// A parsed expression, ready to run any number of times.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    expr: Expr,
}

impl Program {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        Ok(Self { expr: parser::parse(source)? })
    }

    pub fn run(&self, context: &Context) -> Result<Value, ExprError> {
        eval::eval(&self.expr, context)
    }
}

/// The built-in [`Evaluator`]. Keeps successfully parsed programs by source
/// text; parse failures are re-reported on every call.
#[derive(Debug, Default)]
pub struct Sandbox {
    programs: RefCell<HashMap<String, Rc<Program>>>,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn program(&self, source: &str) -> Result<Rc<Program>, ExprError> {
        if let Some(program) = self.programs.borrow().get(source) {
            return Ok(program.clone());
        }
        let program = Rc::new(Program::parse(source)?);
        self.programs.borrow_mut().insert(source.to_string(), program.clone());
        Ok(program)
    }
}

impl Evaluator for Sandbox {
    fn evaluate(&self, source: &str, context: &Context) -> Result<Value, ExprError> {
        self.program(source)?.run(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sandbox_caches_parsed_programs() {
        let sandbox = Sandbox::new();
        let ctx = Context::from_json(&json!({"$self": {"count": 5}}));
        assert_eq!(sandbox.evaluate("$self.count", &ctx), Ok(Value::Number(5.0)));
        assert_eq!(sandbox.evaluate("$self.count", &ctx), Ok(Value::Number(5.0)));
        assert_eq!(sandbox.programs.borrow().len(), 1);

        assert!(sandbox.evaluate("$self.bogus(", &ctx).is_err());
        assert_eq!(sandbox.programs.borrow().len(), 1);
    }

    #[test]
    fn deeply_nested_input_fails_instead_of_overflowing() {
        let sandbox = Sandbox::new();
        let src = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
        let err = sandbox.evaluate(&src, &Context::new()).unwrap_err();
        assert!(err.to_string().contains("expression nested too deeply"), "{err}");
    }
}
