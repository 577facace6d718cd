use super::parser::{BinaryOp, Expr, UnaryOp};
use super::{Context, Value};
use crate::error::ExprError;

pub fn eval(expr: &Expr, ctx: &Context) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Name(name) => Ok(ctx.get(name).cloned().unwrap_or_default()),
        Expr::Member(target, name) => Ok(eval(target, ctx)?.member(name)),
        Expr::Index(target, index) => eval(target, ctx)?.index(&eval(index, ctx)?),
        Expr::Unary(op, operand) => unary(*op, eval(operand, ctx)?),
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            let lhs = eval(lhs, ctx)?;
            if lhs.is_truthy() { eval(rhs, ctx) } else { Ok(lhs) }
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            let lhs = eval(lhs, ctx)?;
            if lhs.is_truthy() { Ok(lhs) } else { eval(rhs, ctx) }
        }
        Expr::Binary(op, lhs, rhs) => binary(*op, eval(lhs, ctx)?, eval(rhs, ctx)?),
        Expr::List(items) => Ok(Value::List(
            items.iter().map(|e| eval(e, ctx)).collect::<Result<_, _>>()?,
        )),
        Expr::Call(name, args) => {
            let args = args.iter().map(|e| eval(e, ctx)).collect::<Result<Vec<_>, _>>()?;
            call(name, args)
        }
    }
}

fn unary(op: UnaryOp, operand: Value) -> Result<Value, ExprError> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Neg, v) => Err(ExprError::UnaryMismatch { op: "-".into(), operand: v.kind() }),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    let mismatch = |lhs: &Value, rhs: &Value| ExprError::TypeMismatch {
        op: op.symbol().to_string(),
        left: lhs.kind(),
        right: rhs.kind(),
    };
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Add => match (&lhs, &rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(lhs.display() + &rhs.display()))
            }
            _ => Err(mismatch(&lhs, &rhs)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Value::Number(a), Value::Number(b)) = (&lhs, &rhs) else {
                return Err(mismatch(&lhs, &rhs));
            };
            let (a, b) = (*a, *b);
            if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0.0 {
                return Err(ExprError::Arithmetic("division by zero".into()));
            }
            Ok(Value::Number(match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&lhs, &rhs) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => return Err(mismatch(&lhs, &rhs)),
            };
            let Some(ordering) = ordering else { return Ok(Value::Bool(false)) };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited in eval"),
    }
}

// ------------------------------- Builtins --------------------------------- //

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), ExprError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ExprError::Arity {
            function: name.to_string(),
            expected: expected.to_string(),
            found: args.len(),
        })
    }
}

fn call(name: &str, mut args: Vec<Value>) -> Result<Value, ExprError> {
    match name {
        "length" => {
            arity(name, &args, 1)?;
            let n = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Map(m) => m.len(),
                other => other
                    .items()
                    .map(|xs| xs.len())
                    .ok_or_else(|| ExprError::Shape {
                        expected: "a string or list".into(),
                        found: other.kind().into(),
                    })?,
            };
            Ok(Value::Number(n as f64))
        }
        "concat" => Ok(Value::String(args.iter().map(Value::display).collect())),
        "string" => {
            arity(name, &args, 1)?;
            Ok(Value::String(args[0].display()))
        }
        "join" => {
            arity(name, &args, 2)?;
            let items = args[0].items().ok_or_else(|| ExprError::Shape {
                expected: "a list".into(),
                found: args[0].kind().into(),
            })?;
            let sep = args[1].display();
            Ok(Value::String(items.iter().map(Value::display).collect::<Vec<_>>().join(&sep)))
        }
        "if" => {
            arity(name, &args, 3)?;
            let otherwise = args.pop().unwrap_or_default();
            let then = args.pop().unwrap_or_default();
            Ok(if args[0].is_truthy() { then } else { otherwise })
        }
        "not" => {
            arity(name, &args, 1)?;
            Ok(Value::Bool(!args[0].is_truthy()))
        }
        _ => Err(ExprError::UnknownFunction(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;
    use serde_json::json;

    fn run(src: &str, ctx: serde_json::Value) -> Result<Value, ExprError> {
        eval(&parse(src)?, &Context::from_json(&ctx))
    }

    #[test]
    fn reads_paths_from_context() {
        let ctx = json!({"$self": {"count": 5, "tags": ["a", "b"]}});
        assert_eq!(run("$self.count", ctx.clone()), Ok(Value::Number(5.0)));
        assert_eq!(run("$self.tags[1]", ctx.clone()), Ok(Value::from("b")));
        assert_eq!(run("$self.missing.deeper", ctx.clone()), Ok(Value::Undefined));
        assert_eq!(run("$nobody", ctx), Ok(Value::Undefined));
    }

    #[test]
    fn arithmetic_and_concatenation() {
        let ctx = json!({"$self": {"count": 5, "name": "x"}});
        assert_eq!(run("$self.count * 2 - 1", ctx.clone()), Ok(Value::Number(9.0)));
        assert_eq!(run("$self.name + $self.count", ctx.clone()), Ok(Value::from("x5")));
        assert_eq!(run("7 % 4", ctx.clone()), Ok(Value::Number(3.0)));
        assert!(matches!(run("true + 1", ctx.clone()), Err(ExprError::TypeMismatch { .. })));
        assert!(matches!(run("1 / 0", ctx), Err(ExprError::Arithmetic(_))));
    }

    #[test]
    fn logic_short_circuits_and_returns_operands() {
        let ctx = json!({"$self": {"name": ""}});
        assert_eq!(run("$self.name || 'anonymous'", ctx.clone()), Ok(Value::from("anonymous")));
        assert_eq!(run("false && (1 / 0)", ctx.clone()), Ok(Value::Bool(false)));
        assert_eq!(run("!$self.name", ctx.clone()), Ok(Value::Bool(true)));
        assert_eq!(run("2 <= 3 && 'a' < 'b'", ctx), Ok(Value::Bool(true)));
    }

    #[test]
    fn builtins() {
        let ctx = json!({"$self": {"tags": ["a", "b"], "done": true}});
        assert_eq!(run("length($self.tags)", ctx.clone()), Ok(Value::Number(2.0)));
        assert_eq!(run("join($self.tags, ', ')", ctx.clone()), Ok(Value::from("a, b")));
        assert_eq!(run("if($self.done, 'yes', 'no')", ctx.clone()), Ok(Value::from("yes")));
        assert_eq!(run("concat('n=', 1, '!')", ctx.clone()), Ok(Value::from("n=1!")));
        assert!(matches!(run("eval('x')", ctx.clone()), Err(ExprError::UnknownFunction(_))));
        assert!(matches!(run("length()", ctx), Err(ExprError::Arity { .. })));
    }
}
