//! Recursive-descent parser, one function per precedence level.
use super::lexer::{Token, tokenize};
use super::Value;
use crate::error::ExprError;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Deepest expression tree the parser builds. The evaluator recurses once
/// per level, so this also bounds evaluation.
const MAX_DEPTH: usize = 64;

pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { src, tokens, pos: 0, nesting: 0 };
    let expr = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
    nesting: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn eat(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Sym(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, sym: &str) -> Result<(), ExprError> {
        if self.eat(sym) { Ok(()) } else { Err(self.error(&format!("expected `{sym}`"))) }
    }

    fn error(&self, message: &str) -> ExprError {
        let at = self.tokens.get(self.pos).map_or(self.src.len(), |(at, _)| *at);
        let found = match self.peek() {
            Some(Token::Sym(s)) => format!(", found `{s}`"),
            Some(Token::Name(n)) => format!(", found `{n}`"),
            Some(Token::Number(n)) => format!(", found `{n}`"),
            Some(Token::Str(s)) => format!(", found {s:?}"),
            None => ", found end of input".to_string(),
        };
        ExprError::Parse {
            expression: self.src.to_string(),
            at,
            message: format!("{message}{found}"),
        }
    }

    fn nested(&mut self, parse: fn(&mut Self) -> Result<Expr, ExprError>) -> Result<Expr, ExprError> {
        if self.nesting >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.nesting += 1;
        let expr = parse(self);
        self.nesting -= 1;
        expr
    }

    /// Left-leaning chains (`a + b + c`, `a.b.c`) deepen the tree without
    /// recursing, so every composite node is measured as it is built.
    fn node(&self, expr: Expr) -> Result<Expr, ExprError> {
        if depth(&expr) > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(expr)
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (sym, op) in ops {
                if self.eat(sym) {
                    let rhs = next(self)?;
                    lhs = self.node(Expr::Binary(*op, Box::new(lhs), Box::new(rhs)))?;
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        self.nested(|p| p.binary_level(&[("||", BinaryOp::Or)], Self::and))
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(&[("&&", BinaryOp::And)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(&[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[("<=", BinaryOp::Le), (">=", BinaryOp::Ge), ("<", BinaryOp::Lt), (">", BinaryOp::Gt)],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat("!") {
            let operand = self.nested(Self::unary)?;
            return self.node(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        if self.eat("-") {
            let operand = self.nested(Self::unary)?;
            return self.node(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(".") {
                match self.next() {
                    Some(Token::Name(name)) if !name.starts_with('$') => {
                        expr = self.node(Expr::Member(Box::new(expr), name))?;
                    }
                    _ => {
                        self.pos -= 1;
                        return Err(self.error("expected a member name after `.`"));
                    }
                }
            } else if self.eat("[") {
                let index = self.expr()?;
                self.expect("]")?;
                expr = self.node(Expr::Index(Box::new(expr), Box::new(index)))?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn list(&mut self, close: &str) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expr()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(",")?;
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Name(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "undefined" => Ok(Expr::Literal(Value::Undefined)),
                _ if !name.starts_with('$') && self.eat("(") => {
                    let args = self.list(")")?;
                    self.node(Expr::Call(name, args))
                }
                _ => Ok(Expr::Name(name)),
            },
            Some(Token::Sym("(")) => {
                let mut items = self.list(")")?;
                match items.len() {
                    0 => {
                        self.pos -= 1;
                        Err(self.error("empty parentheses"))
                    }
                    1 => Ok(items.remove(0)),
                    _ => self.node(Expr::List(items)),
                }
            }
            Some(Token::Sym("[")) => {
                let items = self.list("]")?;
                self.node(Expr::List(items))
            }
            _ => {
                self.pos -= 1;
                Err(self.error("expected a value"))
            }
        }
    }
}

fn depth(expr: &Expr) -> usize {
    1 + match expr {
        Expr::Literal(_) | Expr::Name(_) => 0,
        Expr::Member(inner, _) | Expr::Unary(_, inner) => depth(inner),
        Expr::Index(lhs, rhs) | Expr::Binary(_, lhs, rhs) => depth(lhs).max(depth(rhs)),
        Expr::List(items) | Expr::Call(_, items) => items.iter().map(depth).max().unwrap_or(0),
    }
}
